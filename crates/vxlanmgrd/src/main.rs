//! vxlanmgrd entry point.
//!
//! Runs one reconciliation pass against the peer file given on the command
//! line and exits with a status describing how far it got.

use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vxlanmgr_common::SystemExecutor;
use vxlanmgrd::loader;
use vxlanmgrd::{
    Args, BackendKind, BridgeCli, DesiredState, ExitStatus, NativeBackend, NmcliBackend,
    ReconcileReport, Settings, VxlanMgr,
};

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install tracing subscriber")
}

/// Build the selected backend and run one pass.
async fn run(settings: &Settings, desired: &DesiredState) -> anyhow::Result<ReconcileReport> {
    let executor = SystemExecutor::new(settings.use_sudo);
    let fdb = BridgeCli::new(executor);

    let report = match settings.backend {
        BackendKind::Native => {
            let tunnels = NativeBackend::connect().context("failed to open netlink socket")?;
            VxlanMgr::new(tunnels, fdb, settings.bridge.as_str())
                .reconcile(desired)
                .await?
        }
        BackendKind::Nmcli => {
            let tunnels = NmcliBackend::new(executor, settings.methods.clone());
            VxlanMgr::new(tunnels, fdb, settings.bridge.as_str())
                .reconcile(desired)
                .await?
        }
    };
    Ok(report)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success.into(),
                _ => ExitStatus::MissingInput.into(),
            };
        }
    };

    if let Err(e) = init_logging() {
        eprintln!("{:#}", e);
    }

    let settings = match Settings::from_args(args) {
        Ok(Some(settings)) => settings,
        Ok(None) => {
            error!("No peer file given");
            return ExitStatus::MissingInput.into();
        }
        Err(e) => {
            error!("{}", e);
            return ExitStatus::MissingInput.into();
        }
    };

    info!(
        peer_file = %settings.peer_file.display(),
        backend = ?settings.backend,
        bridge = %settings.bridge,
        "Starting vxlanmgrd"
    );

    let desired = match loader::load_file(&settings.peer_file) {
        Ok(desired) => desired,
        Err(e) => {
            error!("{}", e);
            return ExitStatus::for_load_error(&e).into();
        }
    };

    match run(&settings, &desired).await {
        Ok(report) => {
            info!(actions = report.actions.len(), "vxlanmgrd exiting normally");
            ExitStatus::Success.into()
        }
        Err(e) => {
            error!("Reconciliation failed: {:#}", e);
            ExitStatus::ReconcileFailed.into()
        }
    }
}
