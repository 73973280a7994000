//! Daemon configuration from the command line and environment

use std::path::PathBuf;

use clap::Parser;
use vxlanmgr_common::{VxlanMgrError, VxlanMgrResult};

use crate::backend::BackendKind;
use crate::types::{DEFAULT_ADDRESS_METHOD, DEFAULT_BRIDGE};

/// Address-assignment methods applied to tunnels created through nmcli
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMethods {
    pub ipv4: String,
    pub ipv6: String,
}

impl Default for AddressMethods {
    fn default() -> Self {
        Self {
            ipv4: DEFAULT_ADDRESS_METHOD.to_string(),
            ipv6: DEFAULT_ADDRESS_METHOD.to_string(),
        }
    }
}

/// Converge VXLAN tunnels and bridge FDB peers to a declared peer file
#[derive(Debug, Clone, Parser)]
#[command(name = "vxlanmgrd", version, about)]
pub struct Args {
    /// Desired-state JSON file: a list of {vni, remote, interface?} records
    #[arg(value_name = "PEER_FILE")]
    pub peer_file: Option<PathBuf>,

    /// Tunnel backend
    #[arg(long, env = "VXLAN_BACKEND", value_enum, default_value = "native")]
    pub backend: BackendKind,

    /// Shared bridge every tunnel is attached to
    #[arg(long, env = "VXLAN_BRIDGE", default_value = DEFAULT_BRIDGE)]
    pub bridge: String,

    /// ipv4.method for created tunnel connections
    #[arg(long, env = "VXLAN_IPV4_METHOD", default_value = DEFAULT_ADDRESS_METHOD)]
    pub ipv4_method: String,

    /// ipv6.method for created tunnel connections
    #[arg(long, env = "VXLAN_IPV6_METHOD", default_value = DEFAULT_ADDRESS_METHOD)]
    pub ipv6_method: String,

    /// Run privileged commands directly instead of through sudo
    #[arg(long, env = "VXLAN_NO_SUDO")]
    pub no_sudo: bool,
}

/// Validated runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub peer_file: PathBuf,
    pub backend: BackendKind,
    pub bridge: String,
    pub methods: AddressMethods,
    pub use_sudo: bool,
}

impl Settings {
    /// Validate parsed arguments.
    ///
    /// A missing peer file is reported separately by the caller, so it is
    /// returned as `Ok(None)` rather than as an error.
    pub fn from_args(args: Args) -> VxlanMgrResult<Option<Self>> {
        let Some(peer_file) = args.peer_file else {
            return Ok(None);
        };
        if args.bridge.trim().is_empty() {
            return Err(VxlanMgrError::invalid_config("bridge", "must not be empty"));
        }
        for (field, value) in [("ipv4-method", &args.ipv4_method), ("ipv6-method", &args.ipv6_method)] {
            if value.trim().is_empty() {
                return Err(VxlanMgrError::invalid_config(field, "must not be empty"));
            }
        }

        Ok(Some(Self {
            peer_file,
            backend: args.backend,
            bridge: args.bridge,
            methods: AddressMethods {
                ipv4: args.ipv4_method,
                ipv6: args.ipv6_method,
            },
            use_sudo: !args.no_sudo,
        }))
    }
}
