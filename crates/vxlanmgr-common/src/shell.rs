//! External command execution for the VXLAN manager.
//!
//! Commands are built as a program plus an argument list and never pass
//! through a shell, so arguments need no quoting. Commands that change host
//! network state are marked privileged and are run through `sudo` when the
//! executor is configured to escalate.
//!
//! Any output on stderr is treated as failure, whatever the exit code.
//!
//! # Example
//!
//! ```ignore
//! use vxlanmgr_common::shell::{ShellCommand, SystemExecutor, BRIDGE_CMD};
//! use vxlanmgr_common::Executor;
//!
//! let executor = SystemExecutor::new(true);
//! let cmd = ShellCommand::privileged(BRIDGE_CMD).args(["fdb", "show", "dev", "vxlan100"]);
//! let output = executor.execute(&cmd).await?;
//! ```

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{VxlanMgrError, VxlanMgrResult};

/// Path to the `ip` command for network interface configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `bridge` command for bridge/FDB configuration.
pub const BRIDGE_CMD: &str = "/sbin/bridge";

/// Path to the NetworkManager command line client.
pub const NMCLI_CMD: &str = "/usr/bin/nmcli";

/// Path to `sudo`, used to run privileged commands.
pub const SUDO_CMD: &str = "/usr/bin/sudo";

/// An external command: program, arguments and privilege requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    privileged: bool,
}

impl ShellCommand {
    /// Creates an unprivileged command.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privileged: false,
        }
    }

    /// Creates a command that requires elevated privileges.
    pub fn privileged(program: impl Into<String>) -> Self {
        Self {
            privileged: true,
            ..Self::new(program)
        }
    }

    /// Appends one argument (builder pattern).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments (builder pattern).
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (-1 if terminated by a signal).
    pub exit_code: i32,
    /// Trimmed stdout output.
    pub stdout: String,
    /// Trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command exited 0 without writing to stderr.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.stderr.is_empty()
    }
}

/// Runs external commands on behalf of the backends.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `cmd` and returns its stdout.
    ///
    /// Fails with [`VxlanMgrError::Execution`] if the command wrote to
    /// stderr or exited non-zero.
    async fn execute(&self, cmd: &ShellCommand) -> VxlanMgrResult<String>;
}

/// Executor that spawns real processes.
#[derive(Debug, Clone, Copy)]
pub struct SystemExecutor {
    escalate: bool,
}

impl SystemExecutor {
    /// Creates an executor. With `escalate`, privileged commands run under `sudo`.
    pub fn new(escalate: bool) -> Self {
        Self { escalate }
    }

    /// Resolves the program and arguments actually spawned for `cmd`.
    fn resolve<'a>(&self, cmd: &'a ShellCommand) -> (&'a str, Vec<&'a str>) {
        let args = cmd.argv().iter().map(String::as_str);
        if cmd.is_privileged() && self.escalate {
            (SUDO_CMD, std::iter::once(cmd.program()).chain(args).collect())
        } else {
            (cmd.program(), args.collect())
        }
    }

    /// Spawns `cmd` and captures its output without judging it.
    pub async fn exec(&self, cmd: &ShellCommand) -> VxlanMgrResult<ExecResult> {
        let (program, args) = self.resolve(cmd);
        tracing::debug!(command = %cmd, privileged = cmd.is_privileged(), "Executing command");

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| VxlanMgrError::Spawn {
                command: cmd.to_string(),
                source: e,
            })?;

        let result = ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if result.success() {
            tracing::trace!(command = %cmd, "Command succeeded");
        } else {
            tracing::warn!(
                command = %cmd,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "Command failed"
            );
        }

        Ok(result)
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn execute(&self, cmd: &ShellCommand) -> VxlanMgrResult<String> {
        let result = self.exec(cmd).await?;
        if result.success() {
            Ok(result.stdout)
        } else {
            Err(VxlanMgrError::Execution {
                command: cmd.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr,
            })
        }
    }
}
