//! Error types for VXLAN manager operations.
//!
//! Every failure is fatal to the enclosing reconciliation step. Variants
//! carry enough context (command, record, connection) for an operator to
//! fix the root cause and re-run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for VXLAN manager operations.
pub type VxlanMgrResult<T> = Result<T, VxlanMgrError>;

/// Errors that can occur during a reconciliation pass.
#[derive(Debug, Error)]
pub enum VxlanMgrError {
    /// Failed to spawn an external command.
    #[error("Failed to execute command '{command}': {source}")]
    Spawn {
        /// The command that failed to start.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Command wrote to stderr or exited non-zero.
    #[error("Command failed: '{command}' (exit code {exit_code}): {stderr}")]
    Execution {
        /// The command that failed.
        command: String,
        /// The exit code, -1 if killed by a signal.
        exit_code: i32,
        /// Captured stderr output.
        stderr: String,
    },

    /// Desired-state input did not parse or type-check.
    #[error("Invalid desired state: {message}")]
    Format {
        /// Parser or validation message.
        message: String,
    },

    /// A queried record lacked an expected attribute or held a malformed one.
    #[error("Unexpected backend state in {record}: {attribute}: {message}")]
    BackendState {
        /// The record being inspected (connection, link or FDB line).
        record: String,
        /// The attribute that was missing or malformed.
        attribute: String,
        /// Error message.
        message: String,
    },

    /// Netlink request failed.
    #[error("Netlink operation failed: {operation}: {message}")]
    Netlink {
        /// The operation that failed (e.g., "link add vxlan100").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Reading an input file failed.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure while reconciling a specific tunnel.
    #[error("Tunnel {connection}: {source}")]
    Tunnel {
        /// The connection identifier being reconciled.
        connection: String,
        #[source]
        source: Box<VxlanMgrError>,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },
}

impl VxlanMgrError {
    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Creates a backend state error.
    pub fn backend_state(
        record: impl Into<String>,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BackendState {
            record: record.into(),
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Creates a netlink error.
    pub fn netlink(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Netlink {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attaches the connection identifier the error occurred on.
    pub fn for_tunnel(self, connection: impl Into<String>) -> Self {
        Self::Tunnel {
            connection: connection.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VxlanMgrError::format("expected a sequence");
        assert_eq!(err.to_string(), "Invalid desired state: expected a sequence");
    }

    #[test]
    fn test_execution_error() {
        let err = VxlanMgrError::Execution {
            command: "sudo bridge fdb show dev vxlan100".to_string(),
            exit_code: 0,
            stderr: "Cannot find device".to_string(),
        };
        assert!(err.to_string().contains("bridge fdb show"));
        assert!(err.to_string().contains("exit code 0"));
    }

    #[test]
    fn test_backend_state_error() {
        let err = VxlanMgrError::backend_state("vxlan-vxlan100", "vxlan.id", "missing");
        assert_eq!(
            err.to_string(),
            "Unexpected backend state in vxlan-vxlan100: vxlan.id: missing"
        );
    }

    #[test]
    fn test_for_tunnel_wraps_source() {
        let err = VxlanMgrError::netlink("link del vxlan7", "No such device").for_tunnel("vxlan-vxlan7");
        assert_eq!(
            err.to_string(),
            "Tunnel vxlan-vxlan7: Netlink operation failed: link del vxlan7: No such device"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
