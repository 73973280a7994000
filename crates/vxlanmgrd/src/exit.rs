//! Process exit statuses

use std::process::ExitCode;

use vxlanmgr_common::VxlanMgrError;

/// Distinct exit statuses reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    /// No peer file given, or the configuration is invalid
    MissingInput = 1,
    /// Peer file could not be read
    Unreadable = 2,
    /// Peer file did not parse as desired state
    Unparsable = 3,
    /// A backend operation failed during the pass
    ReconcileFailed = 4,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Status for a failure while loading the peer file.
    pub fn for_load_error(err: &VxlanMgrError) -> Self {
        match err {
            VxlanMgrError::Io { .. } => ExitStatus::Unreadable,
            _ => ExitStatus::Unparsable,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}
