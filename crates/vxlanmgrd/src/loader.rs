//! Desired-state loader
//!
//! Input format, a JSON array of tunnel entries:
//! ```json
//! [
//!   {"vni": 100, "remote": "10.0.0.2"},
//!   {"vni": 100, "remote": "10.0.0.5"},
//!   {"vni": 200, "remote": "fd00::2", "interface": "ovl200"}
//! ]
//! ```
//!
//! Entries are grouped by connection identifier. Within a group the input
//! order is kept, so the first entry for a VNI becomes the primary remote.

use std::path::Path;

use tracing::{debug, info};
use vxlanmgr_common::{VxlanMgrError, VxlanMgrResult};

use crate::types::{connection_id, DesiredState, DesiredTunnelEntry, TunnelGroup, MAX_VNI};

/// Parse a desired-state descriptor into tunnel groups.
pub fn load(input: &[u8]) -> VxlanMgrResult<DesiredState> {
    let entries: Vec<DesiredTunnelEntry> = serde_json::from_slice(input)
        .map_err(|e| VxlanMgrError::format(format!("expected a list of tunnel entries: {}", e)))?;
    from_entries(entries)
}

/// Validate entries and group them by connection identifier.
pub fn from_entries(
    entries: impl IntoIterator<Item = DesiredTunnelEntry>,
) -> VxlanMgrResult<DesiredState> {
    let mut desired = DesiredState::new();
    for mut entry in entries {
        if entry.vni > MAX_VNI {
            return Err(VxlanMgrError::format(format!(
                "VNI {} exceeds maximum {}",
                entry.vni, MAX_VNI
            )));
        }
        if entry.interface.as_deref().is_some_and(str::is_empty) {
            entry.interface = None;
        }

        let id = connection_id(entry.vni);
        debug!(connection = %id, remote = %entry.remote, "Desired tunnel entry");
        match desired.get_mut(&id) {
            Some(group) => group.push(entry),
            None => {
                desired.insert(id, TunnelGroup::new(entry));
            }
        }
    }

    info!("Loaded desired state: {} tunnels", desired.len());
    Ok(desired)
}

/// Read and parse a desired-state file.
///
/// An unreadable file is reported as [`VxlanMgrError::Io`], unparsable
/// content as [`VxlanMgrError::Format`].
pub fn load_file(path: impl AsRef<Path>) -> VxlanMgrResult<DesiredState> {
    let path = path.as_ref();
    let contents = std::fs::read(path).map_err(|e| VxlanMgrError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    load(&contents)
}
