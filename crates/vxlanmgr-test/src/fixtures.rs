//! Test fixtures for desired state and backend output
//!
//! Provides reusable peer files, desired-state groups and canned command
//! output for the CLI backends.

use std::io::Write;
use std::net::IpAddr;

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use vxlanmgrd::loader;
use vxlanmgrd::{DesiredState, DesiredTunnelEntry};

/// Parse an address literal. Panics on malformed input.
pub fn ip(addr: &str) -> IpAddr {
    addr.parse()
        .unwrap_or_else(|e| panic!("bad fixture address {:?}: {}", addr, e))
}

/// Desired entry for (`vni`, `remote`).
pub fn entry(vni: u32, remote: &str) -> DesiredTunnelEntry {
    DesiredTunnelEntry::new(vni, ip(remote))
}

/// Group entries into desired state, in the given order.
pub fn desired(entries: impl IntoIterator<Item = DesiredTunnelEntry>) -> DesiredState {
    loader::from_entries(entries).unwrap_or_else(|e| panic!("bad fixture entries: {}", e))
}

/// Desired state from (`vni`, `remote`) pairs.
pub fn desired_pairs(pairs: &[(u32, &str)]) -> DesiredState {
    desired(pairs.iter().map(|(vni, remote)| entry(*vni, remote)))
}

/// JSON peer file body from (`vni`, `remote`) pairs.
pub fn peer_file_json(pairs: &[(u32, &str)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(vni, remote)| json!({ "vni": vni, "remote": remote }))
            .collect(),
    )
}

/// Write `body` to a temporary peer file.
pub fn write_peer_file(body: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile: {}", e));
    file.write_all(body)
        .and_then(|_| file.flush())
        .unwrap_or_else(|e| panic!("write peer file: {}", e));
    file
}

/// Common overlay layouts
pub mod overlays {
    use super::*;

    /// One VNI, primary remote only
    pub fn single_tunnel() -> DesiredState {
        desired_pairs(&[(100, "10.0.0.2")])
    }

    /// One VNI with a primary and `secondaries` flooding peers
    pub fn hub_with_peers(vni: u32, secondaries: usize) -> DesiredState {
        let mut entries = vec![entry(vni, "10.0.0.2")];
        entries.extend((0..secondaries).map(|i| entry(vni, &format!("10.0.1.{}", i + 1))));
        desired(entries)
    }

    /// Several VNIs mixing address families and declared interfaces
    pub fn mixed() -> DesiredState {
        desired([
            entry(100, "10.0.0.2"),
            entry(100, "10.0.0.5"),
            entry(200, "fd00::2").with_interface("ovl200"),
            entry(200, "fd00::3"),
            entry(200, "fd00::4"),
            entry(300, "192.0.2.1"),
        ])
    }
}

/// Canned command output for the CLI backends
pub mod outputs {
    /// `nmcli -t -f NAME,UUID,TYPE,DEVICE connection show` line
    pub fn nmcli_list_line(name: &str, uuid: &str, kind: &str, device: &str) -> String {
        format!("{}:{}:{}:{}", name.replace(':', "\\:"), uuid, kind, device)
    }

    /// `nmcli -t connection show <uuid>` body for a VXLAN connection
    pub fn nmcli_vxlan_details(id: &str, vni: u32, remote: &str) -> String {
        format!(
            "connection.id:{}\nconnection.type:vxlan\nvxlan.id:{}\nvxlan.remote:{}\nvxlan.destination-port:4789\n",
            id,
            vni,
            remote.replace(':', "\\:")
        )
    }

    /// `bridge fdb show dev <if>` body with one flooding entry per remote
    pub fn fdb_scoped(remotes: &[&str]) -> String {
        remotes
            .iter()
            .map(|r| format!("00:00:00:00:00:00 dst {} self permanent\n", r))
            .collect()
    }
}
