//! Tunnel type definitions and constants

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Deserialize;

/// Interface kind reported for VXLAN links and connections
pub const VXLAN_KIND: &str = "vxlan";

/// UDP destination port for created tunnels (IANA VXLAN port)
pub const VXLAN_DST_PORT: u16 = 4789;

/// Largest VNI representable in the 24-bit VXLAN header field
pub const MAX_VNI: u32 = 0x00FF_FFFF;

/// Shared bridge every tunnel interface is attached to
pub const DEFAULT_BRIDGE: &str = "br-vxlan";

/// Wildcard MAC used for flooding entries in the FDB
pub const WILDCARD_MAC: &str = "00:00:00:00:00:00";

/// Address-assignment method applied when none is configured
pub const DEFAULT_ADDRESS_METHOD: &str = "link-local";

/// Connection identifier a tunnel with the given VNI is tracked under.
pub fn connection_id(vni: u32) -> String {
    format!("vxlan-vxlan{}", vni)
}

/// Interface name synthesized for a VNI when none is declared.
pub fn default_interface(vni: u32) -> String {
    format!("vxlan{}", vni)
}

/// One declared peer relationship for a VNI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DesiredTunnelEntry {
    pub vni: u32,
    pub remote: IpAddr,
    #[serde(default)]
    pub interface: Option<String>,
}

impl DesiredTunnelEntry {
    pub fn new(vni: u32, remote: IpAddr) -> Self {
        Self {
            vni,
            remote,
            interface: None,
        }
    }

    /// Set the interface name (builder pattern)
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }
}

/// Desired entries sharing one VNI, in declaration order.
///
/// The first entry is the primary remote and defines the tunnel itself;
/// the rest are secondary peers reconciled in the FDB only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelGroup {
    entries: Vec<DesiredTunnelEntry>,
}

impl TunnelGroup {
    pub(crate) fn new(primary: DesiredTunnelEntry) -> Self {
        Self {
            entries: vec![primary],
        }
    }

    pub(crate) fn push(&mut self, entry: DesiredTunnelEntry) {
        debug_assert_eq!(entry.vni, self.vni());
        self.entries.push(entry);
    }

    pub fn primary(&self) -> &DesiredTunnelEntry {
        &self.entries[0]
    }

    pub fn secondaries(&self) -> &[DesiredTunnelEntry] {
        &self.entries[1..]
    }

    pub fn entries(&self) -> &[DesiredTunnelEntry] {
        &self.entries
    }

    pub fn vni(&self) -> u32 {
        self.primary().vni
    }

    /// Interface the tunnel lives on: declared on the primary, else `vxlan<vni>`.
    pub fn interface(&self) -> String {
        self.primary()
            .interface
            .clone()
            .unwrap_or_else(|| default_interface(self.vni()))
    }

    /// Returns true if `local` already carries the primary's VNI and remote
    /// on the interface this group declares.
    pub fn matches(&self, local: &LocalTunnel) -> bool {
        let primary = self.primary();
        local.vni == primary.vni && local.remote == primary.remote && self.is_named(local)
    }

    /// Returns true if `local` lives on the interface this group declares.
    pub fn is_named(&self, local: &LocalTunnel) -> bool {
        match &self.primary().interface {
            Some(name) => local.name == *name,
            None => local.name == default_interface(self.vni()),
        }
    }
}

/// Desired tunnels keyed by connection identifier.
pub type DesiredState = BTreeMap<String, TunnelGroup>;

/// A tunnel currently configured on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTunnel {
    /// Kernel interface name
    pub name: String,
    pub remote: IpAddr,
    pub vni: u32,
}

/// Local tunnels keyed by connection identifier.
pub type LocalTunnels = BTreeMap<String, LocalTunnel>;

/// VXLAN attributes a backend could read while listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VxlanAttrs {
    pub vni: Option<u32>,
    pub remote: Option<IpAddr>,
}

/// One network connection as listed by a tunnel backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// Connection name (nmcli) or interface name (netlink)
    pub id: String,
    pub uuid: Option<String>,
    pub kind: Option<String>,
    pub device: Option<String>,
    pub vxlan: Option<VxlanAttrs>,
}

impl ConnectionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uuid: None,
            kind: None,
            device: None,
            vxlan: None,
        }
    }

    /// Set the connection kind (builder pattern)
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Returns true if this record passes the optional kind filter.
    pub fn is_kind(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(kind) => self.kind.as_deref() == Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_naming() {
        assert_eq!(connection_id(100), "vxlan-vxlan100");
        assert_eq!(default_interface(100), "vxlan100");
    }

    #[test]
    fn test_group_primary_and_secondaries() {
        let mut group = TunnelGroup::new(DesiredTunnelEntry::new(7, ip("10.0.0.2")));
        group.push(DesiredTunnelEntry::new(7, ip("10.0.0.5")));
        group.push(DesiredTunnelEntry::new(7, ip("10.0.0.6")));

        assert_eq!(group.primary().remote, ip("10.0.0.2"));
        let secondaries: Vec<_> = group.secondaries().iter().map(|e| e.remote).collect();
        assert_eq!(secondaries, vec![ip("10.0.0.5"), ip("10.0.0.6")]);
        assert_eq!(group.interface(), "vxlan7");
    }

    #[test]
    fn test_group_declared_interface() {
        let group =
            TunnelGroup::new(DesiredTunnelEntry::new(7, ip("10.0.0.2")).with_interface("ovl0"));
        assert_eq!(group.interface(), "ovl0");
    }

    #[test]
    fn test_group_matches_primary_only() {
        let mut group = TunnelGroup::new(DesiredTunnelEntry::new(100, ip("10.0.0.2")));
        group.push(DesiredTunnelEntry::new(100, ip("10.0.0.5")));

        let local = LocalTunnel {
            name: "vxlan100".to_string(),
            remote: ip("10.0.0.2"),
            vni: 100,
        };
        assert!(group.matches(&local));

        let moved = LocalTunnel {
            remote: ip("10.0.0.9"),
            ..local
        };
        assert!(!group.matches(&moved));
    }

    #[test]
    fn test_group_matches_declared_name() {
        let group =
            TunnelGroup::new(DesiredTunnelEntry::new(100, ip("10.0.0.2")).with_interface("ovl100"));
        let local = LocalTunnel {
            name: "vxlan100".to_string(),
            remote: ip("10.0.0.2"),
            vni: 100,
        };
        assert!(!group.is_named(&local));
        assert!(!group.matches(&local));

        let renamed = LocalTunnel {
            name: "ovl100".to_string(),
            ..local
        };
        assert!(group.matches(&renamed));
    }

    #[test]
    fn test_kind_filter() {
        let record = ConnectionRecord::new("vxlan100").with_kind(VXLAN_KIND);
        assert!(record.is_kind(None));
        assert!(record.is_kind(Some("vxlan")));
        assert!(!record.is_kind(Some("bridge")));
        assert!(ConnectionRecord::new("lo").is_kind(None));
    }
}
