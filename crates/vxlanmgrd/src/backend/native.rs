//! Kernel backend over rtnetlink

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use futures::TryStreamExt;
use rtnetlink::packet_route::link::{
    InfoData, InfoKind, InfoVxlan, LinkAttribute, LinkInfo, LinkMessage,
};
use rtnetlink::{Handle, LinkUnspec, LinkVxlan};
use tracing::{debug, info};
use vxlanmgr_common::{VxlanMgrError, VxlanMgrResult};

use super::TunnelBackend;
use crate::types::{
    connection_id, default_interface, ConnectionRecord, LocalTunnel, LocalTunnels, VxlanAttrs, VXLAN_DST_PORT,
    VXLAN_KIND,
};

/// Tunnel backend that manages VXLAN links directly in the kernel
pub struct NativeBackend {
    handle: Handle,
}

impl NativeBackend {
    /// Open a netlink socket and drive it on the current runtime.
    pub fn connect() -> VxlanMgrResult<Self> {
        let (connection, handle, _) =
            rtnetlink::new_connection().map_err(|e| VxlanMgrError::netlink("connect", e))?;
        tokio::spawn(connection);
        info!("Netlink connection established");
        Ok(Self::new(handle))
    }

    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    async fn links(&self) -> VxlanMgrResult<Vec<LinkMessage>> {
        self.handle
            .link()
            .get()
            .execute()
            .try_collect()
            .await
            .map_err(|e| VxlanMgrError::netlink("link dump", e))
    }

    async fn link_index(&self, ifname: &str) -> VxlanMgrResult<u32> {
        let operation = format!("link get {}", ifname);
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(ifname.to_string())
            .execute();
        let link = links
            .try_next()
            .await
            .map_err(|e| VxlanMgrError::netlink(operation.as_str(), e))?
            .ok_or_else(|| VxlanMgrError::netlink(operation.as_str(), "no such link"))?;
        Ok(link.header.index)
    }

    async fn set_up(&self, ifname: &str) -> VxlanMgrResult<()> {
        let index = self.link_index(ifname).await?;
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(index).up().build())
            .execute()
            .await
            .map_err(|e| VxlanMgrError::netlink(format!("link set {} up", ifname), e))
    }

    async fn delete_link(&self, ifname: &str) -> VxlanMgrResult<()> {
        let index = self.link_index(ifname).await?;
        self.handle
            .link()
            .del(index)
            .execute()
            .await
            .map_err(|e| VxlanMgrError::netlink(format!("link del {}", ifname), e))
    }

    /// Find the local tunnel tracked under `connection`.
    async fn resolve(&self, connection: &str) -> VxlanMgrResult<LocalTunnel> {
        self.get_local_vxlan_tunnels()
            .await?
            .remove(connection)
            .ok_or_else(|| VxlanMgrError::backend_state(connection, "link", "no such vxlan link"))
    }
}

/// Build the link creation message for a unicast VXLAN tunnel.
pub(crate) fn vxlan_link_message(ifname: &str, vni: u32, remote: IpAddr) -> LinkMessage {
    let remote = match remote {
        IpAddr::V4(addr) => InfoVxlan::Group(addr),
        IpAddr::V6(addr) => InfoVxlan::Group6(addr),
    };
    LinkVxlan::new(ifname, vni)
        .set_info_data(InfoData::Vxlan(vec![
            InfoVxlan::Id(vni),
            remote,
            InfoVxlan::Port(VXLAN_DST_PORT),
        ]))
        .build()
}

fn kind_name(kind: &InfoKind) -> String {
    match kind {
        InfoKind::Other(name) => name.clone(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Extract a connection record from a link dump entry.
pub(crate) fn connection_from_link(link: &LinkMessage) -> ConnectionRecord {
    let mut name = None;
    let mut kind = None;
    let mut vxlan = None;

    for attr in &link.attributes {
        match attr {
            LinkAttribute::IfName(ifname) => name = Some(ifname.clone()),
            LinkAttribute::LinkInfo(infos) => {
                for info in infos {
                    match info {
                        LinkInfo::Kind(k) => kind = Some(kind_name(k)),
                        LinkInfo::Data(InfoData::Vxlan(data)) => {
                            let mut attrs = VxlanAttrs::default();
                            for item in data {
                                match item {
                                    InfoVxlan::Id(vni) => attrs.vni = Some(*vni),
                                    InfoVxlan::Group(addr) => attrs.remote = Some((*addr).into()),
                                    InfoVxlan::Group6(addr) => attrs.remote = Some((*addr).into()),
                                    _ => {}
                                }
                            }
                            vxlan = Some(attrs);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    let name = name.unwrap_or_else(|| format!("if{}", link.header.index));
    ConnectionRecord {
        id: name.clone(),
        uuid: None,
        kind,
        device: Some(name),
        vxlan,
    }
}

/// Read the tunnel carried by a VXLAN link record.
///
/// Links without a unicast remote (learning or multicast-only devices) are
/// not point-to-point tunnels and yield `None`.
pub(crate) fn local_tunnel_from_record(
    record: &ConnectionRecord,
) -> VxlanMgrResult<Option<LocalTunnel>> {
    let attrs = record.vxlan.as_ref();
    let vni = attrs
        .and_then(|a| a.vni)
        .ok_or_else(|| VxlanMgrError::backend_state(&record.id, "IFLA_VXLAN_ID", "missing"))?;
    let Some(remote) = attrs.and_then(|a| a.remote) else {
        debug!(interface = %record.id, vni, "Skipping vxlan link without unicast remote");
        return Ok(None);
    };
    Ok(Some(LocalTunnel {
        name: record.id.clone(),
        remote,
        vni,
    }))
}

/// Key tunnels the same way NetworkManager names their connections.
///
/// When several links share a VNI, `vxlan<vni>` (or else the first link
/// dumped) owns the connection id; the others get `<id>@<ifname>` so that
/// no desired tunnel claims them and they are removed as stale.
pub(crate) fn key_local_tunnels(tunnels: Vec<LocalTunnel>) -> LocalTunnels {
    let mut by_vni: BTreeMap<u32, Vec<LocalTunnel>> = BTreeMap::new();
    for tunnel in tunnels {
        by_vni.entry(tunnel.vni).or_default().push(tunnel);
    }

    let mut keyed = LocalTunnels::new();
    for (vni, mut links) in by_vni {
        let id = connection_id(vni);
        let owner = links
            .iter()
            .position(|t| t.name == default_interface(vni))
            .unwrap_or(0);
        let owner = links.remove(owner);
        for extra in links {
            debug!(connection = %id, interface = %extra.name, "Duplicate VNI link");
            keyed.insert(format!("{}@{}", id, extra.name), extra);
        }
        keyed.insert(id, owner);
    }
    keyed
}

#[async_trait]
impl TunnelBackend for NativeBackend {
    async fn list_connections(&self, kind: Option<&str>) -> VxlanMgrResult<Vec<ConnectionRecord>> {
        Ok(self
            .links()
            .await?
            .iter()
            .map(connection_from_link)
            .filter(|c| c.is_kind(kind))
            .collect())
    }

    async fn get_local_vxlan_tunnels(&self) -> VxlanMgrResult<LocalTunnels> {
        let mut tunnels = Vec::new();
        for record in self.list_connections(Some(VXLAN_KIND)).await? {
            if let Some(tunnel) = local_tunnel_from_record(&record)? {
                debug!(interface = %tunnel.name, vni = tunnel.vni, remote = %tunnel.remote, "Local tunnel");
                tunnels.push(tunnel);
            }
        }
        Ok(key_local_tunnels(tunnels))
    }

    async fn add_connection(
        &mut self,
        ifname: &str,
        vni: u32,
        remote: IpAddr,
    ) -> VxlanMgrResult<()> {
        self.handle
            .link()
            .add(vxlan_link_message(ifname, vni, remote))
            .execute()
            .await
            .map_err(|e| VxlanMgrError::netlink(format!("link add {}", ifname), e))?;
        self.set_up(ifname).await
    }

    /// VXLAN id and remote cannot be changed on a live link, so the link is
    /// re-created under the same name.
    async fn edit_connection(
        &mut self,
        connection: &str,
        vni: u32,
        remote: IpAddr,
    ) -> VxlanMgrResult<()> {
        let current = self.resolve(connection).await?;
        self.delete_link(&current.name).await?;
        self.add_connection(&current.name, vni, remote).await
    }

    async fn delete_connection(&mut self, connection: &str) -> VxlanMgrResult<()> {
        let current = self.resolve(connection).await?;
        self.delete_link(&current.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn vxlan_link(index: u32, name: &str, data: Vec<InfoVxlan>) -> LinkMessage {
        let mut link = LinkMessage::default();
        link.header.index = index;
        link.attributes.push(LinkAttribute::IfName(name.to_string()));
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vxlan),
            LinkInfo::Data(InfoData::Vxlan(data)),
        ]));
        link
    }

    #[test]
    fn test_connection_from_vxlan_link() {
        let link = vxlan_link(
            7,
            "vxlan100",
            vec![
                InfoVxlan::Id(100),
                InfoVxlan::Group(Ipv4Addr::new(10, 0, 0, 2)),
                InfoVxlan::Port(4789),
            ],
        );
        let record = connection_from_link(&link);
        assert_eq!(record.id, "vxlan100");
        assert_eq!(record.kind.as_deref(), Some("vxlan"));
        assert!(record.is_kind(Some(VXLAN_KIND)));

        let tunnel = local_tunnel_from_record(&record).unwrap().unwrap();
        assert_eq!(tunnel.name, "vxlan100");
        assert_eq!(tunnel.vni, 100);
        assert_eq!(tunnel.remote, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_connection_from_ipv6_vxlan_link() {
        let remote = "fd00::2".parse::<Ipv6Addr>().unwrap();
        let link = vxlan_link(8, "ovl5", vec![InfoVxlan::Id(5), InfoVxlan::Group6(remote)]);
        let tunnel = local_tunnel_from_record(&connection_from_link(&link))
            .unwrap()
            .unwrap();
        assert_eq!(tunnel.name, "ovl5");
        assert_eq!(tunnel.remote, IpAddr::V6(remote));

        let keyed = key_local_tunnels(vec![tunnel]);
        assert_eq!(keyed["vxlan-vxlan5"].name, "ovl5");
    }

    fn tunnel(name: &str, vni: u32, remote: &str) -> LocalTunnel {
        LocalTunnel {
            name: name.to_string(),
            remote: remote.parse().unwrap(),
            vni,
        }
    }

    #[test]
    fn test_duplicate_vni_links_keyed_apart() {
        let keyed = key_local_tunnels(vec![
            tunnel("ovl100", 100, "10.0.0.3"),
            tunnel("vxlan100", 100, "10.0.0.2"),
            tunnel("vxlan7", 7, "10.0.0.7"),
        ]);

        let ids: Vec<&str> = keyed.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["vxlan-vxlan100", "vxlan-vxlan100@ovl100", "vxlan-vxlan7"]);
        assert_eq!(keyed["vxlan-vxlan100"].name, "vxlan100");
        assert_eq!(keyed["vxlan-vxlan100@ovl100"].name, "ovl100");
    }

    #[test]
    fn test_duplicate_vni_first_link_owns_id() {
        let keyed = key_local_tunnels(vec![
            tunnel("ovl-a", 9, "10.0.0.2"),
            tunnel("ovl-b", 9, "10.0.0.3"),
        ]);
        assert_eq!(keyed["vxlan-vxlan9"].name, "ovl-a");
        assert_eq!(keyed["vxlan-vxlan9@ovl-b"].name, "ovl-b");
    }

    #[test]
    fn test_connection_from_plain_link() {
        let mut link = LinkMessage::default();
        link.header.index = 1;
        link.attributes.push(LinkAttribute::IfName("lo".to_string()));
        let record = connection_from_link(&link);
        assert_eq!(record.kind, None);
        assert!(record.is_kind(None));
        assert!(!record.is_kind(Some(VXLAN_KIND)));
    }

    #[test]
    fn test_bridge_kind_name() {
        assert_eq!(kind_name(&InfoKind::Bridge), "bridge");
        assert_eq!(kind_name(&InfoKind::Other("wireguard".to_string())), "wireguard");
    }

    #[test]
    fn test_learning_vxlan_link_skipped() {
        let link = vxlan_link(9, "flannel.1", vec![InfoVxlan::Id(1), InfoVxlan::Port(8472)]);
        let result = local_tunnel_from_record(&connection_from_link(&link));
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn test_vxlan_link_without_id() {
        let link = vxlan_link(
            9,
            "vxlan9",
            vec![InfoVxlan::Group(Ipv4Addr::new(10, 0, 0, 9))],
        );
        let result = local_tunnel_from_record(&connection_from_link(&link));
        match result {
            Err(VxlanMgrError::BackendState { record, attribute, .. }) => {
                assert_eq!(record, "vxlan9");
                assert_eq!(attribute, "IFLA_VXLAN_ID");
            }
            other => panic!("Expected BackendState error, got {:?}", other),
        }
    }

    #[test]
    fn test_vxlan_link_message() {
        let message = vxlan_link_message("vxlan100", 100, "10.0.0.2".parse().unwrap());
        let record = connection_from_link(&message);
        assert_eq!(record.id, "vxlan100");
        assert_eq!(
            record.vxlan,
            Some(VxlanAttrs {
                vni: Some(100),
                remote: Some("10.0.0.2".parse().unwrap()),
            })
        );
        let has_port = message.attributes.iter().any(|attr| match attr {
            LinkAttribute::LinkInfo(infos) => infos.iter().any(|info| {
                matches!(info, LinkInfo::Data(InfoData::Vxlan(data)) if data.contains(&InfoVxlan::Port(4789)))
            }),
            _ => false,
        });
        assert!(has_port);
    }
}
