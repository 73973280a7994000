//! NetworkManager backend

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;
use vxlanmgr_common::{Executor, VxlanMgrError, VxlanMgrResult};

use super::TunnelBackend;
use crate::commands::*;
use crate::config::AddressMethods;
use crate::types::{ConnectionRecord, LocalTunnel, LocalTunnels, VXLAN_KIND};

/// `nmcli` property holding the connection name
const PROP_CONNECTION_ID: &str = "connection.id";
/// `nmcli` property holding the interface the connection is bound to
const PROP_INTERFACE_NAME: &str = "connection.interface-name";
/// `nmcli` property holding the VNI
const PROP_VXLAN_ID: &str = "vxlan.id";
/// `nmcli` property holding the remote endpoint
const PROP_VXLAN_REMOTE: &str = "vxlan.remote";

/// Tunnel backend that owns tunnels as NetworkManager connections
pub struct NmcliBackend<E> {
    executor: E,
    methods: AddressMethods,
}

impl<E: Executor> NmcliBackend<E> {
    pub fn new(executor: E, methods: AddressMethods) -> Self {
        Self { executor, methods }
    }

    /// Read the detail properties of one connection.
    pub async fn get_connection(&self, connection: &str) -> VxlanMgrResult<HashMap<String, String>> {
        let output = self
            .executor
            .execute(&build_show_connection_cmd(connection))
            .await?;
        Ok(parse_connection_details(&output))
    }
}

/// Split one terse line on unescaped `:` separators.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn non_empty(field: Option<&String>) -> Option<String> {
    field.filter(|f| !f.is_empty()).cloned()
}

/// Parse `nmcli -t -f NAME,UUID,TYPE,DEVICE connection show` output.
pub fn parse_connection_list(output: &str) -> VxlanMgrResult<Vec<ConnectionRecord>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields = split_terse(line);
            if fields.len() != 4 || fields[0].is_empty() {
                return Err(VxlanMgrError::backend_state(
                    line,
                    "NAME,UUID,TYPE,DEVICE",
                    format!("expected 4 fields, got {}", fields.len()),
                ));
            }
            Ok(ConnectionRecord {
                id: fields[0].clone(),
                uuid: non_empty(fields.get(1)),
                kind: non_empty(fields.get(2)),
                device: non_empty(fields.get(3)),
                vxlan: None,
            })
        })
        .collect()
}

/// Parse `nmcli -t connection show <connection>` output into properties.
pub fn parse_connection_details(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.replace("\\:", ":")))
        .collect()
}

fn required<'a>(
    data: &'a HashMap<String, String>,
    record: &str,
    property: &str,
) -> VxlanMgrResult<&'a str> {
    data.get(property)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| VxlanMgrError::backend_state(record, property, "missing"))
}

/// Build a local tunnel out of a connection's detail properties.
fn local_tunnel_from_details(
    record: &ConnectionRecord,
    data: &HashMap<String, String>,
) -> VxlanMgrResult<(String, LocalTunnel)> {
    let id = required(data, &record.id, PROP_CONNECTION_ID)?;
    let vni = required(data, id, PROP_VXLAN_ID)?
        .parse::<u32>()
        .map_err(|e| VxlanMgrError::backend_state(id, PROP_VXLAN_ID, e.to_string()))?;
    let remote = required(data, id, PROP_VXLAN_REMOTE)?
        .parse::<IpAddr>()
        .map_err(|e| VxlanMgrError::backend_state(id, PROP_VXLAN_REMOTE, e.to_string()))?;
    // An inactive connection has no device; its bound interface name still counts.
    let name = data
        .get(PROP_INTERFACE_NAME)
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| record.device.clone())
        .unwrap_or_else(|| id.to_string());
    Ok((id.to_string(), LocalTunnel { name, remote, vni }))
}

#[async_trait]
impl<E: Executor> TunnelBackend for NmcliBackend<E> {
    async fn list_connections(&self, kind: Option<&str>) -> VxlanMgrResult<Vec<ConnectionRecord>> {
        let output = self.executor.execute(&build_list_connections_cmd()).await?;
        Ok(parse_connection_list(&output)?
            .into_iter()
            .filter(|c| c.is_kind(kind))
            .collect())
    }

    async fn get_local_vxlan_tunnels(&self) -> VxlanMgrResult<LocalTunnels> {
        let mut tunnels = LocalTunnels::new();
        for record in self.list_connections(Some(VXLAN_KIND)).await? {
            let key = record.uuid.as_deref().unwrap_or(&record.id);
            let data = self.get_connection(key).await?;
            let (id, tunnel) = local_tunnel_from_details(&record, &data)?;
            debug!(connection = %id, vni = tunnel.vni, remote = %tunnel.remote, "Local tunnel");
            tunnels.insert(id, tunnel);
        }
        Ok(tunnels)
    }

    async fn add_connection(
        &mut self,
        ifname: &str,
        vni: u32,
        remote: IpAddr,
    ) -> VxlanMgrResult<()> {
        let cmd = build_add_connection_cmd(
            &crate::types::connection_id(vni),
            ifname,
            vni,
            remote,
            &self.methods.ipv4,
            &self.methods.ipv6,
        );
        self.executor.execute(&cmd).await?;
        Ok(())
    }

    async fn edit_connection(
        &mut self,
        connection: &str,
        vni: u32,
        remote: IpAddr,
    ) -> VxlanMgrResult<()> {
        self.executor
            .execute(&build_modify_connection_cmd(connection, vni, remote))
            .await?;
        Ok(())
    }

    async fn delete_connection(&mut self, connection: &str) -> VxlanMgrResult<()> {
        self.executor
            .execute(&build_delete_connection_cmd(connection))
            .await?;
        Ok(())
    }
}
