//! Bridge and FDB peer management through the `bridge`/`ip` tools

use std::net::IpAddr;

use async_trait::async_trait;
use vxlanmgr_common::{Executor, VxlanMgrError, VxlanMgrResult};

use crate::commands::*;
use crate::types::WILDCARD_MAC;

/// Flooding-peer and bridge-membership operations.
#[async_trait]
pub trait FdbBackend: Send + Sync {
    /// Remote addresses registered under the wildcard MAC.
    async fn list_peers(&self, interface: Option<&str>) -> VxlanMgrResult<Vec<IpAddr>>;

    async fn add_peer(&mut self, remote: IpAddr, interface: &str) -> VxlanMgrResult<()>;

    async fn remove_peer(&mut self, remote: IpAddr, interface: &str) -> VxlanMgrResult<()>;

    /// Bring the shared bridge up. The bridge must already exist.
    async fn ensure_bridge(&mut self, bridge: &str) -> VxlanMgrResult<()>;

    /// Enslave `interface` to `bridge`; a no-op if it already is.
    async fn attach_interface(&mut self, interface: &str, bridge: &str) -> VxlanMgrResult<()>;
}

/// [`FdbBackend`] over the iproute2 command line tools
pub struct BridgeCli<E> {
    executor: E,
}

impl<E: Executor> BridgeCli<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

/// Parse wildcard-MAC flooding entries out of `bridge fdb show` output.
///
/// Scoped output (`dev <if>` given) reads
/// `00:00:00:00:00:00 dst 10.0.0.5 self permanent`; global output carries an
/// extra `dev <if>` pair before `dst`.
pub fn parse_fdb_peers(output: &str, scoped: bool) -> VxlanMgrResult<Vec<IpAddr>> {
    let column = if scoped { 2 } else { 4 };
    let mut peers = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() != Some(&WILDCARD_MAC) {
            continue;
        }
        // Entries without a remote, like the bridge's own self entry.
        if fields.get(column - 1) != Some(&"dst") {
            continue;
        }
        let Some(addr) = fields.get(column) else {
            continue;
        };
        let remote = addr
            .parse::<IpAddr>()
            .map_err(|e| VxlanMgrError::backend_state(line.trim(), "dst", e.to_string()))?;
        peers.push(remote);
    }

    Ok(peers)
}

#[async_trait]
impl<E: Executor> FdbBackend for BridgeCli<E> {
    async fn list_peers(&self, interface: Option<&str>) -> VxlanMgrResult<Vec<IpAddr>> {
        let output = self
            .executor
            .execute(&build_fdb_show_cmd(interface))
            .await?;
        parse_fdb_peers(&output, interface.is_some())
    }

    async fn add_peer(&mut self, remote: IpAddr, interface: &str) -> VxlanMgrResult<()> {
        self.executor
            .execute(&build_fdb_append_cmd(remote, interface))
            .await?;
        Ok(())
    }

    async fn remove_peer(&mut self, remote: IpAddr, interface: &str) -> VxlanMgrResult<()> {
        self.executor
            .execute(&build_fdb_del_cmd(remote, interface))
            .await?;
        Ok(())
    }

    async fn ensure_bridge(&mut self, bridge: &str) -> VxlanMgrResult<()> {
        self.executor.execute(&build_set_link_up_cmd(bridge)).await?;
        Ok(())
    }

    async fn attach_interface(&mut self, interface: &str, bridge: &str) -> VxlanMgrResult<()> {
        self.executor
            .execute(&build_set_master_cmd(interface, bridge))
            .await?;
        Ok(())
    }
}
