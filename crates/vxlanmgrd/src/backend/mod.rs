//! Tunnel backends.
//!
//! Two interchangeable implementations of the same contract: [`NativeBackend`]
//! talks rtnetlink to the kernel, [`NmcliBackend`] drives NetworkManager
//! through its command line client. The reconciler is generic over
//! [`TunnelBackend`] and never inspects which one it holds.

mod native;
mod nmcli;

pub use native::NativeBackend;
pub use nmcli::{parse_connection_details, parse_connection_list, NmcliBackend};

use std::net::IpAddr;

use async_trait::async_trait;
use vxlanmgr_common::VxlanMgrResult;

use crate::types::{ConnectionRecord, LocalTunnels};

/// Backend variant, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Kernel links over rtnetlink
    Native,
    /// NetworkManager connections via nmcli
    Nmcli,
}

/// Management of VXLAN tunnel interfaces.
#[async_trait]
pub trait TunnelBackend: Send + Sync {
    /// Enumerate connections, optionally only those of `kind`.
    async fn list_connections(&self, kind: Option<&str>) -> VxlanMgrResult<Vec<ConnectionRecord>>;

    /// Snapshot of configured VXLAN tunnels keyed by connection identifier.
    async fn get_local_vxlan_tunnels(&self) -> VxlanMgrResult<LocalTunnels>;

    /// Create `ifname` bound to (`vni`, `remote`) on port 4789 and bring it up.
    async fn add_connection(&mut self, ifname: &str, vni: u32, remote: IpAddr)
        -> VxlanMgrResult<()>;

    /// Point an existing tunnel at a new VNI/remote.
    async fn edit_connection(
        &mut self,
        connection: &str,
        vni: u32,
        remote: IpAddr,
    ) -> VxlanMgrResult<()>;

    /// Remove a tunnel.
    async fn delete_connection(&mut self, connection: &str) -> VxlanMgrResult<()>;
}
