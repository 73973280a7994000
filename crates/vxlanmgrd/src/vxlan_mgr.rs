//! VXLAN Manager - tunnel and FDB peer reconciliation

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use tracing::{debug, info};
use vxlanmgr_common::VxlanMgrResult;

use crate::backend::TunnelBackend;
use crate::bridge::FdbBackend;
use crate::types::{DesiredState, LocalTunnel, LocalTunnels, TunnelGroup};

/// One change (or confirmed non-change) made during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TunnelRemoved {
        connection: String,
        interface: String,
    },
    TunnelAdded {
        connection: String,
        interface: String,
        vni: u32,
        remote: IpAddr,
    },
    TunnelUpdated {
        connection: String,
        vni: u32,
        remote: IpAddr,
    },
    TunnelUnchanged {
        connection: String,
    },
    PeerAdded {
        interface: String,
        remote: IpAddr,
    },
    PeerRemoved {
        interface: String,
        remote: IpAddr,
    },
    Attached {
        interface: String,
        bridge: String,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::TunnelRemoved { connection, .. } => write!(f, "removed {}", connection),
            Action::TunnelAdded {
                connection, remote, ..
            } => write!(f, "added {} -> {}", connection, remote),
            Action::TunnelUpdated {
                connection, remote, ..
            } => write!(f, "updated {} -> {}", connection, remote),
            Action::TunnelUnchanged { connection } => {
                write!(f, "{} already up to date", connection)
            }
            Action::PeerAdded { interface, remote } => {
                write!(f, "added peer {} on {}", remote, interface)
            }
            Action::PeerRemoved { interface, remote } => {
                write!(f, "removed peer {} from {}", remote, interface)
            }
            Action::Attached { interface, bridge } => {
                write!(f, "attached {} to {}", interface, bridge)
            }
        }
    }
}

/// Actions taken during one reconciliation pass, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub actions: Vec<Action>,
}

impl ReconcileReport {
    fn record(&mut self, action: Action) {
        self.actions.push(action);
    }

    fn count(&self, pred: impl Fn(&Action) -> bool) -> usize {
        self.actions.iter().filter(|a| pred(a)).count()
    }

    pub fn added(&self) -> usize {
        self.count(|a| matches!(a, Action::TunnelAdded { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|a| matches!(a, Action::TunnelUpdated { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|a| matches!(a, Action::TunnelRemoved { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|a| matches!(a, Action::TunnelUnchanged { .. }))
    }

    pub fn peers_added(&self) -> usize {
        self.count(|a| matches!(a, Action::PeerAdded { .. }))
    }

    pub fn peers_removed(&self) -> usize {
        self.count(|a| matches!(a, Action::PeerRemoved { .. }))
    }

    /// Tunnel creations, updates and deletions combined.
    pub fn tunnel_mutations(&self) -> usize {
        self.added() + self.updated() + self.removed()
    }
}

/// VXLAN Manager
///
/// Drives a [`TunnelBackend`] and an [`FdbBackend`] towards a desired state.
/// Holds no state between passes: every pass re-reads the host.
pub struct VxlanMgr<T, B> {
    tunnels: T,
    fdb: B,
    bridge: String,
}

impl<T: TunnelBackend, B: FdbBackend> VxlanMgr<T, B> {
    pub fn new(tunnels: T, fdb: B, bridge: impl Into<String>) -> Self {
        let bridge = bridge.into();
        info!(bridge = %bridge, "VxlanMgr initialized");
        Self {
            tunnels,
            fdb,
            bridge,
        }
    }

    pub fn tunnels(&self) -> &T {
        &self.tunnels
    }

    pub fn fdb(&self) -> &B {
        &self.fdb
    }

    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    /// Run one reconciliation pass.
    ///
    /// Stale tunnels are deleted first, then each desired tunnel is created,
    /// updated or left alone, its FDB peers are reconciled and its interface
    /// is attached to the bridge. The first failure aborts the pass.
    pub async fn reconcile(&mut self, desired: &DesiredState) -> VxlanMgrResult<ReconcileReport> {
        let local = self.tunnels.get_local_vxlan_tunnels().await?;
        debug!(local = local.len(), desired = desired.len(), "Starting reconciliation");

        self.fdb.ensure_bridge(&self.bridge).await?;

        let mut report = ReconcileReport::default();
        self.remove_stale_tunnels(&local, desired, &mut report)
            .await?;

        for (connection, group) in desired {
            self.reconcile_tunnel(connection, group, local.get(connection), &mut report)
                .await
                .map_err(|e| e.for_tunnel(connection.as_str()))?;
        }

        info!(
            added = report.added(),
            updated = report.updated(),
            removed = report.removed(),
            unchanged = report.unchanged(),
            peers_added = report.peers_added(),
            peers_removed = report.peers_removed(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    async fn remove_stale_tunnels(
        &mut self,
        local: &LocalTunnels,
        desired: &DesiredState,
        report: &mut ReconcileReport,
    ) -> VxlanMgrResult<()> {
        for (connection, tunnel) in local {
            if desired.contains_key(connection) {
                continue;
            }
            self.tunnels
                .delete_connection(connection)
                .await
                .map_err(|e| e.for_tunnel(connection.as_str()))?;
            info!(connection = %connection, interface = %tunnel.name, remote = %tunnel.remote, "Removed tunnel");
            report.record(Action::TunnelRemoved {
                connection: connection.clone(),
                interface: tunnel.name.clone(),
            });
        }
        Ok(())
    }

    async fn reconcile_tunnel(
        &mut self,
        connection: &str,
        group: &TunnelGroup,
        current: Option<&LocalTunnel>,
        report: &mut ReconcileReport,
    ) -> VxlanMgrResult<()> {
        let primary = group.primary();
        let interface = group.interface();

        match current {
            None => self.add_tunnel(connection, group, report).await?,
            // Neither backend renames in place: move the tunnel by re-creating it.
            Some(tunnel) if !group.is_named(tunnel) => {
                self.tunnels.delete_connection(connection).await?;
                info!(connection = %connection, interface = %tunnel.name, renamed = %interface, "Removed tunnel for rename");
                report.record(Action::TunnelRemoved {
                    connection: connection.to_string(),
                    interface: tunnel.name.clone(),
                });
                self.add_tunnel(connection, group, report).await?;
            }
            Some(tunnel) if group.matches(tunnel) => {
                info!(connection = %connection, interface = %interface, remote = %primary.remote, "Tunnel already up to date");
                report.record(Action::TunnelUnchanged {
                    connection: connection.to_string(),
                });
            }
            Some(tunnel) => {
                self.tunnels
                    .edit_connection(connection, primary.vni, primary.remote)
                    .await?;
                info!(
                    connection = %connection,
                    interface = %interface,
                    remote = %primary.remote,
                    previous = %tunnel.remote,
                    "Updated tunnel"
                );
                report.record(Action::TunnelUpdated {
                    connection: connection.to_string(),
                    vni: primary.vni,
                    remote: primary.remote,
                });
            }
        }

        self.reconcile_peers(&interface, group, report).await?;

        self.fdb.attach_interface(&interface, &self.bridge).await?;
        debug!(interface = %interface, bridge = %self.bridge, "Attached to bridge");
        report.record(Action::Attached {
            interface,
            bridge: self.bridge.clone(),
        });
        Ok(())
    }

    async fn add_tunnel(
        &mut self,
        connection: &str,
        group: &TunnelGroup,
        report: &mut ReconcileReport,
    ) -> VxlanMgrResult<()> {
        let primary = group.primary();
        let interface = group.interface();
        self.tunnels
            .add_connection(&interface, primary.vni, primary.remote)
            .await?;
        info!(connection = %connection, interface = %interface, remote = %primary.remote, vni = primary.vni, "Added tunnel");
        report.record(Action::TunnelAdded {
            connection: connection.to_string(),
            interface,
            vni: primary.vni,
            remote: primary.remote,
        });
        Ok(())
    }

    /// Make the interface's flooding peers equal the group's remotes.
    ///
    /// The primary remote counts as desired, so it is never removed here.
    async fn reconcile_peers(
        &mut self,
        interface: &str,
        group: &TunnelGroup,
        report: &mut ReconcileReport,
    ) -> VxlanMgrResult<()> {
        let local_peers = self.fdb.list_peers(Some(interface)).await?;
        debug!(interface = %interface, peers = ?local_peers, "Local FDB peers");

        let mut present: BTreeSet<IpAddr> = local_peers.iter().copied().collect();
        let mut desired_peers = BTreeSet::from([group.primary().remote]);

        for entry in group.secondaries() {
            if present.insert(entry.remote) {
                self.fdb.add_peer(entry.remote, interface).await?;
                info!(interface = %interface, remote = %entry.remote, "Added FDB peer");
                report.record(Action::PeerAdded {
                    interface: interface.to_string(),
                    remote: entry.remote,
                });
            }
            desired_peers.insert(entry.remote);
        }

        let stale: BTreeSet<IpAddr> = local_peers
            .into_iter()
            .filter(|peer| !desired_peers.contains(peer))
            .collect();
        for peer in stale {
            self.fdb.remove_peer(peer, interface).await?;
            info!(interface = %interface, remote = %peer, "Removed FDB peer");
            report.record(Action::PeerRemoved {
                interface: interface.to_string(),
                remote: peer,
            });
        }
        Ok(())
    }
}
