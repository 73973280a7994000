//! In-memory backends for driving the reconciler without a kernel
//!
//! [`FakeHost`] models one host: its VXLAN tunnels, the flooding entries of
//! each interface and bridge membership. It implements both
//! [`TunnelBackend`] and [`FdbBackend`] over shared state, so deleting a
//! tunnel also drops its FDB entries the way the kernel does.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;
use vxlanmgr_common::{Executor, ShellCommand, VxlanMgrError, VxlanMgrResult};
use vxlanmgrd::types::{connection_id, ConnectionRecord, VxlanAttrs, VXLAN_KIND};
use vxlanmgrd::{FdbBackend, LocalTunnel, LocalTunnels, TunnelBackend};

/// One backend call observed by [`FakeHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListConnections,
    GetLocalTunnels,
    AddConnection {
        ifname: String,
        vni: u32,
        remote: IpAddr,
    },
    EditConnection {
        connection: String,
        vni: u32,
        remote: IpAddr,
    },
    DeleteConnection {
        connection: String,
    },
    ListPeers {
        interface: Option<String>,
    },
    AddPeer {
        remote: IpAddr,
        interface: String,
    },
    RemovePeer {
        remote: IpAddr,
        interface: String,
    },
    EnsureBridge {
        bridge: String,
    },
    Attach {
        interface: String,
        bridge: String,
    },
}

impl Call {
    /// Returns true for calls that change host state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::ListConnections | Call::GetLocalTunnels | Call::ListPeers { .. }
        )
    }

    /// Returns true for tunnel create/edit/delete calls.
    pub fn is_tunnel_mutation(&self) -> bool {
        matches!(
            self,
            Call::AddConnection { .. } | Call::EditConnection { .. } | Call::DeleteConnection { .. }
        )
    }
}

#[derive(Debug, Default)]
struct HostState {
    tunnels: LocalTunnels,
    fdb: BTreeMap<String, BTreeSet<IpAddr>>,
    bridges_up: BTreeSet<String>,
    masters: BTreeMap<String, String>,
    calls: Vec<Call>,
    fail_on: Option<&'static str>,
    recreate_on_edit: bool,
}

impl HostState {
    fn check(&self, operation: &'static str) -> VxlanMgrResult<()> {
        if self.fail_on == Some(operation) {
            return Err(VxlanMgrError::Execution {
                command: operation.to_string(),
                exit_code: 1,
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn drop_interface(&mut self, interface: &str) {
        self.fdb.remove(interface);
        self.masters.remove(interface);
    }
}

/// Shared in-memory host state
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an existing tunnel (builder pattern)
    pub fn with_tunnel(self, name: &str, vni: u32, remote: IpAddr) -> Self {
        self.lock().tunnels.insert(
            connection_id(vni),
            LocalTunnel {
                name: name.to_string(),
                remote,
                vni,
            },
        );
        self
    }

    /// Seed flooding entries on an interface (builder pattern)
    pub fn with_peers(self, interface: &str, peers: &[IpAddr]) -> Self {
        self.lock()
            .fdb
            .entry(interface.to_string())
            .or_default()
            .extend(peers.iter().copied());
        self
    }

    /// Seed bridge membership (builder pattern)
    pub fn with_master(self, interface: &str, bridge: &str) -> Self {
        self.lock()
            .masters
            .insert(interface.to_string(), bridge.to_string());
        self
    }

    /// Model kernel links: an edit re-creates the link, dropping its FDB
    /// entries and bridge membership.
    pub fn recreate_on_edit(self) -> Self {
        self.lock().recreate_on_edit = true;
        self
    }

    /// Make every call to `operation` (a trait method name) fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.lock().fail_on = Some(operation);
    }

    pub fn clear_failure(&self) {
        self.lock().fail_on = None;
    }

    pub fn tunnels(&self) -> LocalTunnels {
        self.lock().tunnels.clone()
    }

    pub fn peers(&self, interface: &str) -> BTreeSet<IpAddr> {
        self.lock().fdb.get(interface).cloned().unwrap_or_default()
    }

    pub fn master_of(&self, interface: &str) -> Option<String> {
        self.lock().masters.get(interface).cloned()
    }

    pub fn is_up(&self, bridge: &str) -> bool {
        self.lock().bridges_up.contains(bridge)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls that changed host state, in order.
    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl TunnelBackend for FakeHost {
    async fn list_connections(&self, kind: Option<&str>) -> VxlanMgrResult<Vec<ConnectionRecord>> {
        let mut state = self.lock();
        state.calls.push(Call::ListConnections);
        state.check("list_connections")?;
        Ok(state
            .tunnels
            .values()
            .map(|t| ConnectionRecord {
                id: t.name.clone(),
                uuid: None,
                kind: Some(VXLAN_KIND.to_string()),
                device: Some(t.name.clone()),
                vxlan: Some(VxlanAttrs {
                    vni: Some(t.vni),
                    remote: Some(t.remote),
                }),
            })
            .filter(|c| c.is_kind(kind))
            .collect())
    }

    async fn get_local_vxlan_tunnels(&self) -> VxlanMgrResult<LocalTunnels> {
        let mut state = self.lock();
        state.calls.push(Call::GetLocalTunnels);
        state.check("get_local_vxlan_tunnels")?;
        Ok(state.tunnels.clone())
    }

    async fn add_connection(
        &mut self,
        ifname: &str,
        vni: u32,
        remote: IpAddr,
    ) -> VxlanMgrResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::AddConnection {
            ifname: ifname.to_string(),
            vni,
            remote,
        });
        state.check("add_connection")?;
        let id = connection_id(vni);
        if state.tunnels.contains_key(&id) {
            return Err(VxlanMgrError::Execution {
                command: format!("add {}", ifname),
                exit_code: 1,
                stderr: format!("connection {} already exists", id),
            });
        }
        state.tunnels.insert(
            id,
            LocalTunnel {
                name: ifname.to_string(),
                remote,
                vni,
            },
        );
        Ok(())
    }

    async fn edit_connection(
        &mut self,
        connection: &str,
        vni: u32,
        remote: IpAddr,
    ) -> VxlanMgrResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::EditConnection {
            connection: connection.to_string(),
            vni,
            remote,
        });
        state.check("edit_connection")?;
        let recreate = state.recreate_on_edit;
        let tunnel = state.tunnels.get_mut(connection).ok_or_else(|| {
            VxlanMgrError::backend_state(connection, "connection", "no such connection")
        })?;
        tunnel.vni = vni;
        tunnel.remote = remote;
        let name = tunnel.name.clone();
        if recreate {
            state.drop_interface(&name);
        }
        Ok(())
    }

    async fn delete_connection(&mut self, connection: &str) -> VxlanMgrResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::DeleteConnection {
            connection: connection.to_string(),
        });
        state.check("delete_connection")?;
        let tunnel = state.tunnels.remove(connection).ok_or_else(|| {
            VxlanMgrError::backend_state(connection, "connection", "no such connection")
        })?;
        state.drop_interface(&tunnel.name);
        Ok(())
    }
}

#[async_trait]
impl FdbBackend for FakeHost {
    async fn list_peers(&self, interface: Option<&str>) -> VxlanMgrResult<Vec<IpAddr>> {
        let mut state = self.lock();
        state.calls.push(Call::ListPeers {
            interface: interface.map(str::to_string),
        });
        state.check("list_peers")?;
        Ok(match interface {
            Some(dev) => state
                .fdb
                .get(dev)
                .map(|peers| peers.iter().copied().collect())
                .unwrap_or_default(),
            None => state.fdb.values().flatten().copied().collect(),
        })
    }

    async fn add_peer(&mut self, remote: IpAddr, interface: &str) -> VxlanMgrResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::AddPeer {
            remote,
            interface: interface.to_string(),
        });
        state.check("add_peer")?;
        state
            .fdb
            .entry(interface.to_string())
            .or_default()
            .insert(remote);
        Ok(())
    }

    async fn remove_peer(&mut self, remote: IpAddr, interface: &str) -> VxlanMgrResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::RemovePeer {
            remote,
            interface: interface.to_string(),
        });
        state.check("remove_peer")?;
        let removed = state
            .fdb
            .get_mut(interface)
            .is_some_and(|peers| peers.remove(&remote));
        if !removed {
            return Err(VxlanMgrError::Execution {
                command: format!("fdb del {} {}", remote, interface),
                exit_code: 2,
                stderr: "RTNETLINK answers: No such file or directory".to_string(),
            });
        }
        Ok(())
    }

    async fn ensure_bridge(&mut self, bridge: &str) -> VxlanMgrResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::EnsureBridge {
            bridge: bridge.to_string(),
        });
        state.check("ensure_bridge")?;
        state.bridges_up.insert(bridge.to_string());
        Ok(())
    }

    async fn attach_interface(&mut self, interface: &str, bridge: &str) -> VxlanMgrResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::Attach {
            interface: interface.to_string(),
            bridge: bridge.to_string(),
        });
        state.check("attach_interface")?;
        state
            .masters
            .insert(interface.to_string(), bridge.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recording {
    commands: Vec<ShellCommand>,
    responses: Vec<(String, Result<String, String>)>,
}

/// Executor that records commands instead of running them.
///
/// Responses are matched by substring against the rendered command line;
/// the most recently registered match wins. Unmatched commands succeed with
/// empty output.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer commands containing `pattern` with `output` (builder pattern)
    pub fn respond(self, pattern: impl Into<String>, output: impl Into<String>) -> Self {
        self.lock()
            .responses
            .push((pattern.into(), Ok(output.into())));
        self
    }

    /// Fail commands containing `pattern` with `stderr` (builder pattern)
    pub fn fail(self, pattern: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.lock()
            .responses
            .push((pattern.into(), Err(stderr.into())));
        self
    }

    pub fn commands(&self) -> Vec<ShellCommand> {
        self.lock().commands.clone()
    }

    /// Rendered command lines, in execution order.
    pub fn command_lines(&self) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, cmd: &ShellCommand) -> VxlanMgrResult<String> {
        let line = cmd.to_string();
        debug!("Recorded: {}", line);
        let mut recording = self.lock();
        recording.commands.push(cmd.clone());
        let response = recording
            .responses
            .iter()
            .rev()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());

        match response {
            Some(Ok(output)) => Ok(output),
            Some(Err(stderr)) => Err(VxlanMgrError::Execution {
                command: line,
                exit_code: 1,
                stderr,
            }),
            None => Ok(String::new()),
        }
    }
}
