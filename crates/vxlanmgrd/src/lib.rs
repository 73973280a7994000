//! VXLAN Manager Daemon - overlay tunnel and FDB peer reconciliation
//!
//! vxlanmgrd converges a host's VXLAN overlay to a declared peer file:
//! - Tunnel creation, update and removal over netlink or NetworkManager
//! - Per-VNI flooding peers in the bridge FDB
//! - Shared bridge membership for every tunnel interface
//!
//! Each run is a single stateless pass; re-running heals drift.

pub mod backend;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod exit;
pub mod loader;
pub mod types;
pub mod vxlan_mgr;

pub use backend::{BackendKind, NativeBackend, NmcliBackend, TunnelBackend};
pub use bridge::{BridgeCli, FdbBackend};
pub use config::{AddressMethods, Args, Settings};
pub use exit::ExitStatus;
pub use types::{DesiredState, DesiredTunnelEntry, LocalTunnel, LocalTunnels, TunnelGroup};
pub use vxlan_mgr::{Action, ReconcileReport, VxlanMgr};
