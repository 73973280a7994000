//! Verification helpers for testing reconciliation
//!
//! Provides assertion helpers that compare a [`FakeHost`] against the
//! desired state a pass was driven with.

use std::collections::BTreeSet;
use std::net::IpAddr;

use thiserror::Error;
use vxlanmgrd::DesiredState;

use crate::FakeHost;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected tunnel '{connection}' not found on host")]
    TunnelMissing { connection: String },

    #[error("Tunnel '{connection}' is {actual}, expected {expected}")]
    TunnelMismatch {
        connection: String,
        expected: String,
        actual: String,
    },

    #[error("Tunnel '{connection}' exists on host but is not desired")]
    UnexpectedTunnel { connection: String },

    #[error("Peers on {interface}: expected {expected:?}, found {actual:?}")]
    PeerSetMismatch {
        interface: String,
        expected: BTreeSet<IpAddr>,
        actual: BTreeSet<IpAddr>,
    },

    #[error("Interface {interface} is not attached to {bridge}")]
    NotAttached { interface: String, bridge: String },

    #[error("Bridge {bridge} was never brought up")]
    BridgeDown { bridge: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Host state verification helper
pub struct ConvergenceVerifier<'a> {
    host: &'a FakeHost,
    bridge: String,
}

impl<'a> ConvergenceVerifier<'a> {
    /// Create a new verifier for tunnels attached to `bridge`
    pub fn new(host: &'a FakeHost, bridge: impl Into<String>) -> Self {
        Self {
            host,
            bridge: bridge.into(),
        }
    }

    /// Verify the host's tunnels are exactly the desired primaries
    pub fn assert_tunnels_match(&self, desired: &DesiredState) -> VerifyResult<()> {
        let local = self.host.tunnels();

        for (connection, group) in desired {
            let tunnel = local
                .get(connection)
                .ok_or_else(|| VerificationError::TunnelMissing {
                    connection: connection.clone(),
                })?;
            let primary = group.primary();
            let interface = group.interface();
            if tunnel.name != interface
                || tunnel.vni != primary.vni
                || tunnel.remote != primary.remote
            {
                return Err(VerificationError::TunnelMismatch {
                    connection: connection.clone(),
                    expected: format!(
                        "{} vni {} remote {}",
                        interface, primary.vni, primary.remote
                    ),
                    actual: format!("{} vni {} remote {}", tunnel.name, tunnel.vni, tunnel.remote),
                });
            }
        }

        if let Some(connection) = local.keys().find(|id| !desired.contains_key(*id)) {
            return Err(VerificationError::UnexpectedTunnel {
                connection: connection.clone(),
            });
        }
        Ok(())
    }

    /// Verify each interface floods to exactly its group's secondary remotes.
    ///
    /// The primary remote is ignored on both sides; it may or may not hold
    /// an explicit entry depending on the backend.
    pub fn assert_peers_match(&self, desired: &DesiredState) -> VerifyResult<()> {
        for group in desired.values() {
            let interface = group.interface();
            let primary = group.primary().remote;

            let expected: BTreeSet<IpAddr> = group
                .secondaries()
                .iter()
                .map(|e| e.remote)
                .filter(|r| *r != primary)
                .collect();
            let mut actual = self.host.peers(&interface);
            actual.remove(&primary);

            if expected != actual {
                return Err(VerificationError::PeerSetMismatch {
                    interface,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Verify the bridge is up and every desired interface is enslaved to it
    pub fn assert_attached(&self, desired: &DesiredState) -> VerifyResult<()> {
        if !self.host.is_up(&self.bridge) {
            return Err(VerificationError::BridgeDown {
                bridge: self.bridge.clone(),
            });
        }
        for group in desired.values() {
            let interface = group.interface();
            if self.host.master_of(&interface).as_deref() != Some(self.bridge.as_str()) {
                return Err(VerificationError::NotAttached {
                    interface,
                    bridge: self.bridge.clone(),
                });
            }
        }
        Ok(())
    }

    /// Verify tunnels, peers and bridge membership together
    pub fn assert_converged(&self, desired: &DesiredState) -> VerifyResult<()> {
        self.assert_tunnels_match(desired)?;
        self.assert_peers_match(desired)?;
        self.assert_attached(desired)
    }
}
