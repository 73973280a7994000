//! Convergence properties of a reconciliation pass
//!
//! Every test drives the reconciler against a [`FakeHost`] and checks the
//! host afterwards, not the calls that got it there.

use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};
use vxlanmgr_test::fixtures::{desired, desired_pairs, entry, ip, overlays};
use vxlanmgr_test::{Call, ConvergenceVerifier, FakeHost};
use vxlanmgrd::{DesiredState, ReconcileReport, VxlanMgr};

const BRIDGE: &str = "br-vxlan";

async fn pass(host: &FakeHost, state: &DesiredState) -> ReconcileReport {
    VxlanMgr::new(host.clone(), host.clone(), BRIDGE)
        .reconcile(state)
        .await
        .expect("reconciliation failed")
}

/// A host with drift in every dimension: a stale tunnel, a tunnel pointing
/// at an old remote and flooding peers that are no longer declared.
fn drifted_host() -> FakeHost {
    FakeHost::new()
        .with_tunnel("vxlan100", 100, ip("10.0.0.9"))
        .with_peers("vxlan100", &[ip("10.0.0.9"), ip("10.0.0.77")])
        .with_tunnel("vxlan999", 999, ip("10.9.9.9"))
        .with_peers("vxlan999", &[ip("10.9.9.8")])
}

#[tokio::test]
async fn test_converges_from_empty_host() {
    let host = FakeHost::new();
    let state = overlays::mixed();
    pass(&host, &state).await;

    let verifier = ConvergenceVerifier::new(&host, BRIDGE);
    assert_ok!(verifier.assert_converged(&state));
}

#[tokio::test]
async fn test_converges_from_drifted_host() {
    let host = drifted_host();
    let state = overlays::mixed();
    pass(&host, &state).await;

    let verifier = ConvergenceVerifier::new(&host, BRIDGE);
    assert_ok!(verifier.assert_converged(&state));
    assert!(host.peers("vxlan999").is_empty());
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let host = drifted_host();
    let state = overlays::mixed();
    pass(&host, &state).await;
    host.clear_calls();

    let report = pass(&host, &state).await;
    assert_eq!(report.tunnel_mutations(), 0);
    assert_eq!(report.peers_added() + report.peers_removed(), 0);
    assert_eq!(report.unchanged(), state.len());

    let tunnel_calls: Vec<Call> = host
        .calls()
        .into_iter()
        .filter(Call::is_tunnel_mutation)
        .collect();
    assert!(tunnel_calls.is_empty(), "{:?}", tunnel_calls);
}

#[tokio::test]
async fn test_peer_set_equality_for_zero_one_many() {
    for secondaries in [0, 1, 5] {
        let host = FakeHost::new()
            .with_tunnel("vxlan42", 42, ip("10.0.0.2"))
            .with_peers("vxlan42", &[ip("10.0.9.9")]);
        let state = overlays::hub_with_peers(42, secondaries);
        pass(&host, &state).await;

        let mut peers = host.peers("vxlan42");
        peers.remove(&ip("10.0.0.2"));
        assert_eq!(peers.len(), secondaries, "{} secondaries", secondaries);
        assert_ok!(ConvergenceVerifier::new(&host, BRIDGE).assert_peers_match(&state));
    }
}

#[tokio::test]
async fn test_primary_remote_never_removed() {
    let host = FakeHost::new()
        .with_tunnel("vxlan100", 100, ip("10.0.0.2"))
        .with_peers("vxlan100", &[ip("10.0.0.2")]);
    let report = pass(&host, &desired_pairs(&[(100, "10.0.0.2")])).await;

    assert_eq!(report.peers_removed(), 0);
    assert!(host.peers("vxlan100").contains(&ip("10.0.0.2")));
}

#[tokio::test]
async fn test_deletion_completeness() {
    let host = FakeHost::new()
        .with_tunnel("vxlan1", 1, ip("10.0.0.1"))
        .with_tunnel("vxlan2", 2, ip("10.0.0.2"))
        .with_tunnel("vxlan3", 3, ip("10.0.0.3"));
    let state = desired_pairs(&[(2, "10.0.0.2")]);
    let report = pass(&host, &state).await;

    assert_eq!(report.removed(), 2);
    let remaining: Vec<String> = host.tunnels().into_keys().collect();
    assert_eq!(remaining, vec!["vxlan-vxlan2".to_string()]);
    assert!(!host.mutations().contains(&Call::DeleteConnection {
        connection: "vxlan-vxlan2".to_string()
    }));
}

#[tokio::test]
async fn test_empty_desired_state_deletes_everything() {
    let host = drifted_host();
    let report = pass(&host, &DesiredState::new()).await;

    assert!(host.tunnels().is_empty());
    assert_eq!(report.added(), 0);
    assert_eq!(report.removed(), 2);
    assert!(host.is_up(BRIDGE));
}

#[tokio::test]
async fn test_recreated_link_gets_peers_and_bridge_back() {
    let host = FakeHost::new()
        .recreate_on_edit()
        .with_tunnel("vxlan100", 100, ip("10.0.0.9"))
        .with_peers("vxlan100", &[ip("10.0.0.5")])
        .with_master("vxlan100", BRIDGE);
    let state = desired([entry(100, "10.0.0.2"), entry(100, "10.0.0.5")]);
    let report = pass(&host, &state).await;

    assert_eq!(report.updated(), 1);
    assert_eq!(report.peers_added(), 1);
    assert_ok!(ConvergenceVerifier::new(&host, BRIDGE).assert_converged(&state));
}

#[tokio::test]
async fn test_changed_interface_moves_tunnel() {
    let host = FakeHost::new()
        .recreate_on_edit()
        .with_tunnel("vxlan100", 100, ip("10.0.0.2"))
        .with_peers("vxlan100", &[ip("10.0.0.5")])
        .with_master("vxlan100", BRIDGE);
    let state = desired([
        entry(100, "10.0.0.2").with_interface("ovl100"),
        entry(100, "10.0.0.5"),
    ]);
    let report = pass(&host, &state).await;

    assert_eq!(host.tunnels()["vxlan-vxlan100"].name, "ovl100");
    assert_eq!(report.removed(), 1);
    assert_eq!(report.added(), 1);
    assert_eq!(report.unchanged(), 0);
    assert!(host.peers("vxlan100").is_empty());
    assert_eq!(host.master_of("vxlan100"), None);
    assert_ok!(ConvergenceVerifier::new(&host, BRIDGE).assert_converged(&state));

    let second = pass(&host, &state).await;
    assert_eq!(second.tunnel_mutations(), 0);
}

#[tokio::test]
async fn test_failure_aborts_and_rerun_heals() {
    let host = drifted_host();
    let state = overlays::mixed();
    host.fail_on("add_peer");

    let result = VxlanMgr::new(host.clone(), host.clone(), BRIDGE)
        .reconcile(&state)
        .await;
    let err = assert_err!(result);
    assert!(err.to_string().starts_with("Tunnel vxlan-vxlan100:"), "{}", err);
    assert_err!(ConvergenceVerifier::new(&host, BRIDGE).assert_converged(&state));

    host.clear_failure();
    pass(&host, &state).await;
    assert_ok!(ConvergenceVerifier::new(&host, BRIDGE).assert_converged(&state));
}

#[tokio::test]
async fn test_bridge_brought_up_before_any_tunnel_change() {
    let host = drifted_host();
    pass(&host, &overlays::single_tunnel()).await;

    let mutations = host.mutations();
    assert_eq!(
        mutations.first(),
        Some(&Call::EnsureBridge {
            bridge: BRIDGE.to_string()
        })
    );
}
