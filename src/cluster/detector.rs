//! Heartbeat failure detector.
//!
//! Every round probes each known peer (self excluded, inactive peers
//! included so they can come back) concurrently. A successful probe marks
//! the peer active and refreshes `last_seen`; a failed one marks it
//! inactive once `failure_threshold` consecutive probes have failed. The
//! default threshold of 1 flips status on the first failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::node::{Node, NodeStatus};
use super::registry::NodeRegistry;
use super::transport::PeerTransport;
use crate::metrics::{CLUSTER_ACTIVE_NODES, CLUSTER_PROBE_TOTAL};

/// Outcome counts of one probe round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRound {
    pub alive: usize,
    pub failed: usize,
}

pub struct FailureDetector {
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn PeerTransport>,
    failure_threshold: u32,
    /// Consecutive failed probes per node id.
    misses: Mutex<HashMap<String, u32>>,
}

impl FailureDetector {
    pub fn new(
        registry: Arc<NodeRegistry>,
        transport: Arc<dyn PeerTransport>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            registry,
            transport,
            failure_threshold: failure_threshold.max(1),
            misses: Mutex::new(HashMap::new()),
        }
    }

    /// Probe every peer once and record the results in the registry.
    pub async fn run_round(&self) -> ProbeRound {
        // Copy out under the read lock, then probe without holding it.
        let peers: Vec<Node> = self
            .registry
            .snapshot_all()
            .into_iter()
            .filter(|n| !self.registry.is_self(&n.id))
            .collect();

        let results = join_all(peers.iter().map(|peer| self.transport.probe(peer))).await;

        let mut round = ProbeRound::default();
        for (peer, result) in peers.iter().zip(results) {
            match result {
                Ok(()) => {
                    round.alive += 1;
                    counter!(CLUSTER_PROBE_TOTAL, "result" => "ok").increment(1);
                    self.reset_misses(&peer.id);
                    self.set_status(&peer.id, NodeStatus::Active);
                }
                Err(e) => {
                    round.failed += 1;
                    counter!(CLUSTER_PROBE_TOTAL, "result" => "error").increment(1);
                    let misses = self.record_miss(&peer.id);
                    debug!(node_id = %peer.id, misses, "probe failed: {e}");
                    if misses >= self.failure_threshold {
                        self.set_status(&peer.id, NodeStatus::Inactive);
                    }
                }
            }
        }

        gauge!(CLUSTER_ACTIVE_NODES).set(self.registry.snapshot_active().len() as f64);
        round
    }

    /// Run rounds every `interval` until `cancel` fires. Cancellation is
    /// observed between rounds only.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("failure detector shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // A started round always runs to completion; each call
                    // is bounded by the transport's request timeout.
                    let round = self.run_round().await;
                    debug!(alive = round.alive, failed = round.failed, "heartbeat round complete");
                }
            }
        }
    }

    fn set_status(&self, id: &str, status: NodeStatus) {
        if let Err(e) = self.registry.mark_status(id, status) {
            warn!(node_id = %id, "could not record probe result: {e}");
        }
    }

    fn record_miss(&self, id: &str) -> u32 {
        let mut misses = self.misses.lock().unwrap_or_else(PoisonError::into_inner);
        let count = misses.entry(id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    fn reset_misses(&self, id: &str) {
        self.misses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::partitioner;
    use crate::cluster::transport::testing::ScriptedTransport;

    fn node(id: &str, status: NodeStatus) -> Node {
        Node {
            id: id.to_string(),
            address: "127.0.0.1".to_string(),
            port: 9090,
            status,
            last_seen: 1,
        }
    }

    fn setup(threshold: u32) -> (Arc<NodeRegistry>, Arc<ScriptedTransport>, FailureDetector) {
        let registry = Arc::new(NodeRegistry::new(node("node-self", NodeStatus::Active)));
        registry.add_or_update(node("node-a", NodeStatus::Active));
        registry.add_or_update(node("node-b", NodeStatus::Active));
        let transport = Arc::new(ScriptedTransport::default());
        let detector = FailureDetector::new(registry.clone(), transport.clone(), threshold);
        (registry, transport, detector)
    }

    #[tokio::test]
    async fn test_self_is_never_probed() {
        let (_, transport, detector) = setup(1);
        detector.run_round().await;
        let probes = transport.probes.lock().unwrap().clone();
        assert_eq!(probes.len(), 2);
        assert!(!probes.contains(&"node-self".to_string()));
    }

    #[tokio::test]
    async fn test_successful_probe_refreshes_last_seen() {
        let (registry, _, detector) = setup(1);
        let round = detector.run_round().await;
        assert_eq!(round, ProbeRound { alive: 2, failed: 0 });
        assert!(registry.get("node-a").unwrap().last_seen > 1);
    }

    #[tokio::test]
    async fn test_single_timeout_marks_inactive_and_excludes_from_ownership() {
        let (registry, transport, detector) = setup(1);
        transport.set_down("node-b", true);

        let round = detector.run_round().await;
        assert_eq!(round, ProbeRound { alive: 1, failed: 1 });
        assert_eq!(registry.get("node-b").unwrap().status, NodeStatus::Inactive);

        let active = registry.snapshot_active();
        assert_eq!(active.len(), 2);
        for i in 0..100 {
            let owner = partitioner::owner_of(&format!("key-{i}"), &active).unwrap();
            assert_ne!(owner.id, "node-b");
        }
    }

    #[tokio::test]
    async fn test_inactive_peer_recovers_on_next_success() {
        let (registry, transport, detector) = setup(1);
        transport.set_down("node-a", true);
        detector.run_round().await;
        assert_eq!(registry.get("node-a").unwrap().status, NodeStatus::Inactive);

        transport.set_down("node-a", false);
        detector.run_round().await;
        assert!(registry.get("node-a").unwrap().is_active());
    }

    #[tokio::test]
    async fn test_threshold_requires_consecutive_failures() {
        let (registry, transport, detector) = setup(3);
        transport.set_down("node-a", true);

        detector.run_round().await;
        detector.run_round().await;
        assert!(registry.get("node-a").unwrap().is_active());

        detector.run_round().await;
        assert_eq!(registry.get("node-a").unwrap().status, NodeStatus::Inactive);
    }

    #[tokio::test]
    async fn test_success_resets_miss_count() {
        let (registry, transport, detector) = setup(2);
        transport.set_down("node-a", true);
        detector.run_round().await;
        transport.set_down("node-a", false);
        detector.run_round().await;
        transport.set_down("node-a", true);
        detector.run_round().await;
        assert!(registry.get("node-a").unwrap().is_active());
    }

    #[tokio::test]
    async fn test_all_probes_failing_round_survives() {
        let (registry, transport, detector) = setup(1);
        transport.set_down("node-a", true);
        transport.set_down("node-b", true);

        let round = detector.run_round().await;
        assert_eq!(round.failed, 2);
        let active = registry.snapshot_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "node-self");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_on_cancel() {
        let (_, transport, detector) = setup(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(detector).run(Duration::from_secs(5), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Two ticks elapsed after the skipped immediate one.
        assert_eq!(transport.probes.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_in_flight_round_finish() {
        let (registry, transport, detector) = setup(1);
        transport.set_latency(Duration::from_secs(3));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(detector).run(Duration::from_secs(5), cancel.clone()));

        // The round starts at t=5 and its probes are still pending at t=6.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(transport.completed.lock().unwrap().is_empty());
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(transport.completed.lock().unwrap().len(), 2);
        assert!(registry.get("node-a").unwrap().last_seen > 1);
        assert!(registry.get("node-b").unwrap().last_seen > 1);
    }
}
