//! Gossip dissemination of membership.
//!
//! Each round sends the local active-node list to up to `fanout` randomly
//! chosen active peers. Exchanges are push-pull: the receiving node merges
//! what it got and answers with its own active list, which the sender
//! merges with the same last-writer-wins rule
//! ([`NodeRegistry::merge`]).

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::node::Node;
use super::registry::NodeRegistry;
use super::transport::PeerTransport;
use crate::metrics::{CLUSTER_GOSSIP_MERGED_TOTAL, CLUSTER_GOSSIP_ROUNDS_TOTAL};

/// Outcome of one gossip round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GossipRound {
    /// Peers the local list was sent to.
    pub contacted: Vec<String>,
    /// Exchanges that failed.
    pub failed: usize,
    /// Registry records changed by merging replies.
    pub merged: usize,
}

pub struct Gossiper {
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn PeerTransport>,
    fanout: usize,
}

impl Gossiper {
    pub fn new(registry: Arc<NodeRegistry>, transport: Arc<dyn PeerTransport>, fanout: usize) -> Self {
        Self {
            registry,
            transport,
            fanout: fanout.max(1),
        }
    }

    /// Pick up to `fanout` distinct active peers, self excluded.
    fn pick_targets(&self, active: &[Node]) -> Vec<Node> {
        let peers: Vec<&Node> = active
            .iter()
            .filter(|n| !self.registry.is_self(&n.id))
            .collect();
        let mut rng = rand::thread_rng();
        peers
            .choose_multiple(&mut rng, self.fanout)
            .map(|n| (*n).clone())
            .collect()
    }

    /// Run a single gossip round. A no-op when self is the only active node.
    pub async fn run_round(&self) -> GossipRound {
        let active = self.registry.snapshot_active();
        if active.len() <= 1 {
            return GossipRound::default();
        }

        let targets = self.pick_targets(&active);
        let results = join_all(
            targets
                .iter()
                .map(|peer| self.transport.gossip(peer, &active)),
        )
        .await;

        let mut round = GossipRound::default();
        for (peer, result) in targets.iter().zip(results) {
            round.contacted.push(peer.id.clone());
            match result {
                Ok(remote) => {
                    let merged = self.registry.merge(remote);
                    debug!(node_id = %peer.id, merged, "gossip exchange complete");
                    round.merged += merged;
                }
                Err(e) => {
                    debug!(node_id = %peer.id, "Failed to gossip: {e}");
                    round.failed += 1;
                }
            }
        }

        counter!(CLUSTER_GOSSIP_ROUNDS_TOTAL).increment(1);
        counter!(CLUSTER_GOSSIP_MERGED_TOTAL).increment(round.merged as u64);
        round
    }

    /// Handle an inbound gossip message: merge it and return the local
    /// active list as the reply.
    pub fn receive(&self, incoming: Vec<Node>) -> Vec<Node> {
        let merged = self.registry.merge(incoming);
        if merged > 0 {
            counter!(CLUSTER_GOSSIP_MERGED_TOTAL).increment(merged as u64);
            debug!(merged, "merged inbound gossip");
        }
        self.registry.snapshot_active()
    }

    /// Run rounds every `interval` until `cancel` fires. Cancellation is
    /// observed between rounds only.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("gossip disseminator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // A started round always runs to completion; each call
                    // is bounded by the transport's request timeout.
                    let round = self.run_round().await;
                    debug!(contacted = round.contacted.len(), merged = round.merged, "gossip round complete");
                }
            }
        }
    }
}
