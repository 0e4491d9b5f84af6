//! Cluster controller: lifecycle and public entry points.
//!
//! [`ClusterController`] owns the registry and wires it to the failure
//! detector, the gossiper and the replicator. HTTP handlers only ever go
//! through the controller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::detector::FailureDetector;
use super::gossip::Gossiper;
use super::node::{generate_node_id, now_unix, Node, NodeStatus};
use super::partitioner;
use super::registry::NodeRegistry;
use super::replicator::{ReplicatedWrite, ReplicationReport, Replicator};
use super::transport::PeerTransport;
use crate::config::ClusterConfig;
use crate::errors::ClusterError;

pub struct ClusterController {
    self_node: Node,
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn PeerTransport>,
    replicator: Replicator,
    gossiper: Arc<Gossiper>,
    detector: Arc<FailureDetector>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterController {
    /// Build a controller for a freshly generated self node without
    /// starting any background loops.
    pub fn new(config: &ClusterConfig, transport: Arc<dyn PeerTransport>) -> Self {
        let self_node = Node::new(
            generate_node_id(),
            config.advertise_address.clone(),
            config.listen_port,
        );
        Self::with_self_node(self_node, config, transport)
    }

    /// Like [`ClusterController::new`] with a caller-chosen self node.
    pub fn with_self_node(
        self_node: Node,
        config: &ClusterConfig,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        let registry = Arc::new(NodeRegistry::new(self_node.clone()));
        let replicator = Replicator::new(
            registry.clone(),
            transport.clone(),
            config.replication_factor,
        );
        let gossiper = Arc::new(Gossiper::new(
            registry.clone(),
            transport.clone(),
            config.gossip_fanout,
        ));
        let detector = Arc::new(FailureDetector::new(
            registry.clone(),
            transport.clone(),
            config.failure_threshold,
        ));

        Self {
            self_node,
            registry,
            transport,
            replicator,
            gossiper,
            detector,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the failure detector and gossip loops.
    ///
    /// Calling `start` on a stopped controller does nothing.
    pub fn start(&self, heartbeat_interval: Duration, gossip_interval: Duration) {
        if self.cancel.is_cancelled() {
            warn!("cluster controller already stopped; not restarting loops");
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }
        tasks.push(tokio::spawn(
            self.detector
                .clone()
                .run(heartbeat_interval, self.cancel.clone()),
        ));
        tasks.push(tokio::spawn(
            self.gossiper
                .clone()
                .run(gossip_interval, self.cancel.clone()),
        ));

        info!(
            node_id = %self.self_node.id,
            address = %self.self_node.address,
            port = self.self_node.port,
            replication_factor = self.replicator.replication_factor(),
            "Cluster controller started"
        );
    }

    /// Cancel the background loops and wait for them to exit. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain(..).collect()
        };
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("cluster task ended abnormally: {e}");
            }
        }
        info!(node_id = %self.self_node.id, "Cluster controller stopped");
    }

    pub fn self_node(&self) -> &Node {
        &self.self_node
    }

    pub fn replication_factor(&self) -> usize {
        self.replicator.replication_factor()
    }

    /// Announce this node to `seed` (`host:port`) and merge whatever
    /// membership the seed answered with.
    pub async fn join(&self, seed: &str) -> Result<usize, ClusterError> {
        let me = self.current_self();
        let members = self.transport.join(seed, &me).await?;
        let merged = self.registry.merge(members);
        info!(seed, merged, "Joined cluster");
        Ok(merged)
    }

    /// Join every seed once. Failures are logged and skipped.
    pub async fn join_seeds(&self, seeds: &[String]) {
        for seed in seeds {
            if let Err(e) = self.join(seed).await {
                warn!(seed = %seed, "{e}");
            }
        }
    }

    /// Add a peer by address under a freshly generated id.
    pub fn add_node(&self, address: &str, port: u16) -> Node {
        let mut id = generate_node_id();
        while self.registry.contains(&id) {
            id = generate_node_id();
        }
        let node = Node::new(id, address, port);
        self.registry.add_or_update(node.clone());
        info!(node_id = %node.id, address, port, "Node added");
        node
    }

    /// Record a peer that announced itself through the join endpoint.
    ///
    /// The peer is stored as active with `last_seen` set to now. An
    /// announcement carrying the self id is not stored and `None` is
    /// returned.
    pub fn register(&self, node: Node) -> Option<Node> {
        let node = Node {
            status: NodeStatus::Active,
            last_seen: now_unix(),
            ..node
        };
        if !self.registry.add_or_update(node.clone()) {
            return None;
        }
        info!(node_id = %node.id, address = %node.address, port = node.port, "Node joined");
        Some(node)
    }

    /// Mark `id` inactive. The record stays in the registry.
    pub fn remove_node(&self, id: &str) -> Result<(), ClusterError> {
        if self.registry.is_self(id) {
            return Err(ClusterError::SelfRemoval);
        }
        self.registry.mark_status(id, NodeStatus::Inactive)?;
        info!(node_id = %id, "Node removed");
        Ok(())
    }

    /// Active nodes ordered by id.
    pub fn active_nodes(&self) -> Vec<Node> {
        self.registry.snapshot_active()
    }

    /// Every known node ordered by id.
    pub fn all_nodes(&self) -> Vec<Node> {
        self.registry.snapshot_all()
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.registry.get(id)
    }

    /// Primary owner of `key` among the active nodes.
    pub fn owner_of(&self, key: &str) -> Option<Node> {
        let active = self.registry.snapshot_active();
        partitioner::owner_of(key, &active).cloned()
    }

    /// Push a locally applied write to the key's replicas.
    pub async fn replicate(&self, write: &ReplicatedWrite) -> Result<ReplicationReport, ClusterError> {
        self.replicator.replicate(write).await
    }

    /// Merge an inbound gossip message and return the local active list.
    pub fn receive_gossip(&self, nodes: Vec<Node>) -> Vec<Node> {
        self.gossiper.receive(nodes)
    }

    fn current_self(&self) -> Node {
        self.registry
            .get(&self.self_node.id)
            .unwrap_or_else(|| self.self_node.clone())
    }
}
