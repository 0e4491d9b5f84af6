//! Best-effort replica fan-out for local writes.
//!
//! The local write has always been applied before [`Replicator::replicate`]
//! runs. Pushes to peers are advisory: a failed push is logged and counted
//! but never retried, rolled back or reported as a write failure.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::node::Node;
use super::partitioner;
use super::registry::NodeRegistry;
use super::transport::PeerTransport;
use crate::errors::ClusterError;
use crate::metrics::CLUSTER_REPLICATION_PUSH_TOTAL;
use crate::store::DataModel;

/// Wire payload of the replication endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedWrite {
    pub key: String,
    pub value: serde_json::Value,
    /// Which store model the key belongs to. Defaults to key-value.
    #[serde(default)]
    pub model: DataModel,
    /// Remove `key` instead of writing `value`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete: bool,
}

impl ReplicatedWrite {
    pub fn new(model: DataModel, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            model,
            delete: false,
        }
    }

    /// A delete of `key`; carries a null value.
    pub fn removal(model: DataModel, key: impl Into<String>) -> Self {
        Self {
            delete: true,
            ..Self::new(model, key, serde_json::Value::Null)
        }
    }
}

/// What a replication attempt did.
#[derive(Debug, Clone, Default)]
pub struct ReplicationReport {
    /// The full replica set, primary first. Empty when replication is off.
    pub replicas: Vec<Node>,
    /// Ids of peers that acknowledged the push.
    pub acknowledged: Vec<String>,
    /// Ids of peers whose push failed.
    pub failed: Vec<String>,
}

impl ReplicationReport {
    /// Number of pushes attempted (replicas other than self).
    pub fn attempted(&self) -> usize {
        self.acknowledged.len() + self.failed.len()
    }
}

/// Pushes writes to the replica set of their key.
pub struct Replicator {
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn PeerTransport>,
    replication_factor: usize,
}

impl Replicator {
    pub fn new(
        registry: Arc<NodeRegistry>,
        transport: Arc<dyn PeerTransport>,
        replication_factor: usize,
    ) -> Self {
        Self {
            registry,
            transport,
            replication_factor,
        }
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Replica set for `key` under the current membership.
    pub fn replicas_for(&self, key: &str) -> Result<Vec<Node>, ClusterError> {
        let active = self.registry.snapshot_active();
        if active.len() < self.replication_factor {
            return Err(ClusterError::InsufficientReplicas {
                required: self.replication_factor,
                active: active.len(),
            });
        }
        Ok(partitioner::replica_set(
            key,
            &active,
            self.replication_factor,
        ))
    }

    /// Push `write` to every replica of its key other than self.
    ///
    /// With a replication factor of 1 this is a no-op. Fails only with
    /// [`ClusterError::InsufficientReplicas`]; individual push failures are
    /// collected in the report.
    pub async fn replicate(&self, write: &ReplicatedWrite) -> Result<ReplicationReport, ClusterError> {
        if self.replication_factor <= 1 {
            return Ok(ReplicationReport::default());
        }

        let replicas = match self.replicas_for(&write.key) {
            Ok(replicas) => replicas,
            Err(e) => {
                warn!(key = %write.key, "skipping replication: {e}");
                return Err(e);
            }
        };

        let targets: Vec<&Node> = replicas
            .iter()
            .filter(|n| !self.registry.is_self(&n.id))
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|node| self.transport.replicate(node, write)),
        )
        .await;

        let mut report = ReplicationReport {
            replicas: replicas.clone(),
            ..Default::default()
        };
        for (node, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => {
                    debug!(key = %write.key, node_id = %node.id, "replicated");
                    counter!(CLUSTER_REPLICATION_PUSH_TOTAL, "result" => "ok").increment(1);
                    report.acknowledged.push(node.id.clone());
                }
                Err(e) => {
                    warn!(key = %write.key, node_id = %node.id, "Failed to replicate: {e}");
                    counter!(CLUSTER_REPLICATION_PUSH_TOTAL, "result" => "error").increment(1);
                    report.failed.push(node.id.clone());
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::NodeStatus;
    use crate::cluster::transport::testing::ScriptedTransport;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            address: "127.0.0.1".to_string(),
            port: 9090,
            status: NodeStatus::Active,
            last_seen: 1,
        }
    }

    fn setup(peers: &[&str], factor: usize) -> (Arc<ScriptedTransport>, Replicator) {
        let registry = Arc::new(NodeRegistry::new(node("node-self")));
        for p in peers {
            registry.add_or_update(node(p));
        }
        let transport = Arc::new(ScriptedTransport::default());
        let replicator = Replicator::new(registry, transport.clone(), factor);
        (transport, replicator)
    }

    fn write(key: &str) -> ReplicatedWrite {
        ReplicatedWrite::new(DataModel::KeyValue, key, serde_json::json!({"v": 1}))
    }

    #[tokio::test]
    async fn test_factor_one_never_pushes() {
        let (transport, replicator) = setup(&["node-a", "node-b"], 1);
        let report = replicator.replicate(&write("user:42")).await.unwrap();
        assert!(report.replicas.is_empty());
        assert_eq!(report.attempted(), 0);
        assert!(transport.replicated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_replicas() {
        let (transport, replicator) = setup(&["node-a"], 3);
        let err = replicator.replicate(&write("k")).await.unwrap_err();
        assert!(matches!(
            err,
            ClusterError::InsufficientReplicas {
                required: 3,
                active: 2
            }
        ));
        assert!(transport.replicated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_factor_three_of_three_pushes_to_both_peers() {
        let (transport, replicator) = setup(&["node-a", "node-b"], 3);
        let report = replicator.replicate(&write("anything")).await.unwrap();

        assert_eq!(report.replicas.len(), 3);
        let mut ids: Vec<String> = report.replicas.iter().map(|n| n.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["node-a", "node-b", "node-self"]);

        let mut pushed: Vec<String> = transport
            .replicated
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        pushed.sort();
        assert_eq!(pushed, vec!["node-a", "node-b"]);
    }

    #[tokio::test]
    async fn test_factor_two_replicates_to_exactly_one_peer() {
        // Sorted snapshot is [node-a, node-b, node-self]; "user:42" hashes to
        // index 1, so the replica set is node-b followed by node-self.
        let (transport, replicator) = setup(&["node-a", "node-b"], 2);
        let report = replicator.replicate(&write("user:42")).await.unwrap();

        let ids: Vec<&str> = report.replicas.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["node-b", "node-self"]);

        let pushed: Vec<String> = transport
            .replicated
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        assert_eq!(pushed, vec!["node-b".to_string()]);
    }

    #[tokio::test]
    async fn test_push_failure_is_not_an_error() {
        let (transport, replicator) = setup(&["node-a", "node-b"], 3);
        transport.set_down("node-a", true);

        let report = replicator.replicate(&write("k1")).await.unwrap();
        assert_eq!(report.failed, vec!["node-a".to_string()]);
        assert_eq!(report.acknowledged, vec!["node-b".to_string()]);
    }

    #[tokio::test]
    async fn test_payload_carries_model_and_value() {
        let (transport, replicator) = setup(&["node-a"], 2);
        let w = ReplicatedWrite::new(DataModel::Column, "cf/row/col", serde_json::json!(7));
        replicator.replicate(&w).await.unwrap();

        for (_, sent) in transport.replicated.lock().unwrap().iter() {
            assert_eq!(sent, &w);
        }
    }

    #[test]
    fn test_wire_format_defaults_model() {
        let w: ReplicatedWrite = serde_json::from_str(r#"{"key":"k","value":[1,2]}"#).unwrap();
        assert_eq!(w.model, DataModel::KeyValue);
        assert_eq!(w.value, serde_json::json!([1, 2]));
        assert!(!w.delete);
    }

    #[test]
    fn test_delete_flag_only_on_the_wire_for_removals() {
        let upsert = serde_json::to_value(ReplicatedWrite::new(DataModel::KeyValue, "k", serde_json::json!(1))).unwrap();
        assert!(upsert.get("delete").is_none());

        let removal = serde_json::to_value(ReplicatedWrite::removal(DataModel::Document, "users.u1")).unwrap();
        assert_eq!(
            removal,
            serde_json::json!({"key": "users.u1", "value": null, "model": "document", "delete": true})
        );
    }
}
