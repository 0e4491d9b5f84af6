//! Node registry: the local authoritative view of cluster membership.
//!
//! Every other cluster component reads and writes membership through
//! [`NodeRegistry`]. Reads take the shared lock, writes the exclusive
//! lock, and no lock is ever held across an `.await`.
//!
//! Entries are never physically removed. Removing a node only flips its
//! status to inactive, so the registry size never shrinks.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::node::{now_unix, Node, NodeStatus};
use crate::errors::ClusterError;

/// Lock-guarded mapping of node id to [`Node`].
pub struct NodeRegistry {
    self_id: String,
    /// Keyed by id; `BTreeMap` iteration order is the snapshot order.
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl NodeRegistry {
    /// Create a registry seeded with the local process's own node.
    pub fn new(self_node: Node) -> Self {
        let self_id = self_node.id.clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            self_id.clone(),
            Node {
                status: NodeStatus::Active,
                ..self_node
            },
        );
        Self {
            self_id,
            nodes: RwLock::new(nodes),
        }
    }

    /// Id of the local node.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn is_self(&self, id: &str) -> bool {
        self.self_id == id
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `node`, or replace the stored record with the same id.
    ///
    /// Records carrying the self id are dropped: only this process may
    /// describe itself. Returns whether the record was stored.
    pub fn add_or_update(&self, node: Node) -> bool {
        if self.is_self(&node.id) {
            warn!(node_id = %node.id, address = %node.address, port = node.port,
                "ignoring record that claims the self node id");
            return false;
        }
        let mut nodes = self.write();
        nodes.insert(node.id.clone(), node);
        true
    }

    /// Whether `id` is already taken.
    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Set the status of `id`. Moving to active also stamps `last_seen`.
    ///
    /// Returns whether the status actually changed. The self node is never
    /// downgraded; such calls are ignored and return `Ok(false)`.
    pub fn mark_status(&self, id: &str, status: NodeStatus) -> Result<bool, ClusterError> {
        if self.is_self(id) && status != NodeStatus::Active {
            debug!(node_id = %id, "ignoring status change for self node");
            return Ok(false);
        }

        let mut nodes = self.write();
        let node = nodes.get_mut(id).ok_or_else(|| ClusterError::UnknownNode {
            id: id.to_string(),
        })?;

        let previous = node.status;
        node.status = status;
        if status == NodeStatus::Active {
            node.last_seen = now_unix();
        }

        if previous != status {
            info!(node_id = %id, from = %previous, to = %status, "node status changed");
        }
        Ok(previous != status)
    }

    /// Look up a single node.
    pub fn get(&self, id: &str) -> Option<Node> {
        self.read().get(id).cloned()
    }

    /// All active nodes, ordered by id.
    ///
    /// The order is a function of the registry content only, which keeps
    /// partitioning and replica selection reproducible.
    pub fn snapshot_active(&self) -> Vec<Node> {
        self.read()
            .values()
            .filter(|n| n.is_active())
            .cloned()
            .collect()
    }

    /// Every known node regardless of status, ordered by id.
    pub fn snapshot_all(&self) -> Vec<Node> {
        self.read().values().cloned().collect()
    }

    /// Fold a remote membership list into the local view.
    ///
    /// Unknown nodes are inserted. Known nodes are replaced only when the
    /// incoming `last_seen` is strictly greater (last-writer-wins on the
    /// liveness timestamp), so a stale record can never downgrade a
    /// locally confirmed status. Records about the self node are ignored.
    ///
    /// Returns the number of records inserted or replaced.
    pub fn merge(&self, incoming: impl IntoIterator<Item = Node>) -> usize {
        let mut changed = 0;
        let mut nodes = self.write();

        for remote in incoming {
            if self.is_self(&remote.id) {
                continue;
            }
            match nodes.get_mut(&remote.id) {
                None => {
                    info!(node_id = %remote.id, address = %remote.address, port = remote.port,
                        "learned new node from peer");
                    nodes.insert(remote.id.clone(), remote);
                    changed += 1;
                }
                Some(local) if remote.last_seen > local.last_seen => {
                    if local.status != remote.status {
                        info!(node_id = %remote.id, from = %local.status, to = %remote.status,
                            "node status changed by peer report");
                    }
                    *local = remote;
                    changed += 1;
                }
                Some(_) => {}
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, status: NodeStatus, last_seen: i64) -> Node {
        Node {
            id: id.to_string(),
            address: "127.0.0.1".to_string(),
            port: 9090,
            status,
            last_seen,
        }
    }

    fn registry() -> NodeRegistry {
        NodeRegistry::new(node("node-self", NodeStatus::Active, 10))
    }

    #[test]
    fn test_new_registry_contains_self() {
        let reg = registry();
        assert_eq!(reg.snapshot_all().len(), 1);
        let me = reg.get("node-self").unwrap();
        assert!(me.is_active());
        assert_eq!(reg.self_id(), "node-self");
    }

    #[test]
    fn test_self_seeded_active_even_if_passed_otherwise() {
        let reg = NodeRegistry::new(node("me", NodeStatus::Joining, 0));
        assert!(reg.get("me").unwrap().is_active());
    }

    #[test]
    fn test_snapshot_active_sorted_by_id() {
        let reg = registry();
        reg.add_or_update(node("node-c", NodeStatus::Active, 1));
        reg.add_or_update(node("node-a", NodeStatus::Active, 1));
        reg.add_or_update(node("node-b", NodeStatus::Inactive, 1));

        let ids: Vec<String> = reg.snapshot_active().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["node-a", "node-c", "node-self"]);

        // Stable across calls.
        let again: Vec<String> = reg.snapshot_active().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_mark_inactive_excludes_from_snapshot() {
        let reg = registry();
        reg.add_or_update(node("node-a", NodeStatus::Active, 1));

        assert!(reg.mark_status("node-a", NodeStatus::Inactive).unwrap());
        assert!(reg.snapshot_active().iter().all(|n| n.id != "node-a"));
        // Still known, just inactive.
        assert_eq!(reg.snapshot_all().len(), 2);
        assert_eq!(reg.get("node-a").unwrap().status, NodeStatus::Inactive);
    }

    #[test]
    fn test_mark_active_stamps_last_seen() {
        let reg = registry();
        reg.add_or_update(node("node-a", NodeStatus::Inactive, 1));
        reg.mark_status("node-a", NodeStatus::Active).unwrap();
        assert!(reg.get("node-a").unwrap().last_seen > 1);
    }

    #[test]
    fn test_mark_status_unknown_node() {
        let reg = registry();
        let err = reg.mark_status("ghost", NodeStatus::Inactive).unwrap_err();
        assert!(matches!(err, ClusterError::UnknownNode { .. }));
    }

    #[test]
    fn test_self_never_downgraded() {
        let reg = registry();
        assert!(!reg.mark_status("node-self", NodeStatus::Inactive).unwrap());
        assert!(reg.get("node-self").unwrap().is_active());
    }

    #[test]
    fn test_add_or_update_rejects_self_id() {
        let reg = registry();
        let mut impostor = node("node-self", NodeStatus::Leaving, 99);
        impostor.address = "10.9.9.9".to_string();
        impostor.port = 1;

        assert!(!reg.add_or_update(impostor));
        let me = reg.get("node-self").unwrap();
        assert!(me.is_active());
        assert_eq!(me.address, "127.0.0.1");
        assert_eq!(me.port, 9090);
        assert_eq!(me.last_seen, 10);
    }

    #[test]
    fn test_merge_inserts_unknown() {
        let reg = registry();
        let changed = reg.merge(vec![node("node-x", NodeStatus::Active, 100)]);
        assert_eq!(changed, 1);
        assert_eq!(reg.get("node-x").unwrap().last_seen, 100);
    }

    #[test]
    fn test_merge_newer_last_seen_wins() {
        let reg = registry();
        reg.add_or_update(node("node-x", NodeStatus::Active, 50));
        reg.merge(vec![node("node-x", NodeStatus::Active, 100)]);
        assert_eq!(reg.get("node-x").unwrap().last_seen, 100);
    }

    #[test]
    fn test_merge_stale_record_ignored() {
        let reg = registry();
        reg.add_or_update(node("node-x", NodeStatus::Active, 100));
        let changed = reg.merge(vec![node("node-x", NodeStatus::Inactive, 50)]);
        assert_eq!(changed, 0);
        let x = reg.get("node-x").unwrap();
        assert!(x.is_active());
        assert_eq!(x.last_seen, 100);
    }

    #[test]
    fn test_merge_equal_last_seen_keeps_local() {
        let reg = registry();
        reg.add_or_update(node("node-x", NodeStatus::Active, 100));
        reg.merge(vec![node("node-x", NodeStatus::Inactive, 100)]);
        assert!(reg.get("node-x").unwrap().is_active());
    }

    #[test]
    fn test_merge_reactivates_with_newer_last_seen() {
        let reg = registry();
        reg.add_or_update(node("node-x", NodeStatus::Active, 50));
        reg.mark_status("node-x", NodeStatus::Inactive).unwrap();
        assert!(reg.snapshot_active().iter().all(|n| n.id != "node-x"));

        reg.merge(vec![node("node-x", NodeStatus::Active, 50)]);
        assert!(reg.snapshot_active().iter().all(|n| n.id != "node-x"));

        reg.merge(vec![node("node-x", NodeStatus::Active, 51)]);
        assert!(reg.snapshot_active().iter().any(|n| n.id == "node-x"));
    }

    #[test]
    fn test_merge_ignores_self_records() {
        let reg = registry();
        reg.merge(vec![node("node-self", NodeStatus::Inactive, i64::MAX)]);
        let me = reg.get("node-self").unwrap();
        assert!(me.is_active());
        assert_eq!(me.last_seen, 10);
    }

    #[test]
    fn test_merge_idempotent() {
        let snapshot = vec![
            node("node-a", NodeStatus::Active, 70),
            node("node-b", NodeStatus::Active, 30),
        ];

        let once = registry();
        once.merge(snapshot.clone());

        let twice = registry();
        twice.merge(snapshot.clone());
        let changed = twice.merge(snapshot);

        assert_eq!(changed, 0);
        assert_eq!(once.snapshot_all(), twice.snapshot_all());
    }

    #[test]
    fn test_merge_commutative_on_last_seen() {
        let first = vec![
            node("node-a", NodeStatus::Active, 100),
            node("node-b", NodeStatus::Active, 20),
        ];
        let second = vec![
            node("node-a", NodeStatus::Active, 40),
            node("node-b", NodeStatus::Active, 80),
        ];

        let ab = registry();
        ab.merge(first.clone());
        ab.merge(second.clone());

        let ba = registry();
        ba.merge(second);
        ba.merge(first);

        for id in ["node-a", "node-b"] {
            assert_eq!(ab.get(id).unwrap().last_seen, ba.get(id).unwrap().last_seen);
        }
        assert_eq!(ab.get("node-a").unwrap().last_seen, 100);
        assert_eq!(ab.get("node-b").unwrap().last_seen, 80);
    }
}
