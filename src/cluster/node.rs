//! Cluster member identity and liveness record.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Membership state of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Inactive,
    Joining,
    Leaving,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Inactive => "inactive",
            NodeStatus::Joining => "joining",
            NodeStatus::Leaving => "leaving",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cluster member as seen by the local registry.
///
/// This is also the wire format for join and gossip payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique id, fixed for the lifetime of the member.
    pub id: String,
    /// Host name or IP peers use to reach the member.
    pub address: String,
    /// Cluster listen port of the member.
    pub port: u16,
    pub status: NodeStatus,
    /// Unix seconds of the last successful liveness confirmation.
    #[serde(default)]
    pub last_seen: i64,
}

impl Node {
    /// Create an active node with `last_seen` set to now.
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            status: NodeStatus::Active,
            last_seen: now_unix(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// `http://address:port` base URL for peer requests.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Generate a node id from the current timestamp and a random suffix,
/// e.g. `node-1760601600-4821`.
pub fn generate_node_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("node-{}-{}", now_unix(), suffix)
}

/// Current wall-clock time in unix seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_node_id_shape() {
        let id = generate_node_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "node");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].parse::<u32>().unwrap() < 10_000);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let node = Node {
            id: "node-1".to_string(),
            address: "10.0.0.1".to_string(),
            port: 9090,
            status: NodeStatus::Inactive,
            last_seen: 42,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["status"], "inactive");
        assert_eq!(json["last_seen"], 42);
    }

    #[test]
    fn test_base_url() {
        let node = Node::new("n", "peer.local", 9091);
        assert_eq!(node.base_url(), "http://peer.local:9091");
        assert!(node.is_active());
    }
}
