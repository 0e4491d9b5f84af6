//! Cluster coordination and replication.
//!
//! When clustering is enabled every Polystore node keeps a registry of its
//! peers, probes them on a fixed interval, gossips membership, and pushes
//! each local write to the replicas of its key.

pub mod controller;
pub mod detector;
pub mod gossip;
pub mod node;
pub mod partitioner;
pub mod registry;
pub mod replicator;
pub mod transport;

pub use controller::ClusterController;
pub use node::{Node, NodeStatus};
pub use replicator::{ReplicatedWrite, ReplicationReport};
pub use transport::{HttpTransport, PeerTransport};
