//! Polystore library: a multi-model (document, key-value, column, graph)
//! in-memory store with optional peer clustering.
//!
//! The crate provides the four data models, the HTTP surface in front of
//! them, and the cluster layer: membership registry, heartbeat failure
//! detection, gossip, key partitioning and best-effort replication.

use std::sync::Arc;

pub mod cluster;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod store;

#[cfg(test)]
mod testing;

use crate::cluster::ClusterController;
use crate::config::Config;
use crate::store::MultiModelStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Effective configuration.
    pub config: Config,
    /// Local data for all four models.
    pub store: Arc<MultiModelStore>,
    /// Cluster controller; `None` when clustering is disabled.
    pub cluster: Option<Arc<ClusterController>>,
}
