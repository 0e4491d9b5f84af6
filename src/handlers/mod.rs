//! HTTP handlers, one module per data model plus cluster endpoints.

pub mod cluster;
pub mod column;
pub mod document;
pub mod graph;
pub mod kv;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::cluster::{ClusterController, ReplicatedWrite};
use crate::errors::ApiError;
use crate::AppState;

/// Parse a JSON request body, mapping any failure to a 400 envelope.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON in request body".to_string()))
}

pub(crate) fn require_cluster(state: &AppState) -> Result<&Arc<ClusterController>, ApiError> {
    state.cluster.as_ref().ok_or(ApiError::ClusterDisabled)
}

/// Push a write that has already been applied locally to its replicas.
///
/// Returns the message to show the client: `base` alone, or `base` with a
/// note when replication was skipped or a push failed. Never an error.
pub(crate) async fn replicate_write(state: &AppState, write: ReplicatedWrite, base: &str) -> String {
    let Some(cluster) = state.cluster.as_ref() else {
        return base.to_string();
    };

    match cluster.replicate(&write).await {
        Ok(report) if report.failed.is_empty() => base.to_string(),
        Ok(report) => format!(
            "{base} (replication failed for: {})",
            report.failed.join(", ")
        ),
        Err(e) => {
            warn!(key = %write.key, "replication not attempted: {e}");
            format!("{base} (replication skipped: {e})")
        }
    }
}
