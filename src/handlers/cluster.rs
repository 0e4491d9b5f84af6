//! Cluster endpoints.
//!
//! `cluster_status`, `add_node` and `remove_node` are admin operations on
//! the public listener. `join`, `gossip` and `replicate` are the peer
//! protocol served on the cluster listener; `join` and `gossip` answer with
//! a bare JSON array of nodes rather than the response envelope.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_json, require_cluster};
use crate::cluster::{Node, ReplicatedWrite};
use crate::errors::ApiError;
use crate::server::ApiResponse;
use crate::AppState;

/// Body of `POST /cluster/nodes`.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct AddNodeRequest {
    #[garde(length(min = 1, max = 253))]
    pub address: String,
    #[garde(range(min = 1))]
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct ClusterStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Node>>,
}

/// `GET /cluster/status` -- active members, or `enabled: false`.
#[utoipa::path(
    get,
    path = "/cluster/status",
    tag = "Cluster",
    operation_id = "ClusterStatus",
    responses(
        (status = 200, description = "Cluster membership")
    )
)]
pub async fn cluster_status(State(state): State<Arc<AppState>>) -> ApiResponse<ClusterStatus> {
    match state.cluster.as_ref() {
        None => ApiResponse::ok(ClusterStatus {
            enabled: false,
            self_id: None,
            replication_factor: None,
            nodes: None,
        })
        .with_message("Clustering is disabled"),
        Some(cluster) => ApiResponse::ok(ClusterStatus {
            enabled: true,
            self_id: Some(cluster.self_node().id.clone()),
            replication_factor: Some(cluster.replication_factor()),
            nodes: Some(cluster.active_nodes()),
        }),
    }
}

/// `POST /cluster/nodes` -- add a peer by address.
#[utoipa::path(
    post,
    path = "/cluster/nodes",
    tag = "Cluster",
    operation_id = "AddNode",
    request_body = AddNodeRequest,
    responses(
        (status = 200, description = "Node added"),
        (status = 400, description = "Invalid address or port"),
        (status = 503, description = "Clustering is not enabled")
    )
)]
pub async fn add_node(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<ApiResponse<Node>, ApiError> {
    let cluster = require_cluster(&state)?;
    let req: AddNodeRequest = parse_json(&body)?;
    req.validate()
        .map_err(|report| ApiError::BadRequest(report.to_string()))?;

    let node = cluster.add_node(&req.address, req.port);
    Ok(ApiResponse::ok(node).with_message("Node added to cluster"))
}

/// `DELETE /cluster/nodes/{id}` -- mark a peer inactive.
#[utoipa::path(
    delete,
    path = "/cluster/nodes/{id}",
    tag = "Cluster",
    operation_id = "RemoveNode",
    params(("id" = String, Path, description = "Node id")),
    responses(
        (status = 200, description = "Node marked inactive"),
        (status = 400, description = "Cannot remove the local node"),
        (status = 404, description = "Unknown node"),
        (status = 503, description = "Clustering is not enabled")
    )
)]
pub async fn remove_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    let cluster = require_cluster(&state)?;
    cluster.remove_node(&id)?;
    Ok(ApiResponse::message("Node removed from cluster"))
}

/// `POST /cluster/join` -- register the announcing peer and reply with the
/// local active list.
pub async fn join(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Vec<Node>>, ApiError> {
    let cluster = require_cluster(&state)?;
    let node: Node = parse_json(&body)?;
    let id = node.id.clone();
    if cluster.register(node).is_none() {
        return Err(ApiError::Conflict(format!(
            "node id {id} belongs to the receiving node"
        )));
    }
    Ok(Json(cluster.active_nodes()))
}

/// `POST /cluster/gossip` -- merge the sender's list and reply with ours.
pub async fn gossip(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Vec<Node>>, ApiError> {
    let cluster = require_cluster(&state)?;
    let nodes: Vec<Node> = parse_json(&body)?;
    Ok(Json(cluster.receive_gossip(nodes)))
}

/// `POST /data/replicate` -- apply a peer's write to the local store.
pub async fn replicate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<ApiResponse<()>, ApiError> {
    let write: ReplicatedWrite = parse_json(&body)?;
    debug!(key = %write.key, model = ?write.model, delete = write.delete, "applying replicated write");
    if write.delete {
        state
            .store
            .apply_replicated_delete(write.model, &write.key)
            .await?;
    } else {
        state
            .store
            .apply_replicated(write.model, &write.key, write.value)
            .await?;
    }
    Ok(ApiResponse::message("Data replicated successfully"))
}
