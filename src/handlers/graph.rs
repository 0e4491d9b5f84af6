//! Graph node and edge endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::Value;

use super::{parse_json, replicate_write};
use crate::cluster::ReplicatedWrite;
use crate::errors::ApiError;
use crate::server::{created, ApiResponse};
use crate::store::{DataModel, GraphEdge, GraphNode};
use crate::AppState;

fn to_value<T: serde::Serialize>(item: &T) -> Result<Value, ApiError> {
    serde_json::to_value(item).map_err(|e| ApiError::Internal(e.into()))
}

/// `POST /graph/nodes`
#[utoipa::path(
    post,
    path = "/graph/nodes",
    tag = "Graph",
    operation_id = "CreateNode",
    request_body = GraphNode,
    responses(
        (status = 201, description = "Node created"),
        (status = 409, description = "Node already exists")
    )
)]
pub async fn create_node(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let node: GraphNode = parse_json(&body)?;
    if node.id.is_empty() {
        return Err(ApiError::BadRequest("node id must not be empty".to_string()));
    }
    let id = node.id.clone();
    let value = to_value(&node)?;
    state.store.graph.create_node(node).await?;

    let message = replicate_write(
        &state,
        ReplicatedWrite::new(DataModel::GraphNode, id, value),
        "Node created successfully",
    )
    .await;
    Ok(created(ApiResponse::message(message)))
}

/// `GET /graph/nodes/{id}`
#[utoipa::path(
    get,
    path = "/graph/nodes/{id}",
    tag = "Graph",
    operation_id = "GetNode",
    params(("id" = String, Path, description = "Node id")),
    responses(
        (status = 200, description = "The node", body = GraphNode),
        (status = 404, description = "Node not found")
    )
)]
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<GraphNode>, ApiError> {
    Ok(ApiResponse::ok(state.store.graph.get_node(&id).await?))
}

/// `POST /graph/edges` -- both endpoints must exist.
#[utoipa::path(
    post,
    path = "/graph/edges",
    tag = "Graph",
    operation_id = "CreateEdge",
    request_body = GraphEdge,
    responses(
        (status = 201, description = "Edge created"),
        (status = 400, description = "Endpoint node missing"),
        (status = 409, description = "Edge already exists")
    )
)]
pub async fn create_edge(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let edge: GraphEdge = parse_json(&body)?;
    if edge.id.is_empty() {
        return Err(ApiError::BadRequest("edge id must not be empty".to_string()));
    }
    let id = edge.id.clone();
    let value = to_value(&edge)?;
    state.store.graph.create_edge(edge).await?;

    let message = replicate_write(
        &state,
        ReplicatedWrite::new(DataModel::GraphEdge, id, value),
        "Edge created successfully",
    )
    .await;
    Ok(created(ApiResponse::message(message)))
}

/// `GET /graph/edges/{id}`
#[utoipa::path(
    get,
    path = "/graph/edges/{id}",
    tag = "Graph",
    operation_id = "GetEdge",
    params(("id" = String, Path, description = "Edge id")),
    responses(
        (status = 200, description = "The edge", body = GraphEdge),
        (status = 404, description = "Edge not found")
    )
)]
pub async fn get_edge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<GraphEdge>, ApiError> {
    Ok(ApiResponse::ok(state.store.graph.get_edge(&id).await?))
}
