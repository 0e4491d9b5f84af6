//! Key-value endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use serde_json::Value;

use super::{parse_json, replicate_write};
use crate::cluster::ReplicatedWrite;
use crate::errors::ApiError;
use crate::server::ApiResponse;
use crate::store::DataModel;
use crate::AppState;

/// `POST|PUT /kv/{key}` -- body is any JSON value.
#[utoipa::path(
    put,
    path = "/kv/{key}",
    tag = "KeyValue",
    operation_id = "SetValue",
    params(("key" = String, Path, description = "Key")),
    request_body = Value,
    responses(
        (status = 200, description = "Value stored"),
        (status = 400, description = "Invalid JSON")
    )
)]
pub async fn set_value(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<ApiResponse<()>, ApiError> {
    let value: Value = parse_json(&body)?;
    state.store.kv.set(&key, value.clone()).await;

    let message = replicate_write(
        &state,
        ReplicatedWrite::new(DataModel::KeyValue, key, value),
        "Key-value pair set successfully",
    )
    .await;
    Ok(ApiResponse::message(message))
}

/// `GET /kv/{key}`
#[utoipa::path(
    get,
    path = "/kv/{key}",
    tag = "KeyValue",
    operation_id = "GetValue",
    params(("key" = String, Path, description = "Key")),
    responses(
        (status = 200, description = "Stored value"),
        (status = 404, description = "Key not found")
    )
)]
pub async fn get_value(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let value = state.store.kv.get(&key).await?;
    Ok(ApiResponse::ok(value))
}

/// `DELETE /kv/{key}`
#[utoipa::path(
    delete,
    path = "/kv/{key}",
    tag = "KeyValue",
    operation_id = "DeleteValue",
    params(("key" = String, Path, description = "Key")),
    responses(
        (status = 200, description = "Key deleted"),
        (status = 404, description = "Key not found")
    )
)]
pub async fn delete_value(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    state.store.kv.delete(&key).await?;

    let message = replicate_write(
        &state,
        ReplicatedWrite::removal(DataModel::KeyValue, key),
        "Key deleted successfully",
    )
    .await;
    Ok(ApiResponse::message(message))
}
