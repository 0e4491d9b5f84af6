//! Column family endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use serde_json::Value;

use super::{parse_json, replicate_write};
use crate::cluster::ReplicatedWrite;
use crate::errors::ApiError;
use crate::server::ApiResponse;
use crate::store::column::cell_key;
use crate::store::DataModel;
use crate::AppState;

/// `POST|PUT /columns/{family}/{row}/{column}` -- upsert one cell.
#[utoipa::path(
    put,
    path = "/columns/{family}/{row}/{column}",
    tag = "Column",
    operation_id = "InsertColumn",
    params(
        ("family" = String, Path, description = "Column family"),
        ("row" = String, Path, description = "Row key"),
        ("column" = String, Path, description = "Column name")
    ),
    request_body = Value,
    responses(
        (status = 200, description = "Cell stored"),
        (status = 400, description = "Invalid JSON")
    )
)]
pub async fn insert_column(
    State(state): State<Arc<AppState>>,
    Path((family, row, column)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<ApiResponse<()>, ApiError> {
    let value: Value = parse_json(&body)?;
    state
        .store
        .columns
        .insert(&family, &row, &column, value.clone())
        .await;

    let message = replicate_write(
        &state,
        ReplicatedWrite::new(DataModel::Column, cell_key(&family, &row, &column), value),
        "Column value inserted successfully",
    )
    .await;
    Ok(ApiResponse::message(message))
}

/// `GET /columns/{family}/{row}/{column}`
#[utoipa::path(
    get,
    path = "/columns/{family}/{row}/{column}",
    tag = "Column",
    operation_id = "GetColumn",
    params(
        ("family" = String, Path, description = "Column family"),
        ("row" = String, Path, description = "Row key"),
        ("column" = String, Path, description = "Column name")
    ),
    responses(
        (status = 200, description = "Cell value"),
        (status = 404, description = "Family, row or column not found")
    )
)]
pub async fn get_column(
    State(state): State<Arc<AppState>>,
    Path((family, row, column)): Path<(String, String, String)>,
) -> Result<ApiResponse<Value>, ApiError> {
    let value = state.store.columns.get(&family, &row, &column).await?;
    Ok(ApiResponse::ok(value))
}
