//! Document collection endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde_json::Value;

use super::{parse_json, replicate_write};
use crate::cluster::ReplicatedWrite;
use crate::errors::ApiError;
use crate::server::{created, ApiResponse};
use crate::store::document::doc_key;
use crate::store::{DataModel, Document};
use crate::AppState;

/// `POST /docs/{collection}/{id}` -- insert a new document.
#[utoipa::path(
    post,
    path = "/docs/{collection}/{id}",
    tag = "Document",
    operation_id = "CreateDocument",
    params(
        ("collection" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    request_body = Object,
    responses(
        (status = 201, description = "Document created"),
        (status = 400, description = "Body is not a JSON object"),
        (status = 409, description = "Document already exists")
    )
)]
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let doc: Document = parse_json(&body)?;
    state
        .store
        .documents
        .insert(&collection, &id, doc.clone())
        .await?;

    let message = replicate_write(
        &state,
        ReplicatedWrite::new(DataModel::Document, doc_key(&collection, &id), Value::Object(doc.clone())),
        "Document created successfully",
    )
    .await;
    Ok(created(ApiResponse::ok(doc).with_message(message)))
}

/// `GET /docs/{collection}/{id}`
#[utoipa::path(
    get,
    path = "/docs/{collection}/{id}",
    tag = "Document",
    operation_id = "GetDocument",
    params(
        ("collection" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "The document"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<ApiResponse<Document>, ApiError> {
    let doc = state.store.documents.get(&collection, &id).await?;
    Ok(ApiResponse::ok(doc))
}

/// `PUT /docs/{collection}/{id}` -- shallow-merge fields into a document.
#[utoipa::path(
    put,
    path = "/docs/{collection}/{id}",
    tag = "Document",
    operation_id = "UpdateDocument",
    params(
        ("collection" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    request_body = Object,
    responses(
        (status = 200, description = "Document updated"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn update_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<ApiResponse<()>, ApiError> {
    let updates: Document = parse_json(&body)?;
    let merged = state
        .store
        .documents
        .update(&collection, &id, updates)
        .await?;

    let message = replicate_write(
        &state,
        ReplicatedWrite::new(DataModel::Document, doc_key(&collection, &id), Value::Object(merged)),
        "Document updated successfully",
    )
    .await;
    Ok(ApiResponse::message(message))
}

/// `DELETE /docs/{collection}/{id}`
#[utoipa::path(
    delete,
    path = "/docs/{collection}/{id}",
    tag = "Document",
    operation_id = "DeleteDocument",
    params(
        ("collection" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Document deleted"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<ApiResponse<()>, ApiError> {
    state.store.documents.delete(&collection, &id).await?;

    let message = replicate_write(
        &state,
        ReplicatedWrite::removal(DataModel::Document, doc_key(&collection, &id)),
        "Document deleted successfully",
    )
    .await;
    Ok(ApiResponse::message(message))
}

/// `GET /docs/{collection}?field=value` -- documents matching every filter.
#[utoipa::path(
    get,
    path = "/docs/{collection}",
    tag = "Document",
    operation_id = "QueryDocuments",
    params(("collection" = String, Path, description = "Collection name")),
    responses(
        (status = 200, description = "Matching documents")
    )
)]
pub async fn query_documents(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Query(filters): Query<BTreeMap<String, String>>,
) -> ApiResponse<Vec<Document>> {
    ApiResponse::ok(state.store.documents.query(&collection, &filters).await)
}
