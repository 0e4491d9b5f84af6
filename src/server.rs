//! Axum router construction.
//!
//! [`app`] builds the public router (data models, cluster admin, health,
//! metrics, OpenAPI). [`cluster_app`] builds the peer-facing router that
//! other nodes call for probing, joining, gossip and replication.

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ApiError};
use crate::handlers::{cluster, column, document, graph, kv};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- Response envelope --------------------------------------------------------

/// JSON envelope every public endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    /// Attach a human-readable message to a successful response.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Success without a payload.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// -- OpenAPI specification ----------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Polystore API",
        version = "0.1.0",
        description = "Multi-model document, key-value, column and graph store"
    ),
    paths(
        health_check,
        crate::handlers::document::create_document,
        crate::handlers::document::get_document,
        crate::handlers::document::update_document,
        crate::handlers::document::delete_document,
        crate::handlers::document::query_documents,
        crate::handlers::kv::set_value,
        crate::handlers::kv::get_value,
        crate::handlers::kv::delete_value,
        crate::handlers::column::insert_column,
        crate::handlers::column::get_column,
        crate::handlers::graph::create_node,
        crate::handlers::graph::get_node,
        crate::handlers::graph::create_edge,
        crate::handlers::graph::get_edge,
        crate::handlers::cluster::cluster_status,
        crate::handlers::cluster::add_node,
        crate::handlers::cluster::remove_node,
    ),
    components(schemas(
        crate::store::GraphNode,
        crate::store::GraphEdge,
        crate::handlers::cluster::AddNodeRequest,
    )),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Document", description = "Document collections"),
        (name = "KeyValue", description = "Key-value pairs"),
        (name = "Column", description = "Column families"),
        (name = "Graph", description = "Property graph"),
        (name = "Cluster", description = "Cluster membership"),
    )
)]
struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// -- Routers ------------------------------------------------------------------

/// Build the public [`Router`].
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        // Documents
        .route(
            "/docs/:collection/:id",
            post(document::create_document)
                .get(document::get_document)
                .put(document::update_document)
                .delete(document::delete_document),
        )
        .route("/docs/:collection", get(document::query_documents))
        // Key-value
        .route(
            "/kv/:key",
            post(kv::set_value)
                .put(kv::set_value)
                .get(kv::get_value)
                .delete(kv::delete_value),
        )
        // Columns
        .route(
            "/columns/:family/:row/:column",
            post(column::insert_column)
                .put(column::insert_column)
                .get(column::get_column),
        )
        // Graph
        .route("/graph/nodes", post(graph::create_node))
        .route("/graph/nodes/:id", get(graph::get_node))
        .route("/graph/edges", post(graph::create_edge))
        .route("/graph/edges/:id", get(graph::get_edge))
        // Cluster admin
        .route("/cluster/status", get(cluster::cluster_status))
        .route("/cluster/nodes", post(cluster::add_node))
        .route("/cluster/nodes/:id", axum::routing::delete(cluster::remove_node))
        .fallback(not_found)
        .with_state(state)
        // Inner layers run first; metrics_middleware wraps everything.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
}

/// Build the peer-facing [`Router`] served on the cluster listener.
pub fn cluster_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/cluster/join", post(cluster::join))
        .route("/cluster/gossip", post(cluster::gossip))
        .route("/data/replicate", post(cluster::replicate))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `date` and `server` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("Polystore"));

    response
}

// -- Health check / fallback ---------------------------------------------------

/// `GET /health`
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Server is running")
    )
)]
pub async fn health_check() -> ApiResponse<()> {
    ApiResponse::message("Polystore is running")
}

async fn not_found() -> ApiError {
    ApiError::NoRoute
}

/// Status code helper for handlers that create resources.
pub(crate) fn created<T: Serialize>(body: ApiResponse<T>) -> Response {
    (StatusCode::CREATED, body).into_response()
}
