//! Error types.
//!
//! [`ClusterError`] and [`StoreError`] are the domain errors of the
//! cluster layer and the multi-model store. [`ApiError`] is what HTTP
//! handlers return; it implements [`axum::response::IntoResponse`] and
//! renders the JSON response envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::server::ApiResponse;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

/// Failures of the cluster coordination layer.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A probe, gossip, join or replication call could not complete.
    #[error("peer {peer} unreachable: {reason}")]
    NetworkUnavailable { peer: String, reason: String },

    /// Fewer active nodes than the configured replication factor.
    #[error("not enough active nodes for replication factor {required} (active: {active})")]
    InsufficientReplicas { required: usize, active: usize },

    /// The seed refused or could not be reached.
    #[error("failed to join cluster via {seed}: {reason}")]
    JoinFailed { seed: String, reason: String },

    /// No registry entry for the given node id.
    #[error("node {id} is not a cluster member")]
    UnknownNode { id: String },

    /// The local node was asked to remove itself.
    #[error("the local node cannot be removed from its own registry")]
    SelfRemoval,
}

/// Failures of the in-memory multi-model store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{what} already exists")]
    AlreadyExists { what: String },

    #[error("invalid key '{key}'")]
    InvalidKey { key: String },

    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

/// Error returned from HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Clustering is not enabled")]
    ClusterDisabled,

    #[error("Endpoint not found")]
    NoRoute,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::NoRoute => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ClusterDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::AlreadyExists { .. } => ApiError::Conflict(err.to_string()),
            StoreError::InvalidKey { .. } | StoreError::InvalidValue { .. } => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::UnknownNode { .. } => ApiError::NotFound(err.to_string()),
            ClusterError::SelfRemoval => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let ApiError::Internal(ref err) = self {
            tracing::error!("internal error: {err:#}");
        }
        (status, ApiResponse::<()>::failure(self.to_string())).into_response()
    }
}
