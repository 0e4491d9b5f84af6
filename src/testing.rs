//! Shared helpers for router tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use crate::cluster::node::{Node, NodeStatus};
use crate::cluster::transport::testing::ScriptedTransport;
use crate::cluster::ClusterController;
use crate::config::{ClusterConfig, Config};
use crate::server::{app, cluster_app};
use crate::store::MultiModelStore;
use crate::AppState;

/// Public router of a standalone node.
pub fn test_app() -> Router {
    app(Arc::new(AppState {
        config: Config::default(),
        store: Arc::new(MultiModelStore::new()),
        cluster: None,
    }))
}

/// Public router, peer router and controller of a clustered node whose
/// self id is `node-self`. Background loops are not started.
pub fn clustered_app(
    transport: Arc<ScriptedTransport>,
    replication_factor: usize,
) -> (Router, Router, Arc<ClusterController>) {
    let config = Config {
        cluster: ClusterConfig {
            enabled: true,
            replication_factor,
            ..Default::default()
        },
        ..Default::default()
    };
    let self_node = Node {
        id: "node-self".to_string(),
        address: "127.0.0.1".to_string(),
        port: config.cluster.listen_port,
        status: NodeStatus::Active,
        last_seen: 1,
    };
    let cluster = Arc::new(ClusterController::with_self_node(
        self_node,
        &config.cluster,
        transport,
    ));
    let state = Arc::new(AppState {
        config,
        store: Arc::new(MultiModelStore::new()),
        cluster: Some(cluster.clone()),
    });
    (app(state.clone()), cluster_app(state), cluster)
}

pub async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn send_raw(app: &Router, method: &str, uri: &str, body: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Send a request with an optional JSON body; returns status and parsed body.
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|v| v.to_string()).unwrap_or_default();
    let response = send_raw(app, method, uri, &body).await;
    let status = response.status();
    (status, body_json(response).await)
}
