//! Property graph model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::errors::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GraphEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default)]
    pub edge_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub props: Value,
}

#[derive(Default)]
struct Graph {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<String, GraphEdge>,
}

/// Nodes and edges share one lock so edge creation can check its
/// endpoints atomically.
#[derive(Default)]
pub struct GraphStore {
    inner: RwLock<Graph>,
}

impl GraphStore {
    pub async fn create_node(&self, node: GraphNode) -> Result<(), StoreError> {
        let mut graph = self.inner.write().await;
        if graph.nodes.contains_key(&node.id) {
            return Err(StoreError::AlreadyExists {
                what: format!("node {}", node.id),
            });
        }
        graph.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub async fn get_node(&self, id: &str) -> Result<GraphNode, StoreError> {
        self.inner
            .read()
            .await
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("node {id}"),
            })
    }

    /// Create an edge. Both endpoints must already exist.
    pub async fn create_edge(&self, edge: GraphEdge) -> Result<(), StoreError> {
        let mut graph = self.inner.write().await;
        if graph.edges.contains_key(&edge.id) {
            return Err(StoreError::AlreadyExists {
                what: format!("edge {}", edge.id),
            });
        }
        if !graph.nodes.contains_key(&edge.from) {
            return Err(StoreError::InvalidValue {
                reason: format!("source node {} does not exist", edge.from),
            });
        }
        if !graph.nodes.contains_key(&edge.to) {
            return Err(StoreError::InvalidValue {
                reason: format!("target node {} does not exist", edge.to),
            });
        }
        graph.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    pub async fn get_edge(&self, id: &str) -> Result<GraphEdge, StoreError> {
        self.inner
            .read()
            .await
            .edges
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("edge {id}"),
            })
    }

    /// Insert or replace a node without the existence check.
    pub async fn put_node(&self, node: GraphNode) {
        self.inner.write().await.nodes.insert(node.id.clone(), node);
    }

    /// Insert or replace an edge without checking its endpoints.
    pub async fn put_edge(&self, edge: GraphEdge) {
        self.inner.write().await.edges.insert(edge.id.clone(), edge);
    }
}
