//! In-memory multi-model store.
//!
//! Four independent models, each behind its own `tokio::sync::RwLock`, so a
//! long document query never blocks key-value traffic. [`MultiModelStore`]
//! is the facade handlers and the replication endpoint talk to.

pub mod column;
pub mod document;
pub mod graph;
pub mod keyvalue;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StoreError;

pub use column::ColumnStore;
pub use document::{Document, DocumentStore};
pub use graph::{GraphEdge, GraphNode, GraphStore};
pub use keyvalue::KeyValueStore;

/// Which model a replicated write targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataModel {
    #[default]
    #[serde(rename = "kv")]
    KeyValue,
    #[serde(rename = "document")]
    Document,
    #[serde(rename = "column")]
    Column,
    #[serde(rename = "graph_node")]
    GraphNode,
    #[serde(rename = "graph_edge")]
    GraphEdge,
}

/// All four models of one node.
#[derive(Default)]
pub struct MultiModelStore {
    pub documents: DocumentStore,
    pub kv: KeyValueStore,
    pub columns: ColumnStore,
    pub graph: GraphStore,
}

impl MultiModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a write received from a peer.
    ///
    /// Always an upsert: a replica may see the same write more than once,
    /// and a graph edge may arrive before its endpoints.
    pub async fn apply_replicated(
        &self,
        model: DataModel,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        match model {
            DataModel::KeyValue => {
                self.kv.set(key, value).await;
            }
            DataModel::Document => {
                let (collection, id) =
                    document::split_key(key).ok_or_else(|| StoreError::InvalidKey {
                        key: key.to_string(),
                    })?;
                let doc = match value {
                    Value::Object(map) => map,
                    _ => {
                        return Err(StoreError::InvalidValue {
                            reason: "document must be a JSON object".to_string(),
                        })
                    }
                };
                self.documents.put(collection, id, doc).await;
            }
            DataModel::Column => {
                let (family, row, column) =
                    column::split_key(key).ok_or_else(|| StoreError::InvalidKey {
                        key: key.to_string(),
                    })?;
                self.columns.insert(family, row, column, value).await;
            }
            DataModel::GraphNode => {
                let node: GraphNode = decode(value)?;
                self.graph.put_node(node).await;
            }
            DataModel::GraphEdge => {
                let edge: GraphEdge = decode(value)?;
                self.graph.put_edge(edge).await;
            }
        }
        Ok(())
    }

    /// Apply a delete received from a peer.
    ///
    /// Idempotent: a key that is already gone is not an error. Only the
    /// key-value and document models support deletes.
    pub async fn apply_replicated_delete(&self, model: DataModel, key: &str) -> Result<(), StoreError> {
        let result = match model {
            DataModel::KeyValue => self.kv.delete(key).await,
            DataModel::Document => {
                let (collection, id) =
                    document::split_key(key).ok_or_else(|| StoreError::InvalidKey {
                        key: key.to_string(),
                    })?;
                self.documents.delete(collection, id).await
            }
            other => {
                return Err(StoreError::InvalidValue {
                    reason: format!("{other:?} entries cannot be deleted"),
                })
            }
        };
        match result {
            Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::InvalidValue {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_model_wire_names() {
        assert_eq!(serde_json::to_value(DataModel::KeyValue).unwrap(), json!("kv"));
        assert_eq!(
            serde_json::to_value(DataModel::GraphEdge).unwrap(),
            json!("graph_edge")
        );
        let m: DataModel = serde_json::from_value(json!("column")).unwrap();
        assert_eq!(m, DataModel::Column);
        assert_eq!(DataModel::default(), DataModel::KeyValue);
    }

    #[tokio::test]
    async fn test_apply_replicated_kv_is_upsert() {
        let store = MultiModelStore::new();
        store
            .apply_replicated(DataModel::KeyValue, "user:42", json!({"n": 1}))
            .await
            .unwrap();
        store
            .apply_replicated(DataModel::KeyValue, "user:42", json!({"n": 2}))
            .await
            .unwrap();
        assert_eq!(store.kv.get("user:42").await.unwrap(), json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_apply_replicated_document() {
        let store = MultiModelStore::new();
        store
            .apply_replicated(DataModel::Document, "users.u1", json!({"name": "ada"}))
            .await
            .unwrap();
        let doc = store.documents.get("users", "u1").await.unwrap();
        assert_eq!(doc.get("name"), Some(&json!("ada")));

        let err = store
            .apply_replicated(DataModel::Document, "users.u2", json!(3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));

        let err = store
            .apply_replicated(DataModel::Document, "nodot", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_apply_replicated_column() {
        let store = MultiModelStore::new();
        store
            .apply_replicated(DataModel::Column, "metrics/host1/cpu", json!(0.5))
            .await
            .unwrap();
        assert_eq!(
            store.columns.get("metrics", "host1", "cpu").await.unwrap(),
            json!(0.5)
        );

        let err = store
            .apply_replicated(DataModel::Column, "metrics/host1", json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_apply_replicated_edge_before_nodes() {
        let store = MultiModelStore::new();
        store
            .apply_replicated(
                DataModel::GraphEdge,
                "e1",
                json!({"id": "e1", "from": "a", "to": "b", "type": "knows"}),
            )
            .await
            .unwrap();
        assert_eq!(store.graph.get_edge("e1").await.unwrap().from, "a");

        store
            .apply_replicated(DataModel::GraphNode, "a", json!({"id": "a"}))
            .await
            .unwrap();
        assert!(store.graph.get_node("a").await.is_ok());
    }

    #[tokio::test]
    async fn test_apply_replicated_bad_graph_payload() {
        let store = MultiModelStore::new();
        let err = store
            .apply_replicated(DataModel::GraphNode, "a", json!("not a node"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_apply_replicated_delete_is_idempotent() {
        let store = MultiModelStore::new();
        store.kv.set("user:42", json!(1)).await;
        store
            .apply_replicated(DataModel::Document, "users.u1", json!({"name": "ada"}))
            .await
            .unwrap();

        store
            .apply_replicated_delete(DataModel::KeyValue, "user:42")
            .await
            .unwrap();
        store
            .apply_replicated_delete(DataModel::Document, "users.u1")
            .await
            .unwrap();
        assert!(store.kv.get("user:42").await.is_err());
        assert!(store.documents.get("users", "u1").await.is_err());

        // A second delivery of the same delete is fine.
        store
            .apply_replicated_delete(DataModel::KeyValue, "user:42")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_replicated_delete_unsupported_model() {
        let store = MultiModelStore::new();
        let err = store
            .apply_replicated_delete(DataModel::Column, "cf/r/c")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
    }
}
