//! Document model.
//!
//! Documents are JSON objects addressed by `(collection, id)` and stored
//! under the composite key `collection.id`. The separator is not escaped,
//! so `("a.b", "c")` and `("a", "b.c")` address the same slot.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::errors::StoreError;

pub type Document = Map<String, Value>;

#[derive(Default)]
pub struct DocumentStore {
    docs: RwLock<BTreeMap<String, Document>>,
}

/// Composite storage and replication key.
pub fn doc_key(collection: &str, id: &str) -> String {
    format!("{collection}.{id}")
}

/// Split a composite key at its first `.`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('.')
        .filter(|(c, id)| !c.is_empty() && !id.is_empty())
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        what: format!("document {id} in collection {collection}"),
    }
}

/// A filter value matches a string field verbatim, any other field by its
/// JSON rendering (`42`, `true`, `null`).
fn field_matches(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

impl DocumentStore {
    /// Insert a new document. Fails if `(collection, id)` is taken.
    pub async fn insert(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        let key = doc_key(collection, id);
        if docs.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                what: format!("document {id} in collection {collection}"),
            });
        }
        docs.insert(key, doc);
        Ok(())
    }

    /// Insert or replace without the existence check.
    pub async fn put(&self, collection: &str, id: &str, doc: Document) {
        self.docs.write().await.insert(doc_key(collection, id), doc);
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        self.docs
            .read()
            .await
            .get(&doc_key(collection, id))
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }

    /// Shallow-merge `updates` into an existing document and return the
    /// merged result.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Document,
    ) -> Result<Document, StoreError> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(&doc_key(collection, id))
            .ok_or_else(|| not_found(collection, id))?;
        for (field, value) in updates {
            doc.insert(field, value);
        }
        Ok(doc.clone())
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.docs
            .write()
            .await
            .remove(&doc_key(collection, id))
            .map(|_| ())
            .ok_or_else(|| not_found(collection, id))
    }

    /// Documents of `collection` whose fields equal every filter, in key
    /// order.
    pub async fn query(&self, collection: &str, filters: &BTreeMap<String, String>) -> Vec<Document> {
        let prefix = format!("{collection}.");
        self.docs
            .read()
            .await
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, doc)| {
                filters.iter().all(|(field, expected)| {
                    doc.get(field)
                        .is_some_and(|actual| field_matches(actual, expected))
                })
            })
            .map(|(_, doc)| doc.clone())
            .collect()
    }
}
