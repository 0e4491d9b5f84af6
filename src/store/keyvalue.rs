//! Key-value model.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::StoreError;

#[derive(Default)]
pub struct KeyValueStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl KeyValueStore {
    /// Insert or overwrite `key`.
    pub async fn set(&self, key: &str, value: Value) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    pub async fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| not_found(key))
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| not_found(key))
    }
}

fn not_found(key: &str) -> StoreError {
    StoreError::NotFound {
        what: format!("key {key}"),
    }
}
