//! Column-family model: family -> row -> column -> value.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::StoreError;

type Row = HashMap<String, Value>;
type Family = HashMap<String, Row>;

#[derive(Default)]
pub struct ColumnStore {
    families: RwLock<HashMap<String, Family>>,
}

/// Replication key of a single cell.
pub fn cell_key(family: &str, row: &str, column: &str) -> String {
    format!("{family}/{row}/{column}")
}

/// Split a `family/row/column` key. The column part may itself contain `/`.
pub fn split_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.splitn(3, '/');
    let family = parts.next().filter(|s| !s.is_empty())?;
    let row = parts.next().filter(|s| !s.is_empty())?;
    let column = parts.next().filter(|s| !s.is_empty())?;
    Some((family, row, column))
}

impl ColumnStore {
    /// Upsert one cell, creating the family and row on demand.
    pub async fn insert(&self, family: &str, row: &str, column: &str, value: Value) {
        let mut families = self.families.write().await;
        families
            .entry(family.to_string())
            .or_default()
            .entry(row.to_string())
            .or_default()
            .insert(column.to_string(), value);
    }

    pub async fn get(&self, family: &str, row: &str, column: &str) -> Result<Value, StoreError> {
        let families = self.families.read().await;
        let rows = families.get(family).ok_or_else(|| StoreError::NotFound {
            what: format!("column family {family}"),
        })?;
        let cells = rows.get(row).ok_or_else(|| StoreError::NotFound {
            what: format!("row {row} in column family {family}"),
        })?;
        cells
            .get(column)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("column {column} in row {row} of column family {family}"),
            })
    }
}
