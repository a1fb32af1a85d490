//! Document store abstraction.
//!
//! Documents are JSON bodies addressed by id and guarded by an opaque
//! revision. A write must carry the revision it was read at; a stale write
//! is reported as [`StoreError::Conflict`].

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Document update conflict: {0}")]
    Conflict(String),
    #[error("Invalid field name: {0}")]
    InvalidField(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    /// Revision the document was read at; `None` for a document never stored.
    pub rev: Option<String>,
    /// Body without the `_id` and `_rev` keys.
    pub body: Value,
}

impl Document {
    /// Serialize a value whose `_id`/`_rev` keys become the document id and revision.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        let mut map = match serde_json::to_value(value) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(StoreError::Serialization(
                    "document must serialize to a JSON object".to_string(),
                ))
            }
            Err(e) => return Err(StoreError::Serialization(e.to_string())),
        };

        let id = match map.remove("_id") {
            Some(Value::String(id)) => id,
            _ => return Err(StoreError::Serialization("document has no _id".to_string())),
        };
        let rev = match map.remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            _ => None,
        };

        Ok(Self {
            id,
            rev,
            body: Value::Object(map),
        })
    }

    /// Deserialize into a value, restoring `_id` and `_rev`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut map = match &self.body {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        if let Some(rev) = &self.rev {
            map.insert("_rev".to_string(), Value::String(rev.clone()));
        }
        serde_json::from_value(Value::Object(map))
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Whether a top-level field equals `value` or is an array containing
    /// it, ignoring ASCII case.
    pub fn field_matches(&self, field: &str, value: &str) -> bool {
        match self.body.get(field) {
            Some(Value::String(s)) => s.eq_ignore_ascii_case(value),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .any(|item| item.eq_ignore_ascii_case(value)),
            _ => false,
        }
    }
}

/// Backing store for conductor documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    /// Write a document. Returns the new revision.
    async fn put(&self, doc: Document) -> Result<String, StoreError>;

    /// Documents whose top-level `field` equals `value` or contains it.
    ///
    /// Matching ignores ASCII case; callers needing an exact match filter
    /// the result.
    async fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<Document>, StoreError>;

    /// Delete a document at the given revision.
    async fn remove(&self, id: &str, rev: &str) -> Result<(), StoreError>;
}

/// Revision following `previous`: `"<generation>-<uuid>"`.
pub(crate) fn next_revision(previous: Option<&str>) -> String {
    let generation = previous
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, uuid::Uuid::new_v4().simple())
}

/// Field names are restricted to plain identifiers.
pub(crate) fn validate_field(field: &str) -> Result<(), StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}
