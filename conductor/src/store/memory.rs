use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{next_revision, validate_field, Document, DocumentStore, StoreError};

/// In-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, (String, Value)>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.docs
            .read()
            .await
            .get(id)
            .map(|(rev, body)| Document {
                id: id.to_string(),
                rev: Some(rev.clone()),
                body: body.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn put(&self, doc: Document) -> Result<String, StoreError> {
        let mut docs = self.docs.write().await;
        let current = docs.get(&doc.id).map(|(rev, _)| rev.as_str());
        if current != doc.rev.as_deref() {
            return Err(StoreError::Conflict(doc.id));
        }

        let rev = next_revision(current);
        docs.insert(doc.id, (rev.clone(), doc.body));
        Ok(rev)
    }

    async fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<Document>, StoreError> {
        validate_field(field)?;
        let mut found: Vec<Document> = self
            .docs
            .read()
            .await
            .iter()
            .map(|(id, (rev, body))| Document {
                id: id.clone(),
                rev: Some(rev.clone()),
                body: body.clone(),
            })
            .filter(|doc| doc.field_matches(field, value))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn remove(&self, id: &str, rev: &str) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        match docs.get(id) {
            None => Err(StoreError::NotFound(id.to_string())),
            Some((current, _)) if current != rev => Err(StoreError::Conflict(id.to_string())),
            Some(_) => {
                docs.remove(id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, rev: Option<&str>, body: Value) -> Document {
        Document {
            id: id.to_string(),
            rev: rev.map(String::from),
            body,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let rev = store.put(doc("a", None, json!({"x": 1}))).await.unwrap();

        let fetched = store.get("a").await.unwrap();
        assert_eq!(fetched.rev.as_deref(), Some(rev.as_str()));
        assert_eq!(fetched.body, json!({"x": 1}));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let store = MemoryStore::new();
        let rev1 = store.put(doc("a", None, json!({}))).await.unwrap();
        let rev2 = store.put(doc("a", Some(&rev1), json!({"v": 2}))).await.unwrap();
        assert_ne!(rev1, rev2);

        let stale = store.put(doc("a", Some(&rev1), json!({"v": 3}))).await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));

        let missing_rev = store.put(doc("a", None, json!({"v": 3}))).await;
        assert!(matches!(missing_rev, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_revision_on_new_document_conflicts() {
        let store = MemoryStore::new();
        let result = store.put(doc("fresh", Some("1-abc"), json!({}))).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_find_by_field() {
        let store = MemoryStore::new();
        store.put(doc("u1", None, json!({"emails": ["a@x.org"]}))).await.unwrap();
        store.put(doc("u2", None, json!({"emails": ["b@x.org", "a@x.org"]}))).await.unwrap();
        store.put(doc("u3", None, json!({"emails": ["c@x.org"]}))).await.unwrap();

        let found = store.find_by_field("emails", "a@x.org").await.unwrap();
        let ids: Vec<_> = found.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);

        let mixed_case = store.find_by_field("emails", "A@X.org").await.unwrap();
        assert_eq!(mixed_case.len(), 2);

        assert!(store.find_by_field("emails", "z@x.org").await.unwrap().is_empty());
        assert!(matches!(
            store.find_by_field("bad field", "x").await,
            Err(StoreError::InvalidField(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_checks_revision() {
        let store = MemoryStore::new();
        let rev = store.put(doc("a", None, json!({}))).await.unwrap();

        assert!(matches!(store.remove("a", "1-wrong").await, Err(StoreError::Conflict(_))));
        store.remove("a", &rev).await.unwrap();
        assert!(matches!(store.remove("a", &rev).await, Err(StoreError::NotFound(_))));
    }
}
