//! Persistence seam for document collections.
//!
//! The store knows nothing about schemas: it keeps opaque JSON bodies keyed
//! by collection and id. Validation happens one layer up, in
//! [`crate::collection`], before anything reaches a store.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// A raw document as the store keeps it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub body: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Unique constraint violated")]
    UniqueViolation,

    #[error("Document store error: {0}")]
    Backend(String),
}

/// Backing storage for collections. Every call is a single atomic operation.
pub trait DocumentStore: Send + Sync {
    fn insert(&self, collection: &str, record: &Record) -> Result<(), StoreError>;

    /// Replace the body of a live document. Returns `None` if no such document exists.
    fn replace(
        &self,
        collection: &str,
        id: Uuid,
        body: &Value,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError>;

    /// Delete a document, returning what was removed. `None` if it did not exist.
    fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Record>, StoreError>;

    fn get(&self, collection: &str, id: Uuid) -> Result<Option<Record>, StoreError>;

    /// All live documents of a collection, in insertion order.
    fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError>;
}

/// In-process store. Used by tests, by the CLI's fixtures, and anywhere a
/// catalog is embedded without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let records = collections.entry(collection.to_string()).or_default();
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::UniqueViolation);
        }
        records.push(record.clone());
        Ok(())
    }

    fn replace(
        &self,
        collection: &str,
        id: Uuid,
        body: &Value,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(record) = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
        else {
            return Ok(None);
        };
        record.body = body.clone();
        record.updated_at = updated_at;
        Ok(Some(record.clone()))
    }

    fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Record>, StoreError> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(records) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(records
            .iter()
            .position(|r| r.id == id)
            .map(|index| records.remove(index)))
    }

    fn get(&self, collection: &str, id: Uuid) -> Result<Option<Record>, StoreError> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get(collection)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .cloned())
    }

    fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(body: Value) -> Record {
        let now = Utc::now();
        Record {
            id: Uuid::new_v4(),
            owner_id: None,
            body,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_collections_are_isolated() {
        let store = MemoryStore::new();
        let a = record(json!({"n": 1}));
        store.insert("A", &a).unwrap();
        assert_eq!(store.list("A").unwrap(), vec![a.clone()]);
        assert!(store.list("B").unwrap().is_empty());
        assert!(store.get("B", a.id).unwrap().is_none());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let store = MemoryStore::new();
        let records: Vec<Record> = (0..5).map(|n| record(json!({"n": n}))).collect();
        for r in &records {
            store.insert("A", r).unwrap();
        }
        assert_eq!(store.list("A").unwrap(), records);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = MemoryStore::new();
        let a = record(json!({}));
        store.insert("A", &a).unwrap();
        assert!(matches!(
            store.insert("A", &a),
            Err(StoreError::UniqueViolation)
        ));
    }

    #[test]
    fn test_replace_and_delete_missing_are_none() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(store
            .replace("A", id, &json!({}), Utc::now())
            .unwrap()
            .is_none());
        assert!(store.delete("A", id).unwrap().is_none());
    }

    #[test]
    fn test_replace_updates_body_and_timestamp() {
        let store = MemoryStore::new();
        let a = record(json!({"n": 1}));
        store.insert("A", &a).unwrap();
        let later = a.updated_at + chrono::Duration::seconds(5);
        let replaced = store
            .replace("A", a.id, &json!({"n": 2}), later)
            .unwrap()
            .unwrap();
        assert_eq!(replaced.body, json!({"n": 2}));
        assert_eq!(replaced.updated_at, later);
        assert_eq!(replaced.created_at, a.created_at);
    }

    #[test]
    fn test_delete_returns_removed_record() {
        let store = MemoryStore::new();
        let a = record(json!({"n": 1}));
        store.insert("A", &a).unwrap();
        assert_eq!(store.delete("A", a.id).unwrap(), Some(a.clone()));
        assert!(store.get("A", a.id).unwrap().is_none());
    }
}
