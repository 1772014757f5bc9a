//! Schema-validated collections over a [`DocumentStore`].
//!
//! Every mutation validates first and touches the store only if the
//! document (or patch) is clean. Successful mutations are broadcast as
//! [`Change`]s to every live publication of the collection.

use chrono::Utc;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{Document, Favorite, Recipe, Stored};
use crate::schema::{ValidationError, ViolationKind, DOCUMENT_FIELD};
use crate::store::{DocumentStore, MemoryStore, Record, StoreError};

/// Default number of changes a slow publication may fall behind before it is dropped.
pub const DEFAULT_CHANGE_BUFFER: usize = 256;

/// A mutation that has been applied to a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<D> {
    Inserted(Stored<D>),
    Updated(Stored<D>),
    /// Carries the document as it was before removal.
    Removed(Stored<D>),
}

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Document {0} not found")]
    NotFound(Uuid),

    #[error("Duplicate document: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("Stored document {id} is malformed: {source}")]
    Malformed {
        id: Uuid,
        source: serde_json::Error,
    },

    #[error("Failed to encode document: {0}")]
    Encode(serde_json::Error),
}

impl From<StoreError> for CollectionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation => {
                CollectionError::Duplicate("unique constraint violated".to_string())
            }
            other => CollectionError::Store(other),
        }
    }
}

pub struct Collection<D: Document> {
    store: Arc<dyn DocumentStore>,
    changes: broadcast::Sender<Change<D>>,
    /// Serializes check-then-write sequences (unique keys, read-merge-replace).
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> Collection<D> {
    pub fn new(store: Arc<dyn DocumentStore>, change_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(change_buffer.max(1));
        Self {
            store,
            changes,
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        D::COLLECTION
    }

    /// Register for changes. Only changes made after this call are received.
    pub fn watch(&self) -> broadcast::Receiver<Change<D>> {
        self.changes.subscribe()
    }

    pub fn find_one(&self, id: Uuid) -> Result<Option<Stored<D>>, CollectionError> {
        self.store
            .get(D::COLLECTION, id)?
            .map(decode::<D>)
            .transpose()
    }

    pub fn find_all(&self) -> Result<Vec<Stored<D>>, CollectionError> {
        self.store
            .list(D::COLLECTION)?
            .into_iter()
            .map(decode::<D>)
            .collect()
    }

    pub fn find(
        &self,
        predicate: impl Fn(&Stored<D>) -> bool,
    ) -> Result<Vec<Stored<D>>, CollectionError> {
        Ok(self
            .find_all()?
            .into_iter()
            .filter(|doc| predicate(doc))
            .collect())
    }

    /// Validate a typed document and insert it.
    pub fn validate_and_insert(
        &self,
        document: D,
        owner: Option<Uuid>,
    ) -> Result<Stored<D>, CollectionError> {
        let body = serde_json::to_value(&document).map_err(CollectionError::Encode)?;
        self.insert_value(body, owner)
    }

    /// Validate an untyped document (as received over the wire) and insert it.
    pub fn insert_value(
        &self,
        body: Value,
        owner: Option<Uuid>,
    ) -> Result<Stored<D>, CollectionError> {
        self.check(D::schema().validate(&body))?;
        let document: D = self.check(parse(body))?;
        let body = serde_json::to_value(&document).map_err(CollectionError::Encode)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_unique(&document, None)?;

        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4(),
            owner_id: owner,
            body,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(D::COLLECTION, &record)?;

        let stored = Stored {
            id: record.id,
            owner: record.owner_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            fields: document,
        };
        debug!(collection = D::COLLECTION, id = %stored.id, "document inserted");
        self.emit(Change::Inserted(stored.clone()));
        Ok(stored)
    }

    /// Merge `patch` into the document and replace it.
    ///
    /// Keys set to `null` are removed. Both the patch and the merged result
    /// are validated, so a patch can never leave a document invalid.
    pub fn validate_and_update(
        &self,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Stored<D>, CollectionError> {
        self.check(D::schema().validate_patch(&patch))?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self
            .store
            .get(D::COLLECTION, id)?
            .ok_or(CollectionError::NotFound(id))?;

        let mut merged = match current.body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            if value.is_null() {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }
        let merged = Value::Object(merged);

        self.check(D::schema().validate(&merged))?;
        let document: D = self.check(parse(merged))?;
        self.ensure_unique(&document, Some(id))?;
        let body = serde_json::to_value(&document).map_err(CollectionError::Encode)?;

        let record = self
            .store
            .replace(D::COLLECTION, id, &body, Utc::now())?
            .ok_or(CollectionError::NotFound(id))?;
        let stored = decode::<D>(record)?;
        debug!(collection = D::COLLECTION, %id, "document updated");
        self.emit(Change::Updated(stored.clone()));
        Ok(stored)
    }

    /// Remove a document. Removing an id that does not exist is a no-op
    /// and returns `Ok(None)`.
    pub fn validate_and_remove(&self, id: Uuid) -> Result<Option<Stored<D>>, CollectionError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = self.store.delete(D::COLLECTION, id)? else {
            debug!(collection = D::COLLECTION, %id, "remove of missing document ignored");
            return Ok(None);
        };
        let stored = decode::<D>(record)?;
        debug!(collection = D::COLLECTION, %id, "document removed");
        self.emit(Change::Removed(stored.clone()));
        Ok(Some(stored))
    }

    fn check<T>(&self, result: Result<T, ValidationError>) -> Result<T, CollectionError> {
        result.map_err(|err| {
            warn!(
                collection = D::COLLECTION,
                fields = ?err.fields(),
                "document rejected by schema"
            );
            CollectionError::Validation(err)
        })
    }

    fn ensure_unique(&self, document: &D, except: Option<Uuid>) -> Result<(), CollectionError> {
        let Some(key) = document.unique_key() else {
            return Ok(());
        };
        let taken = self
            .find_all()?
            .iter()
            .any(|existing| Some(existing.id) != except && existing.unique_key().as_ref() == Some(&key));
        if taken {
            warn!(collection = D::COLLECTION, %key, "duplicate document rejected");
            return Err(CollectionError::Duplicate(key));
        }
        Ok(())
    }

    fn emit(&self, change: Change<D>) {
        // No receivers just means nobody is subscribed right now.
        let _ = self.changes.send(change);
    }
}

fn parse<D: Document>(body: Value) -> Result<D, ValidationError> {
    serde_json::from_value(body).map_err(|err| {
        ValidationError::single(
            DOCUMENT_FIELD,
            ViolationKind::Malformed {
                message: err.to_string(),
            },
        )
    })
}

fn decode<D: Document>(record: Record) -> Result<Stored<D>, CollectionError> {
    let fields = serde_json::from_value(record.body).map_err(|source| CollectionError::Malformed {
        id: record.id,
        source,
    })?;
    Ok(Stored {
        id: record.id,
        owner: record.owner_id,
        created_at: record.created_at,
        updated_at: record.updated_at,
        fields,
    })
}

/// The application's collections, sharing one store.
pub struct Catalog {
    pub recipes: Collection<Recipe>,
    pub favorites: Collection<Favorite>,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocumentStore>, change_buffer: usize) -> Self {
        Self {
            recipes: Collection::new(Arc::clone(&store), change_buffer),
            favorites: Collection::new(store, change_buffer),
        }
    }

    /// A catalog backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DEFAULT_CHANGE_BUFFER)
    }
}
