//! Postgres-backed document store.
//!
//! All collections share the `documents` table, keyed by collection name.
//! Deletes are soft: the row keeps its body and gets a `deleted_at`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use recipebox_core::{DocumentStore, Record, StoreError};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{DbPool, PooledConn};
use crate::models::{DocumentRow, NewDocument};
use crate::schema::documents;

pub struct PgStore {
    pool: Arc<DbPool>,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConn, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn store_error(err: DieselError) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StoreError::UniqueViolation
        }
        other => {
            tracing::error!("Document query failed: {}", other);
            StoreError::Backend(other.to_string())
        }
    }
}

impl DocumentStore for PgStore {
    fn insert(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let new_document = NewDocument {
            id: record.id,
            collection,
            owner_id: record.owner_id,
            body: record.body.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        diesel::insert_into(documents::table)
            .values(&new_document)
            .execute(&mut conn)
            .map_err(store_error)?;
        Ok(())
    }

    fn replace(
        &self,
        collection: &str,
        id: Uuid,
        body: &Value,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError> {
        let mut conn = self.conn()?;
        diesel::update(
            documents::table
                .filter(documents::id.eq(id))
                .filter(documents::collection.eq(collection))
                .filter(documents::deleted_at.is_null()),
        )
        .set((
            documents::body.eq(body.clone()),
            documents::updated_at.eq(updated_at),
        ))
        .returning(DocumentRow::as_returning())
        .get_result(&mut conn)
        .optional()
        .map(|row| row.map(Record::from))
        .map_err(store_error)
    }

    fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Record>, StoreError> {
        let mut conn = self.conn()?;
        diesel::update(
            documents::table
                .filter(documents::id.eq(id))
                .filter(documents::collection.eq(collection))
                .filter(documents::deleted_at.is_null()),
        )
        .set(documents::deleted_at.eq(Some(Utc::now())))
        .returning(DocumentRow::as_returning())
        .get_result(&mut conn)
        .optional()
        .map(|row| row.map(Record::from))
        .map_err(store_error)
    }

    fn get(&self, collection: &str, id: Uuid) -> Result<Option<Record>, StoreError> {
        let mut conn = self.conn()?;
        documents::table
            .filter(documents::id.eq(id))
            .filter(documents::collection.eq(collection))
            .filter(documents::deleted_at.is_null())
            .select(DocumentRow::as_select())
            .first(&mut conn)
            .optional()
            .map(|row| row.map(Record::from))
            .map_err(store_error)
    }

    fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let mut conn = self.conn()?;
        documents::table
            .filter(documents::collection.eq(collection))
            .filter(documents::deleted_at.is_null())
            .order(documents::seq.asc())
            .select(DocumentRow::as_select())
            .load(&mut conn)
            .map(|rows| rows.into_iter().map(Record::from).collect())
            .map_err(store_error)
    }
}
