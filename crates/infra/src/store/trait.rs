use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::query::{Patch, Query};

/// Document store operation error.
///
/// These are **infrastructure errors** (storage, serialization) as opposed to
/// domain errors (validation, missing records).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key in {collection}.{field}")]
    Duplicate { collection: String, field: String },

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Abstract document store.
///
/// Collections hold JSON objects. The store only needs equality and
/// array-membership filters (see `Query`) plus set-style patches.
///
/// ## Consistency
///
/// Each call is atomic on its own; nothing spans calls. Callers that need
/// multi-step consistency express their mutations as idempotent set
/// operations and retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Declare a unique index; `create` fails with `Duplicate` on violation.
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError>;

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>, StoreError>;

    async fn find_many(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    async fn create(&self, collection: &str, doc: Value) -> Result<(), StoreError>;

    /// Apply `patches` to every matching document. Returns the number matched.
    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        patches: &[Patch],
    ) -> Result<u64, StoreError>;

    /// Returns the number deleted.
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError>;

    async fn count_documents(&self, collection: &str, query: &Query) -> Result<u64, StoreError>;
}

/// Typed view over one collection.
pub struct Collection<D> {
    store: Arc<dyn DocumentStore>,
    name: &'static str,
    _marker: PhantomData<fn() -> D>,
}

impl<D> Clone for Collection<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<D> core::fmt::Debug for Collection<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name).finish()
    }
}

impl<D> Collection<D>
where
    D: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn DocumentStore>, name: &'static str) -> Self {
        Self {
            store,
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn ensure_unique_index(&self, field: &str) -> Result<(), StoreError> {
        self.store.ensure_unique_index(self.name, field).await
    }

    pub async fn find_one(&self, query: &Query) -> Result<Option<D>, StoreError> {
        match self.store.find_one(self.name, query).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn find_many(&self, query: &Query) -> Result<Vec<D>, StoreError> {
        self.store
            .find_many(self.name, query)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn create(&self, doc: &D) -> Result<(), StoreError> {
        self.store.create(self.name, serde_json::to_value(doc)?).await
    }

    pub async fn update_many(&self, query: &Query, patches: &[Patch]) -> Result<u64, StoreError> {
        self.store.update_many(self.name, query, patches).await
    }

    pub async fn delete_many(&self, query: &Query) -> Result<u64, StoreError> {
        self.store.delete_many(self.name, query).await
    }

    pub async fn count_documents(&self, query: &Query) -> Result<u64, StoreError> {
        self.store.count_documents(self.name, query).await
    }

    pub async fn exists(&self, query: &Query) -> Result<bool, StoreError> {
        Ok(self.count_documents(query).await? > 0)
    }
}
