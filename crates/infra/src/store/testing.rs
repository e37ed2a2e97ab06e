//! Fault-injecting store wrapper for registry tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use super::query::{Condition, Patch, Query};
use super::r#trait::{DocumentStore, StoreError};
use super::InMemoryDocumentStore;

/// Wraps the in-memory store and can fail or hold updates on chosen documents.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: InMemoryDocumentStore,
    /// `(collection, field, value)` equality filters whose updates fail.
    failing_updates: Mutex<Vec<(String, String, Value)>>,
    /// Every call fails while set.
    unavailable: AtomicBool,
    /// When present, updates on this collection wait for a permit.
    gate: Mutex<Option<(String, std::sync::Arc<Semaphore>)>>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_updates_where(
        &self,
        collection: &str,
        field: &str,
        value: impl Into<Value>,
    ) {
        self.failing_updates
            .lock()
            .unwrap()
            .push((collection.to_string(), field.to_string(), value.into()));
    }

    pub(crate) fn heal(&self) {
        self.failing_updates.lock().unwrap().clear();
        self.unavailable.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Hold updates on `collection` until permits are added to the returned semaphore.
    pub(crate) fn gate_updates(&self, collection: &str) -> std::sync::Arc<Semaphore> {
        let semaphore = std::sync::Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some((collection.to_string(), semaphore.clone()));
        semaphore
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Backend("injected outage".into()))
        } else {
            Ok(())
        }
    }

    fn update_fails(&self, collection: &str, query: &Query) -> bool {
        let failing = self.failing_updates.lock().unwrap();
        query.conditions().iter().any(|c| match c {
            Condition::Eq { field, value } => failing
                .iter()
                .any(|(col, f, v)| col == collection && f == field && v == value),
            _ => false,
        })
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        self.inner.ensure_unique_index(collection, field).await
    }

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>, StoreError> {
        self.check_available()?;
        self.inner.find_one(collection, query).await
    }

    async fn find_many(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        self.check_available()?;
        self.inner.find_many(collection, query).await
    }

    async fn create(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner.create(collection, doc).await
    }

    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        patches: &[Patch],
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let gate = self
            .gate
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(col, _)| col == collection)
            .map(|(_, s)| s.clone());
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.update_fails(collection, query) {
            return Err(StoreError::Backend(format!("injected failure on {collection}")));
        }
        self.inner.update_many(collection, query, patches).await
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        self.check_available()?;
        self.inner.delete_many(collection, query).await
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        self.check_available()?;
        self.inner.count_documents(collection, query).await
    }
}
