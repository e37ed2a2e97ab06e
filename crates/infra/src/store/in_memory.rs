use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::query::{Patch, Query, apply_patches, get_path};
use super::r#trait::{DocumentStore, StoreError};

#[derive(Debug, Default)]
struct Collections {
    docs: HashMap<String, Vec<Value>>,
    unique: HashMap<String, Vec<String>>,
}

/// In-memory document store for tests/dev.
///
/// A single `RwLock` guards every collection, so each call is atomic.
/// Unique indexes are enforced on `create`.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Collections>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let fields = inner.unique.entry(collection.to_string()).or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
        Ok(())
    }

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .docs
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| query.matches(d)))
            .cloned())
    }

    async fn find_many(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .docs
            .get(collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::InvalidPatch("documents must be JSON objects".into()));
        }

        let mut inner = self.write()?;
        let Collections { docs, unique } = &mut *inner;
        let docs = docs.entry(collection.to_string()).or_default();

        for field in unique.get(collection).into_iter().flatten() {
            let Some(key) = get_path(&doc, field) else {
                continue;
            };
            if docs.iter().any(|existing| get_path(existing, field) == Some(key)) {
                return Err(StoreError::Duplicate {
                    collection: collection.to_string(),
                    field: field.clone(),
                });
            }
        }

        docs.push(doc);
        Ok(())
    }

    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        patches: &[Patch],
    ) -> Result<u64, StoreError> {
        let mut inner = self.write()?;
        let Some(docs) = inner.docs.get_mut(collection) else {
            return Ok(0);
        };

        // Patch copies first so a failing patch leaves the collection untouched.
        let mut staged = Vec::new();
        for (idx, doc) in docs.iter().enumerate() {
            if query.matches(doc) {
                let mut updated = doc.clone();
                apply_patches(&mut updated, patches)?;
                staged.push((idx, updated));
            }
        }

        let matched = staged.len() as u64;
        for (idx, updated) in staged {
            docs[idx] = updated;
        }
        Ok(matched)
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        let mut inner = self.write()?;
        let Some(docs) = inner.docs.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !query.matches(d));
        Ok((before - docs.len()) as u64)
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .docs
            .get(collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).count() as u64)
            .unwrap_or(0))
    }
}
