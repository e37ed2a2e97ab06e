//! Postgres-backed document store.
//!
//! Every collection lives in a single `documents` table with a JSONB body.
//! Queries are pushed down as a JSONB containment pre-filter (`body @> $2`)
//! and then evaluated exactly in Rust with `Query::matches`, so both backends
//! share one query semantics.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Any other | N/A | `Backend` |
//!
//! ## Updates
//!
//! `update_many` runs in a transaction: matching rows are selected
//! `FOR UPDATE`, patched in Rust and written back, so concurrent set
//! operations on the same document serialize on the row lock.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use super::query::{Query, Patch, apply_patches};
use super::r#trait::{DocumentStore, StoreError};

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and create the backing table if needed.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                collection TEXT NOT NULL,
                body JSONB NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS documents_body_gin ON documents USING GIN (body)")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;

        Ok(())
    }

    async fn select_rows(
        &self,
        tx: Option<&mut Transaction<'_, Postgres>>,
        collection: &str,
        query: &Query,
        for_update: bool,
    ) -> Result<Vec<(i64, Value)>, StoreError> {
        let sql = if for_update {
            "SELECT id, body FROM documents WHERE collection = $1 AND body @> $2 ORDER BY id FOR UPDATE"
        } else {
            "SELECT id, body FROM documents WHERE collection = $1 AND body @> $2 ORDER BY id"
        };

        let q = sqlx::query(sql)
            .bind(collection)
            .bind(Json(query.containment()));

        let rows = match tx {
            Some(tx) => q.fetch_all(&mut **tx).await,
            None => q.fetch_all(&*self.pool).await,
        }
        .map_err(|e| map_sqlx_error("select", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("select", e))?;
            let Json(body): Json<Value> =
                row.try_get("body").map_err(|e| map_sqlx_error("select", e))?;
            if query.matches(&body) {
                out.push((id, body));
            }
        }
        Ok(out)
    }
}

fn index_name(collection: &str, field: &str) -> Result<String, StoreError> {
    let valid = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    };
    if !valid(collection) || !valid(field) {
        return Err(StoreError::Backend(format!(
            "invalid index identifier {collection}.{field}"
        )));
    }
    Ok(format!("documents_{}_{}_uniq", collection, field.replace('.', "_")))
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), err)]
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        let name = index_name(collection, field)?;
        let path = field.replace('.', ",");
        // Identifiers were validated above; DDL cannot take bind parameters.
        let sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON documents ((body #>> '{{{path}}}')) WHERE collection = '{collection}'"
        );
        sqlx::query(&sql)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_unique_index", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>, StoreError> {
        Ok(self
            .select_rows(None, collection, query, false)
            .await?
            .into_iter()
            .next()
            .map(|(_, body)| body))
    }

    #[instrument(skip(self), err)]
    async fn find_many(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .select_rows(None, collection, query, false)
            .await?
            .into_iter()
            .map(|(_, body)| body)
            .collect())
    }

    #[instrument(skip(self, doc), err)]
    async fn create(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::InvalidPatch("documents must be JSON objects".into()));
        }

        sqlx::query("INSERT INTO documents (collection, body) VALUES ($1, $2)")
            .bind(collection)
            .bind(Json(doc))
            .execute(&*self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    StoreError::Duplicate {
                        collection: collection.to_string(),
                        field: db.constraint().unwrap_or("unique").to_string(),
                    }
                }
                _ => map_sqlx_error("create", e),
            })?;
        Ok(())
    }

    #[instrument(skip(self, patches), err)]
    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        patches: &[Patch],
    ) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("update_many", e))?;

        let rows = self.select_rows(Some(&mut tx), collection, query, true).await?;
        let matched = rows.len() as u64;

        for (id, mut body) in rows {
            apply_patches(&mut body, patches)?;
            sqlx::query("UPDATE documents SET body = $1 WHERE id = $2")
                .bind(Json(body))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_many", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("update_many", e))?;
        Ok(matched)
    }

    #[instrument(skip(self), err)]
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("delete_many", e))?;

        let ids: Vec<i64> = self
            .select_rows(Some(&mut tx), collection, query, true)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let deleted = sqlx::query("DELETE FROM documents WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_many", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("delete_many", e))?;
        Ok(deleted)
    }

    #[instrument(skip(self), err)]
    async fn count_documents(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        Ok(self.select_rows(None, collection, query, false).await?.len() as u64)
    }
}

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{operation}: {e}"))
}
