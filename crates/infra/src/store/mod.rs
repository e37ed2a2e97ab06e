//! Abstract document store and its backends.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod r#trait;

#[cfg(test)]
pub(crate) mod testing;

pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDocumentStore;
pub use query::{Condition, Patch, Query};
pub use r#trait::{Collection, DocumentStore, StoreError};
