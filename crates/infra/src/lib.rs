//! Persistence and permission registries: document store backends, roles,
//! the access control matrix, schemas and their propagation.

pub mod acm;
pub mod error;
pub mod permission_store;
pub mod pivot;
pub mod propagation;
pub mod roles;
pub mod schemas;
pub mod store;

pub use acm::{AccessControlMatrix, AcmRecord};
pub use error::{BranchFailure, RegistryError};
pub use permission_store::{ObjectGrantOutcome, PermissionStore};
pub use pivot::{ObjectGrant, pivot};
pub use propagation::{FanOutReport, fan_out};
pub use roles::RoleRegistry;
pub use schemas::{Registration, SchemaRecord, SchemaRegistry, TemplateMutation};
pub use store::{Collection, DocumentStore, InMemoryDocumentStore, Patch, Query, StoreError};
#[cfg(feature = "postgres")]
pub use store::PostgresDocumentStore;
