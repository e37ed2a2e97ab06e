//! Registry error model.

use serde::Serialize;
use thiserror::Error;

use warden_core::{DomainError, SubjectId};

use crate::store::StoreError;

/// One failed branch of a propagation fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchFailure {
    pub subject: SubjectId,
    pub error: String,
}

/// Error returned by the permission registries.
///
/// `Validation`, `NotFound`, `Conflict` and `NoMatchingRoles` are reported
/// before any write. `PartialPropagation` is reported after the successful
/// branches have been applied; nothing is rolled back.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no matching roles among {0:?}")]
    NoMatchingRoles(Vec<String>),

    #[error("propagation partially failed: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialPropagation {
        succeeded: Vec<SubjectId>,
        failed: Vec<BranchFailure>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<DomainError> for RegistryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}
