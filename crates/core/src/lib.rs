//! `warden-core`: foundation building blocks shared by every warden crate.
//!
//! This crate contains **pure** primitives (no IO, no async): identifiers,
//! the domain error model, and the value-equality set operations used by every
//! mutable permission list.

pub mod error;
pub mod id;
pub mod set_ops;

pub use error::{DomainError, DomainResult};
pub use id::{ObjectId, SubjectId};
pub use set_ops::SetOp;
