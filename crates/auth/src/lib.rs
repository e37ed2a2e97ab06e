//! `warden-auth`: token, role and decision boundary.
//!
//! This crate knows nothing of HTTP or storage: lookups reach
//! it through the `PermissionSource` trait and decisions leave it through the
//! `AuditSink` trait.

pub mod audit;
pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod roles;
pub mod token;

pub use audit::{AuditRecord, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use authorize::{
    AccessRequest, AuthorizationEngine, Decision, DenialReason, GrantReason, PermissionSource,
    SourceError,
};
pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use permissions::{AccessControl, AccessKind, Action};
pub use roles::{ANY_ROLE, RoleRecord, RouteKey};
pub use token::{Hs256TokenService, IssuedToken, TokenError, TokenVerifier};
