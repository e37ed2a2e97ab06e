use serde::{Deserialize, Serialize};

use warden_core::{DomainError, SubjectId};

/// Name of the role whose routes are open to every caller.
pub const ANY_ROLE: &str = "any";

/// A `(route, method)` pair, normalized on construction.
///
/// Normalization strips a single trailing `/` (a bare `/` is kept) and
/// uppercases the method. Every comparison goes through this type, so role
/// authoring and request matching can never disagree on case or slashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRouteKey")]
pub struct RouteKey {
    route: String,
    method: String,
}

#[derive(Deserialize)]
struct RawRouteKey {
    route: String,
    method: String,
}

impl TryFrom<RawRouteKey> for RouteKey {
    type Error = DomainError;

    fn try_from(raw: RawRouteKey) -> Result<Self, Self::Error> {
        RouteKey::new(raw.route, raw.method)
    }
}

impl RouteKey {
    pub fn new(route: impl AsRef<str>, method: impl AsRef<str>) -> Result<Self, DomainError> {
        let route = route.as_ref().trim();
        let method = method.as_ref().trim();

        if route.is_empty() {
            return Err(DomainError::validation("route must not be empty"));
        }
        if method.is_empty() {
            return Err(DomainError::validation("method must not be empty"));
        }

        let route = match route.strip_suffix('/') {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => route,
        };

        Ok(Self {
            route: route.to_string(),
            method: method.to_ascii_uppercase(),
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl core::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.method, self.route)
    }
}

/// Route-level ACL entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<SubjectId>,
    #[serde(default)]
    pub access_routes: Vec<RouteKey>,
}

impl RoleRecord {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            members: Vec::new(),
            access_routes: Vec::new(),
        }
    }

    /// The implicit role every subject belongs to.
    pub fn any() -> Self {
        Self::new(ANY_ROLE, "Routes open to every authenticated caller")
    }

    pub fn is_any(&self) -> bool {
        self.name == ANY_ROLE
    }

    pub fn grants(&self, key: &RouteKey) -> bool {
        self.access_routes.contains(key)
    }
}
