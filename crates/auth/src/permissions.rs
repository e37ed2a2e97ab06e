use core::str::FromStr;

use serde::{Deserialize, Serialize};

use warden_core::DomainError;

/// CRUD action derived from an HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    /// Map an HTTP method (any case) to its action.
    ///
    /// Methods outside the CRUD mapping have no action and can never be
    /// authorized against an object.
    pub fn for_method(method: &str) -> Option<Action> {
        match method.trim().to_ascii_uppercase().as_str() {
            "POST" => Some(Action::Create),
            "GET" | "HEAD" => Some(Action::Read),
            "PUT" | "PATCH" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }

    /// The object-level permission this action is checked against.
    ///
    /// `Create` has none: the object does not exist yet when creation is
    /// authorized, so creation is controlled purely at the route level.
    pub fn access_kind(self) -> Option<AccessKind> {
        match self {
            Action::Create => None,
            Action::Read => Some(AccessKind::Read),
            Action::Update => Some(AccessKind::Update),
            Action::Delete => Some(AccessKind::Delete),
        }
    }
}

/// Object-level permission kind stored in ACM records and schema templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Update,
    Delete,
}

impl AccessKind {
    pub const ALL: [AccessKind; 3] = [AccessKind::Read, AccessKind::Update, AccessKind::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Update => "update",
            AccessKind::Delete => "delete",
        }
    }

    /// Dotted document path of the list holding this kind (`accessControl.read`).
    pub fn field_path(&self) -> &'static str {
        match self {
            AccessKind::Read => "accessControl.read",
            AccessKind::Update => "accessControl.update",
            AccessKind::Delete => "accessControl.delete",
        }
    }

    /// Parse an admin `target` parameter such as `accessControl.update`.
    pub fn from_target(target: &str) -> Result<Self, DomainError> {
        let kind = target.strip_prefix("accessControl.").ok_or_else(|| {
            DomainError::validation(format!(
                "target must be accessControl.<read|update|delete>, got '{target}'"
            ))
        })?;
        kind.parse()
    }
}

impl core::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(AccessKind::Read),
            "update" => Ok(AccessKind::Update),
            "delete" => Ok(AccessKind::Delete),
            other => Err(DomainError::validation(format!(
                "access kind must be read, update or delete, got '{other}'"
            ))),
        }
    }
}

/// The `{read, update, delete}` triple shared by ACM records (object ids) and
/// schema templates (role names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct AccessControl<T> {
    #[serde(default)]
    pub read: Vec<T>,
    #[serde(default)]
    pub update: Vec<T>,
    #[serde(default)]
    pub delete: Vec<T>,
}

impl<T> Default for AccessControl<T> {
    fn default() -> Self {
        Self {
            read: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<T> AccessControl<T> {
    pub fn get(&self, kind: AccessKind) -> &[T] {
        match kind {
            AccessKind::Read => &self.read,
            AccessKind::Update => &self.update,
            AccessKind::Delete => &self.delete,
        }
    }

    pub fn get_mut(&mut self, kind: AccessKind) -> &mut Vec<T> {
        match kind {
            AccessKind::Read => &mut self.read,
            AccessKind::Update => &mut self.update,
            AccessKind::Delete => &mut self.delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Iterate `(kind, list)` pairs in read, update, delete order.
    pub fn iter(&self) -> impl Iterator<Item = (AccessKind, &[T])> {
        AccessKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

impl<T: PartialEq> AccessControl<T> {
    pub fn contains(&self, kind: AccessKind, item: &T) -> bool {
        self.get(kind).contains(item)
    }
}
