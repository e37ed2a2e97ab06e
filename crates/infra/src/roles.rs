//! Route-level ACL: roles, their members and their `(route, method)` pairs.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::instrument;

use warden_auth::{ANY_ROLE, RoleRecord, RouteKey};
use warden_core::{SetOp, SubjectId, set_ops};

use crate::error::RegistryError;
use crate::store::{Collection, DocumentStore, Patch, Query, StoreError};

pub const ROLE_COLLECTION: &str = "roles";

fn by_name(name: &str) -> Query {
    Query::new().eq("name", name)
}

#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Collection<RoleRecord>,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            roles: Collection::new(store, ROLE_COLLECTION),
        }
    }

    /// Declare the unique-name index and make sure the `any` role exists.
    pub async fn init(&self) -> Result<(), RegistryError> {
        self.roles.ensure_unique_index("name").await?;
        self.ensure_any_role().await
    }

    pub async fn ensure_any_role(&self) -> Result<(), RegistryError> {
        if self.roles.exists(&by_name(ANY_ROLE)).await? {
            return Ok(());
        }
        match self.roles.create(&RoleRecord::any()).await {
            Ok(()) => {
                tracing::info!("created '{ANY_ROLE}' role");
                Ok(())
            }
            Err(StoreError::Duplicate { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip_all, fields(role = %role.name), err)]
    pub async fn create(&self, mut role: RoleRecord) -> Result<RoleRecord, RegistryError> {
        role.name = role.name.trim().to_string();
        if role.name.is_empty() {
            return Err(RegistryError::validation("role name must not be empty"));
        }
        set_ops::dedup(&mut role.members);
        set_ops::dedup(&mut role.access_routes);

        match self.roles.create(&role).await {
            Ok(()) => Ok(role),
            Err(StoreError::Duplicate { .. }) => Err(RegistryError::Conflict(format!(
                "role '{}' already exists",
                role.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<RoleRecord>, RegistryError> {
        Ok(self.roles.find_one(&by_name(name)).await?)
    }

    pub async fn list(&self) -> Result<Vec<RoleRecord>, RegistryError> {
        Ok(self.roles.find_many(&Query::all()).await?)
    }

    /// Remove a role. The `any` role is permanent.
    pub async fn delete(&self, name: &str) -> Result<bool, RegistryError> {
        if name == ANY_ROLE {
            return Err(RegistryError::validation("the 'any' role cannot be deleted"));
        }
        Ok(self.roles.delete_many(&by_name(name)).await? > 0)
    }

    #[instrument(skip(self, subjects), err)]
    pub async fn mutate_members(
        &self,
        name: &str,
        op: SetOp,
        subjects: &[SubjectId],
    ) -> Result<RoleRecord, RegistryError> {
        let values = subjects.iter().map(|s| Value::from(s.as_str())).collect();
        self.mutate(name, set_patch(op, "members", values)).await
    }

    #[instrument(skip(self, routes), err)]
    pub async fn mutate_routes(
        &self,
        name: &str,
        op: SetOp,
        routes: &[RouteKey],
    ) -> Result<RoleRecord, RegistryError> {
        let values = routes.iter().map(|r| json!(r)).collect();
        self.mutate(name, set_patch(op, "accessRoutes", values)).await
    }

    /// True iff the `any` role lists the pair.
    pub async fn is_route_open_to_any(&self, route: &RouteKey) -> Result<bool, RegistryError> {
        let query = by_name(ANY_ROLE).contains("accessRoutes", json!(route));
        Ok(self.roles.exists(&query).await?)
    }

    /// True iff some role other than `any` has `subject` as member and lists the pair.
    pub async fn is_route_granted_to_subject(
        &self,
        subject: &SubjectId,
        route: &RouteKey,
    ) -> Result<bool, RegistryError> {
        let query = Query::new()
            .ne("name", ANY_ROLE)
            .contains("members", subject.as_str())
            .contains("accessRoutes", json!(route));
        Ok(self.roles.exists(&query).await?)
    }

    /// The subset of `names` that are existing roles, in input order.
    pub async fn existing_names(&self, names: &[String]) -> Result<Vec<String>, RegistryError> {
        let values = names.iter().map(|n| Value::from(n.as_str())).collect();
        let found: Vec<String> = self
            .roles
            .find_many(&Query::new().is_in("name", values))
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();

        let mut existing = Vec::new();
        for name in names {
            if found.contains(name) && !existing.contains(name) {
                existing.push(name.clone());
            }
        }
        Ok(existing)
    }

    async fn mutate(&self, name: &str, patch: Patch) -> Result<RoleRecord, RegistryError> {
        let matched = self.roles.update_many(&by_name(name), &[patch]).await?;
        if matched == 0 {
            return Err(RegistryError::not_found(format!("role '{name}'")));
        }
        self.get(name)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("role '{name}'")))
    }
}

fn set_patch(op: SetOp, field: &str, values: Vec<Value>) -> Patch {
    match op {
        SetOp::Push => Patch::add_to_set(field, values),
        SetOp::Pull => Patch::pull(field, values),
    }
}
