//! Resource-class templates and their propagation into the ACM.
//!
//! A schema record says "role R may read/update/delete any member of class C"
//! and lists the class members. It is the declarative source of truth; the ACM
//! is the per-subject materialized view. Template edits fan out to the ACM
//! record of every affected role, with per-branch outcome reporting.
//!
//! Consistency between the two stores is eventual: the schema write happens
//! first and the ACM writes follow, so a concurrent reader can observe the
//! pre-propagation ACM. Every step is an idempotent set operation, so callers
//! recover from a partial failure by retrying the whole call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use warden_auth::{AccessControl, AccessKind};
use warden_core::{ObjectId, SetOp, SubjectId};

use crate::acm::AccessControlMatrix;
use crate::error::RegistryError;
use crate::propagation::fan_out;
use crate::roles::RoleRegistry;
use crate::store::{Collection, DocumentStore, Patch, Query, StoreError};

pub const SCHEMA_COLLECTION: &str = "schemas";

/// Schema record wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRecord {
    pub schema_name: String,
    pub service_name: String,
    #[serde(default)]
    pub access_control: AccessControl<String>,
    #[serde(default)]
    pub document_ids: Vec<ObjectId>,
}

/// Result of `SchemaRegistry::register_object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub record: SchemaRecord,
    /// The record did not exist and was created with the supplied template.
    pub created: bool,
}

/// Result of a fully propagated template mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMutation {
    pub record: SchemaRecord,
    /// Role names written to the template and propagated to their ACM records.
    pub applied: Vec<String>,
    /// Input names that matched no role and were skipped.
    pub dropped: Vec<String>,
}

fn by_name(schema_name: &str) -> Query {
    Query::new().eq("schemaName", schema_name)
}

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Collection<SchemaRecord>,
    roles: RoleRegistry,
    acm: AccessControlMatrix,
}

impl SchemaRegistry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        roles: RoleRegistry,
        acm: AccessControlMatrix,
    ) -> Self {
        Self {
            schemas: Collection::new(store, SCHEMA_COLLECTION),
            roles,
            acm,
        }
    }

    pub async fn init(&self) -> Result<(), RegistryError> {
        self.schemas.ensure_unique_index("schemaName").await?;
        Ok(())
    }

    pub async fn get(&self, schema_name: &str) -> Result<Option<SchemaRecord>, RegistryError> {
        Ok(self.schemas.find_one(&by_name(schema_name)).await?)
    }

    pub async fn list(&self) -> Result<Vec<SchemaRecord>, RegistryError> {
        Ok(self.schemas.find_many(&Query::all()).await?)
    }

    /// Add `object_id` to the class manifest, creating the record (with
    /// `template`) if the class is new.
    #[instrument(skip(self, template), err)]
    pub async fn register_object(
        &self,
        schema_name: &str,
        service_name: &str,
        template: &AccessControl<String>,
        object_id: &ObjectId,
    ) -> Result<Registration, RegistryError> {
        if schema_name.trim().is_empty() || service_name.trim().is_empty() {
            return Err(RegistryError::validation(
                "schemaName and serviceName must not be empty",
            ));
        }

        let add = [Patch::add_to_set(
            "documentIds",
            vec![Value::from(object_id.as_str())],
        )];

        let mut created = false;
        if self.schemas.update_many(&by_name(schema_name), &add).await? == 0 {
            let mut access_control = template.clone();
            for kind in AccessKind::ALL {
                warden_core::set_ops::dedup(access_control.get_mut(kind));
            }
            let record = SchemaRecord {
                schema_name: schema_name.to_string(),
                service_name: service_name.to_string(),
                access_control,
                document_ids: vec![object_id.clone()],
            };
            match self.schemas.create(&record).await {
                Ok(()) => created = true,
                Err(StoreError::Duplicate { .. }) => {
                    self.schemas.update_many(&by_name(schema_name), &add).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let record = self
            .get(schema_name)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("schema '{schema_name}'")))?;
        Ok(Registration { record, created })
    }

    /// Grant or revoke `role_names` on the class template for `kind`, then
    /// apply the same operation to each role's ACM record using the class's
    /// full `documentIds`.
    ///
    /// - unknown schema → `NotFound`, nothing written;
    /// - no input name is an existing role → `NoMatchingRoles`, nothing written;
    /// - unknown names among known ones are dropped and reported;
    /// - any failed ACM branch → `PartialPropagation` after the others applied.
    #[instrument(skip(self, role_names), fields(roles = role_names.len()), err)]
    pub async fn mutate_role_template(
        &self,
        schema_name: &str,
        kind: AccessKind,
        op: SetOp,
        role_names: &[String],
    ) -> Result<TemplateMutation, RegistryError> {
        if role_names.is_empty() {
            return Err(RegistryError::validation("at least one role name is required"));
        }

        if !self.schemas.exists(&by_name(schema_name)).await? {
            return Err(RegistryError::not_found(format!("schema '{schema_name}'")));
        }

        let applied = self.roles.existing_names(role_names).await?;
        if applied.is_empty() {
            return Err(RegistryError::NoMatchingRoles(role_names.to_vec()));
        }
        let mut dropped: Vec<String> = Vec::new();
        for name in role_names {
            if !applied.contains(name) && !dropped.contains(name) {
                dropped.push(name.clone());
            }
        }
        if !dropped.is_empty() {
            tracing::warn!(?dropped, "ignoring role names with no matching role");
        }

        let values: Vec<Value> = applied.iter().map(|n| Value::from(n.as_str())).collect();
        let patch = match op {
            SetOp::Push => Patch::add_to_set(kind.field_path(), values),
            SetOp::Pull => Patch::pull(kind.field_path(), values),
        };
        if self.schemas.update_many(&by_name(schema_name), &[patch]).await? == 0 {
            return Err(RegistryError::not_found(format!("schema '{schema_name}'")));
        }

        let record = self
            .get(schema_name)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("schema '{schema_name}'")))?;

        let subjects = applied
            .iter()
            .map(|name| SubjectId::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let document_ids = &record.document_ids;
        let acm = &self.acm;
        let report = fan_out(subjects, |subject| async move {
            acm.apply(&subject, kind, op, document_ids).await
        })
        .await;

        tracing::info!(
            schema = schema_name,
            kind = %kind,
            op = %op,
            documents = document_ids.len(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "propagated role template"
        );
        report.into_result()?;

        Ok(TemplateMutation {
            record,
            applied,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::{Action, RoleRecord};

    use crate::store::InMemoryDocumentStore;
    use crate::store::testing::FaultyStore;

    fn oid(s: &str) -> ObjectId {
        ObjectId::new(s).unwrap()
    }

    fn subject(s: &str) -> SubjectId {
        SubjectId::new(s).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        acm: AccessControlMatrix,
        schemas: SchemaRegistry,
    }

    async fn fixture(store: Arc<dyn DocumentStore>) -> Fixture {
        let roles = RoleRegistry::new(store.clone());
        let acm = AccessControlMatrix::new(store.clone());
        let schemas = SchemaRegistry::new(store, roles.clone(), acm.clone());
        roles.init().await.unwrap();
        acm.init().await.unwrap();
        schemas.init().await.unwrap();

        for name in ["Admin2", "Auditors"] {
            roles.create(RoleRecord::new(name, "")).await.unwrap();
        }
        for o in ["O1", "O2", "O3"] {
            schemas
                .register_object("Widget", "widgets", &AccessControl::default(), &oid(o))
                .await
                .unwrap();
        }
        Fixture { acm, schemas }
    }

    #[tokio::test]
    async fn register_object_creates_then_appends_without_duplicates() {
        let f = fixture(Arc::new(InMemoryDocumentStore::new())).await;
        let again = f
            .schemas
            .register_object("Widget", "widgets", &AccessControl::default(), &oid("O2"))
            .await
            .unwrap();

        assert!(!again.created);
        assert_eq!(again.record.document_ids, vec![oid("O1"), oid("O2"), oid("O3")]);
    }

    #[tokio::test]
    async fn grant_propagates_every_document_id() {
        let f = fixture(Arc::new(InMemoryDocumentStore::new())).await;

        let result = f
            .schemas
            .mutate_role_template("Widget", AccessKind::Read, SetOp::Push, &names(&["Admin2"]))
            .await
            .unwrap();

        assert_eq!(result.record.access_control.read, names(&["Admin2"]));
        let acm = f.acm.get(&subject("Admin2")).await.unwrap().unwrap();
        for id in &result.record.document_ids {
            assert!(acm.access_control.read.contains(id));
        }
        assert!(acm.access_control.update.is_empty());
    }

    #[tokio::test]
    async fn revoke_propagates_removal() {
        let f = fixture(Arc::new(InMemoryDocumentStore::new())).await;
        let admin = names(&["Admin2"]);
        f.schemas
            .mutate_role_template("Widget", AccessKind::Delete, SetOp::Push, &admin)
            .await
            .unwrap();
        let result = f
            .schemas
            .mutate_role_template("Widget", AccessKind::Delete, SetOp::Pull, &admin)
            .await
            .unwrap();

        assert!(result.record.access_control.delete.is_empty());
        assert!(!f.acm.is_allowed(&subject("Admin2"), Action::Delete, &oid("O1")).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_schema_is_not_found_without_side_effects() {
        let f = fixture(Arc::new(InMemoryDocumentStore::new())).await;
        let err = f
            .schemas
            .mutate_role_template("Gadget", AccessKind::Read, SetOp::Push, &names(&["Admin2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert!(f.acm.get(&subject("Admin2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_typos_is_no_matching_roles_without_side_effects() {
        let f = fixture(Arc::new(InMemoryDocumentStore::new())).await;
        let err = f
            .schemas
            .mutate_role_template("Widget", AccessKind::Read, SetOp::Push, &names(&["Admni2"]))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::NoMatchingRoles(ref n) if n == &names(&["Admni2"])));
        assert!(f.acm.get(&subject("Admni2")).await.unwrap().is_none());
        let schema = f.schemas.get("Widget").await.unwrap().unwrap();
        assert!(schema.access_control.read.is_empty());
    }

    #[tokio::test]
    async fn typos_are_dropped_and_reported() {
        let f = fixture(Arc::new(InMemoryDocumentStore::new())).await;
        let result = f
            .schemas
            .mutate_role_template(
                "Widget",
                AccessKind::Update,
                SetOp::Push,
                &names(&["Admin2", "Admni2"]),
            )
            .await
            .unwrap();

        assert_eq!(result.applied, names(&["Admin2"]));
        assert_eq!(result.dropped, names(&["Admni2"]));
        assert_eq!(result.record.access_control.update, names(&["Admin2"]));
        assert!(f.acm.get(&subject("Admni2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_failure_reports_subsets_and_retry_converges() {
        let store = Arc::new(FaultyStore::new());
        let f = fixture(store.clone()).await;
        let both = names(&["Admin2", "Auditors"]);

        store.fail_updates_where("acm", "subject", "Auditors");
        let err = f
            .schemas
            .mutate_role_template("Widget", AccessKind::Read, SetOp::Push, &both)
            .await
            .unwrap_err();

        match err {
            RegistryError::PartialPropagation { succeeded, failed } => {
                assert_eq!(succeeded, vec![subject("Admin2")]);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].subject, subject("Auditors"));
            }
            other => panic!("expected partial propagation, got {other:?}"),
        }

        // Completed branches are not rolled back.
        assert!(f.acm.is_allowed(&subject("Admin2"), Action::Read, &oid("O3")).await.unwrap());
        assert!(!f.acm.is_allowed(&subject("Auditors"), Action::Read, &oid("O3")).await.unwrap());

        store.heal();
        f.schemas
            .mutate_role_template("Widget", AccessKind::Read, SetOp::Push, &both)
            .await
            .unwrap();

        for role in ["Admin2", "Auditors"] {
            let record = f.acm.get(&subject(role)).await.unwrap().unwrap();
            assert_eq!(record.access_control.read, vec![oid("O1"), oid("O2"), oid("O3")]);
        }
        let schema = f.schemas.get("Widget").await.unwrap().unwrap();
        assert_eq!(schema.access_control.read, both);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_may_observe_pre_propagation_state() {
        let store = Arc::new(FaultyStore::new());
        let f = fixture(store.clone()).await;
        let gate = store.gate_updates("acm");

        let schemas = f.schemas.clone();
        let pending = tokio::spawn(async move {
            schemas
                .mutate_role_template("Widget", AccessKind::Read, SetOp::Push, &names(&["Admin2"]))
                .await
        });

        // Schema template updated first ...
        loop {
            let schema = f.schemas.get("Widget").await.unwrap().unwrap();
            if schema.access_control.read.contains(&"Admin2".to_string()) {
                break;
            }
            tokio::task::yield_now().await;
        }
        // ... while the ACM still reflects the old state.
        assert!(!f.acm.is_allowed(&subject("Admin2"), Action::Read, &oid("O1")).await.unwrap());

        gate.add_permits(16);
        pending.await.unwrap().unwrap();
        assert!(f.acm.is_allowed(&subject("Admin2"), Action::Read, &oid("O1")).await.unwrap());
    }
}
