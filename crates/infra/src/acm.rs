//! Access control matrix: per-subject object-level permissions.
//!
//! This is the materialized view consulted on the decision hot path: one
//! record per subject, looked up by key. Records are created on first grant or
//! first sight and are never deleted implicitly; an empty record is valid.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use warden_auth::{AccessControl, AccessKind, Action};
use warden_core::{ObjectId, SetOp, SubjectId, set_ops};

use crate::error::RegistryError;
use crate::store::{Collection, DocumentStore, Patch, Query, StoreError};

pub const ACM_COLLECTION: &str = "acm";

/// ACM record wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcmRecord {
    pub subject: SubjectId,
    #[serde(default)]
    pub access_control: AccessControl<ObjectId>,
}

impl AcmRecord {
    pub fn empty(subject: SubjectId) -> Self {
        Self {
            subject,
            access_control: AccessControl::default(),
        }
    }
}

fn id_values(ids: &[ObjectId]) -> Vec<Value> {
    ids.iter().map(|id| Value::from(id.as_str())).collect()
}

fn by_subject(subject: &SubjectId) -> Query {
    Query::new().eq("subject", subject.as_str())
}

#[derive(Debug, Clone)]
pub struct AccessControlMatrix {
    records: Collection<AcmRecord>,
}

impl AccessControlMatrix {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            records: Collection::new(store, ACM_COLLECTION),
        }
    }

    /// Declare the one-record-per-subject index.
    pub async fn init(&self) -> Result<(), RegistryError> {
        self.records.ensure_unique_index("subject").await?;
        Ok(())
    }

    pub async fn get(&self, subject: &SubjectId) -> Result<Option<AcmRecord>, RegistryError> {
        Ok(self.records.find_one(&by_subject(subject)).await?)
    }

    pub async fn list(&self) -> Result<Vec<AcmRecord>, RegistryError> {
        Ok(self.records.find_many(&Query::all()).await?)
    }

    /// Union `ids` into the subject's `kind` set, creating the record if absent.
    #[instrument(skip_all, fields(subject = %subject, kind = %kind, count = ids.len()), err)]
    pub async fn grant(
        &self,
        subject: &SubjectId,
        kind: AccessKind,
        ids: &[ObjectId],
    ) -> Result<(), RegistryError> {
        let mut frame = AccessControl::default();
        set_ops::push_unique(frame.get_mut(kind), ids);
        self.grant_all(subject, &frame).await
    }

    /// Remove `ids` from the subject's `kind` set. Absent ids or an absent
    /// record are a no-op.
    #[instrument(skip_all, fields(subject = %subject, kind = %kind, count = ids.len()), err)]
    pub async fn revoke(
        &self,
        subject: &SubjectId,
        kind: AccessKind,
        ids: &[ObjectId],
    ) -> Result<(), RegistryError> {
        self.records
            .update_many(
                &by_subject(subject),
                &[Patch::pull(kind.field_path(), id_values(ids))],
            )
            .await?;
        Ok(())
    }

    pub async fn apply(
        &self,
        subject: &SubjectId,
        kind: AccessKind,
        op: SetOp,
        ids: &[ObjectId],
    ) -> Result<(), RegistryError> {
        match op {
            SetOp::Push => self.grant(subject, kind, ids).await,
            SetOp::Pull => self.revoke(subject, kind, ids).await,
        }
    }

    /// Union a whole `{read, update, delete}` frame in one update.
    pub async fn grant_all(
        &self,
        subject: &SubjectId,
        frame: &AccessControl<ObjectId>,
    ) -> Result<(), RegistryError> {
        let patches: Vec<Patch> = frame
            .iter()
            .map(|(kind, ids)| Patch::add_to_set(kind.field_path(), id_values(ids)))
            .collect();

        let mut seed = AcmRecord::empty(subject.clone());
        for (kind, ids) in frame.iter() {
            set_ops::push_unique(seed.access_control.get_mut(kind), ids);
        }

        self.upsert(subject, &patches, &seed).await
    }

    /// First-contact provisioning: create an empty record if none exists.
    pub async fn ensure_subject(&self, subject: &SubjectId) -> Result<(), RegistryError> {
        if self.records.exists(&by_subject(subject)).await? {
            return Ok(());
        }
        match self.records.create(&AcmRecord::empty(subject.clone())).await {
            Ok(()) => {
                tracing::debug!(subject = %subject, "provisioned acm record");
                Ok(())
            }
            Err(StoreError::Duplicate { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Explicit administrative removal. Returns whether a record existed.
    pub async fn delete(&self, subject: &SubjectId) -> Result<bool, RegistryError> {
        Ok(self.records.delete_many(&by_subject(subject)).await? > 0)
    }

    /// Object-level membership test. `Create` is never object-authorizable.
    pub async fn is_allowed(
        &self,
        subject: &SubjectId,
        action: Action,
        object: &ObjectId,
    ) -> Result<bool, RegistryError> {
        let Some(kind) = action.access_kind() else {
            return Ok(false);
        };
        let query = by_subject(subject).contains(kind.field_path(), object.as_str());
        Ok(self.records.exists(&query).await?)
    }

    /// Update-or-create; a concurrent create is resolved by retrying the update.
    async fn upsert(
        &self,
        subject: &SubjectId,
        patches: &[Patch],
        seed: &AcmRecord,
    ) -> Result<(), RegistryError> {
        let query = by_subject(subject);
        if self.records.update_many(&query, patches).await? > 0 {
            return Ok(());
        }

        match self.records.create(seed).await {
            Ok(()) => Ok(()),
            Err(StoreError::Duplicate { .. }) => {
                self.records.update_many(&query, patches).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
