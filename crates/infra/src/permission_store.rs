//! Store-backed permission registries and the engine's `PermissionSource`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;

use warden_auth::{AccessControl, AccessKind, Action, PermissionSource, RouteKey, SourceError};
use warden_core::{ObjectId, SubjectId};

use crate::acm::AccessControlMatrix;
use crate::error::RegistryError;
use crate::pivot::{ObjectGrant, merge_frames, pivot};
use crate::propagation::{FanOutReport, fan_out};
use crate::roles::RoleRegistry;
use crate::schemas::{SchemaRecord, SchemaRegistry};
use crate::store::DocumentStore;

/// Result of a fully applied object-centric grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectGrantOutcome {
    pub schema: SchemaRecord,
    /// Subjects whose ACM record now holds the object.
    pub subjects: Vec<SubjectId>,
}

/// The three registries over one shared document store.
#[derive(Debug, Clone)]
pub struct PermissionStore {
    pub roles: RoleRegistry,
    pub acm: AccessControlMatrix,
    pub schemas: SchemaRegistry,
}

impl PermissionStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let roles = RoleRegistry::new(store.clone());
        let acm = AccessControlMatrix::new(store.clone());
        let schemas = SchemaRegistry::new(store, roles.clone(), acm.clone());
        Self { roles, acm, schemas }
    }

    /// Declare indexes and create the `any` role. Safe to call on every boot.
    pub async fn init(&self) -> Result<(), RegistryError> {
        self.roles.init().await?;
        self.acm.init().await?;
        self.schemas.init().await?;
        Ok(())
    }

    /// Pivot an object-centric grant into per-subject ACM frames and register
    /// the object with its class.
    ///
    /// A new class takes the grant's subject lists as its role template. When
    /// the class already exists, every role in its template also receives the
    /// object under the template's actions. Both sets of frames are merged per
    /// subject and applied in one fan-out, so each subject is reported once.
    /// The object stays registered when some ACM branches fail.
    #[instrument(skip_all, fields(object = %grant.object, schema = %grant.schema_name), err)]
    pub async fn create_by_object(
        &self,
        grant: &ObjectGrant,
    ) -> Result<ObjectGrantOutcome, RegistryError> {
        let registration = self
            .schemas
            .register_object(
                &grant.schema_name,
                &grant.service_name,
                &grant.role_template(),
                &grant.object,
            )
            .await?;

        let mut frames = pivot(&grant.object, &grant.access_control);
        if !registration.created {
            let template = subjects_of(&registration.record.access_control)?;
            merge_frames(&mut frames, pivot(&grant.object, &template));
        }

        let subjects = self.grant_frames(frames).await.into_result()?;
        Ok(ObjectGrantOutcome {
            schema: registration.record,
            subjects,
        })
    }

    async fn grant_frames(
        &self,
        frames: BTreeMap<SubjectId, AccessControl<ObjectId>>,
    ) -> FanOutReport {
        let subjects: Vec<SubjectId> = frames.keys().cloned().collect();
        let frames = &frames;
        let acm = &self.acm;
        fan_out(subjects, |subject| async move {
            match frames.get(&subject) {
                Some(frame) => acm.grant_all(&subject, frame).await,
                None => Ok(()),
            }
        })
        .await
    }
}

fn subjects_of(
    template: &AccessControl<String>,
) -> Result<AccessControl<SubjectId>, RegistryError> {
    let convert = |kind: AccessKind| -> Result<Vec<SubjectId>, RegistryError> {
        template
            .get(kind)
            .iter()
            .map(|name| SubjectId::new(name.as_str()).map_err(RegistryError::from))
            .collect()
    };
    Ok(AccessControl {
        read: convert(AccessKind::Read)?,
        update: convert(AccessKind::Update)?,
        delete: convert(AccessKind::Delete)?,
    })
}

fn unavailable(err: RegistryError) -> SourceError {
    SourceError::Unavailable(err.to_string())
}

#[async_trait]
impl PermissionSource for PermissionStore {
    async fn is_route_open_to_any(&self, route: &RouteKey) -> Result<bool, SourceError> {
        self.roles.is_route_open_to_any(route).await.map_err(unavailable)
    }

    async fn is_route_granted_to_subject(
        &self,
        subject: &SubjectId,
        route: &RouteKey,
    ) -> Result<bool, SourceError> {
        self.roles
            .is_route_granted_to_subject(subject, route)
            .await
            .map_err(unavailable)
    }

    async fn ensure_subject(&self, subject: &SubjectId) -> Result<(), SourceError> {
        self.acm.ensure_subject(subject).await.map_err(unavailable)
    }

    async fn is_object_allowed(
        &self,
        subject: &SubjectId,
        action: Action,
        object: &ObjectId,
    ) -> Result<bool, SourceError> {
        self.acm
            .is_allowed(subject, action, object)
            .await
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use warden_auth::{
        AccessRequest, AuthorizationEngine, Decision, DenialReason, Hs256TokenService,
        InMemoryAuditSink, RoleRecord,
    };
    use warden_core::SetOp;

    use crate::store::InMemoryDocumentStore;
    use crate::store::testing::FaultyStore;

    fn subject(s: &str) -> SubjectId {
        SubjectId::new(s).unwrap()
    }

    fn oid(s: &str) -> ObjectId {
        ObjectId::new(s).unwrap()
    }

    fn route(r: &str, m: &str) -> RouteKey {
        RouteKey::new(r, m).unwrap()
    }

    fn grant(object: &str, read: &[&str], update: &[&str]) -> ObjectGrant {
        ObjectGrant {
            object: oid(object),
            schema_name: "Widget".into(),
            service_name: "widgets".into(),
            access_control: AccessControl {
                read: read.iter().map(|s| subject(s)).collect(),
                update: update.iter().map(|s| subject(s)).collect(),
                delete: Vec::new(),
            },
        }
    }

    struct Harness {
        store: PermissionStore,
        tokens: Arc<Hs256TokenService>,
        engine: AuthorizationEngine,
    }

    async fn harness(backend: Arc<dyn DocumentStore>) -> Harness {
        let store = PermissionStore::new(backend);
        store.init().await.unwrap();

        let mut editors = RoleRecord::new("Editors", "edit widgets");
        editors.members.push(subject("U1"));
        editors.access_routes.push(route("/widgets", "PUT"));
        store.roles.create(editors).await.unwrap();

        let tokens = Arc::new(Hs256TokenService::new("test-secret", Duration::hours(1)));
        let engine = AuthorizationEngine::new(
            tokens.clone(),
            Arc::new(store.clone()),
            Arc::new(InMemoryAuditSink::default()),
        );
        Harness { store, tokens, engine }
    }

    impl Harness {
        async fn decide(&self, who: &str, r: &str, m: &str, object: Option<&str>) -> Decision {
            let token = self.tokens.issue(&subject(who), Utc::now()).unwrap().token;
            self.engine
                .authorize(&AccessRequest {
                    route: route(r, m),
                    token,
                    object_id: object.map(oid),
                })
                .await
        }
    }

    #[tokio::test]
    async fn pivot_grants_each_subject_only_its_actions() {
        let h = harness(Arc::new(InMemoryDocumentStore::new())).await;
        let outcome = h
            .store
            .create_by_object(&grant("O7", &["A", "B"], &["A"]))
            .await
            .unwrap();

        assert!(outcome.schema.document_ids.contains(&oid("O7")));
        let a = h.store.acm.get(&subject("A")).await.unwrap().unwrap();
        assert_eq!(a.access_control.read, vec![oid("O7")]);
        assert_eq!(a.access_control.update, vec![oid("O7")]);
        assert!(a.access_control.delete.is_empty());

        let b = h.store.acm.get(&subject("B")).await.unwrap().unwrap();
        assert_eq!(b.access_control.read, vec![oid("O7")]);
        assert!(b.access_control.update.is_empty());
    }

    #[tokio::test]
    async fn pivot_is_idempotent() {
        let h = harness(Arc::new(InMemoryDocumentStore::new())).await;
        let body = grant("O7", &["A"], &[]);
        h.store.create_by_object(&body).await.unwrap();
        let again = h.store.create_by_object(&body).await.unwrap();

        assert_eq!(again.schema.document_ids, vec![oid("O7")]);
        let a = h.store.acm.get(&subject("A")).await.unwrap().unwrap();
        assert_eq!(a.access_control.read, vec![oid("O7")]);
    }

    #[tokio::test]
    async fn new_member_of_existing_class_inherits_template() {
        let h = harness(Arc::new(InMemoryDocumentStore::new())).await;
        h.store.create_by_object(&grant("O1", &[], &["U1"])).await.unwrap();
        h.store
            .schemas
            .mutate_role_template(
                "Widget",
                AccessKind::Update,
                SetOp::Push,
                &["Editors".to_string()],
            )
            .await
            .unwrap();

        h.store.create_by_object(&grant("O2", &[], &[])).await.unwrap();

        let editors = h.store.acm.get(&subject("Editors")).await.unwrap().unwrap();
        assert_eq!(editors.access_control.update, vec![oid("O1"), oid("O2")]);
    }

    #[tokio::test]
    async fn template_role_listed_under_other_action_keeps_template_action() {
        let h = harness(Arc::new(InMemoryDocumentStore::new())).await;
        h.store.create_by_object(&grant("O1", &[], &["A"])).await.unwrap();

        let outcome = h.store.create_by_object(&grant("O2", &["A"], &[])).await.unwrap();

        assert_eq!(outcome.subjects, vec![subject("A")]);
        let a = h.store.acm.get(&subject("A")).await.unwrap().unwrap();
        assert_eq!(a.access_control.read, vec![oid("O2")]);
        assert_eq!(a.access_control.update, vec![oid("O1"), oid("O2")]);
    }

    #[tokio::test]
    async fn editors_scenarios_through_the_engine() {
        let h = harness(Arc::new(InMemoryDocumentStore::new())).await;

        assert_eq!(
            h.decide("U1", "/widgets", "PUT", None).await,
            Decision::Granted(warden_auth::GrantReason::SubjectRoute)
        );
        assert_eq!(
            h.decide("U1", "/widgets", "PUT", Some("O1")).await,
            Decision::Denied(DenialReason::ObjectNotGranted)
        );

        h.store
            .acm
            .grant(&subject("U1"), AccessKind::Update, &[oid("O1")])
            .await
            .unwrap();
        assert!(h.decide("U1", "/widgets/", "put", Some("O1")).await.is_granted());
        assert_eq!(
            h.decide("U1", "/widgets", "DELETE", None).await,
            Decision::Denied(DenialReason::RouteNotGranted)
        );
    }

    #[tokio::test]
    async fn first_contact_provisions_acm_record() {
        let h = harness(Arc::new(InMemoryDocumentStore::new())).await;
        h.decide("U9", "/widgets", "GET", None).await;
        assert!(h.store.acm.get(&subject("U9")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn store_outage_is_a_denial() {
        let backend = Arc::new(FaultyStore::new());
        let h = harness(backend.clone()).await;
        backend.set_unavailable();

        let decision = h.decide("U1", "/widgets", "PUT", None).await;
        assert!(matches!(
            decision,
            Decision::Denied(DenialReason::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn partial_pivot_still_registers_object() {
        let backend = Arc::new(FaultyStore::new());
        let h = harness(backend.clone()).await;
        backend.fail_updates_where("acm", "subject", "B");

        let err = h
            .store
            .create_by_object(&grant("O7", &["A", "B"], &[]))
            .await
            .unwrap_err();
        match err {
            RegistryError::PartialPropagation { succeeded, failed } => {
                assert_eq!(succeeded, vec![subject("A")]);
                assert_eq!(failed[0].subject, subject("B"));
            }
            other => panic!("expected partial propagation, got {other:?}"),
        }
        let schema = h.store.schemas.get("Widget").await.unwrap().unwrap();
        assert_eq!(schema.document_ids, vec![oid("O7")]);
    }

    #[tokio::test]
    async fn failed_template_role_is_reported_once() {
        let backend = Arc::new(FaultyStore::new());
        let h = harness(backend.clone()).await;
        h.store.create_by_object(&grant("O1", &[], &["A"])).await.unwrap();
        backend.fail_updates_where("acm", "subject", "A");

        let err = h
            .store
            .create_by_object(&grant("O2", &["A", "B"], &[]))
            .await
            .unwrap_err();
        match err {
            RegistryError::PartialPropagation { succeeded, failed } => {
                assert_eq!(succeeded, vec![subject("B")]);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].subject, subject("A"));
            }
            other => panic!("expected partial propagation, got {other:?}"),
        }
        let schema = h.store.schemas.get("Widget").await.unwrap().unwrap();
        assert_eq!(schema.document_ids, vec![oid("O1"), oid("O2")]);
    }
}
