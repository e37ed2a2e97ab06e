use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_core::{ObjectId, SubjectId};

use crate::audit::{AuditRecord, AuditSink};
use crate::permissions::Action;
use crate::roles::RouteKey;
use crate::token::{TokenError, TokenVerifier};

/// Failure of the permission lookups backing the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("permission source unavailable: {0}")]
    Unavailable(String),
}

/// Route, object and subject lookups the engine needs.
///
/// Storage lives outside this crate:
/// `warden-infra` provides the store-backed implementation.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Does the `any` role list this route?
    async fn is_route_open_to_any(&self, route: &RouteKey) -> Result<bool, SourceError>;

    /// Does some role (other than `any`) with `subject` as member list this route?
    async fn is_route_granted_to_subject(
        &self,
        subject: &SubjectId,
        route: &RouteKey,
    ) -> Result<bool, SourceError>;

    /// First-contact provisioning of the subject's record.
    async fn ensure_subject(&self, subject: &SubjectId) -> Result<(), SourceError>;

    /// Object-level membership test. `Action::Create` is always false.
    async fn is_object_allowed(
        &self,
        subject: &SubjectId,
        action: Action,
        object: &ObjectId,
    ) -> Result<bool, SourceError>;
}

/// Input of a single authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub route: RouteKey,
    pub token: String,
    pub object_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    /// `POST` to a route the `any` role lists.
    OpenCreateRoute,
    /// Route open to `any`, no object requested.
    OpenRoute,
    /// Route open to `any` and the object is granted to `any`.
    OpenObject,
    /// Route granted through one of the subject's roles, no object requested.
    SubjectRoute,
    /// Route and object both granted to the subject.
    SubjectObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    InvalidToken(TokenError),
    RouteNotGranted,
    ObjectNotGranted,
    /// Creation is never authorized per object.
    CreateNotObjectScoped,
    /// The method has no object-level action.
    UnsupportedMethod,
    /// A lookup failed; the engine fails closed.
    SourceUnavailable(String),
}

impl From<SourceError> for DenialReason {
    fn from(value: SourceError) -> Self {
        match value {
            SourceError::Unavailable(msg) => DenialReason::SourceUnavailable(msg),
        }
    }
}

/// Terminal outcome of `AuthorizationEngine::authorize`. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted(GrantReason),
    Denied(DenialReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }

    /// Human-readable reason, recorded in the audit trail.
    pub fn reason(&self) -> String {
        match self {
            Decision::Granted(GrantReason::OpenCreateRoute) => "creation route open to any".into(),
            Decision::Granted(GrantReason::OpenRoute) => "route open to any".into(),
            Decision::Granted(GrantReason::OpenObject) => "object open to any".into(),
            Decision::Granted(GrantReason::SubjectRoute) => "route granted by role".into(),
            Decision::Granted(GrantReason::SubjectObject) => "object granted to subject".into(),
            Decision::Denied(DenialReason::InvalidToken(e)) => format!("invalid token: {e}"),
            Decision::Denied(DenialReason::RouteNotGranted) => "route not granted".into(),
            Decision::Denied(DenialReason::ObjectNotGranted) => "object not granted".into(),
            Decision::Denied(DenialReason::CreateNotObjectScoped) => {
                "creation is not object-scoped".into()
            }
            Decision::Denied(DenialReason::UnsupportedMethod) => {
                "method has no object-level action".into()
            }
            Decision::Denied(DenialReason::SourceUnavailable(msg)) => {
                format!("permission source unavailable: {msg}")
            }
        }
    }
}

/// Orchestrates token verification, route-level and object-level checks.
///
/// - Stages run strictly in order; the first denial short-circuits.
/// - Every terminal decision is handed to the audit sink.
/// - Lookup failures deny (fail-closed).
#[derive(Clone)]
pub struct AuthorizationEngine {
    tokens: Arc<dyn TokenVerifier>,
    source: Arc<dyn PermissionSource>,
    audit: Arc<dyn AuditSink>,
}

impl AuthorizationEngine {
    pub fn new(
        tokens: Arc<dyn TokenVerifier>,
        source: Arc<dyn PermissionSource>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { tokens, source, audit }
    }

    pub async fn authorize(&self, request: &AccessRequest) -> Decision {
        self.authorize_at(request, Utc::now()).await
    }

    /// Decide with an explicit clock (token expiry is evaluated against `now`).
    pub async fn authorize_at(&self, request: &AccessRequest, now: DateTime<Utc>) -> Decision {
        let mut subject = None;
        let decision = match self.evaluate(request, now, &mut subject).await {
            Ok(grant) => Decision::Granted(grant),
            Err(denial) => Decision::Denied(denial),
        };

        self.audit.record(&AuditRecord::from_decision(
            subject,
            &request.route,
            request.object_id.clone(),
            &decision,
            now,
        ));

        decision
    }

    async fn evaluate(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
        verified: &mut Option<SubjectId>,
    ) -> Result<GrantReason, DenialReason> {
        let route = &request.route;

        let claims = self
            .tokens
            .verify(&request.token, now)
            .map_err(DenialReason::InvalidToken)?;
        let subject = claims.subject_id;
        *verified = Some(subject.clone());

        let is_create = route.method() == "POST";
        let mut open_to_any = None;
        if is_create {
            let open = self.source.is_route_open_to_any(route).await?;
            if open {
                return Ok(GrantReason::OpenCreateRoute);
            }
            open_to_any = Some(open);
        }

        self.source.ensure_subject(&subject).await?;

        let open_to_any = match open_to_any {
            Some(open) => open,
            None => self.source.is_route_open_to_any(route).await?,
        };

        if open_to_any {
            let Some(object) = &request.object_id else {
                return Ok(GrantReason::OpenRoute);
            };
            // A miss for `any` does not preclude the subject's own grant.
            if let Some(action) = Action::for_method(route.method()) {
                if self
                    .source
                    .is_object_allowed(&SubjectId::any(), action, object)
                    .await?
                {
                    return Ok(GrantReason::OpenObject);
                }
            }
        }

        if !self.source.is_route_granted_to_subject(&subject, route).await? {
            return Err(DenialReason::RouteNotGranted);
        }

        let Some(object) = &request.object_id else {
            return Ok(GrantReason::SubjectRoute);
        };

        let action = Action::for_method(route.method()).ok_or(DenialReason::UnsupportedMethod)?;
        if action == Action::Create {
            return Err(DenialReason::CreateNotObjectScoped);
        }

        if self.source.is_object_allowed(&subject, action, object).await? {
            Ok(GrantReason::SubjectObject)
        } else {
            Err(DenialReason::ObjectNotGranted)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::Duration;

    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::token::Hs256TokenService;

    const SECRET: &str = "engine-test-secret";

    /// Static lookup tables standing in for the stores.
    #[derive(Default)]
    struct StaticSource {
        open: HashSet<RouteKey>,
        granted: HashSet<(String, RouteKey)>,
        objects: HashSet<(String, Action, String)>,
        ensured: Mutex<Vec<String>>,
        fail: bool,
    }

    impl StaticSource {
        fn open(mut self, route: &str, method: &str) -> Self {
            self.open.insert(RouteKey::new(route, method).unwrap());
            self
        }

        fn grant_route(mut self, subject: &str, route: &str, method: &str) -> Self {
            self.granted
                .insert((subject.to_string(), RouteKey::new(route, method).unwrap()));
            self
        }

        fn grant_object(mut self, subject: &str, action: Action, object: &str) -> Self {
            self.objects
                .insert((subject.to_string(), action, object.to_string()));
            self
        }

        fn check(&self) -> Result<(), SourceError> {
            if self.fail {
                Err(SourceError::Unavailable("store down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PermissionSource for StaticSource {
        async fn is_route_open_to_any(&self, route: &RouteKey) -> Result<bool, SourceError> {
            self.check()?;
            Ok(self.open.contains(route))
        }

        async fn is_route_granted_to_subject(
            &self,
            subject: &SubjectId,
            route: &RouteKey,
        ) -> Result<bool, SourceError> {
            self.check()?;
            Ok(self
                .granted
                .contains(&(subject.as_str().to_string(), route.clone())))
        }

        async fn ensure_subject(&self, subject: &SubjectId) -> Result<(), SourceError> {
            self.check()?;
            self.ensured.lock().unwrap().push(subject.as_str().to_string());
            Ok(())
        }

        async fn is_object_allowed(
            &self,
            subject: &SubjectId,
            action: Action,
            object: &ObjectId,
        ) -> Result<bool, SourceError> {
            self.check()?;
            if action == Action::Create {
                return Ok(false);
            }
            Ok(self.objects.contains(&(
                subject.as_str().to_string(),
                action,
                object.as_str().to_string(),
            )))
        }
    }

    struct Harness {
        engine: AuthorizationEngine,
        tokens: Arc<Hs256TokenService>,
        audit: Arc<InMemoryAuditSink>,
        source: Arc<StaticSource>,
    }

    fn harness(source: StaticSource) -> Harness {
        let tokens = Arc::new(Hs256TokenService::new(SECRET, Duration::minutes(10)));
        let audit = Arc::new(InMemoryAuditSink::new());
        let source = Arc::new(source);
        let engine = AuthorizationEngine::new(tokens.clone(), source.clone(), audit.clone());
        Harness {
            engine,
            tokens,
            audit,
            source,
        }
    }

    impl Harness {
        fn token(&self, subject: &str) -> String {
            self.tokens
                .issue(&SubjectId::new(subject).unwrap(), Utc::now())
                .unwrap()
                .token
        }

        async fn decide(
            &self,
            subject: &str,
            route: &str,
            method: &str,
            object: Option<&str>,
        ) -> Decision {
            let request = AccessRequest {
                route: RouteKey::new(route, method).unwrap(),
                token: self.token(subject),
                object_id: object.map(|o| ObjectId::new(o).unwrap()),
            };
            self.engine.authorize(&request).await
        }
    }

    fn editors() -> StaticSource {
        StaticSource::default().grant_route("U1", "/widgets", "PUT")
    }

    #[tokio::test]
    async fn role_route_without_object_is_granted() {
        let h = harness(editors());
        assert_eq!(
            h.decide("U1", "/widgets", "PUT", None).await,
            Decision::Granted(GrantReason::SubjectRoute)
        );
    }

    #[tokio::test]
    async fn role_route_with_ungranted_object_is_denied() {
        let h = harness(editors());
        assert_eq!(
            h.decide("U1", "/widgets", "PUT", Some("O7")).await,
            Decision::Denied(DenialReason::ObjectNotGranted)
        );
    }

    #[tokio::test]
    async fn role_route_with_granted_object_is_granted() {
        let h = harness(editors().grant_object("U1", Action::Update, "O7"));
        assert_eq!(
            h.decide("U1", "/widgets/", "put", Some("O7")).await,
            Decision::Granted(GrantReason::SubjectObject)
        );
    }

    #[tokio::test]
    async fn route_outside_every_role_is_denied() {
        let h = harness(editors());
        assert_eq!(
            h.decide("U1", "/widgets", "DELETE", None).await,
            Decision::Denied(DenialReason::RouteNotGranted)
        );
        assert_eq!(
            h.decide("U2", "/widgets", "PUT", None).await,
            Decision::Denied(DenialReason::RouteNotGranted)
        );
    }

    #[tokio::test]
    async fn expired_token_is_denied_even_for_open_create_route() {
        let h = harness(StaticSource::default().open("/public", "POST"));
        let issued_at = Utc::now() - Duration::hours(1);
        let token = h
            .tokens
            .issue(&SubjectId::new("U1").unwrap(), issued_at)
            .unwrap()
            .token;

        let request = AccessRequest {
            route: RouteKey::new("/public", "POST").unwrap(),
            token,
            object_id: None,
        };
        let decision = h.engine.authorize(&request).await;
        assert_eq!(decision, Decision::Denied(DenialReason::InvalidToken(TokenError::Expired)));

        let records = h.audit.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].granted);
        assert!(records[0].subject.is_none());
    }

    #[tokio::test]
    async fn open_create_route_short_circuits_before_provisioning() {
        let h = harness(StaticSource::default().open("/public", "POST"));
        assert_eq!(
            h.decide("U1", "/public", "POST", Some("O1")).await,
            Decision::Granted(GrantReason::OpenCreateRoute)
        );
        assert!(h.source.ensured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_create_route_does_not_open_other_methods() {
        let h = harness(StaticSource::default().open("/public", "POST"));
        assert_eq!(
            h.decide("U1", "/public", "PUT", None).await,
            Decision::Denied(DenialReason::RouteNotGranted)
        );
    }

    #[tokio::test]
    async fn create_with_object_is_denied_at_object_step() {
        let h = harness(
            StaticSource::default()
                .grant_route("U1", "/widgets", "POST")
                .grant_object("U1", Action::Create, "O1")
                .grant_object("U1", Action::Update, "O1"),
        );
        assert_eq!(
            h.decide("U1", "/widgets", "POST", Some("O1")).await,
            Decision::Denied(DenialReason::CreateNotObjectScoped)
        );
    }

    #[tokio::test]
    async fn open_route_without_object_is_granted_and_subject_provisioned() {
        let h = harness(StaticSource::default().open("/status", "GET"));
        assert_eq!(
            h.decide("U9", "/status", "GET", None).await,
            Decision::Granted(GrantReason::OpenRoute)
        );
        assert_eq!(*h.source.ensured.lock().unwrap(), vec!["U9".to_string()]);
    }

    #[tokio::test]
    async fn open_route_object_granted_to_any() {
        let h = harness(
            StaticSource::default()
                .open("/docs", "GET")
                .grant_object("any", Action::Read, "D1"),
        );
        assert_eq!(
            h.decide("U1", "/docs", "GET", Some("D1")).await,
            Decision::Granted(GrantReason::OpenObject)
        );
    }

    #[tokio::test]
    async fn open_route_object_miss_falls_through_to_subject_grant() {
        let h = harness(
            StaticSource::default()
                .open("/docs", "GET")
                .grant_route("U1", "/docs", "GET")
                .grant_object("U1", Action::Read, "D2"),
        );
        assert_eq!(
            h.decide("U1", "/docs", "GET", Some("D2")).await,
            Decision::Granted(GrantReason::SubjectObject)
        );
        assert_eq!(
            h.decide("U2", "/docs", "GET", Some("D2")).await,
            Decision::Denied(DenialReason::RouteNotGranted)
        );
    }

    #[tokio::test]
    async fn unsupported_method_with_object_is_denied() {
        let h = harness(StaticSource::default().grant_route("U1", "/widgets", "OPTIONS"));
        assert_eq!(
            h.decide("U1", "/widgets", "OPTIONS", None).await,
            Decision::Granted(GrantReason::SubjectRoute)
        );
        assert_eq!(
            h.decide("U1", "/widgets", "OPTIONS", Some("O1")).await,
            Decision::Denied(DenialReason::UnsupportedMethod)
        );
    }

    #[tokio::test]
    async fn source_failure_fails_closed() {
        let h = harness(StaticSource {
            fail: true,
            ..editors()
        });
        let decision = h.decide("U1", "/widgets", "PUT", None).await;
        assert!(matches!(decision, Decision::Denied(DenialReason::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn every_decision_is_audited() {
        let h = harness(editors());
        h.decide("U1", "/widgets", "PUT", None).await;
        h.decide("U1", "/widgets", "PUT", Some("O7")).await;

        let records = h.audit.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].granted);
        assert_eq!(records[1].decision(), "denied");
        assert_eq!(records[1].object_id.as_ref().unwrap().as_str(), "O7");
        assert_eq!(records[1].subject.as_ref().unwrap().as_str(), "U1");
        assert_eq!(records[1].method, "PUT");
    }
}
