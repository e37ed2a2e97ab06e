//! Decision audit trail.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use warden_core::{ObjectId, SubjectId};

use crate::authorize::Decision;

/// One record per terminal authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    /// Absent when the token could not be verified.
    pub subject: Option<SubjectId>,
    pub route: String,
    pub method: String,
    pub object_id: Option<ObjectId>,
    pub granted: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn decision(&self) -> &'static str {
        if self.granted { "granted" } else { "denied" }
    }

    pub(crate) fn from_decision(
        subject: Option<SubjectId>,
        route: &crate::RouteKey,
        object_id: Option<ObjectId>,
        decision: &Decision,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            subject,
            route: route.route().to_string(),
            method: route.method().to_string(),
            object_id,
            granted: decision.is_granted(),
            reason: decision.reason(),
            timestamp,
        }
    }
}

/// Receives audit records. Recording is a side effect and must never fail the
/// decision it describes.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits one structured event per decision on the `warden::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        tracing::info!(
            target: "warden::audit",
            audit_id = %record.id,
            subject = record.subject.as_ref().map(|s| s.as_str()).unwrap_or("-"),
            route = %record.route,
            method = %record.method,
            object_id = record.object_id.as_ref().map(|o| o.as_str()).unwrap_or("-"),
            decision = record.decision(),
            reason = %record.reason,
            timestamp = %record.timestamp.to_rfc3339(),
            "authorization decision"
        );
    }
}

/// Keeps records in memory (tests and local inspection).
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    inner: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Ok(mut records) = self.inner.lock() {
            records.push(record.clone());
        }
    }
}
