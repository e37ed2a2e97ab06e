//! Per-subject access control matrix records.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};

use warden_core::{ObjectId, SetOp, SubjectId};
use warden_infra::{AcmRecord, ObjectGrant};

use crate::app::dto::{self, AcmParams, SubjectGrantRequest};
use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route(
        "/acm",
        get(get_acm).put(mutate_acm).post(create_acm).delete(delete_acm),
    )
}

fn subject_param(params: &AcmParams) -> Result<SubjectId, axum::response::Response> {
    let raw = dto::required(&params.subject, "subject")?;
    SubjectId::new(raw).map_err(|e| errors::bad_request(e.to_string()))
}

/// GET /acm?subject= - one record, or every record when omitted
pub async fn get_acm(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<AcmParams>,
) -> axum::response::Response {
    let acm = &services.permissions.acm;
    if params.subject.is_none() {
        return match acm.list().await {
            Ok(all) => (StatusCode::OK, Json(all)).into_response(),
            Err(e) => errors::registry_error_to_response(e),
        };
    }

    let subject = match subject_param(&params) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match acm.get(&subject).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("acm record for '{subject}' not found"),
        ),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// PUT /acm?subject=&target=accessControl.<action>&operation=push|pull
///
/// Body: object ids.
pub async fn mutate_acm(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<AcmParams>,
    payload: Result<Json<Vec<ObjectId>>, JsonRejection>,
) -> axum::response::Response {
    let subject = match subject_param(&params) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match dto::parse_access_target(&params.target) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let op = match dto::parse_operation(&params.operation) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ids = match dto::body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let acm = &services.permissions.acm;
    if let Err(e) = acm.apply(&subject, kind, op, &ids).await {
        return errors::registry_error_to_response(e);
    }

    match acm.get(&subject).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        // Revoke on a subject that never had a record.
        Ok(None) if op == SetOp::Pull => {
            (StatusCode::OK, Json(AcmRecord::empty(subject))).into_response()
        }
        Ok(None) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            "acm record vanished after grant",
        ),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// POST /acm?createBy=object|subject
pub async fn create_acm(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<AcmParams>,
    payload: Result<Json<Value>, JsonRejection>,
) -> axum::response::Response {
    let create_by = match dto::required(&params.create_by, "createBy") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let body = match dto::body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match create_by.as_str() {
        "object" => {
            let grant: ObjectGrant = match dto::decode(body) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            match services.permissions.create_by_object(&grant).await {
                Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
                Err(e) => errors::registry_error_to_response(e),
            }
        }
        "subject" => {
            let request: SubjectGrantRequest = match dto::decode(body) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            let subject = match SubjectId::new(request.subject) {
                Ok(v) => v,
                Err(e) => return errors::bad_request(e.to_string()),
            };
            let acm = &services.permissions.acm;
            if let Err(e) = acm.grant_all(&subject, &request.access_control).await {
                return errors::registry_error_to_response(e);
            }
            match acm.get(&subject).await {
                Ok(record) => {
                    let record = record.unwrap_or_else(|| AcmRecord::empty(subject));
                    (StatusCode::CREATED, Json(record)).into_response()
                }
                Err(e) => errors::registry_error_to_response(e),
            }
        }
        _ => errors::bad_request("createBy must be one of: object, subject"),
    }
}

/// DELETE /acm?subject=
pub async fn delete_acm(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<AcmParams>,
) -> axum::response::Response {
    let subject = match subject_param(&params) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.permissions.acm.delete(&subject).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "subject": subject, "deleted": true })),
        )
            .into_response(),
        Ok(false) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("acm record for '{subject}' not found"),
        ),
        Err(e) => errors::registry_error_to_response(e),
    }
}
