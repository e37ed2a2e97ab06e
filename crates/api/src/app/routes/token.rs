//! Token issuance and the authorization decision endpoint.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use serde_json::json;

use warden_auth::{AccessRequest, RouteKey};
use warden_core::{ObjectId, SubjectId};

use crate::app::dto::{self, IssueTokenRequest, ValidateTokenRequest};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/token", post(issue_token))
        .route("/token/validate", post(validate_token))
}

/// POST /token - sign a token for `subjectId`
pub async fn issue_token(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IssueTokenRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match dto::required(&body.subject_id, "subjectId").and_then(|raw| {
        SubjectId::new(raw).map_err(|e| errors::bad_request(e.to_string()))
    }) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.tokens.issue(&subject, Utc::now()) {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "token signing failed");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "token_error", e.to_string())
        }
    }
}

/// POST /token/validate - decide one access request
pub async fn validate_token(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<ValidateTokenRequest>, JsonRejection>,
) -> axum::response::Response {
    let request = match dto::body(payload).and_then(|body| access_request(&body)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let decision = services.engine.authorize(&request).await;
    if decision.is_granted() {
        (StatusCode::OK, Json(json!({ "message": "Access Granted" }))).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Access Denied" }))).into_response()
    }
}

fn access_request(body: &ValidateTokenRequest) -> Result<AccessRequest, axum::response::Response> {
    let route = dto::required(&body.route, "route")?;
    let method = dto::required(&body.method, "method")?;
    let token = dto::required(&body.token, "token")?;
    let route = RouteKey::new(route, method).map_err(|e| errors::bad_request(e.to_string()))?;
    let object_id = match body.object_id.as_deref() {
        Some(raw) => Some(ObjectId::new(raw).map_err(|e| errors::bad_request(e.to_string()))?),
        None => None,
    };

    Ok(AccessRequest {
        route,
        token: token.to_string(),
        object_id,
    })
}
