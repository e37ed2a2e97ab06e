//! Role authoring: members and `(route, method)` pairs.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};

use warden_auth::{RoleRecord, RouteKey};
use warden_core::SubjectId;

use crate::app::dto::{self, RoleParams, RoleTarget};
use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/role", get(list_roles).post(create_role))
        .route("/role/:name", get(get_role).put(mutate_role).delete(delete_role))
}

/// GET /role
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.permissions.roles.list().await {
        Ok(all) => (StatusCode::OK, Json(all)).into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// POST /role - body is a role record; members and routes are optional
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RoleRecord>, JsonRejection>,
) -> axum::response::Response {
    let role = match dto::body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.permissions.roles.create(role).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// GET /role/:name
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match services.permissions.roles.get(&name).await {
        Ok(Some(role)) => (StatusCode::OK, Json(role)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("role '{name}' not found"),
        ),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// DELETE /role/:name
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match services.permissions.roles.delete(&name).await {
        Ok(true) => {
            (StatusCode::OK, Json(json!({ "name": name, "deleted": true }))).into_response()
        }
        Ok(false) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("role '{name}' not found"),
        ),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// PUT /role/:name?target=members|accessRoutes&operation=push|pull
///
/// Body: subject ids for `members`, `{route, method}` pairs for `accessRoutes`.
pub async fn mutate_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
    Query(params): Query<RoleParams>,
    payload: Result<Json<Value>, JsonRejection>,
) -> axum::response::Response {
    let target = match dto::parse_role_target(&params.target) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let op = match dto::parse_operation(&params.operation) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let roles = &services.permissions.roles;
    let result = match target {
        RoleTarget::Members => match dto::decode::<Vec<SubjectId>>(body) {
            Ok(subjects) => roles.mutate_members(&name, op, &subjects).await,
            Err(resp) => return resp,
        },
        RoleTarget::AccessRoutes => match dto::decode::<Vec<RouteKey>>(body) {
            Ok(routes) => roles.mutate_routes(&name, op, &routes).await,
            Err(resp) => return resp,
        },
    };

    match result {
        Ok(role) => (StatusCode::OK, Json(role)).into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}
