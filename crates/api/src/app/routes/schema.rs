//! Class-level permission templates.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::dto::{self, SchemaParams};
use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/schema", get(get_schema).put(mutate_schema))
}

/// GET /schema?schemaName= - one record, or every record when omitted
pub async fn get_schema(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<SchemaParams>,
) -> axum::response::Response {
    let schemas = &services.permissions.schemas;
    match params.schema_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => match schemas.get(name).await {
            Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
            Ok(None) => errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("schema '{name}' not found"),
            ),
            Err(e) => errors::registry_error_to_response(e),
        },
        None => match schemas.list().await {
            Ok(all) => (StatusCode::OK, Json(all)).into_response(),
            Err(e) => errors::registry_error_to_response(e),
        },
    }
}

/// PUT /schema?schemaName=&target=accessControl.<action>&operation=push|pull
///
/// Body: role names. Edits the template and propagates to each role's ACM record.
pub async fn mutate_schema(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<SchemaParams>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> axum::response::Response {
    let schema_name = match dto::required(&params.schema_name, "schemaName") {
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
    let role_names = match dto::body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .permissions
        .schemas
        .mutate_role_template(schema_name, kind, op, &role_names)
        .await
    {
        Ok(mutation) => (StatusCode::OK, Json(mutation)).into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}
