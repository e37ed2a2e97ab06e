use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use warden_infra::{RegistryError, StoreError};

pub fn registry_error_to_response(err: RegistryError) -> axum::response::Response {
    match err {
        RegistryError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        RegistryError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        RegistryError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        err @ RegistryError::NoMatchingRoles(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "no_matching_roles", err.to_string())
        }
        RegistryError::PartialPropagation { succeeded, failed } => {
            let message = format!(
                "propagation partially failed: {} succeeded, {} failed",
                succeeded.len(),
                failed.len()
            );
            (
                StatusCode::BAD_GATEWAY,
                axum::Json(json!({
                    "error": "partial_propagation_failure",
                    "message": message,
                    "succeeded": succeeded,
                    "failed": failed,
                })),
            )
                .into_response()
        }
        RegistryError::Store(StoreError::Duplicate { collection, field }) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("duplicate {field} in {collection}"),
        ),
        RegistryError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}
