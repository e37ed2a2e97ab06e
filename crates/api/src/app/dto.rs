use axum::extract::rejection::JsonRejection;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use warden_auth::{AccessControl, AccessKind};
use warden_core::{ObjectId, SetOp};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub subject_id: Option<String>,
}

/// Fields are optional so that a missing one is reported as 400, not as a
/// deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    pub route: Option<String>,
    pub method: Option<String>,
    pub token: Option<String>,
    pub object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaParams {
    pub schema_name: Option<String>,
    pub target: Option<String>,
    pub operation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcmParams {
    pub subject: Option<String>,
    pub target: Option<String>,
    pub operation: Option<String>,
    pub create_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleParams {
    pub target: Option<String>,
    pub operation: Option<String>,
}

/// Body of `POST /acm?createBy=subject`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGrantRequest {
    pub subject: String,
    #[serde(default)]
    pub access_control: AccessControl<ObjectId>,
}

/// Which list of a role `PUT /role/:name` edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTarget {
    Members,
    AccessRoutes,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn required<'a>(
    value: &'a Option<String>,
    name: &str,
) -> Result<&'a str, axum::response::Response> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(errors::bad_request(format!("{name} is required"))),
    }
}

pub fn parse_access_target(value: &Option<String>) -> Result<AccessKind, axum::response::Response> {
    let raw = required(value, "target")?;
    AccessKind::from_target(raw).map_err(|e| errors::bad_request(e.to_string()))
}

pub fn parse_operation(value: &Option<String>) -> Result<SetOp, axum::response::Response> {
    let raw = required(value, "operation")?;
    raw.parse::<SetOp>()
        .map_err(|_| errors::bad_request("operation must be one of: push, pull"))
}

pub fn parse_role_target(value: &Option<String>) -> Result<RoleTarget, axum::response::Response> {
    match required(value, "target")? {
        "members" => Ok(RoleTarget::Members),
        "accessRoutes" => Ok(RoleTarget::AccessRoutes),
        _ => Err(errors::bad_request("target must be one of: members, accessRoutes")),
    }
}

/// Unwrap an extracted JSON body, mapping every rejection to 400.
pub fn body<T>(
    payload: Result<axum::Json<T>, JsonRejection>,
) -> Result<T, axum::response::Response> {
    payload
        .map(|axum::Json(v)| v)
        .map_err(|e| errors::bad_request(e.body_text()))
}

/// Decode a JSON value into `T`, mapping failures to 400.
pub fn decode<T: DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, axum::response::Response> {
    serde_json::from_value(value).map_err(|e| errors::bad_request(e.to_string()))
}
