use axum::{
    extract::{MatchedPath, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use warden_auth::{AccessRequest, AuthorizationEngine, RouteKey};

/// Runs administrative requests through the decision engine.
///
/// The route is the matched route template (e.g. `/role/:name`), so one role
/// entry covers every concrete name.
pub async fn admin_guard(
    State(engine): State<AuthorizationEngine>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return denied();
    };

    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let Ok(route) = RouteKey::new(&path, req.method().as_str()) else {
        return denied();
    };

    let decision = engine
        .authorize(&AccessRequest {
            route,
            token: token.to_string(),
            object_id: None,
        })
        .await;
    if !decision.is_granted() {
        return denied();
    }

    next.run(req).await
}

fn denied() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({ "message": "Access Denied" })),
    )
        .into_response()
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer  "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer t0k"));
        assert_eq!(extract_bearer(&headers), Some("t0k"));
    }
}
