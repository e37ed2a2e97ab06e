//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store backend selection and registry/engine wiring
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and query/body parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> anyhow::Result<Router> {
    if config.uses_dev_secret() {
        tracing::warn!("WARDEN_JWT_SECRET not set; using insecure dev default");
    }

    let services = services::build_services(&config).await?;
    let engine = services.engine.clone();

    let mut admin = routes::admin_router();
    if config.guard_admin {
        admin = admin.layer(axum::middleware::from_fn_with_state(
            engine,
            middleware::admin_guard,
        ));
    } else {
        tracing::warn!("administrative routes are not guarded (WARDEN_GUARD_ADMIN=false)");
    }

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::token::router())
        .merge(admin)
        .layer(Extension(Arc::new(services)))
        .layer(ServiceBuilder::new()))
}
