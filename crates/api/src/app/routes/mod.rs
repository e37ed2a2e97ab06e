use axum::Router;

pub mod acm;
pub mod role;
pub mod schema;
pub mod system;
pub mod token;

/// Router for the administrative surface (optionally guarded).
pub fn admin_router() -> Router {
    Router::new()
        .merge(schema::router())
        .merge(acm::router())
        .merge(role::router())
}
