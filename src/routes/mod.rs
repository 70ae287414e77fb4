pub mod auth;
pub mod upload;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API.
/// Signup and login only exist when authentication is configured.
pub fn build_routes(auth_enabled: bool) -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/health", get(health))
        .merge(upload::routes());

    if auth_enabled {
        router.merge(auth::routes())
    } else {
        router
    }
}

async fn health() -> &'static str {
    "ok"
}
