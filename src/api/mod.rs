pub mod admin;
pub mod public;
pub mod user;

use axum::{middleware::from_fn, Extension, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::logging::logging_middleware;
use crate::AppState;
use admin::admin_api_router;
use public::public_api_router;
use user::user_api_router;

pub fn create_api_router(state: AppState) -> Router {
    let api = public_api_router(state.clone()).merge(user_api_router(state.clone()));

    Router::new()
        .nest("/api", api)
        .nest("/api/admin", admin_api_router(state.clone()))
        .layer(from_fn(logging_middleware))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}
