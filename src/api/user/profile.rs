use axum::{
    extract::Extension,
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::middleware::auth::Claims;
use crate::middleware::logging::{account_error_response, ok_response};
use crate::services::accounts::{self, ProfilePatch};
use crate::AppState;

pub fn profile_router() -> Router {
    Router::new()
        .route("/accounts/profile", get(get_profile).patch(patch_profile))
        .route("/accounts/logout", post(logout))
}

async fn get_profile(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match accounts::profile(&state.db, claims.user_id).await {
        Ok(user) => ok_response(
            StatusCode::OK,
            Json(json!({ "success": true, "user": user })),
        ),
        Err(err) => account_error_response(err),
    }
}

async fn patch_profile(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ProfilePatch>,
) -> Response {
    match accounts::update_profile(&state.db, claims.user_id, payload).await {
        Ok(user) => ok_response(
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Profile updated successfully",
                "user": user
            })),
        ),
        Err(err) => account_error_response(err),
    }
}

async fn logout(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<LogoutRequest>,
) -> Response {
    match accounts::logout(&state.db, &state.config, claims.user_id, &payload.refresh).await {
        Ok(()) => ok_response(
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Logout successful" })),
        ),
        Err(err) => account_error_response(err),
    }
}

#[derive(Deserialize)]
struct LogoutRequest {
    #[serde(default)]
    refresh: String,
}
