use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::middleware::logging::{account_error_response, ok_response};
use crate::services::accounts::{self, Credentials, PasswordReset, Registration};
use crate::AppState;

//ROUTERS
pub fn accounts_router() -> Router {
    Router::new()
        .route("/accounts/register", post(register))
        .route("/accounts/login", post(login))
        .route("/accounts/google-login", post(google_login))
        .route("/accounts/token/refresh", post(refresh))
        .route("/accounts/forgot-password", post(forgot_password))
        .route("/accounts/reset-password/:uid/:token", post(reset_password))
        .route(
            "/accounts/validate-reset-token/:uid/:token",
            get(validate_reset_token),
        )
}

//ROUTES
async fn register(
    Extension(state): Extension<AppState>,
    Json(payload): Json<Registration>,
) -> Response {
    match accounts::register(&state.db, &state.config, payload).await {
        Ok(session) => ok_response(
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "User registered successfully",
                "user": session.user,
                "tokens": session.tokens
            })),
        ),
        Err(err) => account_error_response(err),
    }
}

async fn login(
    Extension(state): Extension<AppState>,
    Json(payload): Json<Credentials>,
) -> Response {
    match accounts::login(&state.db, &state.config, payload).await {
        Ok(session) => ok_response(
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Login successful",
                "user": session.user,
                "tokens": session.tokens
            })),
        ),
        Err(err) => account_error_response(err),
    }
}

async fn google_login(
    Extension(state): Extension<AppState>,
    Json(payload): Json<GoogleLogin>,
) -> Response {
    match accounts::google_login(&state.db, &state.config, state.identity.as_ref(), &payload.token)
        .await
    {
        Ok(session) => ok_response(
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Google login successful",
                "user": session.user,
                "tokens": session.tokens
            })),
        ),
        Err(err) => account_error_response(err),
    }
}

async fn refresh(
    Extension(state): Extension<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Response {
    match accounts::refresh(&state.db, &state.config, &payload.refresh).await {
        Ok(access) => ok_response(StatusCode::OK, Json(json!({ "access": access }))),
        Err(err) => account_error_response(err),
    }
}

async fn forgot_password(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ForgotPassword>,
) -> Response {
    match accounts::forgot_password(&state.db, &state.config, state.mailer.as_ref(), &payload.email)
        .await
    {
        Ok(()) => ok_response(
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "If an account exists for this email, a reset link has been sent"
            })),
        ),
        Err(err) => account_error_response(err),
    }
}

async fn validate_reset_token(
    Path((uid, token)): Path<(String, String)>,
    Extension(state): Extension<AppState>,
) -> Response {
    match accounts::validate_reset_token(&state.db, &state.config, &uid, &token).await {
        Ok(()) => ok_response(
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Reset link is valid" })),
        ),
        Err(err) => account_error_response(err),
    }
}

async fn reset_password(
    Path((uid, token)): Path<(String, String)>,
    Extension(state): Extension<AppState>,
    Json(payload): Json<PasswordReset>,
) -> Response {
    match accounts::reset_password(&state.db, &state.config, &uid, &token, payload).await {
        Ok(()) => ok_response(
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Password has been reset successfully" })),
        ),
        Err(err) => account_error_response(err),
    }
}

//Structs
#[derive(Deserialize)]
struct GoogleLogin {
    #[serde(default, alias = "credential")]
    token: String,
}

#[derive(Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    refresh: String,
}

#[derive(Deserialize)]
struct ForgotPassword {
    #[serde(default)]
    email: String,
}
