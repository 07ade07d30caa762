use axum::{
    extract::Extension, http::StatusCode, response::Response, routing::post, Json, Router,
};

use crate::middleware::auth::Claims;
use crate::middleware::logging::{error_response, ok_response};
use crate::services::reviews::{self, NewReview};
use crate::AppState;

pub fn user_reviews_router() -> Router {
    Router::new().route("/reviews", post(create_review))
}

async fn create_review(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewReview>,
) -> Response {
    match reviews::add_review(&state.db, claims.user_id, payload).await {
        Ok(review) => ok_response(StatusCode::CREATED, Json(review)),
        Err(err) => error_response(err),
    }
}
