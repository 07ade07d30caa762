use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::middleware::logging::{error_response, ok_response};
use crate::services::reviews;
use crate::AppState;

pub fn reviews_router() -> Router {
    Router::new().route("/reviews", get(get_reviews))
}

async fn get_reviews(
    Query(params): Query<ReviewsQuery>,
    Extension(state): Extension<AppState>,
) -> Response {
    match reviews::list_reviews(&*state.db, params.product_id).await {
        Ok(list) => ok_response(StatusCode::OK, Json(list)),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct ReviewsQuery {
    product_id: Option<i32>,
}
