use axum::{
    extract::Extension, http::StatusCode, response::Response, routing::post, Json, Router,
};

use crate::middleware::logging::{error_response, ok_response};
use crate::services::catalog::{self, NewCategory};
use crate::AppState;

pub fn admin_category_router() -> Router {
    Router::new().route("/categories", post(create_category))
}

async fn create_category(
    Extension(state): Extension<AppState>,
    Json(payload): Json<NewCategory>,
) -> Response {
    match catalog::create_category(&*state.db, payload).await {
        Ok(category) => ok_response(StatusCode::CREATED, Json(category)),
        Err(err) => error_response(err),
    }
}
