use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};

use crate::middleware::logging::{error_response, ok_response};
use crate::services::catalog;
use crate::AppState;

pub fn category_router() -> Router {
    Router::new()
        .route("/categories", get(get_categories))
        .route("/categories/:slug", get(get_category))
}

async fn get_categories(Extension(state): Extension<AppState>) -> Response {
    match catalog::list_categories(&*state.db).await {
        Ok(categories) => ok_response(StatusCode::OK, Json(categories)),
        Err(err) => error_response(err),
    }
}

async fn get_category(
    Path(slug): Path<String>,
    Extension(state): Extension<AppState>,
) -> Response {
    match catalog::get_category(&*state.db, &slug).await {
        Ok(category) => ok_response(StatusCode::OK, Json(category)),
        Err(err) => error_response(err),
    }
}
