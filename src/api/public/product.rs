use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};

use crate::middleware::logging::{error_response, ok_response};
use crate::services::catalog::{self, ProductQuery};
use crate::AppState;

pub fn product_router() -> Router {
    Router::new()
        .route("/products", get(get_products))
        .route("/products/:key", get(get_product))
}

async fn get_products(
    Query(params): Query<ProductQuery>,
    Extension(state): Extension<AppState>,
) -> Response {
    match catalog::list_products(&*state.db, state.config.page_size, &params).await {
        Ok(page) => ok_response(StatusCode::OK, Json(page)),
        Err(err) => error_response(err),
    }
}

/// `key` is a numeric id or a slug.
async fn get_product(
    Path(key): Path<String>,
    Extension(state): Extension<AppState>,
) -> Response {
    match catalog::get_product(&*state.db, &key).await {
        Ok(product) => ok_response(StatusCode::OK, Json(product)),
        Err(err) => error_response(err),
    }
}
