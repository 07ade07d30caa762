use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{patch, post},
    Json, Router,
};

use crate::middleware::logging::{error_response, ok_response};
use crate::services::catalog::{self, NewProduct, ProductPatch};
use crate::AppState;

pub fn admin_product_router() -> Router {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", patch(patch_product))
}

async fn create_product(
    Extension(state): Extension<AppState>,
    Json(payload): Json<NewProduct>,
) -> Response {
    match catalog::create_product(&*state.db, payload).await {
        Ok(product) => ok_response(StatusCode::CREATED, Json(product)),
        Err(err) => error_response(err),
    }
}

async fn patch_product(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Json(payload): Json<ProductPatch>,
) -> Response {
    match catalog::update_product(&*state.db, id, payload).await {
        Ok(product) => ok_response(StatusCode::OK, Json(product)),
        Err(err) => error_response(err),
    }
}
