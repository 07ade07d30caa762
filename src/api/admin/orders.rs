use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::entities::order::Status;
use crate::error::ServiceError;
use crate::middleware::logging::{error_response, ok_response};
use crate::services::orders::{self, OrderFilter};
use crate::AppState;

//ROUTERS
pub fn admin_orders_router() -> Router {
    Router::new()
        .route("/orders", get(get_orders))
        .route("/orders/:id/status", post(advance_status))
        .route("/orders/:id/complete-refund", post(complete_refund))
}

//ROUTES
async fn get_orders(
    Query(filter): Query<OrderFilter>,
    Extension(state): Extension<AppState>,
) -> Response {
    match orders::list_all_orders(&*state.db, &filter).await {
        Ok(list) => ok_response(StatusCode::OK, Json(list)),
        Err(err) => error_response(err),
    }
}

async fn advance_status(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Json(payload): Json<StatusChange>,
) -> Response {
    let target: Status = match payload.status.parse() {
        Ok(status) => status,
        Err(message) => return error_response(ServiceError::Validation(message)),
    };
    match orders::advance_status(&state.db, id, target).await {
        Ok(order) => ok_response(StatusCode::OK, Json(order)),
        Err(err) => error_response(err),
    }
}

async fn complete_refund(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    payload: Option<Json<CompleteRefund>>,
) -> Response {
    let execute = payload.map(|Json(p)| p.execute_refund).unwrap_or(false);
    match orders::complete_refund(&state.db, state.gateway.as_ref(), id, execute).await {
        Ok(order) => ok_response(StatusCode::OK, Json(order)),
        Err(err) => error_response(err),
    }
}

//Structs
#[derive(Deserialize)]
struct StatusChange {
    status: String,
}

#[derive(Deserialize)]
struct CompleteRefund {
    #[serde(default)]
    execute_refund: bool,
}
