use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::middleware::auth::Claims;
use crate::middleware::logging::{error_response, ok_response};
use crate::services::orders::{self, ShippingDetails};
use crate::AppState;

//ROUTERS
pub fn orders_router() -> Router {
    Router::new()
        .route("/orders", get(get_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/refund", post(refund_order))
}

//ROUTES
async fn get_orders(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match orders::list_orders(&*state.db, claims.user_id).await {
        Ok(list) => ok_response(StatusCode::OK, Json(list)),
        Err(err) => error_response(err),
    }
}

async fn get_order(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match orders::get_order(&*state.db, claims.user_id, id).await {
        Ok(order) => ok_response(StatusCode::OK, Json(order)),
        Err(err) => error_response(err),
    }
}

async fn create_order(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ShippingDetails>,
) -> Response {
    match orders::checkout(&state.db, &state.config, claims.user_id, payload).await {
        Ok(order) => ok_response(StatusCode::CREATED, Json(order)),
        Err(err) => error_response(err),
    }
}

async fn cancel_order(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Option<Json<ReasonPayload>>,
) -> Response {
    let reason = payload.and_then(|Json(p)| p.reason);
    match orders::cancel(&state.db, claims.user_id, id, reason).await {
        Ok((order, message)) => ok_response(
            StatusCode::OK,
            Json(json!({
                "message": message,
                "order": order
            })),
        ),
        Err(err) => error_response(err),
    }
}

async fn refund_order(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Option<Json<ReasonPayload>>,
) -> Response {
    let reason = payload.and_then(|Json(p)| p.reason).unwrap_or_default();
    match orders::request_refund(&state.db, claims.user_id, id, &reason).await {
        Ok(order) => ok_response(
            StatusCode::OK,
            Json(json!({
                "message": "Refund request submitted successfully. Our team will process it within 5-7 business days.",
                "order": order
            })),
        ),
        Err(err) => error_response(err),
    }
}

//Structs
#[derive(Deserialize)]
struct ReasonPayload {
    reason: Option<String>,
}
