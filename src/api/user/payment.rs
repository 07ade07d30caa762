use axum::{
    extract::Extension,
    http::StatusCode,
    response::Response,
    routing::post,
    Json, Router,
};
use sea_orm::EntityTrait;
use serde_json::json;

use crate::entities::user;
use crate::error::ServiceError;
use crate::middleware::auth::Claims;
use crate::middleware::logging::{error_response, ok_response};
use crate::services::payment::{self, VerifyPayment};
use crate::AppState;

pub fn payment_router() -> Router {
    Router::new()
        .route("/payment/create-order", post(create_gateway_order))
        .route("/payment/verify", post(verify_payment))
}

async fn create_gateway_order(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let email = match user::Entity::find_by_id(claims.user_id).one(&*state.db).await {
        Ok(Some(user)) => user.email,
        Ok(None) => return error_response(ServiceError::Unauthorized("Invalid user".into())),
        Err(err) => return error_response(err.into()),
    };
    match payment::create_gateway_order(&state.db, state.gateway.as_ref(), claims.user_id, &email)
        .await
    {
        Ok(checkout) => ok_response(StatusCode::CREATED, Json(checkout)),
        Err(err) => error_response(err),
    }
}

async fn verify_payment(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerifyPayment>,
) -> Response {
    match payment::verify_and_finalize(
        &state.db,
        &state.config,
        state.gateway.as_ref(),
        claims.user_id,
        payload,
    )
    .await
    {
        Ok(order) => ok_response(
            StatusCode::CREATED,
            Json(json!({
                "message": "Payment verified and order created successfully",
                "order_number": order.order.order_number,
                "order_id": order.order.id,
                "total_amount": order.order.total_amount,
                "payment_id": order.order.gateway_payment_id,
                "order": order
            })),
        ),
        Err(err) => error_response(err),
    }
}
