use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Response,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::ServiceError;
use crate::middleware::auth::cart_owner_middleware;
use crate::middleware::logging::{error_response, ok_response};
use crate::services::cart::{self, AddItem, CartOwner, UpdateItem};
use crate::AppState;

//ROUTERS
/// Carts work for guests too: the owner is the bearer token's user when one
/// is sent, otherwise the `x-cart-session` token.
pub fn cart_router(state: AppState) -> Router {
    Router::new()
        .route("/cart/current", get(get_cart))
        .route("/cart/add_item", post(add_item))
        .route("/cart/update_item", patch(update_item))
        .route("/cart/remove_item", delete(remove_item))
        .route("/cart/clear", delete(clear_cart))
        .layer(from_fn_with_state(state, cart_owner_middleware))
}

//ROUTES
async fn get_cart(
    Extension(state): Extension<AppState>,
    Extension(owner): Extension<CartOwner>,
) -> Response {
    match cart::current(&*state.db, &owner).await {
        Ok(view) => ok_response(StatusCode::OK, Json(view)),
        Err(err) => error_response(err),
    }
}

async fn add_item(
    Extension(state): Extension<AppState>,
    Extension(owner): Extension<CartOwner>,
    Json(payload): Json<AddItem>,
) -> Response {
    match cart::add_item(&*state.db, &state.config, &owner, payload).await {
        Ok(outcome) if outcome.debounced => ok_response(
            StatusCode::OK,
            Json(json!({
                "message": "Item already in cart",
                "cart": outcome.cart
            })),
        ),
        Ok(outcome) => ok_response(
            StatusCode::CREATED,
            Json(json!({
                "message": "Item added to cart successfully",
                "cart": outcome.cart
            })),
        ),
        Err(err) => error_response(err),
    }
}

async fn update_item(
    Extension(state): Extension<AppState>,
    Extension(owner): Extension<CartOwner>,
    Json(payload): Json<UpdateItem>,
) -> Response {
    match cart::update_item(&*state.db, &owner, payload).await {
        Ok(view) => ok_response(
            StatusCode::OK,
            Json(json!({
                "message": "Cart updated successfully",
                "cart": view
            })),
        ),
        Err(err) => error_response(err),
    }
}

async fn remove_item(
    Query(params): Query<RemoveItemQuery>,
    Extension(state): Extension<AppState>,
    Extension(owner): Extension<CartOwner>,
) -> Response {
    let Some(item_id) = params.item_id else {
        return error_response(ServiceError::validation("item_id parameter is required"));
    };
    match cart::remove_item(&*state.db, &owner, item_id).await {
        Ok(view) => ok_response(
            StatusCode::OK,
            Json(json!({
                "message": "Item removed from cart",
                "cart": view
            })),
        ),
        Err(err) => error_response(err),
    }
}

async fn clear_cart(
    Extension(state): Extension<AppState>,
    Extension(owner): Extension<CartOwner>,
) -> Response {
    match cart::clear(&*state.db, &owner).await {
        Ok((view, removed)) => ok_response(
            StatusCode::OK,
            Json(json!({
                "message": format!("Cart cleared successfully. Removed {removed} items."),
                "cart": view
            })),
        ),
        Err(err) => error_response(err),
    }
}

//Structs
#[derive(Deserialize)]
struct RemoveItemQuery {
    item_id: Option<i32>,
}
