pub mod accounts;
pub mod cart;
pub mod category;
pub mod product;
pub mod reviews;

use axum::Router;

use crate::AppState;
use accounts::accounts_router;
use cart::cart_router;
use category::category_router;
use product::product_router;
use reviews::reviews_router;

pub fn public_api_router(state: AppState) -> Router {
    Router::new()
        .merge(accounts_router())
        .merge(category_router())
        .merge(product_router())
        .merge(reviews_router())
        .merge(cart_router(state))
}
