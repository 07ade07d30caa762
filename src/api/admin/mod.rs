pub mod category;
pub mod orders;
pub mod product;

use axum::{middleware::from_fn_with_state, Router};

use crate::entities::user::Role;
use crate::middleware::auth::{auth_middleware, AuthState};
use crate::AppState;
use category::admin_category_router;
use orders::admin_orders_router;
use product::admin_product_router;

pub fn admin_api_router(state: AppState) -> Router {
    Router::new()
        .merge(admin_category_router())
        .merge(admin_product_router())
        .merge(admin_orders_router())
        .layer(from_fn_with_state(
            AuthState {
                app: state,
                role: Role::Admin,
            },
            auth_middleware,
        ))
}
