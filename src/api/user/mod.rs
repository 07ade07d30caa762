pub mod orders;
pub mod payment;
pub mod profile;
pub mod reviews;

use axum::{middleware::from_fn_with_state, Router};

use crate::entities::user::Role;
use crate::middleware::auth::{auth_middleware, AuthState};
use crate::AppState;
use orders::orders_router;
use payment::payment_router;
use profile::profile_router;
use reviews::user_reviews_router;

pub fn user_api_router(state: AppState) -> Router {
    Router::new()
        .merge(profile_router())
        .merge(orders_router())
        .merge(payment_router())
        .merge(user_reviews_router())
        .layer(from_fn_with_state(
            AuthState {
                app: state,
                role: Role::User,
            },
            auth_middleware,
        ))
}
