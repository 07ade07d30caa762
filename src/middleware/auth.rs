use crate::entities::user::{self, Entity as UserEntity, Role};
use crate::services::cart::CartOwner;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;

pub const CART_SESSION_HEADER: &str = "x-cart-session";

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = bearer_token(&req).ok_or_else(|| unauthorized("Authentication required"))?;

    let claims = match validate_token(&state.app, &token, state.role).await {
        Ok(claims) => claims,
        Err(err) => {
            debug!(error = %err, "Rejected bearer token");
            return Err(match err {
                AuthMiddlewareError::InsufficientRole => forbidden("Insufficient permissions"),
                AuthMiddlewareError::InternalServerError => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response(),
                other => unauthorized(&other.to_string()),
            });
        }
    };
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Resolves who owns the cart for this request: the signed-in user when a
/// bearer token is present, otherwise the anonymous session named by the
/// `x-cart-session` header (a fresh one is issued when missing).
pub async fn cart_owner_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let owner = match bearer_token(&req) {
        Some(token) => match validate_token(&state, &token, Role::User).await {
            Ok(claims) => CartOwner::User(claims.user_id),
            Err(err) => {
                debug!(error = %err, "Rejected bearer token on cart request");
                return Err(unauthorized(&err.to_string()));
            }
        },
        None => {
            let session = req
                .headers()
                .get(CART_SESSION_HEADER)
                .and_then(|h| h.to_str().ok())
                .filter(|s| is_valid_session_token(s))
                .map(str::to_owned)
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
            CartOwner::Session(session)
        }
    };

    req.extensions_mut().insert(owner.clone());
    let mut response = next.run(req).await;

    if let CartOwner::Session(session) = owner {
        if let Ok(value) = HeaderValue::from_str(&session) {
            response.headers_mut().insert(CART_SESSION_HEADER, value);
        }
    }
    Ok(response)
}

// Owned so no borrow of the request is held across an await.
fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

fn is_valid_session_token(token: &str) -> bool {
    (8..=64).contains(&token.len())
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub role: String,
    pub kind: TokenKind,
    pub jti: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct AuthState {
    pub app: AppState,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn generate_token(
    config: &AppConfig,
    user_id: i32,
    role: Role,
    kind: TokenKind,
) -> Result<IssuedToken, AuthMiddlewareError> {
    let ttl = match kind {
        TokenKind::Access => config.access_token_ttl,
        TokenKind::Refresh => config.refresh_token_ttl,
    };
    let expires_at = Utc::now()
        .checked_add_signed(ttl)
        .ok_or(AuthMiddlewareError::GenerationFail)?;

    let jti = Uuid::new_v4().to_string();
    let claims = Claims {
        user_id,
        role: role.to_string(),
        kind,
        jti: jti.clone(),
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AuthMiddlewareError::GenerationFail)?;

    Ok(IssuedToken {
        token,
        jti,
        expires_at,
    })
}

pub fn generate_token_pair(
    config: &AppConfig,
    user_id: i32,
    role: Role,
) -> Result<TokenPair, AuthMiddlewareError> {
    Ok(TokenPair {
        access: generate_token(config, user_id, role, TokenKind::Access)?.token,
        refresh: generate_token(config, user_id, role, TokenKind::Refresh)?.token,
    })
}

/// Checks signature, expiry and kind only. Callers decide what the claims
/// are good for.
pub fn decode_token(
    config: &AppConfig,
    token: &str,
    kind: TokenKind,
) -> Result<Claims, AuthMiddlewareError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthMiddlewareError::TokenExpired,
        _ => AuthMiddlewareError::ValidationFail,
    })?
    .claims;

    if claims.kind != kind {
        return Err(AuthMiddlewareError::ValidationFail);
    }
    Ok(claims)
}

pub async fn validate_token(
    app: &AppState,
    token: &str,
    req_role: Role,
) -> Result<Claims, AuthMiddlewareError> {
    let claims = decode_token(&app.config, token, TokenKind::Access)?;
    let role = Role::from_str(&claims.role).map_err(|_| AuthMiddlewareError::ValidationFail)?;

    match UserEntity::find_by_id(claims.user_id).one(&*app.db).await {
        Ok(Some(user::Model {
            is_active: true,
            role: stored_role,
            ..
        })) if stored_role == role => {
            if role >= req_role {
                Ok(claims)
            } else {
                Err(AuthMiddlewareError::InsufficientRole)
            }
        }
        Ok(_) => Err(AuthMiddlewareError::InvalidUserOrRole),
        Err(err) => {
            warn!(error = %err, "User lookup failed during token validation");
            Err(AuthMiddlewareError::InternalServerError)
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthMiddlewareError {
    #[error("Invalid user id or role")]
    InvalidUserOrRole,
    #[error("Insufficient permissions")]
    InsufficientRole,
    #[error("Token expired")]
    TokenExpired,
    #[error("Failed to validate token")]
    ValidationFail,
    #[error("Failed to generate token")]
    GenerationFail,
    #[error("Internal server error")]
    InternalServerError,
}
