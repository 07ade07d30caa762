use axum::http::StatusCode;
use sea_orm::DbErr;
use thiserror::Error;

use crate::middleware::auth::AuthMiddlewareError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Cannot {action} order with {current}")]
    InvalidTransition { current: String, action: &'static str },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Verification(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidTransition { .. } | Self::Verification(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gateway(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a client. Server-side failures never leak detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::Gateway(_) => "Payment service is unavailable, please try again".to_owned(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_owned(),
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| match errs.first().and_then(|e| e.message.as_ref()) {
                Some(message) => format!("{field}: {message}"),
                None => format!("{field} is invalid"),
            })
            .collect();
        fields.sort();
        Self::Validation(fields.join(", "))
    }
}

impl From<AuthMiddlewareError> for ServiceError {
    fn from(err: AuthMiddlewareError) -> Self {
        match err {
            AuthMiddlewareError::GenerationFail | AuthMiddlewareError::InternalServerError => {
                Self::Internal(err.to_string())
            }
            other => Self::Unauthorized(other.to_string()),
        }
    }
}
