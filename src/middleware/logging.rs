use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::ServiceError;

pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed = start.elapsed();
    match response.extensions().get::<Result<(), ApiError>>() {
        Some(Ok(_)) => info!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            "Processed request"
        ),
        Some(Err(value)) if status.is_server_error() => error!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            value = %value,
            "Failed to process request"
        ),
        Some(Err(value)) => warn!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            value = %value,
            "Rejected request"
        ),
        None => info!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            "Processed request without handler outcome"
        ),
    }

    response
}

/// Handler outcome carried to `logging_middleware` as a response extension.
#[derive(Clone, Debug)]
pub enum ApiError {
    General(String),
    DbError(String),
    ValidationFail(String),
    Gateway(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::General(value) => write!(f, "{value}"),
            ApiError::DbError(value) => write!(f, "Database error: {value}"),
            ApiError::ValidationFail(value) => write!(f, "Failed to validate: {value}"),
            ApiError::Gateway(value) => write!(f, "Gateway error: {value}"),
        }
    }
}

impl From<&ServiceError> for ApiError {
    fn from(err: &ServiceError) -> Self {
        match err {
            ServiceError::Database(db) => ApiError::DbError(db.to_string()),
            ServiceError::Gateway(detail) => ApiError::Gateway(detail.clone()),
            ServiceError::Validation(msg) | ServiceError::Verification(msg) => {
                ApiError::ValidationFail(msg.clone())
            }
            other => ApiError::General(other.to_string()),
        }
    }
}

pub fn to_response<T: IntoResponse>(
    response: T,               //The response that we are sending + StatusCode
    ext: Result<(), ApiError>, //The extension, that we want to give logging middleware
) -> Response {
    let mut response = response.into_response();

    response.extensions_mut().insert(ext);

    response
}

/// `{"error": ...}` body with the status the error maps to.
pub fn error_response(err: ServiceError) -> Response {
    to_response(
        (
            err.status_code(),
            Json(json!({
                "error": err.public_message()
            })),
        ),
        Err(ApiError::from(&err)),
    )
}

/// Account endpoints answer `{"success": false, "message": ...}` instead.
pub fn account_error_response(err: ServiceError) -> Response {
    to_response(
        (
            err.status_code(),
            Json(json!({
                "success": false,
                "message": err.public_message()
            })),
        ),
        Err(ApiError::from(&err)),
    )
}

pub fn ok_response<T: IntoResponse>(status: StatusCode, body: T) -> Response {
    to_response((status, body), Ok(()))
}
