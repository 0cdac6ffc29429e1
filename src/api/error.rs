//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::model::ModelError;
use crate::storage::StorageError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
///
/// Client errors carry a message that is safe to show to the caller.
/// Server errors are logged with their detail and answered generically.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input, unknown metric kind, failed integrity check
    InvalidRequest(String),

    /// JSON endpoint called without a JSON content type
    UnsupportedMediaType(String),

    /// Request from outside the trusted subnet
    Forbidden(String),

    /// Resource not found
    NotFound(String),

    /// Body larger than the configured limit
    PayloadTooLarge(usize),

    /// Storage operation failed
    StorageError(String),

    /// Internal server error
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StorageError(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            ApiError::InvalidRequest(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => msg,
            ApiError::PayloadTooLarge(limit) => format!("body exceeds {limit} bytes"),
            ApiError::StorageError(detail) => {
                error!("storage failure: {detail}");
                "storage unavailable".to_string()
            }
            ApiError::Internal(detail) => {
                error!("internal error: {detail}");
                "internal server error".to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        if err.is_client_error() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::StorageError(err.to_string())
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
