//! Collector HTTP handlers

pub mod list;
pub mod ping;
pub mod update;
pub mod value;

use axum::http::{HeaderMap, header};
use serde::de::DeserializeOwned;

use super::error::{ApiError, ApiResult};

/// Decode a JSON body, insisting on an `application/json` content type.
pub(crate) fn parse_json<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> ApiResult<T> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));

    if !is_json {
        return Err(ApiError::UnsupportedMediaType(
            "expected Content-Type: application/json".to_string(),
        ));
    }

    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(format!("invalid JSON: {e}")))
}
