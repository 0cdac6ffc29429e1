//! GET /ping - storage health check

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::ApiState;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub message: String,
    pub backend: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// 200 when the storage backend reports healthy, 500 otherwise
pub async fn ping(State(state): State<ApiState>) -> (StatusCode, Json<PingResponse>) {
    match state.engine.ping().await {
        Ok(health) if health.healthy => (
            StatusCode::OK,
            Json(PingResponse {
                status: "ok",
                message: health.message,
                backend: health.metadata.get("backend").cloned(),
                checked_at: health.checked_at,
            }),
        ),
        Ok(health) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(PingResponse {
                status: "unavailable",
                message: health.message,
                backend: health.metadata.get("backend").cloned(),
                checked_at: health.checked_at,
            }),
        ),
        Err(e) => {
            tracing::error!("storage health check failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PingResponse {
                    status: "unavailable",
                    message: "health check failed".to_string(),
                    backend: None,
                    checked_at: Utc::now(),
                }),
            )
        }
    }
}
