//! Metric read endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};

use super::parse_json;
use crate::api::{ApiError, ApiResult, ApiState};
use crate::model::{Metric, MetricKind, MetricQuery};

/// GET /value/{type}/{name} - the stored value as plain text
pub async fn get_value(
    State(state): State<ApiState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;

    state
        .engine
        .read_formatted(kind, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{kind} {name:?} not found")))
}

/// POST /value/ - look a metric up by id and type
pub async fn post_value(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Metric>> {
    let query: MetricQuery = parse_json(&headers, &body)?;

    state
        .engine
        .read(query.kind, &query.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{} {:?} not found", query.kind, query.id)))
}
