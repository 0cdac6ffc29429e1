//! Metric update endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;

use super::parse_json;
use crate::api::{ApiResult, ApiState};
use crate::model::{Batch, Metric, MetricKind, MetricValue};

/// POST /update/{type}/{name}/{value}
pub async fn update_from_path(
    State(state): State<ApiState>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let kind: MetricKind = kind.parse()?;
    let metric = Metric::new(name, MetricValue::parse(kind, &raw)?)?;

    state.engine.apply_update(metric).await?;
    Ok(StatusCode::OK)
}

/// POST /update/ - one metric as JSON; answers with the stored state
pub async fn update_json(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Metric>> {
    let metric: Metric = parse_json(&headers, &body)?;
    let stored = state.engine.apply_update(metric).await?;
    Ok(Json(stored))
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub updated: usize,
}

/// POST /updates/ - a JSON array of metrics
pub async fn update_batch(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<BatchSummary>> {
    let batch: Batch = parse_json(&headers, &body)?;
    let updated = state.engine.apply_batch(batch).await?;
    Ok(Json(BatchSummary { updated }))
}
