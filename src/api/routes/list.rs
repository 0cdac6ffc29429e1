//! GET / - listing of every stored metric

use axum::{
    extract::State,
    http::{HeaderMap, header},
    response::{Html, IntoResponse, Response},
};

use crate::api::{ApiResult, ApiState};
use crate::model::Metric;

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn render_text(metrics: &[Metric]) -> String {
    metrics
        .iter()
        .map(|m| format!("{} ({}): {}\n", m.id, m.kind(), m.value))
        .collect()
}

fn render_html(metrics: &[Metric]) -> String {
    let items: String = metrics
        .iter()
        .map(|m| {
            format!(
                "<li>{} ({}): {}</li>",
                escape_html(&m.id),
                m.kind(),
                m.value
            )
        })
        .collect();

    format!(
        "<!DOCTYPE html><html><head><title>Metrics</title></head>\
         <body><ul>{items}</ul></body></html>"
    )
}

pub async fn list_metrics(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult<Response> {
    let metrics = state.engine.list().await?;

    if wants_html(&headers) {
        Ok(Html(render_html(&metrics)).into_response())
    } else {
        Ok(render_text(&metrics).into_response())
    }
}
