//! Per-request access log

use std::fmt::Write;
use std::time::Instant;

use axum::{extract::Request, http::header, middleware::Next, response::Response};
use rand::Rng;

fn request_id() -> String {
    let bytes: [u8; 6] = rand::thread_rng().r#gen();
    let mut id = String::with_capacity(12);
    for b in bytes {
        let _ = write!(id, "{b:02x}");
    }
    id
}

fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

/// Log method, path, status and latency of every request.
pub async fn access_log(request: Request, next: Next) -> Response {
    let id = request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let size = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    tracing::debug!(request_id = %id, method = %method, path = %path, size = %size, "--> request");

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(request_id = %id, method = %method, path = %path, status = status.as_u16(), elapsed = %elapsed, "<-- response");
    } else if status.is_client_error() {
        tracing::warn!(request_id = %id, method = %method, path = %path, status = status.as_u16(), elapsed = %elapsed, "<-- response");
    } else {
        tracing::info!(request_id = %id, method = %method, path = %path, status = status.as_u16(), elapsed = %elapsed, "<-- response");
    }

    response
}
