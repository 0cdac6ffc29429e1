//! Transparent gzip for request and response bodies

use axum::Router;
use axum::http::{Extensions, HeaderMap, StatusCode, Version, header};
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::{Predicate, SizeAbove};
use tower_http::decompression::RequestDecompressionLayer;

/// Only JSON and text responses get compressed.
fn is_textual(_: StatusCode, _: Version, headers: &HeaderMap, _: &Extensions) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.starts_with("text/"))
}

/// Inflate gzip request bodies; deflate JSON/text responses for gzip-capable clients
///
/// The inflated size is bounded by the router's `DefaultBodyLimit`: extractors
/// refuse a body that expands past it with 413. A body that is not valid gzip
/// fails while being read, which extractors report as 400.
pub fn layer(router: Router) -> Router {
    router
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(1).and(is_textual)))
        .layer(RequestDecompressionLayer::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json,
        body::{Body, Bytes},
        extract::{DefaultBodyLimit, Request},
        routing::post,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::transport::gzip::{compress, decompress};

    fn app() -> Router {
        layer(
            Router::new()
                .route("/", post(|Json(v): Json<Value>| async move { Json(v) }))
                .route("/bytes", post(|body: Bytes| async move { body }))
                .layer(DefaultBodyLimit::max(1 << 16)),
        )
    }

    fn post_json(uri: &str, body: Vec<u8>, gzip_body: bool, accept_gzip: bool) -> Request {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if gzip_body {
            builder = builder.header(header::CONTENT_ENCODING, "gzip");
        }
        if accept_gzip {
            builder = builder.header(header::ACCEPT_ENCODING, "deflate, gzip;q=1.0");
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_request_is_inflated_and_response_deflated() {
        let body = compress(br#"{"id":"x"}"#).unwrap();
        let response = app()
            .oneshot(post_json("/", body, true, true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::VARY], "accept-encoding");

        let packed = axum::body::to_bytes(response.into_body(), 1 << 16).await.unwrap();
        let plain = decompress(&packed, 1 << 16).unwrap();
        let value: Value = serde_json::from_slice(&plain).unwrap();
        assert_eq!(value, json!({"id": "x"}));
    }

    #[tokio::test]
    async fn test_plain_client_gets_plain_response() {
        let response = app()
            .oneshot(post_json("/", br#"{"id":"x"}"#.to_vec(), false, false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_binary_response_is_not_compressed() {
        let response = app()
            .oneshot(post_json("/bytes", b"raw".to_vec(), false, true))
            .await
            .unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_bad_gzip_is_a_client_error() {
        let response = app()
            .oneshot(post_json("/", b"not gzip".to_vec(), true, false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_inflated_size_is_capped() {
        let body = compress(&vec![b' '; (1 << 16) + 1]).unwrap();
        let response = app()
            .oneshot(post_json("/bytes", body, true, false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
