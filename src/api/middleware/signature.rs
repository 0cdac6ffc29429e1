//! HMAC-SHA256 request verification and response signing

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{trace, warn};

use super::read_body;
use crate::api::error::ApiError;
use crate::transport::signing::{HASH_HEADER, SigningKey};

#[derive(Clone)]
pub struct SignatureState {
    pub key: SigningKey,
    pub body_limit: usize,
}

/// Verify the request signature when one is sent, and sign the response
///
/// A request without a `HashSHA256` header passes unverified; one with a
/// signature that does not match the body is rejected with 400.
pub async fn signature(
    State(state): State<SignatureState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let request = match request.headers().get(HASH_HEADER) {
        Some(value) => {
            let claimed = value
                .to_str()
                .map_err(|_| ApiError::InvalidRequest("malformed signature header".to_string()))?
                .to_string();

            let (parts, body) = request.into_parts();
            let bytes = read_body(body, state.body_limit).await?;

            if !state.key.verify(&bytes, &claimed) {
                warn!("rejecting request to {}: signature mismatch", parts.uri.path());
                return Err(ApiError::InvalidRequest("signature mismatch".to_string()));
            }

            trace!("request signature verified");
            Request::from_parts(parts, Body::from(bytes))
        }
        None => request,
    };

    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    let bytes = read_body(body, usize::MAX).await?;
    let signature = state.key.sign(&bytes);
    let value = HeaderValue::from_str(&signature)
        .map_err(|e| ApiError::Internal(format!("unencodable signature: {e}")))?;
    parts.headers.insert(HASH_HEADER, value);

    Ok(Response::from_parts(parts, Body::from(bytes)))
}
