//! RSA-OAEP body decryption

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{trace, warn};

use super::{read_body, set_content_length};
use crate::api::error::ApiError;
use crate::transport::crypto::Decryptor;

#[derive(Clone)]
pub struct DecryptState {
    pub decryptor: Arc<Decryptor>,
    pub body_limit: usize,
}

/// Replace a non-empty encrypted body with its plaintext
///
/// Bodies that do not decrypt are rejected with 400. Empty bodies (plain
/// reads) pass untouched.
pub async fn decrypt(
    State(state): State<DecryptState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let sealed = read_body(body, state.body_limit).await?;

    if sealed.is_empty() {
        return Ok(next.run(Request::from_parts(parts, Body::empty())).await);
    }

    let decryptor = state.decryptor.clone();
    let opened = tokio::task::spawn_blocking(move || decryptor.decrypt(&sealed))
        .await
        .map_err(|e| ApiError::Internal(format!("decryption task failed: {e}")))?
        .map_err(|e| {
            warn!("rejecting body that does not decrypt: {e}");
            ApiError::InvalidRequest("failed to decrypt body".to_string())
        })?;

    trace!("decrypted body to {} bytes", opened.len());
    set_content_length(&mut parts.headers, opened.len());

    Ok(next.run(Request::from_parts(parts, Body::from(opened))).await)
}
