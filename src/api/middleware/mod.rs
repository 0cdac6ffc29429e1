//! Ingress stages
//!
//! Every request passes through the same ordered list of stages, outermost
//! first:
//!
//! | stage          | request side                         | response side            |
//! |----------------|--------------------------------------|--------------------------|
//! | trusted subnet | 403 unless `X-Real-IP` is in the CIDR | -                        |
//! | decrypt        | RSA-OAEP open non-empty bodies       | -                        |
//! | access log     | start timer                          | log status and latency   |
//! | signature      | verify `HashSHA256` if present       | sign the body            |
//! | gzip           | inflate `Content-Encoding: gzip`     | deflate JSON/text bodies |
//!
//! The agent builds its body in the mirror order (gzip, sign, encrypt), so
//! each stage sees exactly the bytes its counterpart produced. Stages whose
//! key material is not configured are skipped; the order of the remaining
//! ones never changes.

pub mod access_log;
pub mod decrypt;
pub mod gzip;
pub mod signature;
pub mod subnet;

use std::error::Error as StdError;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::{from_fn, from_fn_with_state};
use http_body_util::LengthLimitError;
use ipnet::IpNet;

use super::error::ApiError;
use crate::transport::crypto::Decryptor;
use crate::transport::signing::SigningKey;

/// One ingress stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TrustedSubnet,
    Decrypt,
    AccessLog,
    Signature,
    Gzip,
}

/// All stages, outermost first.
pub const STAGE_ORDER: [Stage; 5] = [
    Stage::TrustedSubnet,
    Stage::Decrypt,
    Stage::AccessLog,
    Stage::Signature,
    Stage::Gzip,
];

/// Key material and limits for the ingress stages
#[derive(Debug, Clone, Default)]
pub struct IngressSecurity {
    pub trusted_subnet: Option<IpNet>,
    pub decryptor: Option<Arc<Decryptor>>,
    pub signing_key: Option<SigningKey>,
}

impl IngressSecurity {
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::TrustedSubnet => self.trusted_subnet.is_some(),
            Stage::Decrypt => self.decryptor.is_some(),
            Stage::Signature => self.signing_key.is_some(),
            Stage::AccessLog | Stage::Gzip => true,
        }
    }

    /// Stages that will run, outermost first.
    pub fn active_stages(&self) -> Vec<Stage> {
        STAGE_ORDER
            .into_iter()
            .filter(|stage| self.is_enabled(*stage))
            .collect()
    }
}

/// Wrap `router` in the active stages
///
/// Layers added later wrap earlier ones, so stages are added innermost first.
pub fn apply_stages(mut router: Router, security: &IngressSecurity, body_limit: usize) -> Router {
    for stage in STAGE_ORDER.into_iter().rev() {
        router = match stage {
            Stage::Gzip => gzip::layer(router),
            Stage::Signature => match &security.signing_key {
                Some(key) => router.layer(from_fn_with_state(
                    signature::SignatureState {
                        key: key.clone(),
                        body_limit,
                    },
                    signature::signature,
                )),
                None => router,
            },
            Stage::AccessLog => router.layer(from_fn(access_log::access_log)),
            Stage::Decrypt => match &security.decryptor {
                Some(decryptor) => router.layer(from_fn_with_state(
                    decrypt::DecryptState {
                        decryptor: decryptor.clone(),
                        body_limit,
                    },
                    decrypt::decrypt,
                )),
                None => router,
            },
            Stage::TrustedSubnet => match security.trusted_subnet {
                Some(subnet) => router.layer(from_fn_with_state(subnet, subnet::trusted_subnet)),
                None => router,
            },
        };
    }

    router
}

/// Buffer a body, refusing anything above `limit` bytes with 413
///
/// The outer `RequestBodyLimitLayer` reports its own limit the same way, so a
/// chunked body that overruns either limit is a 413 rather than a 400.
pub(crate) async fn read_body(body: Body, limit: usize) -> Result<Bytes, ApiError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if is_length_limit(&e) {
            ApiError::PayloadTooLarge(limit)
        } else {
            ApiError::InvalidRequest(format!("failed to read body: {e}"))
        }
    })
}

fn is_length_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Fix up `Content-Length` after a stage replaced the body.
pub(crate) fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}
