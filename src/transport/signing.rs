//! HMAC-SHA256 body signatures
//!
//! The signature travels hex-encoded in the `HashSHA256` header and covers
//! the body bytes exactly as they appear at the signing stage: gzip output on
//! the way out, before any encryption.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded signature
pub const HASH_HEADER: &str = "HashSHA256";

#[derive(Debug, thiserror::Error)]
#[error("invalid signing key: {0}")]
pub struct SigningKeyError(String);

/// A pre-shared secret, ready to sign and verify bodies
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SigningKeyError> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| SigningKeyError(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Hex-encoded HMAC of `data`
    pub fn sign(&self, data: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a hex signature against `data`.
    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}
