//! RSA-OAEP (SHA-256) body encryption
//!
//! One OAEP block seals at most `k - 66` bytes, where `k` is the modulus size
//! in bytes, so larger bodies are sealed block by block. The ciphertext is the
//! concatenation of `k`-byte blocks; the receiving side splits on `k` and
//! opens each block in order.

use std::path::{Path, PathBuf};

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// Bytes of each block consumed by OAEP padding with a 32-byte hash
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key of {bytes} bytes is too small for OAEP with SHA-256")]
    KeyTooSmall { bytes: usize },

    #[error("ciphertext length {len} is not a multiple of the {block}-byte block size")]
    MalformedCiphertext { len: usize, block: usize },

    #[error("RSA operation failed: {0}")]
    Rsa(#[from] rsa::Error),
}

fn read_pem(path: &Path) -> Result<String, CryptoError> {
    std::fs::read_to_string(path).map_err(|source| CryptoError::KeyFile {
        path: path.to_path_buf(),
        source,
    })
}

fn check_size(bytes: usize) -> Result<(), CryptoError> {
    if bytes <= OAEP_OVERHEAD {
        return Err(CryptoError::KeyTooSmall { bytes });
    }
    Ok(())
}

/// Agent side: seals bodies with the collector's public key
#[derive(Debug, Clone)]
pub struct Encryptor {
    key: RsaPublicKey,
}

impl Encryptor {
    pub fn new(key: RsaPublicKey) -> Result<Self, CryptoError> {
        check_size(key.size())?;
        Ok(Self { key })
    }

    /// Parse a PEM public key (SPKI, falling back to PKCS#1).
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::new(key)
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let block = self.key.size();
        let chunk = block - OAEP_OVERHEAD;
        let mut rng = rand::thread_rng();

        let mut sealed = Vec::with_capacity(plaintext.len().div_ceil(chunk) * block);
        for part in plaintext.chunks(chunk) {
            sealed.extend(self.key.encrypt(&mut rng, Oaep::new::<Sha256>(), part)?);
        }

        Ok(sealed)
    }
}

/// Collector side: opens bodies sealed with the matching public key
#[derive(Debug, Clone)]
pub struct Decryptor {
    key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(key: RsaPrivateKey) -> Result<Self, CryptoError> {
        check_size(key.size())?;
        Ok(Self { key })
    }

    /// Parse a PEM private key (PKCS#1, falling back to PKCS#8).
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::new(key)
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let block = self.key.size();
        if ciphertext.len() % block != 0 {
            return Err(CryptoError::MalformedCiphertext {
                len: ciphertext.len(),
                block,
            });
        }

        let mut opened = Vec::with_capacity(ciphertext.len());
        for part in ciphertext.chunks(block) {
            opened.extend(self.key.decrypt(Oaep::new::<Sha256>(), part)?);
        }

        Ok(opened)
    }
}
