//! HMAC-SHA256 token signing
//!
//! - **Signing**: `s = base64url(HMAC-SHA256(secret, "p=..&t=..&e=.."))`
//! - **Validation**: constant-time comparison via `ring::hmac::verify`
//!
//! The secret is deployment configuration. The client never holds it.

use super::types::{split_fields, AuthToken};
use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::hmac;
use std::fmt;

/// Minimum secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Signs and verifies serialized tokens
#[derive(Clone)]
pub struct Signer {
    key: hmac::Key,
}

impl Signer {
    /// Create a signer from shared key material
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::config(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    /// Serialize and sign a token
    pub fn sign(&self, token: &AuthToken) -> String {
        let payload = token.payload();
        let signature = self.sign_bytes(payload.as_bytes());
        format!("{payload}&s={}", URL_SAFE_NO_PAD.encode(signature))
    }

    /// Verify a serialized token and return its structured form
    ///
    /// Fails with `MalformedToken` on structure and `InvalidSignature` when the
    /// signature does not match. Expiry is the caller's concern.
    pub fn verify(&self, signed: &str) -> Result<AuthToken> {
        let raw = split_fields(signed)?;

        let signature = URL_SAFE_NO_PAD
            .decode(raw.signature)
            .map_err(|_| Error::InvalidSignature)?;

        if !self.verify_bytes(raw.payload.as_bytes(), &signature) {
            return Err(Error::InvalidSignature);
        }

        AuthToken::from_raw(&raw)
    }

    /// Raw HMAC tag over arbitrary bytes
    pub fn sign_bytes(&self, message: &[u8]) -> Vec<u8> {
        hmac::sign(&self.key, message).as_ref().to_vec()
    }

    /// Constant-time check of a raw HMAC tag
    pub fn verify_bytes(&self, message: &[u8], tag: &[u8]) -> bool {
        hmac::verify(&self.key, message, tag).is_ok()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("algorithm", &"HMAC-SHA256")
            .finish_non_exhaustive()
    }
}
