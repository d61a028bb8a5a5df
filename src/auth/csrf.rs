//! CSRF double-submit token signing and verification.
//!
//! The CSRF token is `base64(HMAC-SHA256(secret_key, session_token))`:
//! deterministic, stateless, recomputed on every verification. No CSRF
//! store exists — validity is entirely a function of session-token
//! validity plus possession of the server secret.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Generate a fresh 32-byte base64-encoded secret.
///
/// Used when no `secret_key` is configured. An ephemeral secret means all
/// sessions are invalidated on restart, since authenticated mutating
/// requests require a matching CSRF token.
pub fn generate_secret() -> String {
    let mut secret_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut secret_bytes);
    BASE64_STANDARD.encode(secret_bytes)
}

/// Stateless CSRF signer bound to the process-wide secret key.
#[derive(Clone)]
pub struct CsrfSigner {
    key: Arc<Vec<u8>>,
}

impl CsrfSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(secret.as_bytes().to_vec()),
        }
    }

    /// Derive the CSRF token for a session token.
    pub fn sign(&self, session_token: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(session_token.as_bytes());
        BASE64_STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Recompute and compare in constant time.
    pub fn verify(&self, session_token: &str, presented: &str) -> bool {
        let expected = self.sign(session_token);
        constant_time_eq(expected.as_bytes(), presented.as_bytes())
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
