//! Random identifiers and the RFC 7636 S256 transform.
//!
//! Everything token-shaped in authgate flows through this module: PKCE
//! verifier/challenge pairs, opaque `state` values, and generated client
//! identifiers are all URL-safe base64 over cryptographically strong
//! random bytes.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a PKCE code verifier (32 random bytes, 43 base64url chars).
#[must_use]
pub fn generate_verifier() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the S256 code challenge for a verifier.
///
/// `code_challenge = base64url(sha256(code_verifier))` per RFC 7636 §4.2.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a random opaque `state` parameter (16 bytes).
#[must_use]
pub fn generate_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a random client identifier (16 bytes).
#[must_use]
pub fn generate_client_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 over arbitrary input, base64url-encoded.
///
/// Token ids are derived this way from the process secret plus fresh
/// random bytes, so an id never reveals the secret or the entropy used.
#[must_use]
pub fn hashed_id(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
