//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements S256 code challenge verification per RFC 7636. `plain` is not
//! supported.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::error::{OAuthError, OAuthResult};

/// Compute `BASE64URL(SHA256(code_verifier))`.
#[must_use]
pub fn s256_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Verify a PKCE S256 code challenge.
///
/// Computes `BASE64URL(SHA256(code_verifier))` and compares to the stored challenge.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    constant_time_eq(s256_challenge(code_verifier).as_bytes(), code_challenge.as_bytes())
}

/// Like [`verify_s256`], failing with `invalid_grant` on mismatch.
pub fn check_code_verifier(code_verifier: &str, code_challenge: &str) -> OAuthResult<()> {
    if verify_s256(code_verifier, code_challenge) {
        Ok(())
    } else {
        Err(OAuthError::invalid_grant("code_verifier does not match the challenge"))
    }
}

/// Constant-time byte comparison.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
