//! Proof Key for Code Exchange (RFC 7636), `S256` method only.

use sha2::{Digest, Sha256};

use crate::utils::encode::{base64url, constant_time_eq, random_token};

pub const S256: &str = "S256";

/// 32 bytes of OS randomness, base64url-encoded without padding (43 characters).
pub fn generate_code_verifier() -> String {
    random_token(32)
}

/// The base64url-encoded SHA-256 digest of `verifier`.
pub fn generate_code_challenge(verifier: &str) -> String {
    base64url(Sha256::digest(verifier.as_bytes()))
}

/// Checks `verifier` against a stored challenge. Only `S256` is accepted; a
/// missing method is treated as `S256` since the authorize endpoint rejects
/// anything else.
pub fn verify_code_challenge(challenge: &str, method: Option<&str>, verifier: &str) -> bool {
    if verifier.is_empty() {
        return false;
    }

    match method {
        Some(S256) | None => {
            constant_time_eq(generate_code_challenge(verifier).as_bytes(), challenge.as_bytes())
        }
        Some(_) => false,
    }
}
