//! Cryptographic utilities for webhook verification.
//!
//! Shared primitives for verifying processor webhook signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over `message` and return the lowercase hex digest
/// (64 characters).
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // HMAC accepts keys of any length (RFC 2104), so construction cannot
    // fail for a string secret.
    let digest = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length")
        .chain_update(message.as_bytes())
        .finalize();

    hex::encode(digest.into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Used when comparing computed signatures against the value a webhook
/// caller supplied. Length is compared first; for equal lengths every byte
/// pair is visited regardless of where the first mismatch sits.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
