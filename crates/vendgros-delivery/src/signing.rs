//! HMAC-SHA256 payload signing for outbound webhooks.
//!
//! Every delivery is signed with the webhook's secret over the raw payload
//! bytes; receivers recompute the digest to authenticate the request. The
//! hex signature travels in the `X-Vendgros-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex HMAC-SHA256 signature of `payload` under `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex signature against the expected HMAC of `payload`.
///
/// Comparison is constant time so response latency leaks nothing about how
/// much of the signature matched.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = sign_payload(secret, payload);
    timing_safe_eq(expected.as_bytes(), signature.as_bytes())
}

/// Constant-time byte comparison.
fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
