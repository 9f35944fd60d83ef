//! HMAC-SHA256 signatures for outbound webhook payloads.
//!
//! The header value is `sha256=<lowercase hex>` computed over the exact
//! request body bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
const PREFIX: &str = "sha256=";

fn mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}

/// Signs `payload` with `secret`, returning the full header value.
///
/// # Examples
///
/// ```
/// use relaydesk_notify::signature::{sign_payload, verify_signature};
///
/// let header = sign_payload(r#"{"type":"ping"}"#, "s3cret");
/// assert!(header.starts_with("sha256="));
/// assert!(verify_signature(r#"{"type":"ping"}"#, "s3cret", &header));
/// assert!(!verify_signature(r#"{"type":"ping"}"#, "other", &header));
/// ```
pub fn sign_payload(payload: &str, secret: &str) -> String {
    let mut mac = mac(secret);
    mac.update(payload.as_bytes());
    format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a received signature header.
pub fn verify_signature(payload: &str, secret: &str, header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix(PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac = mac(secret);
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
