//! HMAC-SHA256 webhook signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Produces and checks `X-Webhook-Signature` values of the form
/// `sha256={hex}`, computed over the exact request body bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookSigner;

impl WebhookSigner {
    /// Prefix of every signature header value.
    pub const PREFIX: &'static str = "sha256=";

    /// Sign `body` with `secret`.
    pub fn sign(secret: &str, body: &[u8]) -> String {
        // HMAC accepts keys of any length, so this never fails.
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(body);
        format!("{}{}", Self::PREFIX, hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a signature header against `body`. Comparison is constant-time.
    pub fn verify(secret: &str, body: &[u8], header: &str) -> bool {
        let Some(hex_digest) = header.strip_prefix(Self::PREFIX) else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}
