//! Stripe webhook signature verification.
//!
//! Stripe signs every webhook delivery with the endpoint's signing secret and sends the result in the
//! `Stripe-Signature` header:
//!
//! ```text
//! Stripe-Signature: t=1718000000,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
//! ```
//!
//! The `v1` value is the hex-encoded HMAC-SHA256 of `"{t}.{raw body}"`. The header may carry more than one `v1`
//! entry while a secret is being rolled; any match is accepted. The raw body must be verified exactly as received,
//! before any JSON parsing takes place.
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;

use crate::WebhookSignatureError;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookSignatureError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(WebhookSignatureError::MissingHeader);
        }
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookSignatureError::MalformedHeader(part.to_string()))?;
            match key {
                "t" => {
                    let t = value
                        .parse::<i64>()
                        .map_err(|_| WebhookSignatureError::MalformedHeader(format!("bad timestamp: {value}")))?;
                    timestamp = Some(t);
                },
                "v1" => signatures.push(value.to_string()),
                // v0 and any future schemes are ignored
                _ => {},
            }
        }
        let timestamp = timestamp.ok_or_else(|| WebhookSignatureError::MalformedHeader("no timestamp".into()))?;
        if signatures.is_empty() {
            return Err(WebhookSignatureError::NoSignature);
        }
        Ok(Self { timestamp, signatures })
    }
}

/// Verifies `payload` against the `Stripe-Signature` header value.
///
/// `now` is the current unix time in seconds; a signature whose timestamp differs from `now` by more than
/// `tolerance_secs` is rejected to limit replay attacks. A tolerance of zero or less disables the check.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), WebhookSignatureError> {
    let header = SignatureHeader::parse(header)?;
    if tolerance_secs > 0 && (now - header.timestamp).abs() > tolerance_secs {
        warn!("🔐️ Webhook signature timestamp {} is outside the tolerance window", header.timestamp);
        return Err(WebhookSignatureError::TimestampOutOfTolerance);
    }
    let matched = header.signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        // constant-time comparison
        mac.verify_slice(&expected).is_ok()
    });
    if matched {
        trace!("🔐️ Webhook signature check ✅️");
        Ok(())
    } else {
        warn!("🔐️ Webhook signature does not match the payload");
        Err(WebhookSignatureError::Mismatch)
    }
}

/// Produces a `Stripe-Signature` header value for the given payload. Used to sign test fixtures and by any tooling
/// that replays events against a local server.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}
