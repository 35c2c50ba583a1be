//! Webhook Signature Verification
//!
//! Implements the processor's `v1` signing scheme: HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"`, hex-encoded, delivered in a header of the
//! form `t=<unix>,v1=<hex>[,v1=<hex>...]`. Verification always runs against
//! the raw, unparsed body bytes -- parsing and re-serializing the JSON would
//! change the bytes and break the signature.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default replay-protection window in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies webhook signature headers against a shared signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the replay tolerance window
    pub fn with_tolerance(mut self, secs: i64) -> Self {
        self.tolerance_secs = secs;
        self
    }

    /// Verify `header` against the raw request body
    pub fn verify(&self, raw_body: &[u8], header: &str) -> Result<()> {
        self.verify_at(raw_body, header, chrono::Utc::now().timestamp())
    }

    /// Verification against an explicit "now", so the tolerance window is
    /// testable without clock games.
    fn verify_at(&self, raw_body: &[u8], header: &str, now: i64) -> Result<()> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for item in header.split(',') {
            match item.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".into()))?;
        if candidates.is_empty() {
            return Err(PaymentError::InvalidSignature("no v1 signatures".into()));
        }
        if (now - timestamp).abs() > self.tolerance_secs {
            return Err(PaymentError::InvalidSignature(
                "timestamp outside tolerance window".into(),
            ));
        }

        let mut signed_payload = Vec::with_capacity(raw_body.len() + 16);
        signed_payload.extend_from_slice(timestamp.to_string().as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(raw_body);

        for candidate in candidates {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                .map_err(|e| PaymentError::Config(format!("invalid webhook secret: {e}")))?;
            mac.update(&signed_payload);
            // verify_slice is constant-time
            if mac.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }

        Err(PaymentError::InvalidSignature("signature mismatch".into()))
    }
}
