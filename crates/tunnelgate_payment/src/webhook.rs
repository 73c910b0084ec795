// --- File: crates/tunnelgate_payment/src/webhook.rs ---
//! Signed settlement notifications.
//!
//! The gateway signs the raw request body with HMAC-SHA256 and sends the
//! lowercase hex digest in the `X-Signature` header. Nothing in the body is
//! looked at before the signature has been checked.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};
use tunnelgate_common::services::Settlement;

use crate::error::PaymentError;

/// Header carrying the hex HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `raw_body` under `secret`.
pub fn sign(raw_body: &[u8], secret: &str) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::ConfigError("webhook secret is not a usable HMAC key".into()))?;
    mac.update(raw_body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Whether `signature` is the hex HMAC of `raw_body` under `secret`.
///
/// The digest comparison runs in constant time. Malformed hex never matches.
pub fn verify_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided).is_ok()
}

/// Verifies `signature` and only then decodes the body into a [`Settlement`].
pub fn parse_settlement(
    raw_body: &[u8],
    signature: Option<&str>,
    secret: &str,
) -> Result<Settlement, PaymentError> {
    let signature = signature
        .ok_or_else(|| PaymentError::WebhookSignatureError(format!("missing {} header", SIGNATURE_HEADER)))?;
    if !verify_signature(raw_body, signature, secret) {
        warn!("[Webhook] Rejected notification with a non-matching signature");
        return Err(PaymentError::WebhookSignatureError("signature mismatch".into()));
    }

    let settlement: Settlement = serde_json::from_slice(raw_body).map_err(|source| PaymentError::ParseError {
        operation: "parse_webhook",
        source,
    })?;
    debug!(
        "[Webhook] Verified {} for payment {} ({:?})",
        settlement.event, settlement.payment_id, settlement.status
    );
    Ok(settlement)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"event":"payment.succeeded","payment_id":"pay_1","status":"succeeded","amount":500,"currency":"USD","metadata":{"user_id":"42","plan":"month"}}"#;

    #[test]
    fn test_valid_signature_verifies() {
        let signature = sign(BODY, SECRET).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(BODY, &signature, SECRET));
    }

    #[test]
    fn test_any_single_bit_flip_in_body_fails() {
        let signature = sign(BODY, SECRET).unwrap();
        for byte in 0..BODY.len() {
            for bit in 0..8 {
                let mut tampered = BODY.to_vec();
                tampered[byte] ^= 1 << bit;
                assert!(!verify_signature(&tampered, &signature, SECRET), "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn test_any_single_bit_flip_in_signature_fails() {
        let signature = hex::decode(sign(BODY, SECRET).unwrap()).unwrap();
        for byte in 0..signature.len() {
            for bit in 0..8 {
                let mut tampered = signature.clone();
                tampered[byte] ^= 1 << bit;
                assert!(!verify_signature(BODY, &hex::encode(&tampered), SECRET));
            }
        }
    }

    #[test]
    fn test_wrong_secret_and_garbage_fail() {
        let signature = sign(BODY, SECRET).unwrap();
        assert!(!verify_signature(BODY, &signature, "other"));
        assert!(!verify_signature(BODY, "not-hex", SECRET));
        assert!(!verify_signature(BODY, "", SECRET));
    }

    #[test]
    fn test_parse_requires_signature_before_decoding() {
        // Undecodable body with a bad signature: must be a signature error, never a parse error.
        let err = parse_settlement(b"{not json", Some("00"), SECRET).unwrap_err();
        assert!(matches!(err, PaymentError::WebhookSignatureError(_)));

        let err = parse_settlement(BODY, None, SECRET).unwrap_err();
        assert!(matches!(err, PaymentError::WebhookSignatureError(_)));
    }

    #[test]
    fn test_parse_decodes_verified_body() {
        let signature = sign(BODY, SECRET).unwrap();
        let settlement = parse_settlement(BODY, Some(&signature), SECRET).unwrap();
        assert!(settlement.is_succeeded());
        assert_eq!(settlement.user_ref(), Some("42"));
    }

    #[test]
    fn test_verified_but_malformed_body_is_parse_error() {
        let body = b"{\"event\":1}";
        let signature = sign(body, SECRET).unwrap();
        let err = parse_settlement(body, Some(&signature), SECRET).unwrap_err();
        assert!(matches!(err, PaymentError::ParseError { .. }));
    }
}
