// crates/link-locker-core/src/runtime/signature.rs
// ============================================================================
// Module: Link Locker Postback Signatures
// Description: HMAC-SHA256 signing over canonical postback parameters.
// Purpose: Authenticate server-to-server postbacks from ad networks.
// Dependencies: hmac, sha2, hex, subtle
// ============================================================================

//! ## Overview
//! The signed message is every parameter except `signature`, sorted by key
//! and joined as `key=value` pairs separated by `&`. Signatures are lowercase
//! hex; verification decodes either case and compares in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Parameter carrying the signature itself.
pub const SIGNATURE_PARAM: &str = "signature";

/// HMAC-SHA256 instance.
type HmacSha256 = Hmac<Sha256>;

/// Builds the canonical message for a parameter map.
#[must_use]
pub fn canonical_message(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE_PARAM)
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Computes the raw MAC over a message.
fn mac_bytes(secret: &str, message: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

/// Signs a parameter map, returning lowercase hex.
#[must_use]
pub fn sign_params(secret: &str, params: &BTreeMap<String, String>) -> Option<String> {
    mac_bytes(secret, &canonical_message(params)).map(hex::encode)
}

/// Verifies a hex signature over a parameter map in constant time.
#[must_use]
pub fn verify_params(secret: &str, params: &BTreeMap<String, String>, signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Some(expected) = mac_bytes(secret, &canonical_message(params)) else {
        return false;
    };
    expected.ct_eq(&provided).into()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwrap/expect for clarity."
    )]

    use super::*;

    fn params() -> BTreeMap<String, String> {
        [("task_id", "t1"), ("click_id", "c1"), ("status", "approved"), ("payout", "2.00")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn canonical_message_sorts_and_skips_signature() {
        let mut params = params();
        params.insert("signature".to_string(), "abc".to_string());
        assert_eq!(
            canonical_message(&params),
            "click_id=c1&payout=2.00&status=approved&task_id=t1"
        );
    }

    #[test]
    fn matches_known_vector() {
        // RFC 4231 test case 2.
        let mut params = BTreeMap::new();
        params.insert("what do ya want for nothing?".to_string(), String::new());
        let message = canonical_message(&params);
        assert_eq!(message, "what do ya want for nothing?=");
        let digest = hex::encode(mac_bytes("Jefe", "what do ya want for nothing?").unwrap());
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verifies_round_trip_and_rejects_tampering() {
        let params = params();
        let signature = sign_params("secret", &params).unwrap();
        assert!(verify_params("secret", &params, &signature));
        assert!(verify_params("secret", &params, &signature.to_ascii_uppercase()));
        assert!(!verify_params("other", &params, &signature));
        let mut tampered = params;
        tampered.insert("payout".to_string(), "200.00".to_string());
        assert!(!verify_params("secret", &tampered, &signature));
        assert!(!verify_params("secret", &tampered, "zz"));
    }
}
