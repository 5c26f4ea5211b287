// HMAC-SHA256 signatures for checkout callbacks and webhooks

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `payload` keyed with `secret`
pub fn sign_hex(payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature. Empty secret, payload or
/// signature never verify.
pub fn verify_hex(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() || payload.is_empty() || signature.trim().is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Payload signed by checkout for a one-off order payment
pub fn order_payload(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

pub fn verify_order_signature(order_id: &str, payment_id: &str, signature: &str, key_secret: &str) -> bool {
    verify_hex(order_payload(order_id, payment_id).as_bytes(), signature, key_secret)
}

pub fn verify_webhook_signature(raw_body: &[u8], signature: &str, webhook_secret: &str) -> bool {
    verify_hex(raw_body, signature, webhook_secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let sig = sign_hex(b"{\"event\":\"payment.captured\"}", "whsec");
        assert_eq!(sig.len(), 64);
        assert!(verify_webhook_signature(b"{\"event\":\"payment.captured\"}", &sig, "whsec"));
        assert!(!verify_webhook_signature(b"{\"event\":\"payment.failed\"}", &sig, "whsec"));
        assert!(!verify_webhook_signature(b"{\"event\":\"payment.captured\"}", &sig, "other"));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign_hex(b"what do ya want for nothing?", "Jefe"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_order_signature_uses_pipe_payload() {
        let sig = sign_hex(b"order_1|pay_1", "key_secret");
        assert!(verify_order_signature("order_1", "pay_1", &sig, "key_secret"));
        assert!(!verify_order_signature("order_1", "pay_2", &sig, "key_secret"));
    }

    #[test]
    fn test_missing_parts_never_verify() {
        let sig = sign_hex(b"body", "secret");
        assert!(!verify_hex(b"body", "", "secret"));
        assert!(!verify_hex(b"", &sig, "secret"));
        assert!(!verify_hex(b"body", &sig, ""));
        assert!(!verify_hex(b"body", "not-hex", "secret"));
    }
}
