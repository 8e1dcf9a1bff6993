//! Request body signing.
//!
//! When a shared secret is configured, the sender attaches a hex-encoded
//! HMAC-SHA256 of the **uncompressed** body in the `HashSHA256` header and
//! the receiver recomputes it before applying the request.

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Compute the hex HMAC-SHA256 of `body` under `key`.
pub fn sign(body: &[u8], key: &[u8]) -> String {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(body);
    hex_encode(&mac.finalize().into_bytes())
}

/// Verify a hex signature against `body`. The comparison runs through the
/// hmac crate's constant-time equality.
pub fn verify(body: &[u8], key: &[u8], signature_hex: &str) -> bool {
    let Some(expected) = hex_decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn signature_verifies_under_same_key() {
        let body = br#"{"id":"PollCount","type":"counter","delta":3}"#;

        let signature = sign(body, b"shared-secret");

        assert!(
            verify(body, b"shared-secret", &signature),
            "signature should verify with the signing key"
        );
    }

    #[test]
    fn signature_fails_under_different_key() {
        let body = b"payload";

        let signature = sign(body, b"key-a");

        assert!(
            !verify(body, b"key-b", &signature),
            "signature should not verify under a different key"
        );
    }

    #[test]
    fn tampered_body_fails_verification() {
        let signature = sign(b"original", b"secret");

        assert!(
            !verify(b"tampered", b"secret", &signature),
            "modified body should fail verification"
        );
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!(!verify(b"body", b"secret", "not-hex"), "non-hex signature should be rejected");
        assert!(!verify(b"body", b"secret", "abc"), "odd-length hex should be rejected");
    }

    #[test]
    fn signature_is_lowercase_hex_of_expected_length() {
        let signature = sign(b"body", b"secret");

        assert_eq!(signature.len(), 64, "sha256 digest should be 32 hex pairs");
        assert!(
            signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
            "signature should be lowercase hex"
        );
    }
}
