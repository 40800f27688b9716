use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare two signatures without leaking timing information.
pub fn constant_time_eq(expected: &str, provided: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided.as_bytes();

    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}

/// Verify a hex HMAC-SHA256 signature over `payload`.
pub fn verify_hmac_sha256(
    secret: &str,
    payload: &[u8],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;
    Ok(constant_time_eq(&expected, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let sig = hmac_sha256_hex("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let sig = hmac_sha256_hex("whsec_test", b"1700000000.{}").unwrap();
        assert!(verify_hmac_sha256("whsec_test", b"1700000000.{}", &sig).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let sig = hmac_sha256_hex("whsec_test", b"1700000000.{}").unwrap();
        assert!(!verify_hmac_sha256("whsec_test", b"1700000000.{\"x\":1}", &sig).unwrap());
    }

    #[test]
    fn length_mismatch_is_not_equal() {
        assert!(!constant_time_eq("abcd", "abc"));
    }
}
