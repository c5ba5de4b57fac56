use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `payload` under `secret`.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature using constant-time comparison.
///
/// The provided signature must match the lowercase hex digest byte for byte.
pub fn verify_hmac_sha256_hex(
    secret: &str,
    payload: &str,
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;

    if expected.len() != signature.len() {
        return Ok(false);
    }

    Ok(expected.as_bytes().ct_eq(signature.as_bytes()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret";
    const PAYLOAD: &str = "order_123|pay_456";

    #[test]
    fn test_signature_generation_and_verification() {
        let signature = hmac_sha256_hex(SECRET, PAYLOAD).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_hmac_sha256_hex(SECRET, PAYLOAD, &signature).unwrap());
    }

    #[test]
    fn test_case_flipped_or_padded_signature_is_rejected() {
        let signature = hmac_sha256_hex(SECRET, PAYLOAD).unwrap();

        // Flip bit 0x20 of the first hex letter: 'a'..'f' becomes 'A'..'F'.
        let mut bytes = signature.clone().into_bytes();
        let letter = bytes
            .iter()
            .position(|b| b.is_ascii_alphabetic())
            .unwrap();
        bytes[letter] ^= 0x20;
        let case_flipped = String::from_utf8(bytes).unwrap();

        assert!(!verify_hmac_sha256_hex(SECRET, PAYLOAD, &case_flipped).unwrap());
        assert!(!verify_hmac_sha256_hex(SECRET, PAYLOAD, &signature.to_uppercase()).unwrap());
        assert!(!verify_hmac_sha256_hex(SECRET, PAYLOAD, &format!(" {}\n", signature)).unwrap());
    }

    #[test]
    fn test_single_bit_flip_is_rejected() {
        let signature = hmac_sha256_hex(SECRET, PAYLOAD).unwrap();
        let mut bytes = hex::decode(&signature).unwrap();
        bytes[7] ^= 0x01;
        let tampered = hex::encode(bytes);

        assert!(!verify_hmac_sha256_hex(SECRET, PAYLOAD, &tampered).unwrap());
    }

    #[test]
    fn test_wrong_secret_or_payload() {
        let signature = hmac_sha256_hex(SECRET, PAYLOAD).unwrap();
        assert!(!verify_hmac_sha256_hex("other", PAYLOAD, &signature).unwrap());
        assert!(!verify_hmac_sha256_hex(SECRET, "order_123|pay_457", &signature).unwrap());
        assert!(!verify_hmac_sha256_hex(SECRET, PAYLOAD, "").unwrap());
    }
}
