//! HMAC-SHA256 webhook signatures

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex encoded signature of the raw body
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Hex encoded HMAC-SHA256 of `body`
pub fn sign(secret: &str, body: &[u8]) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::SecretNotConfigured)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a delivered signature against the raw body.
///
/// Fails closed: a missing or empty secret rejects every delivery. An
/// optional `sha256=` prefix on the signature is accepted.
pub fn verify(
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), GatewayError> {
    let secret = match secret {
        Some(s) if !s.is_empty() => s,
        _ => return Err(GatewayError::SecretNotConfigured),
    };
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(GatewayError::MissingSignature)?;
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let expected = hex::decode(signature).map_err(|_| GatewayError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::SecretNotConfigured)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| GatewayError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"TransID":"QK12345","TransAmount":"150.00"}"#;

    #[test]
    fn test_valid_signature() {
        let signature = sign("whsec", BODY).unwrap();
        assert!(verify(Some("whsec"), BODY, Some(&signature)).is_ok());
        let prefixed = format!("sha256={}", signature);
        assert!(verify(Some("whsec"), BODY, Some(&prefixed)).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signature = sign("whsec", BODY).unwrap();
        let result = verify(Some("whsec"), b"{}", Some(&signature));
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[test]
    fn test_fails_closed_without_secret() {
        let signature = sign("whsec", BODY).unwrap();
        assert!(matches!(
            verify(None, BODY, Some(&signature)),
            Err(GatewayError::SecretNotConfigured)
        ));
        assert!(matches!(
            verify(Some(""), BODY, Some(&signature)),
            Err(GatewayError::SecretNotConfigured)
        ));
    }

    #[test]
    fn test_missing_or_garbled_signature() {
        assert!(matches!(
            verify(Some("whsec"), BODY, None),
            Err(GatewayError::MissingSignature)
        ));
        assert!(matches!(
            verify(Some("whsec"), BODY, Some("not-hex")),
            Err(GatewayError::InvalidSignature)
        ));
    }
}
