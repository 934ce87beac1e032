//! `Content-Digest` computation and verification.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::core::error::HttpSigError;

/// Compute the `Content-Digest` header value for `body`: `sha-256=:<base64-standard>:`.
pub fn compute_content_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    format!("sha-256=:{}:", STANDARD.encode(hash))
}

/// Verify that `header_value` matches the independently-computed digest of `body`.
pub fn verify_content_digest(header_value: &str, body: &[u8]) -> Result<(), HttpSigError> {
    let expected = compute_content_digest(body);
    let matches: bool = expected.as_bytes().ct_eq(header_value.as_bytes()).into();
    if matches {
        Ok(())
    } else {
        Err(HttpSigError::BodyTampered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrips() {
        let body = br#"{"a":1}"#;
        let header = compute_content_digest(body);
        assert!(verify_content_digest(&header, body).is_ok());
    }

    #[test]
    fn tampered_body_fails_digest() {
        let header = compute_content_digest(br#"{"a":1}"#);
        assert!(matches!(
            verify_content_digest(&header, br#"{"a":2}"#),
            Err(HttpSigError::BodyTampered)
        ));
    }
}
