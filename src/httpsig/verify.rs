//! Verifies inbound HTTP messages: resolves `keyid` against the
//! Session Manager's key-id index first, falling back to a caller-supplied
//! DID-resolved key, then checks freshness, replay, and (when covered)
//! `Content-Digest` before accepting the signature.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{instrument, warn};

use crate::core::error::HttpSigError;
use crate::crypto::VerifyingKeyHandle;
use crate::httpsig::canonical::{build_signature_base, Component, HttpRequestMeta, SignatureParams};
use crate::httpsig::digest::verify_content_digest;
use crate::nonce::{NonceCache, NonceVerdict};
use crate::session::{KeyId, SessionManager};

/// A parsed `Signature-Input`/`Signature` header pair, before verification.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// The covered components, in the order the signer chose.
    pub components: Vec<Component>,
    /// The `@signature-params` fields.
    pub params: SignatureParams,
    /// The raw signature bytes.
    pub signature: Vec<u8>,
}

/// Parse the `sig1=(...)...` `Signature-Input` value and the `sig1=:...:`
/// `Signature` value.
pub fn parse_signature_headers(signature_input: &str, signature: &str) -> Result<ParsedSignature, HttpSigError> {
    let body = signature_input
        .strip_prefix("sig1=")
        .ok_or(HttpSigError::MalformedSignature)?;
    if !body.starts_with('(') {
        return Err(HttpSigError::MalformedSignature);
    }
    let close = body.find(')').ok_or(HttpSigError::MalformedSignature)?;
    let list = &body[1..close];

    let components = list
        .split_whitespace()
        .map(|token| Component::parse(token.trim_matches('"')))
        .collect::<Result<Vec<_>, _>>()?;
    if components.is_empty() {
        return Err(HttpSigError::MalformedSignature);
    }

    let mut created = None;
    let mut keyid = None;
    let mut alg = None;
    let mut nonce = None;
    for part in body[close + 1..].split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = part.split_once('=').ok_or(HttpSigError::MalformedSignature)?;
        let value = value.trim_matches('"');
        match key {
            "created" => created = Some(value.parse::<i64>().map_err(|_| HttpSigError::MalformedSignature)?),
            "keyid" => keyid = Some(value.to_string()),
            "alg" => alg = Some(value.to_string()),
            "nonce" => nonce = Some(value.to_string()),
            _ => {}
        }
    }

    let params = SignatureParams {
        created: created.ok_or(HttpSigError::MalformedSignature)?,
        keyid: keyid.ok_or(HttpSigError::MalformedSignature)?,
        alg: alg.ok_or(HttpSigError::MalformedSignature)?,
        nonce,
    };

    let sig_body = signature
        .strip_prefix("sig1=:")
        .and_then(|s| s.strip_suffix(':'))
        .ok_or(HttpSigError::MalformedSignature)?;
    let signature = STANDARD.decode(sig_body).map_err(|_| HttpSigError::MalformedSignature)?;

    Ok(ParsedSignature {
        components,
        params,
        signature,
    })
}

/// Verify a parsed signature against `request`/`body`: freshness, replay,
/// `Content-Digest` (if covered), then the signature itself. `keyid` is
/// matched against the Session Manager first; `did_verifying_key` is the
/// fallback asymmetric key when no session owns that key id.
#[allow(clippy::too_many_arguments)]
#[instrument(skip(request, body, parsed, nonce_cache, session_manager, did_verifying_key), fields(keyid = %parsed.params.keyid))]
pub fn verify_request(
    request: &HttpRequestMeta,
    body: Option<&[u8]>,
    parsed: &ParsedSignature,
    now: i64,
    max_skew: Duration,
    nonce_cache: &NonceCache,
    session_manager: &SessionManager,
    did_verifying_key: Option<&VerifyingKeyHandle>,
) -> Result<(), HttpSigError> {
    if now.abs_diff(parsed.params.created) > max_skew.as_secs() {
        warn!("signature timestamp outside allowed skew");
        return Err(HttpSigError::Stale);
    }

    if let Some(nonce) = &parsed.params.nonce {
        match nonce_cache.check_and_store(nonce.as_bytes(), Instant::now()) {
            NonceVerdict::Accepted => {}
            NonceVerdict::Duplicate => {
                warn!("replayed signature nonce");
                return Err(HttpSigError::ReplayedNonce);
            }
            NonceVerdict::Malformed => return Err(HttpSigError::MalformedSignature),
        }
    }

    let covers_digest = parsed
        .components
        .iter()
        .any(|c| matches!(c, Component::Header(name) if name.eq_ignore_ascii_case("content-digest")));
    if covers_digest {
        let body = body.ok_or(HttpSigError::BodyTampered)?;
        let header_value = request.header_value("content-digest").ok_or(HttpSigError::BodyTampered)?;
        verify_content_digest(&header_value, body)?;
    }

    let base = build_signature_base(request, &parsed.components, &parsed.params)
        .map_err(|_| HttpSigError::MalformedSignature)?;

    if let Some(session) = session_manager.get_by_key_id(&KeyId::new(parsed.params.keyid.clone())) {
        let session = session.read();
        return session
            .verify_inbound_mac(base.as_bytes(), &parsed.signature)
            .map_err(|_| HttpSigError::BadSignature);
    }

    let verifying_key = did_verifying_key.ok_or(HttpSigError::UnknownKey)?;
    if verifying_key.verify(base.as_bytes(), &parsed.signature) {
        Ok(())
    } else {
        warn!("asymmetric signature verification failed");
        Err(HttpSigError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionPolicy;
    use crate::crypto::{derive_directional_keys, SigningKeypair};
    use crate::httpsig::sign::{sign_request, SigningKey};
    use crate::session::{Role, Session, SessionId};

    fn sample_request<'a>(headers: &'a [(String, String)]) -> HttpRequestMeta<'a> {
        HttpRequestMeta {
            method: "POST",
            path: "/v1/messages",
            query: None,
            authority: "agent.example.com",
            headers,
        }
    }

    #[test]
    fn session_bound_signature_verifies_via_key_id_index() {
        let keys = derive_directional_keys(&[11u8; 32], "sess-1");
        let session_id = SessionId::new("sess-1".into());
        let manager = SessionManager::new(SessionPolicy::default());
        manager.create(session_id.clone(), Role::Responder, keys).unwrap();
        manager.bind_key_id(KeyId::new("key-1".into()), session_id.clone()).unwrap();

        let session_handle = manager.get_by_id(&session_id).unwrap();
        let headers = vec![];
        let request = sample_request(&headers);
        let components = vec![Component::Method, Component::Path];

        let signed = {
            let guard = session_handle.read();
            sign_request(
                &request,
                &components,
                1000,
                None,
                &SigningKey::Session {
                    key_id: "key-1".into(),
                    session: &guard,
                },
            )
            .unwrap()
        };

        let parsed = parse_signature_headers(&signed.signature_input, &signed.signature).unwrap();
        let nonce_cache = NonceCache::default();
        let result = verify_request(
            &request,
            None,
            &parsed,
            1000,
            Duration::from_secs(120),
            &nonce_cache,
            &manager,
            None,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn asymmetric_signature_fails_without_matching_key() {
        let signing_key = SigningKeypair::generate_ed25519();
        let headers = vec![];
        let request = sample_request(&headers);
        let components = vec![Component::Method, Component::Path];

        let signed = sign_request(
            &request,
            &components,
            1000,
            None,
            &SigningKey::Asymmetric {
                keyid: "did:sage:ethereum:0xAAA".into(),
                signing_key: &signing_key,
            },
        )
        .unwrap();
        let parsed = parse_signature_headers(&signed.signature_input, &signed.signature).unwrap();

        let manager = SessionManager::new(SessionPolicy::default());
        let nonce_cache = NonceCache::default();
        let other_key = SigningKeypair::generate_ed25519().verifying_key();
        let result = verify_request(
            &request,
            None,
            &parsed,
            1000,
            Duration::from_secs(120),
            &nonce_cache,
            &manager,
            Some(&other_key),
        );
        assert!(matches!(result, Err(HttpSigError::BadSignature)));
    }

    #[test]
    fn stale_created_timestamp_is_rejected() {
        let signing_key = SigningKeypair::generate_ed25519();
        let headers = vec![];
        let request = sample_request(&headers);
        let components = vec![Component::Method];

        let signed = sign_request(
            &request,
            &components,
            1000,
            None,
            &SigningKey::Asymmetric {
                keyid: "did:sage:ethereum:0xAAA".into(),
                signing_key: &signing_key,
            },
        )
        .unwrap();
        let parsed = parse_signature_headers(&signed.signature_input, &signed.signature).unwrap();

        let manager = SessionManager::new(SessionPolicy::default());
        let nonce_cache = NonceCache::default();
        let verifying_key = signing_key.verifying_key();
        let result = verify_request(
            &request,
            None,
            &parsed,
            1000 + 1000,
            Duration::from_secs(120),
            &nonce_cache,
            &manager,
            Some(&verifying_key),
        );
        assert!(matches!(result, Err(HttpSigError::Stale)));
    }

    #[test]
    fn missing_content_digest_header_fails_closed() {
        let signing_key = SigningKeypair::generate_ed25519();
        let headers = vec![];
        let request = sample_request(&headers);
        let components = vec![Component::Method, Component::Header("content-digest".into())];

        let signed = sign_request(
            &request,
            &components,
            1000,
            None,
            &SigningKey::Asymmetric {
                keyid: "did:sage:ethereum:0xAAA".into(),
                signing_key: &signing_key,
            },
        );
        assert!(signed.is_err());
    }
}
