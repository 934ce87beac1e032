//! Signs outgoing HTTP messages. Dispatches on whether the
//! caller holds a live session (HMAC-SHA-256 over the session's outbound
//! MAC key) or is signing as a DID-anchored identity directly (Ed25519 or
//! Secp256k1). Mirrors the invoker-side signing half of the nexus-sdk
//! `sign_invoke_request_v1`/`sign_invoke_response_v1` split, generalized
//! from fixed JSON claims to RFC 9421 component lines.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::instrument;

use crate::core::constants::ALG_HMAC_SHA256;
use crate::core::error::HttpSigError;
use crate::crypto::SigningKeypair;
use crate::httpsig::canonical::{build_signature_base, Component, HttpRequestMeta, SignatureParams};
use crate::session::Session;

/// The key material backing a signature ("Key resolution").
pub enum SigningKey<'a> {
    /// HMAC-SHA-256 with a live session's outbound MAC key; `key_id` becomes
    /// the `keyid` signature parameter.
    Session { key_id: String, session: &'a Session },
    /// An asymmetric signature under this side's long-term key; `keyid` is
    /// this side's own DID.
    Asymmetric { keyid: String, signing_key: &'a SigningKeypair },
}

/// The rendered `Signature-Input` and `Signature` header values for one request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// The `Signature-Input` header value (without the leading header name).
    pub signature_input: String,
    /// The `Signature` header value (without the leading header name).
    pub signature: String,
}

/// Sign `request` over `components`, producing the headers to attach.
#[instrument(skip(request, components, nonce, key))]
pub fn sign_request(
    request: &HttpRequestMeta,
    components: &[Component],
    created: i64,
    nonce: Option<String>,
    key: &SigningKey,
) -> Result<SignedHeaders, HttpSigError> {
    let (keyid, alg) = match key {
        SigningKey::Session { key_id, .. } => (key_id.clone(), ALG_HMAC_SHA256.to_string()),
        SigningKey::Asymmetric { keyid, signing_key } => {
            (keyid.clone(), signing_key.verifying_key().alg_label().to_string())
        }
    };

    let params = SignatureParams {
        created,
        keyid,
        alg,
        nonce,
    };
    let base = build_signature_base(request, components, &params)?;

    let signature = match key {
        SigningKey::Session { session, .. } => session.sign_outbound_mac(base.as_bytes()),
        SigningKey::Asymmetric { signing_key, .. } => signing_key.sign(base.as_bytes()),
    };

    Ok(SignedHeaders {
        signature_input: format!("sig1={}", params.serialized(components)),
        signature: format!("sig1=:{}:", STANDARD.encode(signature)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionPolicy;
    use crate::crypto::derive_directional_keys;
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
    fn session_signing_uses_hmac_algorithm_label() {
        let keys = derive_directional_keys(&[7u8; 32], "sess-1");
        let session = Session::new(SessionId::new("sess-1".into()), Role::Initiator, keys, SessionPolicy::default());
        let headers = vec![];
        let request = sample_request(&headers);
        let components = vec![Component::Method, Component::Path];

        let signed = sign_request(
            &request,
            &components,
            1000,
            None,
            &SigningKey::Session {
                key_id: "key-1".into(),
                session: &session,
            },
        )
        .unwrap();

        assert!(signed.signature_input.contains("alg=\"hmac-sha256\""));
        assert!(signed.signature_input.contains("keyid=\"key-1\""));
    }

    #[test]
    fn asymmetric_signing_uses_key_algorithm_label() {
        let signing_key = SigningKeypair::generate_ed25519();
        let headers = vec![];
        let request = sample_request(&headers);
        let components = vec![Component::Method, Component::Path];

        let signed = sign_request(
            &request,
            &components,
            1000,
            Some("nonce-1".into()),
            &SigningKey::Asymmetric {
                keyid: "did:sage:ethereum:0xAAA".into(),
                signing_key: &signing_key,
            },
        )
        .unwrap();

        assert!(signed.signature_input.contains("alg=\"ed25519\""));
        assert!(signed.signature_input.contains("nonce=\"nonce-1\""));
    }
}
