//! Ephemeral-ECDH four-message handshake variant:
//! Invitation -> Request -> Response -> Complete.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::constants::LABEL_ECDH_HANDSHAKE;
use crate::core::error::HandshakeError;
use crate::crypto::{self, derive_session_id, derive_session_seed, EphemeralSecret, VerifyingKeyHandle};
use crate::handshake::hpke_flow::HandshakeOutcome;
use crate::handshake::pending::PendingHandshakeMap;

const ENVELOPE_INFO: &[u8] = b"sage/ecdh-envelope v1";
const ENVELOPE_EXPORT_CONTEXT: &[u8] = b"sage/ecdh-envelope-aead v1";

/// Message 1, Invitation (initiator -> responder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationMessage {
    /// The handshake's context identifier.
    pub context_id: String,
    /// Unix-seconds timestamp.
    pub timestamp: i64,
    /// The initiator's DID.
    pub initiator_did: String,
}

/// Message 2, Request (initiator -> responder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    /// The handshake's context identifier.
    pub context_id: String,
    /// `HPKE-enc (32 B) || AEAD-ciphertext-with-tag` over the initiator's
    /// ephemeral public key, encrypted to the responder's KEM key.
    pub enc_ephemeral: Vec<u8>,
}

/// Message 3, Response (responder -> initiator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// The handshake's context identifier.
    pub context_id: String,
    /// `HPKE-enc (32 B) || AEAD-ciphertext-with-tag` over the responder's
    /// ephemeral public key, encrypted to the initiator's KEM key.
    pub enc_ephemeral: Vec<u8>,
}

/// Message 4, Complete (initiator -> responder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteMessage {
    /// The handshake's context identifier.
    pub context_id: String,
    /// Unix-seconds timestamp.
    pub timestamp: i64,
}

/// The key id piggybacked on the Complete response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAck {
    /// The key id the responder bound to its new session.
    pub key_id: String,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs() as i64
}

fn canonical_bytes<T: Serialize>(message: &T) -> Vec<u8> {
    serde_json::to_vec(message).expect("handshake messages contain no non-serializable fields")
}

fn encrypt_ephemeral_pub(
    recipient_kem_pub: &[u8; 32],
    aad: &[u8],
    ephemeral_pub: &[u8; 32],
) -> Vec<u8> {
    let sender_ctx = crypto::setup_base_sender(recipient_kem_pub, ENVELOPE_INFO);
    let mut base_secret = [0u8; 32];
    base_secret.copy_from_slice(&sender_ctx.export(ENVELOPE_EXPORT_CONTEXT, 32));
    let ciphertext =
        crypto::seal(&base_secret, aad, ephemeral_pub).expect("sealing a fixed 32-byte payload cannot fail");

    let mut envelope = Vec::with_capacity(32 + ciphertext.len());
    envelope.extend_from_slice(&sender_ctx.enc);
    envelope.extend_from_slice(&ciphertext);
    envelope
}

fn decrypt_ephemeral_pub(
    recipient_kem: &crypto::KemKeypair,
    aad: &[u8],
    envelope: &[u8],
) -> Result<[u8; 32], HandshakeError> {
    if envelope.len() <= 32 {
        return Err(HandshakeError::Crypto("ECDH envelope too short".into()));
    }
    let mut enc = [0u8; 32];
    enc.copy_from_slice(&envelope[..32]);
    let ciphertext = &envelope[32..];

    let dh = recipient_kem.diffie_hellman(&enc);
    let receiver_ctx =
        crypto::setup_base_receiver(&dh, &enc, &recipient_kem.public_key(), ENVELOPE_INFO);
    let mut base_secret = [0u8; 32];
    base_secret.copy_from_slice(&receiver_ctx.export(ENVELOPE_EXPORT_CONTEXT, 32));

    let plaintext = crypto::open(&base_secret, aad, ciphertext)?;
    <[u8; 32]>::try_from(plaintext.as_slice())
        .map_err(|_| HandshakeError::Crypto("decrypted ephemeral key has the wrong length".into()))
}

/// Build and sign the Invitation message.
pub fn invite(
    context_id: &str,
    initiator_did: &str,
    initiator_signing_key: &crypto::SigningKeypair,
) -> (InvitationMessage, Vec<u8>) {
    let message = InvitationMessage {
        context_id: context_id.to_string(),
        timestamp: now_unix(),
        initiator_did: initiator_did.to_string(),
    };
    let signature = initiator_signing_key.sign(&canonical_bytes(&message));
    (message, signature)
}

/// Verify an inbound Invitation.
pub fn receive_invitation(
    invitation: &InvitationMessage,
    signature: &[u8],
    initiator_verifying_key: &VerifyingKeyHandle,
    max_skew: Duration,
) -> Result<(), HandshakeError> {
    if !initiator_verifying_key.verify(&canonical_bytes(invitation), signature) {
        return Err(HandshakeError::BadSignature);
    }
    let now = now_unix();
    if (now - invitation.timestamp).unsigned_abs() as u64 > max_skew.as_secs() {
        return Err(HandshakeError::ClockSkew);
    }
    Ok(())
}

/// Initiator side of message 2: generate the initiator's ephemeral keypair,
/// seal its public half to the responder, and sign the Request envelope.
///
/// The returned [`EphemeralSecret`] must be held by the caller until
/// [`finalize_initiator`] consumes it after the Response arrives.
pub fn request(
    context_id: &str,
    responder_kem_pub: &[u8; 32],
    initiator_signing_key: &crypto::SigningKeypair,
) -> (RequestMessage, Vec<u8>, EphemeralSecret) {
    let ephemeral = EphemeralSecret::generate();
    let enc_ephemeral = encrypt_ephemeral_pub(responder_kem_pub, context_id.as_bytes(), &ephemeral.public_key());

    let message = RequestMessage {
        context_id: context_id.to_string(),
        enc_ephemeral,
    };
    let signature = initiator_signing_key.sign(&canonical_bytes(&message));
    (message, signature, ephemeral)
}

/// Responder side of message 2: verify the Request, decrypt the initiator's
/// ephemeral key, record [`PendingHandshake`](crate::handshake::pending::PendingHandshake)
/// state, and build the signed Response.
#[allow(clippy::too_many_arguments)]
pub fn receive_request(
    request: &RequestMessage,
    signature: &[u8],
    initiator_verifying_key: &VerifyingKeyHandle,
    responder_kem: &crypto::KemKeypair,
    initiator_kem_pub: &[u8; 32],
    responder_signing_key: &crypto::SigningKeypair,
    pending: &PendingHandshakeMap,
    now: Instant,
) -> Result<(ResponseMessage, Vec<u8>), HandshakeError> {
    if !initiator_verifying_key.verify(&canonical_bytes(request), signature) {
        return Err(HandshakeError::BadSignature);
    }

    let peer_ephemeral_pub = decrypt_ephemeral_pub(
        responder_kem,
        request.context_id.as_bytes(),
        &request.enc_ephemeral,
    )?;

    let self_ephemeral = EphemeralSecret::generate();
    let self_ephemeral_pub = self_ephemeral.public_key();
    pending.insert(request.context_id.clone(), peer_ephemeral_pub, self_ephemeral, now)?;

    let enc_ephemeral = encrypt_ephemeral_pub(initiator_kem_pub, request.context_id.as_bytes(), &self_ephemeral_pub);
    let message = ResponseMessage {
        context_id: request.context_id.clone(),
        enc_ephemeral,
    };
    let signature = responder_signing_key.sign(&canonical_bytes(&message));
    Ok((message, signature))
}

/// Initiator side of message 3: verify the Response and decrypt the
/// responder's ephemeral public key.
pub fn receive_response(
    response: &ResponseMessage,
    signature: &[u8],
    responder_verifying_key: &VerifyingKeyHandle,
    initiator_kem: &crypto::KemKeypair,
) -> Result<[u8; 32], HandshakeError> {
    if !responder_verifying_key.verify(&canonical_bytes(response), signature) {
        return Err(HandshakeError::BadSignature);
    }
    decrypt_ephemeral_pub(initiator_kem, response.context_id.as_bytes(), &response.enc_ephemeral)
}

/// Build and sign the Complete message.
pub fn complete(
    context_id: &str,
    initiator_signing_key: &crypto::SigningKeypair,
) -> (CompleteMessage, Vec<u8>) {
    let message = CompleteMessage {
        context_id: context_id.to_string(),
        timestamp: now_unix(),
    };
    let signature = initiator_signing_key.sign(&canonical_bytes(&message));
    (message, signature)
}

/// Responder side of message 4: verify Complete, retrieve the
/// `PendingHandshake`, derive the session seed, and return the outcome plus
/// the signed `CompleteAck` carrying the new key id.
pub fn receive_complete(
    complete: &CompleteMessage,
    signature: &[u8],
    initiator_verifying_key: &VerifyingKeyHandle,
    pending: &PendingHandshakeMap,
    now: Instant,
    max_skew: Duration,
    responder_signing_key: &crypto::SigningKeypair,
) -> Result<(HandshakeOutcome, String, CompleteAck, Vec<u8>), HandshakeError> {
    if !initiator_verifying_key.verify(&canonical_bytes(complete), signature) {
        return Err(HandshakeError::BadSignature);
    }
    let unix_now = now_unix();
    if (unix_now - complete.timestamp).unsigned_abs() as u64 > max_skew.as_secs() {
        return Err(HandshakeError::ClockSkew);
    }

    let entry = pending.take(&complete.context_id, now)?;
    let self_pub = entry.self_ephemeral.public_key();
    let peer_pub = entry.peer_ephemeral_pub;
    let shared_secret = entry.self_ephemeral.diffie_hellman(&peer_pub);

    let seed = derive_session_seed(LABEL_ECDH_HANDSHAKE, &complete.context_id, &self_pub, &peer_pub, &shared_secret);
    let session_id = derive_session_id(LABEL_ECDH_HANDSHAKE, &seed);

    let key_id = crate::session::KeyId::generate();
    let ack = CompleteAck {
        key_id: key_id.as_str().to_string(),
    };
    let ack_signature = responder_signing_key.sign(&canonical_bytes(&ack));

    Ok((HandshakeOutcome { seed, session_id }, key_id.as_str().to_string(), ack, ack_signature))
}

/// Initiator's final step: combine the held ephemeral secret with the
/// responder's ephemeral public key (from [`receive_response`]) to derive
/// the same session materials the responder computed in
/// [`receive_complete`].
pub fn finalize_initiator(
    self_ephemeral: EphemeralSecret,
    context_id: &str,
    peer_ephemeral_pub: &[u8; 32],
) -> HandshakeOutcome {
    let self_pub = self_ephemeral.public_key();
    let shared_secret = self_ephemeral.diffie_hellman(peer_ephemeral_pub);
    let seed = derive_session_seed(LABEL_ECDH_HANDSHAKE, context_id, &self_pub, peer_ephemeral_pub, &shared_secret);
    let session_id = derive_session_id(LABEL_ECDH_HANDSHAKE, &seed);
    HandshakeOutcome { seed, session_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KemKeypair, SigningKeypair};

    #[test]
    fn four_message_handshake_converges_on_identical_session() {
        let initiator_signing = SigningKeypair::generate_ed25519();
        let responder_signing = SigningKeypair::generate_ed25519();
        let initiator_kem = KemKeypair::generate();
        let responder_kem = KemKeypair::generate();
        let pending = PendingHandshakeMap::new(Duration::from_secs(900));
        let now = Instant::now();
        let max_skew = Duration::from_secs(120);

        let (invitation, sig) = invite("ctx-1", "did:sage:ethereum:0xAAA", &initiator_signing);
        receive_invitation(&invitation, &sig, &initiator_signing.verifying_key(), max_skew).unwrap();

        let (req, req_sig, initiator_ephemeral) =
            request("ctx-1", &responder_kem.public_key(), &initiator_signing);

        let (resp, resp_sig) = receive_request(
            &req,
            &req_sig,
            &initiator_signing.verifying_key(),
            &responder_kem,
            &initiator_kem.public_key(),
            &responder_signing,
            &pending,
            now,
        )
        .unwrap();

        let peer_ephemeral_pub = receive_response(
            &resp,
            &resp_sig,
            &responder_signing.verifying_key(),
            &initiator_kem,
        )
        .unwrap();

        let (comp, comp_sig) = complete("ctx-1", &initiator_signing);
        let (responder_outcome, key_id, _ack, _ack_sig) = receive_complete(
            &comp,
            &comp_sig,
            &initiator_signing.verifying_key(),
            &pending,
            now,
            max_skew,
            &responder_signing,
        )
        .unwrap();

        let initiator_outcome = finalize_initiator(initiator_ephemeral, "ctx-1", &peer_ephemeral_pub);

        assert_eq!(responder_outcome.session_id, initiator_outcome.session_id);
        assert!(!key_id.is_empty());
    }

    #[test]
    fn complete_without_prior_request_is_unknown_peer() {
        let initiator_signing = SigningKeypair::generate_ed25519();
        let responder_signing = SigningKeypair::generate_ed25519();
        let pending = PendingHandshakeMap::new(Duration::from_secs(900));

        let (comp, comp_sig) = complete("ctx-absent", &initiator_signing);
        let result = receive_complete(
            &comp,
            &comp_sig,
            &initiator_signing.verifying_key(),
            &pending,
            Instant::now(),
            Duration::from_secs(120),
            &responder_signing,
        );
        assert!(matches!(result, Err(HandshakeError::UnknownPeer)));
    }

    #[test]
    fn expired_pending_handshake_rejects_complete() {
        let initiator_signing = SigningKeypair::generate_ed25519();
        let responder_signing = SigningKeypair::generate_ed25519();
        let initiator_kem = KemKeypair::generate();
        let responder_kem = KemKeypair::generate();
        let pending = PendingHandshakeMap::new(Duration::from_millis(10));
        let t0 = Instant::now();

        let (req, req_sig, _initiator_ephemeral) =
            request("ctx-1", &responder_kem.public_key(), &initiator_signing);
        receive_request(
            &req,
            &req_sig,
            &initiator_signing.verifying_key(),
            &responder_kem,
            &initiator_kem.public_key(),
            &responder_signing,
            &pending,
            t0,
        )
        .unwrap();

        let (comp, comp_sig) = complete("ctx-1", &initiator_signing);
        let result = receive_complete(
            &comp,
            &comp_sig,
            &initiator_signing.verifying_key(),
            &pending,
            t0 + Duration::from_millis(50),
            Duration::from_secs(120),
            &responder_signing,
        );
        assert!(matches!(result, Err(HandshakeError::Expired)));
    }

    #[test]
    fn tampered_envelope_fails_decryption() {
        let initiator_signing = SigningKeypair::generate_ed25519();
        let responder_signing = SigningKeypair::generate_ed25519();
        let initiator_kem = KemKeypair::generate();
        let responder_kem = KemKeypair::generate();
        let pending = PendingHandshakeMap::new(Duration::from_secs(900));

        let (mut req, _req_sig, _eph) = request("ctx-1", &responder_kem.public_key(), &initiator_signing);
        *req.enc_ephemeral.last_mut().unwrap() ^= 0xff;
        let req_sig = initiator_signing.sign(&canonical_bytes(&req));

        let result = receive_request(
            &req,
            &req_sig,
            &initiator_signing.verifying_key(),
            &responder_kem,
            &initiator_kem.public_key(),
            &responder_signing,
            &pending,
            Instant::now(),
        );
        assert!(result.is_err());
    }
}
