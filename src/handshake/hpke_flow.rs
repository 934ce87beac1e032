//! HPKE single-round-trip handshake variant.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::core::constants::{
    HANDSHAKE_NONCE_SIZE, LABEL_HPKE_EXPORT, LABEL_HPKE_HANDSHAKE, LABEL_HPKE_INFO,
    SESSION_SEED_SIZE,
};
use crate::core::error::HandshakeError;
use crate::crypto::{self, derive_directional_keys, derive_session_id, VerifyingKeyHandle};

type HmacSha256 = Hmac<Sha256>;

/// Message 1, Init (initiator -> responder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitMessage {
    /// The HPKE encapsulated key.
    pub enc: [u8; 32],
    /// Domain-separation bytes: `LABEL_HPKE_INFO || initiator_did || responder_did`.
    pub info: Vec<u8>,
    /// `LABEL_HPKE_EXPORT || context_id`.
    pub export_context: Vec<u8>,
    /// Fresh randomness, checked against the Nonce Cache.
    pub nonce: [u8; HANDSHAKE_NONCE_SIZE],
    /// Unix-seconds timestamp.
    pub ts: i64,
    /// The initiator's DID.
    pub initiator_did: String,
    /// The responder's DID.
    pub responder_did: String,
}

/// Message 2, Ack (responder -> initiator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckMessage {
    /// The key id the responder bound to its new session.
    pub key_id: String,
    /// `HMAC-SHA-256(exporter, context_id || nonce || key_id)`.
    pub ack_tag: [u8; 32],
    /// Unix-seconds timestamp.
    pub ts: i64,
}

/// Build the `info` field for a given DID pair.
pub fn build_info(initiator_did: &str, responder_did: &str) -> Vec<u8> {
    let mut info = Vec::with_capacity(LABEL_HPKE_INFO.len() + initiator_did.len() + responder_did.len());
    info.extend_from_slice(LABEL_HPKE_INFO);
    info.extend_from_slice(initiator_did.as_bytes());
    info.extend_from_slice(responder_did.as_bytes());
    info
}

/// Build the `export_context` field for a given `context_id`.
pub fn build_export_context(context_id: &str) -> Vec<u8> {
    let mut export_context = Vec::with_capacity(LABEL_HPKE_EXPORT.len() + context_id.len());
    export_context.extend_from_slice(LABEL_HPKE_EXPORT);
    export_context.extend_from_slice(context_id.as_bytes());
    export_context
}

/// Recover `context_id` from a previously built `export_context`, or `None`
/// if it doesn't carry the expected label prefix.
pub fn parse_context_id(export_context: &[u8]) -> Option<String> {
    let rest = export_context.strip_prefix(LABEL_HPKE_EXPORT)?;
    std::str::from_utf8(rest).ok().map(str::to_string)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs() as i64
}

/// Canonical byte encoding used to compute and verify envelope signatures.
///
/// Every field here has a fixed width or is a length-prefixed-by-type
/// serde field (no maps, no floats), so `serde_json`'s declaration-order
/// struct encoding is already a stable serializer ("Canonicalization
/// pitfalls").
fn canonical_bytes<T: Serialize>(message: &T) -> Vec<u8> {
    serde_json::to_vec(message).expect("handshake messages contain no non-serializable fields")
}

/// Output of a successful HPKE handshake: the materials the engine needs
/// to hand to the Session Manager.
pub struct HandshakeOutcome {
    /// The 32-byte seed from which directional keys are derived.
    pub seed: [u8; SESSION_SEED_SIZE],
    /// The session identifier both sides converge on independently.
    pub session_id: String,
}

fn finalize_seed(exporter: Vec<u8>) -> HandshakeOutcome {
    let mut seed = [0u8; SESSION_SEED_SIZE];
    seed.copy_from_slice(&exporter);
    let session_id = derive_session_id(LABEL_HPKE_HANDSHAKE, &seed);
    let mut exporter = exporter;
    exporter.zeroize();
    HandshakeOutcome { seed, session_id }
}

/// Initiator side of message 1: build the signed Init envelope and the
/// exporter secret the initiator needs to verify the eventual Ack.
pub struct InitiatorStart {
    /// The envelope to sign and send.
    pub message: InitMessage,
    /// Signature over `canonical_bytes(&message)`.
    pub signature: Vec<u8>,
    /// The freshly-derived session materials, pre-created before the Ack
    /// arrives ("pre-create its local Session").
    pub outcome: HandshakeOutcome,
    exporter: Vec<u8>,
}

/// Build and sign the Init message, running `SetupBaseS` against the
/// responder's KEM public key.
pub fn initiate(
    initiator_did: &str,
    responder_did: &str,
    context_id: &str,
    responder_kem_pk: &[u8; 32],
    initiator_signing_key: &crypto::SigningKeypair,
) -> InitiatorStart {
    let info = build_info(initiator_did, responder_did);
    let export_context = build_export_context(context_id);

    let sender_ctx = crypto::setup_base_sender(responder_kem_pk, &info);
    let exporter = sender_ctx.export(&export_context, 32);

    let mut nonce = [0u8; HANDSHAKE_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let message = InitMessage {
        enc: sender_ctx.enc,
        info,
        export_context,
        nonce,
        ts: now_unix(),
        initiator_did: initiator_did.to_string(),
        responder_did: responder_did.to_string(),
    };
    let signature = initiator_signing_key.sign(&canonical_bytes(&message));
    let outcome = finalize_seed(exporter.clone());

    InitiatorStart {
        message,
        signature,
        outcome,
        exporter,
    }
}

/// Responder side: verify and process an incoming Init, returning the
/// session materials plus the signed Ack to send back.
pub struct ResponderAck {
    /// The envelope to sign and send.
    pub message: AckMessage,
    /// Signature over `canonical_bytes(&message)`.
    pub signature: Vec<u8>,
    /// The freshly-derived session materials.
    pub outcome: HandshakeOutcome,
}

/// Process an Init message as the responder.
///
/// `check_nonce` is a closure so callers can thread the Nonce Cache through
/// without this module depending on it directly; it should return `true`
/// iff the nonce was freshly accepted.
#[allow(clippy::too_many_arguments)]
pub fn respond(
    init: &InitMessage,
    init_signature: &[u8],
    initiator_verifying_key: &VerifyingKeyHandle,
    responder_kem: &crypto::KemKeypair,
    responder_signing_key: &crypto::SigningKeypair,
    max_skew: Duration,
    check_nonce: impl FnOnce(&[u8; HANDSHAKE_NONCE_SIZE]) -> bool,
) -> Result<ResponderAck, HandshakeError> {
    if !initiator_verifying_key.verify(&canonical_bytes(init), init_signature) {
        return Err(HandshakeError::BadSignature);
    }

    let now = now_unix();
    if (now - init.ts).unsigned_abs() as u64 > max_skew.as_secs() {
        return Err(HandshakeError::ClockSkew);
    }

    if !check_nonce(&init.nonce) {
        return Err(HandshakeError::ReplayedNonce);
    }

    let context_id = parse_context_id(&init.export_context)
        .ok_or(HandshakeError::TamperedInfo)?;
    let expected_info = build_info(&init.initiator_did, &init.responder_did);
    let expected_export_context = build_export_context(&context_id);
    if expected_info != init.info || expected_export_context != init.export_context {
        return Err(HandshakeError::TamperedInfo);
    }

    let dh = responder_kem.diffie_hellman(&init.enc);
    let receiver_ctx =
        crypto::setup_base_receiver(&dh, &init.enc, &responder_kem.public_key(), &init.info);
    let exporter = receiver_ctx.export(&init.export_context, 32);
    let outcome = finalize_seed(exporter.clone());

    let key_id = crate::session::KeyId::generate();
    let ack_tag = ack_tag(&exporter, &context_id, &init.nonce, key_id.as_str());

    let message = AckMessage {
        key_id: key_id.as_str().to_string(),
        ack_tag,
        ts: now_unix(),
    };
    let signature = responder_signing_key.sign(&canonical_bytes(&message));

    Ok(ResponderAck {
        message,
        signature,
        outcome,
    })
}

fn ack_tag(exporter: &[u8], context_id: &str, nonce: &[u8; HANDSHAKE_NONCE_SIZE], key_id: &str) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(exporter).expect("HMAC accepts any key length");
    mac.update(context_id.as_bytes());
    mac.update(nonce);
    mac.update(key_id.as_bytes());
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Initiator side of message 2: verify the Ack and, on success, return the
/// key id to bind to the pre-created session.
pub fn complete(
    start: &InitiatorStart,
    context_id: &str,
    ack: &AckMessage,
    ack_signature: &[u8],
    responder_verifying_key: &VerifyingKeyHandle,
) -> Result<String, HandshakeError> {
    if !responder_verifying_key.verify(&canonical_bytes(ack), ack_signature) {
        return Err(HandshakeError::BadSignature);
    }

    let expected = ack_tag(&start.exporter, context_id, &start.message.nonce, &ack.key_id);
    if !bool::from(expected.ct_eq(&ack.ack_tag)) {
        return Err(HandshakeError::BadSignature);
    }

    Ok(ack.key_id.clone())
}
