//! A minimal HPKE instantiation: DHKEM(X25519, HKDF-SHA256), HKDF-SHA256,
//! ChaCha20-Poly1305 - RFC 9180's "base" mode, §4.1/§7.1 ciphersuite.
//!
//! No registry-fetched crate provides an `hpke` implementation, so this is
//! built directly from the primitives the rest of the crate already uses,
//! mirroring the HKDF-from-shared-secret idiom the directional key
//! schedule in `crypto::kdf` also follows.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::core::error::HandshakeError;

const KEM_LABEL: &[u8] = b"sage/hpke-kem v1";
const EXPORTER_LABEL: &[u8] = b"sage/hpke-exporter v1";
const AEAD_KEY_LABEL: &[u8] = b"sage/hpke-aead-key v1";
const AEAD_BASE_NONCE_LABEL: &[u8] = b"sage/hpke-aead-nonce v1";

/// Output of `setup_base_sender`: the encapsulated key to send plus the
/// exporter secret used to derive the session's `sessionSeed`.
pub struct SenderContext {
    /// The HPKE encapsulated key (`enc`), 32 bytes for the X25519 KEM.
    pub enc: [u8; 32],
    exporter_secret: [u8; 32],
}

/// Output of `setup_base_receiver`: the exporter secret, matching
/// [`SenderContext::exporter_secret`] when both sides used the same `info`.
pub struct ReceiverContext {
    exporter_secret: [u8; 32],
}

impl Drop for SenderContext {
    fn drop(&mut self) {
        self.exporter_secret.zeroize();
    }
}

impl Drop for ReceiverContext {
    fn drop(&mut self) {
        self.exporter_secret.zeroize();
    }
}

fn kem_shared_secret(dh: &[u8; 32], enc: &[u8; 32], recipient_pub: &[u8; 32]) -> [u8; 32] {
    // RFC 9180 DHKEM's `ExtractAndExpand`: bind the DH output to both the
    // encapsulated key and the recipient's static public key so neither
    // side's messages can be replayed against a different KEM keypair.
    let hk = Hkdf::<Sha256>::new(Some(KEM_LABEL), dh);
    let mut out = [0u8; 32];
    let mut info = Vec::with_capacity(64);
    info.extend_from_slice(enc);
    info.extend_from_slice(recipient_pub);
    hk.expand(&info, &mut out)
        .expect("32 bytes is within HKDF-SHA256's output range");
    out
}

fn derive_exporter_secret(shared_secret: &[u8; 32], info: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut out = [0u8; 32];
    let mut labeled_info = Vec::with_capacity(EXPORTER_LABEL.len() + info.len());
    labeled_info.extend_from_slice(EXPORTER_LABEL);
    labeled_info.extend_from_slice(info);
    hk.expand(&labeled_info, &mut out)
        .expect("32 bytes is within HKDF-SHA256's output range");
    out
}

/// `SetupBaseS`: encapsulate to `recipient_pub`, binding `info`.
///
/// Returns the context carrying `enc` (to be sent) and the exporter secret.
pub fn setup_base_sender(recipient_pub: &[u8; 32], info: &[u8]) -> SenderContext {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let enc = *PublicKey::from(&ephemeral).as_bytes();
    let recipient = PublicKey::from(*recipient_pub);
    let dh = *ephemeral.diffie_hellman(&recipient).as_bytes();

    let shared_secret = kem_shared_secret(&dh, &enc, recipient_pub);
    let exporter_secret = derive_exporter_secret(&shared_secret, info);

    SenderContext {
        enc,
        exporter_secret,
    }
}

/// `SetupBaseR`: decapsulate `enc` given the DH output between the
/// recipient's static secret and `enc`, binding the same `info` the sender
/// used.
///
/// Takes the raw DH output rather than the secret scalar itself, so the
/// caller computes it through [`KemKeypair::diffie_hellman`](crate::crypto::KemKeypair::diffie_hellman)
/// and the long-term private scalar never leaves that type.
pub fn setup_base_receiver(dh: &[u8; 32], enc: &[u8; 32], recipient_pub: &[u8; 32], info: &[u8]) -> ReceiverContext {
    let shared_secret = kem_shared_secret(dh, enc, recipient_pub);
    let exporter_secret = derive_exporter_secret(&shared_secret, info);

    ReceiverContext { exporter_secret }
}

impl SenderContext {
    /// `Export(exporter_context, length)`.
    pub fn export(&self, exporter_context: &[u8], length: usize) -> Vec<u8> {
        export(&self.exporter_secret, exporter_context, length)
    }
}

impl ReceiverContext {
    /// `Export(exporter_context, length)`.
    pub fn export(&self, exporter_context: &[u8], length: usize) -> Vec<u8> {
        export(&self.exporter_secret, exporter_context, length)
    }
}

fn export(exporter_secret: &[u8; 32], exporter_context: &[u8], length: usize) -> Vec<u8> {
    let hk = Hkdf::<Sha256>::new(None, exporter_secret);
    let mut out = vec![0u8; length];
    hk.expand(exporter_context, &mut out)
        .expect("export length must be within HKDF-SHA256's output range");
    out
}

/// Seal a plaintext with a key derived from `base_secret` - used by the
/// ephemeral-ECDH variant to encrypt ephemeral public keys
/// to a peer's long-term KEM key using this same HPKE construction.
pub fn seal(base_secret: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
    let (key, nonce) = derive_aead_key_nonce(base_secret);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| HandshakeError::Crypto("HPKE seal failed".into()))
}

/// Open a ciphertext sealed by [`seal`] with the matching `base_secret`.
pub fn open(base_secret: &[u8; 32], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
    let (key, nonce) = derive_aead_key_nonce(base_secret);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| HandshakeError::Crypto("HPKE open failed".into()))
}

fn derive_aead_key_nonce(base_secret: &[u8; 32]) -> ([u8; 32], [u8; 12]) {
    let hk = Hkdf::<Sha256>::new(None, base_secret);
    let mut key = [0u8; 32];
    let mut nonce = [0u8; 12];
    hk.expand(AEAD_KEY_LABEL, &mut key)
        .expect("32 bytes is within HKDF-SHA256's output range");
    hk.expand(AEAD_BASE_NONCE_LABEL, &mut nonce)
        .expect("12 bytes is within HKDF-SHA256's output range");
    (key, nonce)
}
