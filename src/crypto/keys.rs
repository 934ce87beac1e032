//! Key types: KEM (X25519) keypairs and the signing-key sum type.
//!
//! The handshake engine and signature layer take signing/verification keys
//! by abstract handle (a sum type over the supported schemes) rather than
//! downcasting a trait object.

use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use k256::ecdsa::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature as K256Signature, SigningKey as K256SigningKey, VerifyingKey as K256VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};
use zeroize::Zeroize;

use crate::core::constants::PUBLIC_KEY_SIZE;

/// A long-term X25519 KEM keypair.
///
/// The private scalar is zeroized on drop; `Debug` never prints key bytes.
pub struct KemKeypair {
    private: X25519StaticSecret,
    public: [u8; PUBLIC_KEY_SIZE],
}

impl KemKeypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let private = X25519StaticSecret::random_from_rng(OsRng);
        let public = *X25519PublicKey::from(&private).as_bytes();
        Self { private, public }
    }

    /// Reconstruct a keypair from an existing private scalar.
    pub fn from_bytes(private: [u8; PUBLIC_KEY_SIZE]) -> Self {
        let private = X25519StaticSecret::from(private);
        let public = *X25519PublicKey::from(&private).as_bytes();
        Self { private, public }
    }

    /// The public key.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public
    }

    /// Compute the X25519 Diffie-Hellman shared secret with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &[u8; PUBLIC_KEY_SIZE]) -> [u8; 32] {
        let peer = X25519PublicKey::from(*peer_public);
        *self.private.diffie_hellman(&peer).as_bytes()
    }
}

impl std::fmt::Debug for KemKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemKeypair")
            .field("public", &hex_prefix(&self.public))
            .finish()
    }
}

/// An ephemeral X25519 keypair generated fresh for a single handshake.
///
/// Identical in shape to [`KemKeypair`] but kept as a separate type so
/// callers can't accidentally persist what must be single-use key material.
pub struct EphemeralSecret {
    private: X25519StaticSecret,
    public: [u8; PUBLIC_KEY_SIZE],
}

impl EphemeralSecret {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let private = X25519StaticSecret::random_from_rng(OsRng);
        let public = *X25519PublicKey::from(&private).as_bytes();
        Self { private, public }
    }

    /// The public half.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public
    }

    /// Consume the secret to perform a single Diffie-Hellman operation.
    ///
    /// Takes `self` by value: an ephemeral secret is used exactly once and
    /// then must be gone, zeroized immediately after derivation.
    pub fn diffie_hellman(self, peer_public: &[u8; PUBLIC_KEY_SIZE]) -> [u8; 32] {
        let peer = X25519PublicKey::from(*peer_public);
        *self.private.diffie_hellman(&peer).as_bytes()
    }
}

impl std::fmt::Debug for EphemeralSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralSecret")
            .field("public", &hex_prefix(&self.public))
            .finish()
    }
}

/// A signature scheme keypair, held as an owned enum rather than trait
/// objects so callers can match on the concrete variant when needed (e.g.
/// to pick the RFC 9421 algorithm label) without downcasting.
pub enum SigningKeypair {
    /// Ed25519.
    Ed25519(SigningKey),
    /// Secp256k1 with Keccak-256 pre-hashing (Ethereum-style).
    Secp256k1(K256SigningKey),
}

impl SigningKeypair {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate_ed25519() -> Self {
        SigningKeypair::Ed25519(SigningKey::generate(&mut OsRng))
    }

    /// Generate a fresh Secp256k1 keypair.
    pub fn generate_secp256k1() -> Self {
        SigningKeypair::Secp256k1(K256SigningKey::random(&mut OsRng))
    }

    /// The corresponding verifying key.
    pub fn verifying_key(&self) -> VerifyingKeyHandle {
        match self {
            SigningKeypair::Ed25519(sk) => VerifyingKeyHandle::Ed25519(sk.verifying_key()),
            SigningKeypair::Secp256k1(sk) => {
                VerifyingKeyHandle::Secp256k1(*sk.verifying_key())
            }
        }
    }

    /// Sign `message`, returning a raw signature byte string.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningKeypair::Ed25519(sk) => sk.sign(message).to_bytes().to_vec(),
            SigningKeypair::Secp256k1(sk) => {
                let digest = Keccak256::digest(message);
                let sig: K256Signature = sk
                    .sign_prehash(&digest)
                    .expect("signing over a fixed-size digest cannot fail");
                sig.to_bytes().to_vec()
            }
        }
    }
}

/// A verifying key, carried as an owned enum so callers can hold either
/// signature scheme behind one type.
#[derive(Clone, Debug)]
pub enum VerifyingKeyHandle {
    /// Ed25519.
    Ed25519(VerifyingKey),
    /// Secp256k1, verified over a Keccak-256 pre-hash.
    Secp256k1(K256VerifyingKey),
}

impl VerifyingKeyHandle {
    /// The RFC 9421 algorithm label this key verifies under.
    pub fn alg_label(&self) -> &'static str {
        match self {
            VerifyingKeyHandle::Ed25519(_) => crate::core::constants::ALG_ED25519,
            VerifyingKeyHandle::Secp256k1(_) => crate::core::constants::ALG_ECDSA_SECP256K1,
        }
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            VerifyingKeyHandle::Ed25519(vk) => {
                let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
                    return false;
                };
                let sig = Ed25519Signature::from_bytes(&sig_bytes);
                vk.verify(message, &sig).is_ok()
            }
            VerifyingKeyHandle::Secp256k1(vk) => {
                let Ok(sig) = K256Signature::try_from(signature) else {
                    return false;
                };
                let digest = Keccak256::digest(message);
                vk.verify_prehash(&digest, &sig).is_ok()
            }
        }
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kem_keypairs_agree_on_shared_secret() {
        let a = KemKeypair::generate();
        let b = KemKeypair::generate();
        let sa = a.diffie_hellman(&b.public_key());
        let sb = b.diffie_hellman(&a.public_key());
        assert_eq!(sa, sb);
    }

    #[test]
    fn ephemeral_secrets_are_single_use() {
        let a = EphemeralSecret::generate();
        let b_pub = KemKeypair::generate().public_key();
        let _ = a.diffie_hellman(&b_pub);
        // `a` was moved; a second DH would not compile, which is the point.
    }

    #[test]
    fn ed25519_roundtrip() {
        let kp = SigningKeypair::generate_ed25519();
        let sig = kp.sign(b"hello");
        assert!(kp.verifying_key().verify(b"hello", &sig));
        assert!(!kp.verifying_key().verify(b"goodbye", &sig));
    }

    #[test]
    fn secp256k1_roundtrip() {
        let kp = SigningKeypair::generate_secp256k1();
        let sig = kp.sign(b"hello");
        assert!(kp.verifying_key().verify(b"hello", &sig));
        assert!(!kp.verifying_key().verify(b"goodbye", &sig));
    }

    #[test]
    fn wrong_key_rejects() {
        let a = SigningKeypair::generate_ed25519();
        let b = SigningKeypair::generate_ed25519();
        let sig = a.sign(b"hello");
        assert!(!b.verifying_key().verify(b"hello", &sig));
    }
}
