//! Session seed derivation and directional key expansion.

use base64::Engine;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::core::constants::{
    INFO_C2S_ENC, INFO_C2S_SIGN, INFO_S2C_ENC, INFO_S2C_SIGN, SESSION_SEED_SIZE,
};

/// The four keys expanded from a session seed: one encryption and one MAC
/// key per direction (client-to-server / server-to-client).
pub struct DirectionalKeys {
    /// Initiator's outbound (c2s) encryption key.
    pub c2s_enc: [u8; 32],
    /// Initiator's outbound (c2s) MAC key.
    pub c2s_sign: [u8; 32],
    /// Responder's outbound (s2c) encryption key.
    pub s2c_enc: [u8; 32],
    /// Responder's outbound (s2c) MAC key.
    pub s2c_sign: [u8; 32],
}

impl Drop for DirectionalKeys {
    fn drop(&mut self) {
        self.c2s_enc.zeroize();
        self.c2s_sign.zeroize();
        self.s2c_enc.zeroize();
        self.s2c_sign.zeroize();
    }
}

/// Lexicographically order two ephemeral public keys so both handshake
/// sides compute the same `(lo, hi)` pair without knowing who is initiator.
pub fn canonical_order<'a>(
    a: &'a [u8; 32],
    b: &'a [u8; 32],
) -> (&'a [u8; 32], &'a [u8; 32]) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Derive the 32-byte session seed (HKDF-Extract PRK).
///
/// `label` is the variant-specific domain string ("sage/hpke v1" or
/// "a2a/handshake v1"); `self_pub`/`peer_pub` are the two handshake-bound
/// ephemeral (or HPKE-derived) public keys used only for the tie-break.
pub fn derive_session_seed(
    label: &[u8],
    context_id: &str,
    self_pub: &[u8; 32],
    peer_pub: &[u8; 32],
    shared_secret: &[u8; 32],
) -> [u8; SESSION_SEED_SIZE] {
    let (lo, hi) = canonical_order(self_pub, peer_pub);

    let mut hasher = Sha256::new();
    hasher.update(label);
    hasher.update(context_id.as_bytes());
    hasher.update(lo);
    hasher.update(hi);
    let salt: [u8; 32] = hasher.finalize().into();

    let (prk, _hk) = Hkdf::<Sha256>::extract(Some(&salt), shared_secret);
    let mut seed = [0u8; SESSION_SEED_SIZE];
    seed.copy_from_slice(&prk);
    seed
}

/// Derive the session identifier from the label and seed:
/// `base64url_nopad(SHA-256(label || seed)[0:16])`.
pub fn derive_session_id(label: &[u8], seed: &[u8; SESSION_SEED_SIZE]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(label);
    hasher.update(seed);
    let digest = hasher.finalize();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&digest[..16])
}

/// Expand the session seed into the four directional keys, using
/// `session_id` as the HKDF-Expand salt input (folded into the PRK via a
/// fresh `extract`, since `Hkdf::expand` only takes an `info` parameter).
///
/// The key schedule treats the seed itself as the PRK input, `session_id`
/// as the salt, and each direction's label as the `info` string; HKDF's
/// textbook two-step form treats `salt` as an `extract`-time input, so the
/// salt is folded into the seed once here and the resulting PRK is expanded
/// with each of the four info labels.
pub fn derive_directional_keys(seed: &[u8; SESSION_SEED_SIZE], session_id: &str) -> DirectionalKeys {
    let (prk, hk) = Hkdf::<Sha256>::extract(Some(session_id.as_bytes()), seed);
    let mut prk_bytes = [0u8; 32];
    prk_bytes.copy_from_slice(&prk);

    let mut c2s_enc = [0u8; 32];
    let mut c2s_sign = [0u8; 32];
    let mut s2c_enc = [0u8; 32];
    let mut s2c_sign = [0u8; 32];

    hk.expand(INFO_C2S_ENC, &mut c2s_enc)
        .expect("32 bytes is within HKDF-SHA256's output range");
    hk.expand(INFO_C2S_SIGN, &mut c2s_sign)
        .expect("32 bytes is within HKDF-SHA256's output range");
    hk.expand(INFO_S2C_ENC, &mut s2c_enc)
        .expect("32 bytes is within HKDF-SHA256's output range");
    hk.expand(INFO_S2C_SIGN, &mut s2c_sign)
        .expect("32 bytes is within HKDF-SHA256's output range");

    prk_bytes.zeroize();

    DirectionalKeys {
        c2s_enc,
        c2s_sign,
        s2c_enc,
        s2c_sign,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_symmetric() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(canonical_order(&a, &b), canonical_order(&b, &a));
    }

    #[test]
    fn both_sides_derive_identical_seed_and_session_id() {
        let a_pub = [7u8; 32];
        let b_pub = [9u8; 32];
        let shared = [42u8; 32];

        let seed_a = derive_session_seed("label".as_bytes(), "ctx-1", &a_pub, &b_pub, &shared);
        let seed_b = derive_session_seed("label".as_bytes(), "ctx-1", &b_pub, &a_pub, &shared);
        // Hex-encoded for a readable failure message instead of a raw byte-array diff.
        assert_eq!(hex::encode(seed_a), hex::encode(seed_b));

        let id_a = derive_session_id(b"label", &seed_a);
        let id_b = derive_session_id(b"label", &seed_b);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn directional_keys_are_pairwise_distinct() {
        let seed = [5u8; 32];
        let keys = derive_directional_keys(&seed, "sess-1");
        let all = [keys.c2s_enc, keys.c2s_sign, keys.s2c_enc, keys.s2c_sign];
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
    }
}
