//! `Session`: directional AEAD + MAC keys, counters, and expiry policy.
//! Builds on direction-aware nonce construction and close-on-auth-failure,
//! adding the HMAC sign/verify operations HTTP message signing needs.

use std::time::{Duration, Instant};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::core::error::SessionError;
use crate::core::SessionPolicy;
use crate::crypto::DirectionalKeys;
use crate::session::replay::ReplayWindow;
use crate::session::types::{Role, SessionId};

type HmacSha256 = Hmac<Sha256>;

struct DirectionState {
    enc_key: [u8; 32],
    mac_key: [u8; 32],
    nonce_prefix: [u8; 4],
    counter: u64,
}

impl Drop for DirectionState {
    fn drop(&mut self) {
        self.enc_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl DirectionState {
    fn nonce_for(&self, counter: u64) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.nonce_prefix);
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }
}

/// An immutable-after-creation, directionally-keyed AEAD + MAC channel.
///
/// Key material is generated once at construction (from `DirectionalKeys`)
/// and never rotated; a fresh handshake is required for new keys.
pub struct Session {
    id: SessionId,
    role: Role,
    created_at: Instant,
    last_used_at: Instant,
    message_count: u64,
    out: DirectionState,
    in_: DirectionState,
    replay_window: ReplayWindow,
    policy: SessionPolicy,
    closed: bool,
}

impl Session {
    /// Materialize a session from the four directional keys.
    /// The initiator's outbound direction is `c2s`; the responder's is `s2c`.
    pub fn new(id: SessionId, role: Role, keys: DirectionalKeys, policy: SessionPolicy) -> Self {
        let (out_enc, out_mac, in_enc, in_mac) = match role {
            Role::Initiator => (keys.c2s_enc, keys.c2s_sign, keys.s2c_enc, keys.s2c_sign),
            Role::Responder => (keys.s2c_enc, keys.s2c_sign, keys.c2s_enc, keys.c2s_sign),
        };

        let now = Instant::now();
        Self {
            id,
            role,
            created_at: now,
            last_used_at: now,
            message_count: 0,
            out: DirectionState {
                enc_key: out_enc,
                mac_key: out_mac,
                nonce_prefix: direction_prefix(role, true),
                counter: 0,
            },
            in_: DirectionState {
                enc_key: in_enc,
                mac_key: in_mac,
                nonce_prefix: direction_prefix(role, false),
                counter: 0,
            },
            replay_window: ReplayWindow::new(),
            policy,
            closed: false,
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// This side's role in the handshake that created the session.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the session has been explicitly or implicitly closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the session has expired under its policy, or is closed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.closed
            || now.saturating_duration_since(self.created_at) >= self.policy.max_age
            || now.saturating_duration_since(self.last_used_at) >= self.policy.idle_timeout
            || self.message_count >= self.policy.max_messages
    }

    /// Seconds since creation (for manager stats).
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Encrypt `plaintext`, incrementing the outbound counter.
    pub fn encrypt(&mut self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.is_expired(Instant::now()) {
            return Err(SessionError::Expired);
        }
        if self.out.counter == u64::MAX {
            self.close();
            return Err(SessionError::CounterExhausted);
        }

        let nonce = self.out.nonce_for(self.out.counter);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.out.enc_key));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| SessionError::AuthFailure)?;

        self.out.counter += 1;
        self.touch();
        Ok(ciphertext)
    }

    /// Decrypt `ciphertext`, enforcing the inbound sliding-window rule
    /// before attempting AEAD verification.
    pub fn decrypt(
        &mut self,
        counter: u64,
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.is_expired(Instant::now()) {
            return Err(SessionError::Expired);
        }

        self.replay_window.check_and_update(counter)?;

        let nonce = self.in_.nonce_for(counter);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.in_.enc_key));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| {
                self.close();
                SessionError::AuthFailure
            })?;

        self.touch();
        Ok(plaintext)
    }

    /// HMAC-SHA-256 over `base` with this side's outbound MAC key.
    pub fn sign_outbound_mac(&self, base: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.out.mac_key).expect("HMAC accepts any key length");
        mac.update(base);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verify an inbound MAC using constant-time comparison.
    pub fn verify_inbound_mac(&self, base: &[u8], tag: &[u8]) -> Result<(), SessionError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.in_.mac_key).expect("HMAC accepts any key length");
        mac.update(base);
        let expected = mac.finalize().into_bytes();
        if expected.ct_eq(tag).into() {
            Ok(())
        } else {
            Err(SessionError::MacAuthFailure)
        }
    }

    /// Mark the session closed, zeroizing all key material.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.out.enc_key.zeroize();
        self.out.mac_key.zeroize();
        self.in_.enc_key.zeroize();
        self.in_.mac_key.zeroize();
    }

    fn touch(&mut self) {
        self.last_used_at = Instant::now();
        self.message_count += 1;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// The four-byte nonce prefix is distinct per logical direction (c2s vs.
/// s2c), not per physical send/receive role, so both sides derive the same
/// prefix for the same direction independently of who is "outbound" here.
fn direction_prefix(role: Role, outbound: bool) -> [u8; 4] {
    let is_c2s = match role {
        Role::Initiator => outbound,
        Role::Responder => !outbound,
    };
    if is_c2s {
        *b"c2s\0"
    } else {
        *b"s2c\0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_directional_keys;
    use proptest::prelude::*;

    fn paired_sessions() -> (Session, Session) {
        let seed = [11u8; 32];
        let session_id = SessionId::new("sess-1".to_string());
        let initiator_keys = derive_directional_keys(&seed, session_id.as_str());
        let responder_keys = derive_directional_keys(&seed, session_id.as_str());
        let policy = SessionPolicy::default();
        (
            Session::new(session_id.clone(), Role::Initiator, initiator_keys, policy.clone()),
            Session::new(session_id, Role::Responder, responder_keys, policy),
        )
    }

    #[test]
    fn encrypt_decrypt_roundtrip_across_sides() {
        let (mut initiator, mut responder) = paired_sessions();
        let ciphertext = initiator.encrypt(b"hello", b"ad").unwrap();
        let plaintext = responder.decrypt(0, &ciphertext, b"ad").unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn replayed_counter_is_rejected() {
        let (mut initiator, mut responder) = paired_sessions();
        let ciphertext = initiator.encrypt(b"hello", b"ad").unwrap();
        responder.decrypt(0, &ciphertext, b"ad").unwrap();
        assert!(matches!(
            responder.decrypt(0, &ciphertext, b"ad"),
            Err(SessionError::Replay)
        ));
    }

    #[test]
    fn decrypt_failure_closes_session() {
        let (mut initiator, mut responder) = paired_sessions();
        let mut ciphertext = initiator.encrypt(b"hello", b"ad").unwrap();
        *ciphertext.last_mut().unwrap() ^= 0xff;
        assert!(responder.decrypt(0, &ciphertext, b"ad").is_err());
        assert!(responder.is_closed());
    }

    #[test]
    fn mac_roundtrip() {
        let (initiator, responder) = paired_sessions();
        let tag = initiator.sign_outbound_mac(b"signature base");
        assert!(responder.verify_inbound_mac(b"signature base", &tag).is_ok());
        assert!(responder
            .verify_inbound_mac(b"tampered base", &tag)
            .is_err());
    }

    #[test]
    fn message_count_increases_monotonically() {
        let (mut initiator, _responder) = paired_sessions();
        initiator.encrypt(b"one", b"").unwrap();
        assert_eq!(initiator.message_count, 1);
        initiator.encrypt(b"two", b"").unwrap();
        assert_eq!(initiator.message_count, 2);
    }

    proptest! {
        #[test]
        fn encrypt_decrypt_roundtrips_for_arbitrary_payloads(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            aad in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let (mut initiator, mut responder) = paired_sessions();
            let ciphertext = initiator.encrypt(&plaintext, &aad).unwrap();
            let decrypted = responder.decrypt(0, &ciphertext, &aad).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }
    }
}
