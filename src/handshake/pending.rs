//! `PendingHandshake` map: responder-side state held between the
//! ephemeral-ECDH variant's Request and Complete messages, keyed by
//! `context_id` and garbage-collected on TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::error::HandshakeError;
use crate::crypto::EphemeralSecret;

/// Responder-side state recorded between Request and Complete.
pub struct PendingHandshake {
    /// The initiator's ephemeral public key, received in Request.
    pub peer_ephemeral_pub: [u8; 32],
    /// This responder's own ephemeral keypair, generated in response.
    pub self_ephemeral: EphemeralSecret,
    expires_at: Instant,
}

/// A `context_id`-keyed map of in-progress ephemeral-ECDH handshakes.
///
/// One entry per `context_id`: a second Invitation/Request for an
/// already-pending `context_id` is rejected rather than silently replacing
/// the prior state, so concurrent handshake attempts sharing a context id
/// are serialized.
pub struct PendingHandshakeMap {
    entries: Mutex<HashMap<String, PendingHandshake>>,
    ttl: Duration,
}

impl PendingHandshakeMap {
    /// Construct an empty map with the given per-entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Register a new pending handshake for `context_id`.
    ///
    /// Fails with `AlreadyPending` if one is already tracked and not yet
    /// expired: a `context_id` collision rejects the second attempt rather
    /// than silently overwriting the first.
    pub fn insert(
        &self,
        context_id: String,
        peer_ephemeral_pub: [u8; 32],
        self_ephemeral: EphemeralSecret,
        now: Instant,
    ) -> Result<(), HandshakeError> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&context_id) {
            if existing.expires_at > now {
                return Err(HandshakeError::AlreadyPending);
            }
        }
        entries.insert(
            context_id,
            PendingHandshake {
                peer_ephemeral_pub,
                self_ephemeral,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    /// Remove and return the pending handshake for `context_id`, if present
    /// and not expired. An expired-but-not-yet-swept entry is treated as
    /// absent and also removed.
    pub fn take(&self, context_id: &str, now: Instant) -> Result<PendingHandshake, HandshakeError> {
        let mut entries = self.entries.lock();
        match entries.remove(context_id) {
            None => Err(HandshakeError::UnknownPeer),
            Some(entry) if entry.expires_at <= now => Err(HandshakeError::Expired),
            Some(entry) => Ok(entry),
        }
    }

    /// Drop every entry whose TTL has elapsed as of `now`.
    pub fn gc(&self, now: Instant) {
        self.entries.lock().retain(|_, entry| entry.expires_at > now);
    }

    /// Number of currently tracked entries (tests/stats).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the map currently tracks no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
