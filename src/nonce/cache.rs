//! The global Nonce Cache: a bounded, TTL-scoped set of
//! recently-observed handshake nonces, used to reject replays before any
//! expensive cryptography runs.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::constants::{DEFAULT_NONCE_CACHE_CAPACITY, DEFAULT_NONCE_TTL, MAX_NONCE_BYTES};
use crate::core::error::NonceError;

/// Outcome of a [`NonceCache::check_and_store`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceVerdict {
    /// The nonce was syntactically valid and had not been seen within TTL.
    Accepted,
    /// The nonce had already been observed within TTL.
    Duplicate,
    /// The nonce failed the syntactic check (empty or oversized).
    Malformed,
}

impl From<NonceVerdict> for Result<(), NonceError> {
    fn from(verdict: NonceVerdict) -> Self {
        match verdict {
            NonceVerdict::Accepted => Ok(()),
            NonceVerdict::Duplicate => Err(NonceError::Duplicate),
            NonceVerdict::Malformed => Err(NonceError::Malformed),
        }
    }
}

struct Inner {
    entries: LruCache<Vec<u8>, Instant>,
    ttl: Duration,
}

/// A bounded, mutex-guarded LRU set of observed nonces.
///
/// Size pressure evicts the oldest entries; this is acceptable because each
/// `Session` additionally keeps its own small sliding-window replay guard,
/// so an evicted handshake-layer nonce is not the sole line of
/// defense once a session exists.
pub struct NonceCache {
    inner: Mutex<Inner>,
}

impl NonceCache {
    /// Construct a cache with the given entry-count bound and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                ttl,
            }),
        }
    }

    /// Check whether `nonce` is syntactically valid and unseen, and record
    /// it if so. Atomic with respect to concurrent callers: of two
    /// concurrent calls with the same nonce, exactly one observes
    /// `Accepted`.
    pub fn check_and_store(&self, nonce: &[u8], now: Instant) -> NonceVerdict {
        if nonce.is_empty() || nonce.len() > MAX_NONCE_BYTES {
            return NonceVerdict::Malformed;
        }

        let mut inner = self.inner.lock();
        let ttl = inner.ttl;
        if let Some(first_seen) = inner.entries.get(nonce) {
            if now.saturating_duration_since(*first_seen) < ttl {
                debug!(len = nonce.len(), "duplicate nonce rejected");
                return NonceVerdict::Duplicate;
            }
        }
        inner.entries.put(nonce.to_vec(), now);
        NonceVerdict::Accepted
    }

    /// Remove every entry whose TTL has elapsed as of `now`.
    pub fn purge(&self, now: Instant) {
        let mut inner = self.inner.lock();
        let ttl = inner.ttl;
        let expired: Vec<Vec<u8>> = inner
            .entries
            .iter()
            .filter(|(_, first_seen)| now.saturating_duration_since(**first_seen) >= ttl)
            .map(|(nonce, _)| nonce.clone())
            .collect();
        for nonce in expired {
            inner.entries.pop(&nonce);
        }
    }

    /// Current number of tracked entries (for stats/tests).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache currently tracks no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NonceCache {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_CACHE_CAPACITY, DEFAULT_NONCE_TTL)
    }
}
