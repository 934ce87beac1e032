//! The `Resolver` abstraction plus the `context_id`-keyed peer
//! cache and DID-keyed single-flight coalescing built on top of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, instrument};

use crate::core::constants::PEER_CACHE_TTL;
use crate::core::did::AgentDid;
use crate::core::error::ResolverError;
use crate::crypto::VerifyingKeyHandle;

/// A peer's registry-published identity, as returned by the blockchain
/// registry the core treats as an external collaborator.
#[derive(Clone)]
pub struct ResolvedPeer {
    /// The peer's signing (Ed25519 or Secp256k1) public key.
    pub signing_pk: VerifyingKeyHandle,
    /// The peer's X25519 KEM public key.
    pub kem_pk: [u8; 32],
    /// The peer's transport endpoint.
    pub endpoint: String,
    /// Whether the registry currently considers this identity active.
    pub active: bool,
    fetched_at: Instant,
}

impl ResolvedPeer {
    /// Construct a resolved peer record, stamping `fetched_at` as now.
    pub fn new(signing_pk: VerifyingKeyHandle, kem_pk: [u8; 32], endpoint: String, active: bool) -> Self {
        Self {
            signing_pk,
            kem_pk,
            endpoint,
            active,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.active && self.fetched_at.elapsed() < ttl
    }
}

/// External lookup from an [`AgentDid`] to its registry-published identity.
///
/// This is the core's only dependency on the blockchain registry; the
/// registry's own schema and provisioning process are out of scope.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `did` to its current registry record.
    async fn resolve(&self, did: &AgentDid) -> Result<ResolvedPeer, ResolverError>;
}

enum Slot {
    Ready(ResolvedPeer),
    InFlight(watch::Receiver<Option<Result<ResolvedPeer, String>>>),
}

/// Wraps a `Resolver` with a peer cache (keyed by `context_id`, 15-minute
/// TTL) and single-flight coalescing (keyed by DID string), so concurrent
/// lookups of the same identity share one RPC.
///
/// Must be held behind an `Arc` - coalescing spawns a `tokio` task to drive
/// the shared lookup, which needs an owned handle back into `self`.
pub struct CachingResolver<R: Resolver> {
    inner: R,
    ttl: Duration,
    by_context: Mutex<HashMap<String, ResolvedPeer>>,
    by_did: Mutex<HashMap<String, Slot>>,
}

impl<R: Resolver + 'static> CachingResolver<R> {
    /// Wrap `resolver`, using the default 15-minute peer-cache TTL.
    pub fn new(resolver: R) -> Arc<Self> {
        Self::with_ttl(resolver, PEER_CACHE_TTL)
    }

    /// Wrap `resolver` with an explicit cache TTL (test hook).
    pub fn with_ttl(resolver: R, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: resolver,
            ttl,
            by_context: Mutex::new(HashMap::new()),
            by_did: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve `did` for `context_id`, reusing a fresh context-scoped cache
    /// hit and otherwise coalescing with any in-flight lookup for the same
    /// DID before falling through to the wrapped resolver.
    #[instrument(skip(self), fields(context_id, did = %did.as_str()))]
    pub async fn resolve(
        self: &Arc<Self>,
        context_id: &str,
        did: &AgentDid,
    ) -> Result<ResolvedPeer, ResolverError> {
        if let Some(peer) = self.cached_for_context(context_id).await {
            debug!("peer cache hit");
            return Ok(peer);
        }

        let key = did.as_str().to_string();
        let mut rx = {
            let mut inflight = self.by_did.lock().await;
            match inflight.get(&key) {
                Some(Slot::Ready(peer)) if peer.is_fresh(self.ttl) => {
                    let peer = peer.clone();
                    drop(inflight);
                    self.by_context
                        .lock()
                        .await
                        .insert(context_id.to_string(), peer.clone());
                    return Ok(peer);
                }
                Some(Slot::InFlight(rx)) => {
                    debug!("coalescing onto in-flight lookup");
                    rx.clone()
                }
                _ => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.clone(), Slot::InFlight(rx.clone()));
                    self.spawn_lookup(key.clone(), did.clone(), tx);
                    rx
                }
            }
        };

        let peer = Self::await_result(&mut rx).await?;
        self.by_context
            .lock()
            .await
            .insert(context_id.to_string(), peer.clone());
        Ok(peer)
    }

    async fn cached_for_context(&self, context_id: &str) -> Option<ResolvedPeer> {
        let cache = self.by_context.lock().await;
        cache
            .get(context_id)
            .filter(|peer| peer.is_fresh(self.ttl))
            .cloned()
    }

    fn spawn_lookup(
        self: &Arc<Self>,
        key: String,
        did: AgentDid,
        tx: watch::Sender<Option<Result<ResolvedPeer, String>>>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.inner.resolve(&did).await.map_err(|e| e.to_string());
            {
                let mut inflight = this.by_did.lock().await;
                match &result {
                    Ok(peer) => {
                        inflight.insert(key, Slot::Ready(peer.clone()));
                    }
                    Err(_) => {
                        inflight.remove(&key);
                    }
                }
            }
            let _ = tx.send(Some(result));
        });
    }

    async fn await_result(
        rx: &mut watch::Receiver<Option<Result<ResolvedPeer, String>>>,
    ) -> Result<ResolvedPeer, ResolverError> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result.map_err(ResolverError::Backend);
            }
            if rx.changed().await.is_err() {
                return Err(ResolverError::Backend("resolution task dropped".into()));
            }
        }
    }
}
