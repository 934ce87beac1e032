//! Test doubles for the `Resolver` and `MessageTransport` abstractions:
//! a `HashMap`-backed resolver and an in-process, handler-backed transport.
//! The registry and transport themselves are out of scope for this crate;
//! these exist only so the handshake engine's own tests (and downstream
//! consumers' tests) can drive a full exchange without real sockets or a
//! real chain RPC.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::{AgentDid, MessageTransport, ResolvedPeer, Resolver, ResolverError, SecureMessage, TransportResponse};
use crate::handshake::HandshakeEngine;

/// A `Resolver` backed by a fixed `HashMap`, keyed by DID string.
#[derive(Default)]
pub struct InMemoryResolver {
    peers: HashMap<String, ResolvedPeer>,
}

impl InMemoryResolver {
    /// An empty registry; populate with [`Self::insert`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` under `did`.
    pub fn insert(&mut self, did: &AgentDid, peer: ResolvedPeer) {
        self.peers.insert(did.as_str().to_string(), peer);
    }
}

#[async_trait]
impl Resolver for InMemoryResolver {
    async fn resolve(&self, did: &AgentDid) -> Result<ResolvedPeer, ResolverError> {
        self.peers
            .get(did.as_str())
            .cloned()
            .ok_or_else(|| ResolverError::Unknown(did.as_str().to_string()))
    }
}

/// Anything that can answer a [`SecureMessage`] in-process, letting
/// [`LoopbackTransport`] stay agnostic of which handshake variant it's
/// wired to.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one inbound message, returning the reply.
    async fn handle(&self, message: SecureMessage) -> Result<TransportResponse, String>;
}

#[async_trait]
impl<E: HandshakeEngine> InboundHandler for E {
    async fn handle(&self, message: SecureMessage) -> Result<TransportResponse, String> {
        self.handle_inbound(message)
            .await
            .map(|(response, _session)| response)
            .map_err(|e| e.to_string())
    }
}

/// An in-process `MessageTransport` that hands every send straight to an
/// installed [`InboundHandler`], for exercising a full handshake exchange
/// between two engines without real sockets.
pub struct LoopbackTransport<H: InboundHandler + ?Sized> {
    peer: Mutex<Option<Arc<H>>>,
}

impl<H: InboundHandler + ?Sized> LoopbackTransport<H> {
    /// No peer installed yet; sends fail until [`Self::install`] runs.
    pub fn new() -> Self {
        Self {
            peer: Mutex::new(None),
        }
    }

    /// Install the handler that answers every subsequent send.
    pub async fn install(&self, handler: Arc<H>) {
        *self.peer.lock().await = Some(handler);
    }
}

impl<H: InboundHandler + ?Sized> Default for LoopbackTransport<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<H: InboundHandler + ?Sized + 'static> MessageTransport for LoopbackTransport<H> {
    async fn send(&self, message: SecureMessage, _deadline: Duration) -> Result<TransportResponse, String> {
        let peer = self.peer.lock().await;
        let peer = peer.as_ref().ok_or_else(|| "LoopbackTransport has no peer installed".to_string())?;
        peer.handle(message).await
    }
}
