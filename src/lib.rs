//! # sage-core
//!
//! The cryptographic session-establishment core for SAGE agent-to-agent
//! (A2A) messaging: two mutually-unknown agents, each identified by a
//! `did:sage:<chain>:<address>`, converge on a shared, forward-secret,
//! directional AEAD channel bound to a short key identifier.
//!
//! This crate covers three tightly coupled pieces:
//!
//! - [`handshake`]: the handshake state machine, in both an HPKE
//!   single-round-trip variant and an extended four-message ephemeral-ECDH
//!   variant.
//! - [`session`]: the session lifetime/key-derivation engine with its
//!   replay guard.
//! - [`httpsig`]: the RFC 9421 HTTP Message Signatures layer that
//!   authenticates subsequent requests using session-bound key identifiers.
//!
//! The core never opens a socket and never talks to a blockchain registry
//! itself; it consumes the [`core::MessageTransport`] and [`core::Resolver`]
//! abstractions, leaving transport and registry provisioning to the host
//! application.
//!
//! ## Example: HPKE handshake between two in-process engines
//!
//! ```no_run
//! use sage_core::core::{AgentDid, CachingResolver, Resolver, ResolvedPeer, SecureMessage, TransportResponse, MessageTransport};
//! use sage_core::crypto::{KemKeypair, SigningKeypair};
//! use sage_core::handshake::{HandshakeEngine, HpkeHandshakeEngine};
//! use sage_core::nonce::NonceCache;
//! use sage_core::session::SessionManager;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example<R: Resolver + 'static, T: MessageTransport>(
//! #     self_did: AgentDid, kem: KemKeypair, signing: SigningKeypair,
//! #     resolver: Arc<CachingResolver<R>>, transport: Arc<T>, responder_did: AgentDid,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = HpkeHandshakeEngine::new(
//!     self_did,
//!     kem,
//!     signing,
//!     resolver,
//!     transport,
//!     SessionManager::new(Default::default()),
//!     Arc::new(NonceCache::default()),
//!     Duration::from_secs(120),
//! );
//! let session = engine.initiate("ctx-1", &responder_did, Duration::from_secs(5)).await?;
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Shared types: errors, protocol constants, DID parsing, the `Resolver`
/// and `MessageTransport` abstractions, and session-policy configuration.
pub mod core;

/// Cryptographic primitives: KEM/signature key types, HPKE, and the
/// session-seed key schedule.
pub mod crypto;

/// Handshake state machines: the HPKE single-round-trip variant and the
/// ephemeral-ECDH four-message variant.
pub mod handshake;

/// RFC 9421 HTTP Message Signatures.
pub mod httpsig;

/// The handshake-layer Nonce Cache.
pub mod nonce;

/// The Session Manager, `Session`, and the per-session replay guard.
pub mod session;

/// `Resolver`/`MessageTransport` test doubles shared across this crate's
/// own integration tests.
#[cfg(test)]
mod testing;

/// Convenient re-export of the crate's most commonly used types.
pub mod prelude {
    pub use crate::core::{
        AgentDid, CachingResolver, MessageRole, MessageTransport, ResolvedPeer, Resolver, SageError, SecureMessage,
        SessionPolicy, TransportResponse,
    };
    pub use crate::crypto::{KemKeypair, SigningKeypair, VerifyingKeyHandle};
    pub use crate::handshake::{EcdhHandshakeEngine, HandshakeEngine, HpkeHandshakeEngine};
    pub use crate::httpsig::{sign_request, verify_request, Component, HttpRequestMeta, SigningKey};
    pub use crate::nonce::NonceCache;
    pub use crate::session::{Role, Session, SessionManager};
}
