//! `HandshakeEngine`: drives either handshake variant from DID-only
//! knowledge to a materialized [`Session`], over an injected
//! [`MessageTransport`] and [`Resolver`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::core::constants::DEFAULT_PENDING_HANDSHAKE_TTL;
use crate::core::error::HandshakeError;
use crate::core::{
    handshake_task_id, hpke_task_id, AgentDid, CachingResolver, MessageRole, MessageTransport, Resolver, SecureMessage,
    TransportResponse,
};
use crate::crypto::{derive_directional_keys, KemKeypair, SigningKeypair};
use crate::handshake::{ecdh_flow, hpke_flow, PendingHandshakeMap};
use crate::nonce::NonceCache;
use crate::session::{KeyId, Role, Session, SessionId, SessionManager};

/// Pairs a message with the signature over its canonical bytes, for the
/// wire positions ([`TransportResponse::data`]) that have no dedicated
/// signature field of their own.
#[derive(Serialize, Deserialize)]
struct Signed<T> {
    message: T,
    signature: Vec<u8>,
}

fn transport_error(err: String) -> HandshakeError {
    HandshakeError::Internal(err)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, HandshakeError> {
    serde_json::to_vec(value).map_err(|e| HandshakeError::Internal(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, HandshakeError> {
    serde_json::from_slice(bytes).map_err(|e| HandshakeError::Crypto(e.to_string()))
}

fn empty_metadata() -> HashMap<String, String> {
    HashMap::new()
}

/// Drives a handshake variant to completion and hands inbound protocol
/// messages off to the matching responder logic.
///
/// A single trait covers both variants so a caller picks the
/// variant at construction time and is otherwise indifferent to which one
/// is running underneath.
#[async_trait]
pub trait HandshakeEngine: Send + Sync {
    /// Run the full initiator-side handshake against `responder_did`,
    /// returning the freshly materialized session.
    async fn initiate(
        &self,
        context_id: &str,
        responder_did: &AgentDid,
        deadline: Duration,
    ) -> Result<Arc<RwLock<Session>>, HandshakeError>;

    /// Process one inbound [`SecureMessage`], returning the reply to send
    /// back (and, once the exchange completes, the new session).
    async fn handle_inbound(
        &self,
        message: SecureMessage,
    ) -> Result<(TransportResponse, Option<Arc<RwLock<Session>>>), HandshakeError>;
}

fn peer_into_handshake_error(err: crate::core::error::ResolverError) -> HandshakeError {
    HandshakeError::Internal(err.to_string())
}

/// Shared plumbing both variants need: this side's identity, the resolver,
/// the transport, the Session Manager, and the Nonce Cache.
struct Shared<R: Resolver + 'static, T: MessageTransport> {
    self_did: AgentDid,
    kem: KemKeypair,
    signing: SigningKeypair,
    resolver: Arc<CachingResolver<R>>,
    transport: Arc<T>,
    manager: Arc<SessionManager>,
    nonce_cache: Arc<NonceCache>,
    max_skew: Duration,
}

/// HPKE single-round-trip variant.
pub struct HpkeHandshakeEngine<R: Resolver + 'static, T: MessageTransport> {
    shared: Shared<R, T>,
}

impl<R: Resolver + 'static, T: MessageTransport> HpkeHandshakeEngine<R, T> {
    /// Construct the engine from this side's identity and the collaborators
    /// it drives the handshake through.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_did: AgentDid,
        kem: KemKeypair,
        signing: SigningKeypair,
        resolver: Arc<CachingResolver<R>>,
        transport: Arc<T>,
        manager: Arc<SessionManager>,
        nonce_cache: Arc<NonceCache>,
        max_skew: Duration,
    ) -> Self {
        Self {
            shared: Shared {
                self_did,
                kem,
                signing,
                resolver,
                transport,
                manager,
                nonce_cache,
                max_skew,
            },
        }
    }
}

#[async_trait]
impl<R: Resolver + 'static, T: MessageTransport> HandshakeEngine for HpkeHandshakeEngine<R, T> {
    #[instrument(skip(self), fields(context_id, responder = %responder_did.as_str()))]
    async fn initiate(
        &self,
        context_id: &str,
        responder_did: &AgentDid,
        deadline: Duration,
    ) -> Result<Arc<RwLock<Session>>, HandshakeError> {
        let shared = &self.shared;
        let peer = shared
            .resolver
            .resolve(context_id, responder_did)
            .await
            .map_err(peer_into_handshake_error)?;
        if !peer.active {
            warn!("peer resolved but marked inactive");
            return Err(HandshakeError::UnknownPeer);
        }

        let start = hpke_flow::initiate(
            shared.self_did.as_str(),
            responder_did.as_str(),
            context_id,
            &peer.kem_pk,
            &shared.signing,
        );

        let request = SecureMessage {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.to_string(),
            task_id: hpke_task_id("init"),
            role: MessageRole::User,
            payload: encode(&start.message)?,
            did: shared.self_did.as_str().to_string(),
            signature: start.signature.clone(),
            metadata: empty_metadata(),
        };

        let response = shared
            .transport
            .send(request, deadline)
            .await
            .map_err(transport_error)?;
        if !response.success {
            return Err(HandshakeError::Internal(
                response.error.unwrap_or_else(|| "transport send failed".into()),
            ));
        }

        let signed_ack: Signed<hpke_flow::AckMessage> = decode(&response.data)?;
        let key_id = hpke_flow::complete(
            &start,
            context_id,
            &signed_ack.message,
            &signed_ack.signature,
            &peer.signing_pk,
        )?;

        let session = shared
            .manager
            .create(
                SessionId::new(start.outcome.session_id.clone()),
                Role::Initiator,
                derive_directional_keys(&start.outcome.seed, &start.outcome.session_id),
            )?;
        shared
            .manager
            .bind_key_id(KeyId::new(key_id), session.read().id().clone())?;

        debug!(session_id = %session.read().id().as_str(), "hpke handshake completed as initiator");
        Ok(session)
    }

    #[instrument(skip(self, message), fields(context_id = %message.context_id, did = %message.did))]
    async fn handle_inbound(
        &self,
        message: SecureMessage,
    ) -> Result<(TransportResponse, Option<Arc<RwLock<Session>>>), HandshakeError> {
        let shared = &self.shared;
        let initiator_did = AgentDid::parse(&message.did).map_err(|_| HandshakeError::UnknownPeer)?;
        let peer = shared
            .resolver
            .resolve(&message.context_id, &initiator_did)
            .await
            .map_err(peer_into_handshake_error)?;
        if !peer.active {
            warn!("peer resolved but marked inactive");
            return Err(HandshakeError::UnknownPeer);
        }

        let init: hpke_flow::InitMessage = decode(&message.payload)?;
        let nonce_cache = Arc::clone(&shared.nonce_cache);
        let ack = hpke_flow::respond(
            &init,
            &message.signature,
            &peer.signing_pk,
            &shared.kem,
            &shared.signing,
            shared.max_skew,
            |nonce| {
                matches!(
                    nonce_cache.check_and_store(nonce, Instant::now()),
                    crate::nonce::NonceVerdict::Accepted
                )
            },
        )?;

        let session = shared.manager.create(
            SessionId::new(ack.outcome.session_id.clone()),
            Role::Responder,
            derive_directional_keys(&ack.outcome.seed, &ack.outcome.session_id),
        )?;
        shared
            .manager
            .bind_key_id(KeyId::new(ack.message.key_id.clone()), session.read().id().clone())?;

        let reply = TransportResponse {
            success: true,
            message_id: message.id,
            task_id: message.task_id,
            data: encode(&Signed {
                message: ack.message,
                signature: ack.signature,
            })?,
            error: None,
        };

        debug!(session_id = %session.read().id().as_str(), "hpke handshake completed as responder");
        Ok((reply, Some(session)))
    }
}

/// Ephemeral-ECDH four-message variant.
pub struct EcdhHandshakeEngine<R: Resolver + 'static, T: MessageTransport> {
    shared: Shared<R, T>,
    pending: PendingHandshakeMap,
}

impl<R: Resolver + 'static, T: MessageTransport> EcdhHandshakeEngine<R, T> {
    /// Construct the engine, using [`DEFAULT_PENDING_HANDSHAKE_TTL`] for the
    /// responder-side pending-handshake map.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_did: AgentDid,
        kem: KemKeypair,
        signing: SigningKeypair,
        resolver: Arc<CachingResolver<R>>,
        transport: Arc<T>,
        manager: Arc<SessionManager>,
        nonce_cache: Arc<NonceCache>,
        max_skew: Duration,
    ) -> Self {
        Self {
            shared: Shared {
                self_did,
                kem,
                signing,
                resolver,
                transport,
                manager,
                nonce_cache,
                max_skew,
            },
            pending: PendingHandshakeMap::new(DEFAULT_PENDING_HANDSHAKE_TTL),
        }
    }

    async fn send(&self, message: SecureMessage, deadline: Duration) -> Result<TransportResponse, HandshakeError> {
        let response = self
            .shared
            .transport
            .send(message, deadline)
            .await
            .map_err(transport_error)?;
        if !response.success {
            return Err(HandshakeError::Internal(
                response.error.unwrap_or_else(|| "transport send failed".into()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl<R: Resolver + 'static, T: MessageTransport> HandshakeEngine for EcdhHandshakeEngine<R, T> {
    #[instrument(skip(self), fields(context_id, responder = %responder_did.as_str()))]
    async fn initiate(
        &self,
        context_id: &str,
        responder_did: &AgentDid,
        deadline: Duration,
    ) -> Result<Arc<RwLock<Session>>, HandshakeError> {
        let shared = &self.shared;
        let peer = shared
            .resolver
            .resolve(context_id, responder_did)
            .await
            .map_err(peer_into_handshake_error)?;
        if !peer.active {
            warn!("peer resolved but marked inactive");
            return Err(HandshakeError::UnknownPeer);
        }

        let (invitation, invitation_sig) = ecdh_flow::invite(context_id, shared.self_did.as_str(), &shared.signing);
        self.send(
            SecureMessage {
                id: Uuid::new_v4().to_string(),
                context_id: context_id.to_string(),
                task_id: handshake_task_id("invitation"),
                role: MessageRole::User,
                payload: encode(&invitation)?,
                did: shared.self_did.as_str().to_string(),
                signature: invitation_sig,
                metadata: empty_metadata(),
            },
            deadline,
        )
        .await?;

        let (request, request_sig, self_ephemeral) = ecdh_flow::request(context_id, &peer.kem_pk, &shared.signing);
        let response = self
            .send(
                SecureMessage {
                    id: Uuid::new_v4().to_string(),
                    context_id: context_id.to_string(),
                    task_id: handshake_task_id("request"),
                    role: MessageRole::User,
                    payload: encode(&request)?,
                    did: shared.self_did.as_str().to_string(),
                    signature: request_sig,
                    metadata: empty_metadata(),
                },
                deadline,
            )
            .await?;

        let signed_response: Signed<ecdh_flow::ResponseMessage> = decode(&response.data)?;
        let peer_ephemeral_pub = ecdh_flow::receive_response(
            &signed_response.message,
            &signed_response.signature,
            &peer.signing_pk,
            &shared.kem,
        )?;

        let (complete, complete_sig) = ecdh_flow::complete(context_id, &shared.signing);
        let complete_response = self
            .send(
                SecureMessage {
                    id: Uuid::new_v4().to_string(),
                    context_id: context_id.to_string(),
                    task_id: handshake_task_id("complete"),
                    role: MessageRole::User,
                    payload: encode(&complete)?,
                    did: shared.self_did.as_str().to_string(),
                    signature: complete_sig,
                    metadata: empty_metadata(),
                },
                deadline,
            )
            .await?;

        let signed_ack: Signed<ecdh_flow::CompleteAck> = decode(&complete_response.data)?;
        if !peer
            .signing_pk
            .verify(&serde_json::to_vec(&signed_ack.message).unwrap_or_default(), &signed_ack.signature)
        {
            return Err(HandshakeError::BadSignature);
        }

        let outcome = ecdh_flow::finalize_initiator(self_ephemeral, context_id, &peer_ephemeral_pub);
        let session = shared.manager.create(
            SessionId::new(outcome.session_id.clone()),
            Role::Initiator,
            derive_directional_keys(&outcome.seed, &outcome.session_id),
        )?;
        shared
            .manager
            .bind_key_id(KeyId::new(signed_ack.message.key_id), session.read().id().clone())?;

        debug!(session_id = %session.read().id().as_str(), "ecdh handshake completed as initiator");
        Ok(session)
    }

    #[instrument(skip(self, message), fields(context_id = %message.context_id, did = %message.did))]
    async fn handle_inbound(
        &self,
        message: SecureMessage,
    ) -> Result<(TransportResponse, Option<Arc<RwLock<Session>>>), HandshakeError> {
        let shared = &self.shared;
        let initiator_did = AgentDid::parse(&message.did).map_err(|_| HandshakeError::UnknownPeer)?;
        let peer = shared
            .resolver
            .resolve(&message.context_id, &initiator_did)
            .await
            .map_err(peer_into_handshake_error)?;
        if !peer.active {
            warn!("peer resolved but marked inactive");
            return Err(HandshakeError::UnknownPeer);
        }

        let phase = message
            .task_id
            .strip_prefix("handshake:")
            .ok_or_else(|| HandshakeError::Internal(format!("unrecognized task id: {}", message.task_id)))?;

        match phase {
            "invitation" => {
                let invitation: ecdh_flow::InvitationMessage = decode(&message.payload)?;
                ecdh_flow::receive_invitation(&invitation, &message.signature, &peer.signing_pk, shared.max_skew)?;
                let reply = TransportResponse {
                    success: true,
                    message_id: message.id,
                    task_id: message.task_id,
                    data: Vec::new(),
                    error: None,
                };
                Ok((reply, None))
            }
            "request" => {
                let request: ecdh_flow::RequestMessage = decode(&message.payload)?;
                let (response, response_sig) = ecdh_flow::receive_request(
                    &request,
                    &message.signature,
                    &peer.signing_pk,
                    &shared.kem,
                    &peer.kem_pk,
                    &shared.signing,
                    &self.pending,
                    Instant::now(),
                )?;
                let reply = TransportResponse {
                    success: true,
                    message_id: message.id,
                    task_id: message.task_id,
                    data: encode(&Signed {
                        message: response,
                        signature: response_sig,
                    })?,
                    error: None,
                };
                Ok((reply, None))
            }
            "complete" => {
                let complete: ecdh_flow::CompleteMessage = decode(&message.payload)?;
                let (outcome, key_id, ack, ack_sig) = ecdh_flow::receive_complete(
                    &complete,
                    &message.signature,
                    &peer.signing_pk,
                    &self.pending,
                    Instant::now(),
                    shared.max_skew,
                    &shared.signing,
                )?;

                let session = shared.manager.create(
                    SessionId::new(outcome.session_id.clone()),
                    Role::Responder,
                    derive_directional_keys(&outcome.seed, &outcome.session_id),
                )?;
                shared
                    .manager
                    .bind_key_id(KeyId::new(key_id), session.read().id().clone())?;
                debug!(session_id = %session.read().id().as_str(), "ecdh handshake completed as responder");

                let reply = TransportResponse {
                    success: true,
                    message_id: message.id,
                    task_id: message.task_id,
                    data: encode(&Signed {
                        message: ack,
                        signature: ack_sig,
                    })?,
                    error: None,
                };
                Ok((reply, Some(session)))
            }
            other => {
                warn!(phase = other, "unrecognized handshake phase");
                Err(HandshakeError::Internal(format!("unrecognized handshake phase: {other}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResolvedPeer;
    use crate::testing::{InMemoryResolver, LoopbackTransport};

    struct NullTransport;

    #[async_trait]
    impl MessageTransport for NullTransport {
        async fn send(&self, _message: SecureMessage, _deadline: Duration) -> Result<TransportResponse, String> {
            Err("NullTransport never sends".into())
        }
    }

    fn agent(seed: u8) -> (AgentDid, KemKeypair, SigningKeypair) {
        let did = AgentDid::parse(&format!("did:sage:ethereum:0x{seed:02x}")).unwrap();
        (did, KemKeypair::generate(), SigningKeypair::generate_ed25519())
    }

    /// Installs a `tracing` subscriber so the `#[instrument]` spans and
    /// `debug!`/`warn!` events on the handshake entry points below actually
    /// render somewhere instead of being dropped by the default no-op
    /// subscriber. Idempotent: a second call (from another test in this
    /// binary) finding a subscriber already set is not an error.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn hpke_engine_initiate_and_handle_inbound_converge() {
        init_tracing();
        let (initiator_did, initiator_kem, initiator_signing) = agent(1);
        let (responder_did, responder_kem, responder_signing) = agent(2);

        let responder_peer = ResolvedPeer::new(
            responder_signing.verifying_key(),
            responder_kem.public_key(),
            "https://responder".into(),
            true,
        );
        let initiator_peer = ResolvedPeer::new(
            initiator_signing.verifying_key(),
            initiator_kem.public_key(),
            "https://initiator".into(),
            true,
        );

        let mut initiator_registry = InMemoryResolver::new();
        initiator_registry.insert(&responder_did, responder_peer);
        let mut responder_registry = InMemoryResolver::new();
        responder_registry.insert(&initiator_did, initiator_peer);

        let transport = Arc::new(LoopbackTransport::<HpkeHandshakeEngine<InMemoryResolver, NullTransport>>::new());

        let responder_engine = Arc::new(HpkeHandshakeEngine::new(
            responder_did,
            responder_kem,
            responder_signing,
            CachingResolver::new(responder_registry),
            Arc::new(NullTransport),
            SessionManager::new(Default::default()),
            Arc::new(NonceCache::default()),
            Duration::from_secs(120),
        ));
        transport.install(Arc::clone(&responder_engine)).await;

        let initiator_engine = HpkeHandshakeEngine::new(
            initiator_did,
            initiator_kem,
            initiator_signing,
            CachingResolver::new(initiator_registry),
            Arc::clone(&transport),
            SessionManager::new(Default::default()),
            Arc::new(NonceCache::default()),
            Duration::from_secs(120),
        );

        let session = initiator_engine
            .initiate("ctx-1", &AgentDid::parse("did:sage:ethereum:0x02").unwrap(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!session.read().is_closed());
    }
}
