//! The `MessageTransport` abstraction consumed by the
//! handshake engine. The core never opens a socket itself.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which side of a conversation produced a [`SecureMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The originating caller's agent.
    User,
    /// The counterparty agent.
    Agent,
}

/// A handshake or signed-request envelope handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureMessage {
    /// A per-message identifier, opaque to the transport.
    pub id: String,
    /// The handshake-attempt identifier shared by both peers.
    pub context_id: String,
    /// Task identifier, `handshake:<phase>` or `hpke:<phase>`.
    pub task_id: String,
    /// Which side sent this message.
    pub role: MessageRole,
    /// The opaque, already-serialized payload.
    pub payload: Vec<u8>,
    /// The sending agent's DID.
    pub did: String,
    /// Signature over a deterministic encoding of the payload.
    pub signature: Vec<u8>,
    /// Free-form metadata the transport passes through unexamined.
    pub metadata: HashMap<String, String>,
}

/// The reply to a [`SecureMessage`] send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResponse {
    /// Whether the send/reply round-trip succeeded at the transport level.
    pub success: bool,
    /// Echoes the request's `id`.
    pub message_id: String,
    /// Echoes the request's `task_id`.
    pub task_id: String,
    /// The reply payload, meaningful only when `success` is true.
    pub data: Vec<u8>,
    /// A transport-level error description, present iff `!success`.
    pub error: Option<String>,
}

/// Abstraction over whatever carries [`SecureMessage`]s between agents.
///
/// The handshake engine treats every send as "send-and-await-reply" with a
/// caller-supplied deadline; it never retries a send itself.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send `message` and await the peer's reply, or time out after `deadline`.
    async fn send(
        &self,
        message: SecureMessage,
        deadline: Duration,
    ) -> Result<TransportResponse, String>;
}

/// Build the `task_id` for an HPKE-variant message.
pub fn hpke_task_id(phase: &str) -> String {
    format!("hpke:{phase}")
}

/// Build the `task_id` for an ephemeral-ECDH-variant message.
pub fn handshake_task_id(phase: &str) -> String {
    format!("handshake:{phase}")
}
