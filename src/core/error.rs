//! Error types for the SAGE core.

use thiserror::Error;

/// Errors from the Nonce Cache.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NonceError {
    /// The nonce failed the syntactic check (empty or oversized).
    #[error("malformed nonce")]
    Malformed,

    /// The nonce was already present within the TTL window.
    #[error("duplicate nonce")]
    Duplicate,
}

/// Errors from a single `Session`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session's outbound or inbound AEAD counter would wrap.
    #[error("AEAD counter exhausted, session must close")]
    CounterExhausted,

    /// AEAD authentication failed on decrypt.
    #[error("AEAD authentication failed")]
    AuthFailure,

    /// The inbound counter fell below the sliding window or repeated one
    /// already inside it.
    #[error("replayed or out-of-window counter")]
    Replay,

    /// The session has already been closed.
    #[error("session is closed")]
    Closed,

    /// The session has exceeded its age, idle, or message-count policy.
    #[error("session has expired")]
    Expired,

    /// HMAC verification of an inbound signature base failed.
    #[error("MAC verification failed")]
    MacAuthFailure,
}

/// Errors from the `SessionManager`.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A session with that id already exists.
    #[error("session already exists")]
    AlreadyExists,

    /// No session or key-id binding found.
    #[error("not found")]
    NotFound,

    /// A key id is already bound to a different session.
    #[error("key id already bound to a different session")]
    Conflict,

    /// The looked-up session has expired.
    #[error("session expired")]
    Expired,

    /// The looked-up session has been closed.
    #[error("session closed")]
    Closed,

    /// The underlying session reported an error during an operation
    /// delegated through the manager (e.g. MAC verification).
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors from either handshake variant.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A signed envelope failed signature verification.
    #[error("bad signature")]
    BadSignature,

    /// The message timestamp fell outside the allowed skew.
    #[error("clock skew exceeded")]
    ClockSkew,

    /// The handshake nonce had already been observed.
    #[error("replayed handshake nonce")]
    ReplayedNonce,

    /// Recomputed `info`/`export_context` did not match what was sent.
    #[error("tampered info")]
    TamperedInfo,

    /// The resolved peer is inactive or could not be resolved.
    #[error("unknown or inactive peer")]
    UnknownPeer,

    /// The pending handshake record had already expired.
    #[error("handshake expired")]
    Expired,

    /// A second handshake was attempted on a `context_id` already pending.
    #[error("a handshake is already pending for this context id")]
    AlreadyPending,

    /// The handshake did not complete before its deadline.
    #[error("handshake timed out")]
    Timeout,

    /// HPKE or X25519 operation failed.
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    /// The resolver or transport reported an error.
    #[error("internal error: {0}")]
    Internal(String),

    /// The Session Manager rejected session creation or binding.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// Errors from the RFC 9421 HTTP Signature Layer.
#[derive(Debug, Error)]
pub enum HttpSigError {
    /// No `Signature`/`Signature-Input` header pair was present.
    #[error("missing signature")]
    MissingSignature,

    /// The signature or signature-input header could not be parsed.
    #[error("malformed signature")]
    MalformedSignature,

    /// `keyid` did not resolve to a session or a registry identity.
    #[error("unknown key")]
    UnknownKey,

    /// Signature verification failed.
    #[error("bad signature")]
    BadSignature,

    /// `Content-Digest` did not match the actual request body.
    #[error("body tampered")]
    BodyTampered,

    /// `created` fell outside the allowed skew.
    #[error("stale signature")]
    Stale,

    /// The signature's `nonce` parameter had already been observed.
    #[error("replayed nonce")]
    ReplayedNonce,
}

/// Errors from a `Resolver` lookup.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The DID does not resolve to a known identity.
    #[error("unknown DID: {0}")]
    Unknown(String),

    /// The DID string failed to parse.
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    /// The upstream registry lookup failed.
    #[error("resolver backend error: {0}")]
    Backend(String),
}

/// Crate-wide error aggregating every component's error type.
///
/// Callers that don't care which layer failed can match on this; code that
/// needs component-specific detail works with the per-layer error types
/// directly (they're all reachable through `#[from]` here).
#[derive(Debug, Error)]
pub enum SageError {
    /// Nonce Cache error.
    #[error("nonce cache: {0}")]
    Nonce(#[from] NonceError),

    /// Session error.
    #[error("session: {0}")]
    Session(#[from] SessionError),

    /// Session Manager error.
    #[error("session manager: {0}")]
    Manager(#[from] ManagerError),

    /// Handshake error.
    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),

    /// HTTP signature layer error.
    #[error("http signature: {0}")]
    HttpSig(#[from] HttpSigError),

    /// Resolver error.
    #[error("resolver: {0}")]
    Resolver(#[from] ResolverError),

    /// DID parsing error.
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    /// Transport-level error surfaced from a `MessageTransport` implementation.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The HTTP-boundary error taxonomy, with its status mapping.
///
/// This is the single chokepoint where internal errors are collapsed into
/// the externally-visible taxonomy, so the boundary never acts as a
/// cryptographic oracle.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryError {
    /// 400 - the request itself was malformed.
    #[error("invalid request")]
    InvalidRequest,

    /// 401 - the DID failed to parse or resolve to a well-formed identity.
    #[error("invalid DID")]
    InvalidDid,

    /// 401 - a signature failed verification.
    #[error("invalid signature")]
    InvalidSignature,

    /// 401 - a signature's timestamp fell outside the allowed skew.
    #[error("expired signature")]
    ExpiredSignature,

    /// 401 - a nonce or counter was replayed.
    #[error("replay attack")]
    ReplayAttack,

    /// 401 - the session referenced by `keyid` has expired or closed.
    #[error("session expired")]
    SessionExpired,

    /// 404 - the DID does not resolve to a known identity.
    #[error("unknown DID")]
    UnknownDid,

    /// 500 - an internal error that carries no externally-safe detail.
    #[error("internal error")]
    InternalError,
}

impl BoundaryError {
    /// The HTTP status code assigned to this error.
    pub fn status_code(self) -> u16 {
        match self {
            BoundaryError::InvalidRequest => 400,
            BoundaryError::InvalidDid => 401,
            BoundaryError::InvalidSignature => 401,
            BoundaryError::ExpiredSignature => 401,
            BoundaryError::ReplayAttack => 401,
            BoundaryError::SessionExpired => 401,
            BoundaryError::UnknownDid => 404,
            BoundaryError::InternalError => 500,
        }
    }
}

impl From<&SageError> for BoundaryError {
    /// Collapses the internal taxonomy down to the opaque boundary taxonomy.
    ///
    /// Every cryptographic failure mode (bad MAC vs. wrong key, tampered
    /// info vs. bad signature, ...) maps to the same externally visible
    /// error so the boundary never acts as an oracle.
    fn from(err: &SageError) -> Self {
        match err {
            SageError::Nonce(_) => BoundaryError::ReplayAttack,
            SageError::Session(SessionError::Replay) => BoundaryError::ReplayAttack,
            SageError::Session(SessionError::Expired) => BoundaryError::SessionExpired,
            SageError::Session(SessionError::Closed) => BoundaryError::SessionExpired,
            SageError::Session(_) => BoundaryError::InvalidSignature,
            SageError::Manager(ManagerError::Expired) => BoundaryError::SessionExpired,
            SageError::Manager(ManagerError::Closed) => BoundaryError::SessionExpired,
            SageError::Manager(ManagerError::NotFound) => BoundaryError::SessionExpired,
            SageError::Manager(_) => BoundaryError::InvalidSignature,
            SageError::Handshake(HandshakeError::ClockSkew) => BoundaryError::ExpiredSignature,
            SageError::Handshake(HandshakeError::ReplayedNonce) => BoundaryError::ReplayAttack,
            SageError::Handshake(HandshakeError::UnknownPeer) => BoundaryError::UnknownDid,
            SageError::Handshake(_) => BoundaryError::InvalidSignature,
            SageError::HttpSig(HttpSigError::MissingSignature) => BoundaryError::InvalidRequest,
            SageError::HttpSig(HttpSigError::MalformedSignature) => BoundaryError::InvalidRequest,
            SageError::HttpSig(HttpSigError::UnknownKey) => BoundaryError::UnknownDid,
            SageError::HttpSig(HttpSigError::Stale) => BoundaryError::ExpiredSignature,
            SageError::HttpSig(HttpSigError::ReplayedNonce) => BoundaryError::ReplayAttack,
            SageError::HttpSig(_) => BoundaryError::InvalidSignature,
            SageError::Resolver(_) => BoundaryError::UnknownDid,
            SageError::InvalidDid(_) => BoundaryError::InvalidDid,
            SageError::Transport(_) => BoundaryError::InternalError,
        }
    }
}
