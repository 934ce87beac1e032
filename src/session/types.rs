//! Small newtypes shared across the session layer.

use std::fmt;

/// A session identifier: `base64url_nopad(SHA-256(label || seed)[0:16])`.
/// Both handshake sides compute this independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an already-computed session identifier string.
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A responder-issued key identifier bound one-to-one to a [`SessionId`]
/// for that session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
    /// Generate a fresh, unguessable key id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing key id string (e.g. received over the wire).
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Borrow the key id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of a handshake a `Session` was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The side that initiated the handshake; its outbound direction is `c2s`.
    Initiator,
    /// The side that responded to the handshake; its outbound direction is `s2c`.
    Responder,
}

impl Role {
    /// Whether this role is the initiator.
    pub fn is_initiator(self) -> bool {
        matches!(self, Role::Initiator)
    }
}
