//! Protocol constants fixed by the SAGE handshake and session protocol.
//!
//! These values are part of the wire protocol. Changing any of them breaks
//! interoperability with a peer running an unmodified build.

use std::time::Duration;

// =============================================================================
// KEY / TAG SIZES
// =============================================================================

/// X25519 / Ed25519 / shared-secret size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private scalar size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// AEAD key size (ChaCha20-Poly1305).
pub const AEAD_KEY_SIZE: usize = 32;

/// AEAD nonce size (ChaCha20-Poly1305): 4-byte direction prefix + 8-byte counter.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// MAC key size (HMAC-SHA-256).
pub const MAC_KEY_SIZE: usize = 32;

/// HMAC-SHA-256 tag size.
pub const MAC_TAG_SIZE: usize = 32;

/// Session seed size (HKDF-Extract PRK).
pub const SESSION_SEED_SIZE: usize = 32;

/// Handshake nonce size (HPKE Init message).
pub const HANDSHAKE_NONCE_SIZE: usize = 16;

// =============================================================================
// DOMAIN-SEPARATION LABELS
// =============================================================================

/// Label for the ephemeral-ECDH handshake variant's seed derivation.
pub const LABEL_ECDH_HANDSHAKE: &[u8] = b"a2a/handshake v1";

/// Label for the HPKE handshake variant's seed derivation.
pub const LABEL_HPKE_HANDSHAKE: &[u8] = b"sage/hpke v1";

/// Prefix for the HPKE `info` field: `LABEL_HPKE_INFO || initiator_did || responder_did`.
pub const LABEL_HPKE_INFO: &[u8] = b"sage/hpke v1";

/// Prefix for the HPKE `export_context` field: `LABEL_HPKE_EXPORT || context_id`.
pub const LABEL_HPKE_EXPORT: &[u8] = b"sage/export v1";

/// HKDF-Expand info label, initiator-outbound encryption key.
pub const INFO_C2S_ENC: &[u8] = b"c2s|enc|v1";

/// HKDF-Expand info label, initiator-outbound MAC key.
pub const INFO_C2S_SIGN: &[u8] = b"c2s|sign|v1";

/// HKDF-Expand info label, responder-outbound encryption key.
pub const INFO_S2C_ENC: &[u8] = b"s2c|enc|v1";

/// HKDF-Expand info label, responder-outbound MAC key.
pub const INFO_S2C_SIGN: &[u8] = b"s2c|sign|v1";

// =============================================================================
// REPLAY / NONCE
// =============================================================================

/// Per-session inbound sliding-window size, in sequence numbers.
pub const REPLAY_WINDOW_SIZE: usize = 256;

/// Maximum syntactically valid nonce length accepted by the Nonce Cache.
pub const MAX_NONCE_BYTES: usize = 64;

/// Default bound on the Nonce Cache's entry count.
pub const DEFAULT_NONCE_CACHE_CAPACITY: usize = 1_000_000;

/// Default nonce retention window.
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(300);

// =============================================================================
// HANDSHAKE / SESSION TIMING
// =============================================================================

/// Default acceptable clock skew for handshake timestamps.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(120);

/// TTL for a responder-side `PendingHandshake` record.
pub const DEFAULT_PENDING_HANDSHAKE_TTL: Duration = Duration::from_secs(900);

/// Default resolved-peer cache lifetime.
pub const PEER_CACHE_TTL: Duration = Duration::from_secs(900);

/// Default maximum session age.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// Default session idle timeout.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default maximum message count per session before forced expiry.
pub const DEFAULT_SESSION_MAX_MESSAGES: u64 = 1 << 32;

/// Default interval between Session Manager expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// RFC 9421 HTTP SIGNATURES
// =============================================================================

/// Algorithm label for session-bound HMAC signatures.
pub const ALG_HMAC_SHA256: &str = "hmac-sha256";

/// Algorithm label for Ed25519 signatures.
pub const ALG_ED25519: &str = "ed25519";

/// Algorithm label for Secp256k1 (Keccak-256 prehash, Ethereum-style) signatures.
pub const ALG_ECDSA_SECP256K1: &str = "ecdsa-p256-sha256";

/// Structured-field name for the synthesized signature-params component.
pub const SIGNATURE_PARAMS_COMPONENT: &str = "@signature-params";
