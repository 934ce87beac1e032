//! RFC 9421 HTTP Message Signatures: signs and verifies HTTP
//! requests whose `keyid` resolves either to a live session's bound key id
//! (HMAC-SHA-256) or to a DID-anchored signing key (Ed25519/Secp256k1).

pub mod canonical;
pub mod digest;
pub mod sign;
pub mod verify;

pub use canonical::{build_signature_base, Component, HttpRequestMeta, OwnedRequestMeta, SignatureParams};
pub use digest::{compute_content_digest, verify_content_digest};
pub use sign::{sign_request, SignedHeaders, SigningKey};
pub use verify::{parse_signature_headers, verify_request, ParsedSignature};
