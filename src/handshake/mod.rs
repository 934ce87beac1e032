//! Handshake state machines: the HPKE single-round-trip
//! variant and the ephemeral-ECDH four-message variant, both driven from
//! DID-only knowledge to a materialized [`Session`](crate::session::Session)
//! through a single [`HandshakeEngine`] trait.

pub mod ecdh_flow;
mod engine;
pub mod hpke_flow;
mod pending;

pub use engine::*;
pub use pending::{PendingHandshake, PendingHandshakeMap};
