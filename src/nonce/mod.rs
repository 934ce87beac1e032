//! The handshake-layer Nonce Cache.

mod cache;

pub use cache::*;
