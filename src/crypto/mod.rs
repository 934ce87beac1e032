//! Cryptographic primitives: KEM/signature key types, HPKE, and the
//! session-seed key schedule.

mod hpke;
mod kdf;
mod keys;

pub use hpke::*;
pub use kdf::*;
pub use keys::*;
