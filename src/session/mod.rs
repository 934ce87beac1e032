//! Session identity types, the per-session replay guard, the `Session`
//! itself, and the `SessionManager` that owns the live session set.

mod manager;
mod replay;
mod session;
mod types;

pub use manager::*;
pub use session::*;
pub use types::*;
