//! wsline core: runtime-free WebSocket protocol engine.
//!
//! This crate holds the byte-exact parts of a server-side WebSocket endpoint:
//! masking, the resumable modern frame decoder, the frame encoder, message
//! reassembly, control-frame handling and the legacy (Hixie) codec. It carries
//! no transport or runtime dependencies so the same state machines can be
//! driven from the tokio session crate, from tests, or from another executor.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Untrusted input only ever surfaces as `WsError::Protocol`, never a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorKind, Result, Violation, WsError};
