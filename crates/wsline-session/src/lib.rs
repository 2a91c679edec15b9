//! wsline session engine.
//!
//! Drives WebSocket sessions over an already-upgraded byte stream: framing
//! via `wsline-core`, lifecycle on one tokio task per session, strict YAML
//! config, tracing and in-process metrics.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod engine;
pub mod obs;
pub mod registry;
pub mod session;
pub mod transport;

pub use engine::Engine;
pub use session::{Session, SessionHandle, SessionHandler};
