//! Transport layer seams.
//!
//! Exposes the byte-stream traits the session reads from and writes to, and
//! the verifier that classifies an upgrade request before a session exists.

pub mod handshake;
pub mod io;

pub use handshake::{HandshakeVerifier, HeaderVerifier, UpgradeRequest};
pub use io::{IoTransport, Transport, TransportReader, TransportWriter};
