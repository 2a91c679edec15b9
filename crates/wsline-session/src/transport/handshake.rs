//! Upgrade request classification.
//!
//! The HTTP exchange itself happens outside this crate. A verifier only
//! decides whether an already-parsed request is a WebSocket upgrade and which
//! protocol generation it negotiates; the session trusts that answer.

use wsline_core::error::{Result, WsError};
use wsline_core::protocol::{ModernVersion, ProtocolGeneration};

/// Method and headers of an inbound HTTP request.
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    method: String,
    headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// First value of `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }
}

/// Decides whether a request is a WebSocket upgrade and which generation it speaks.
pub trait HandshakeVerifier: Send + Sync {
    fn verify(&self, request: &UpgradeRequest) -> Result<ProtocolGeneration>;
}

/// Header-based verifier.
///
/// - `Sec-WebSocket-Version: N` with N in 8..=15 → modern framing
/// - `Sec-WebSocket-Key1` + `Sec-WebSocket-Key2` → Hixie-76
/// - neither → Hixie-75
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderVerifier;

impl HeaderVerifier {
    /// True when method, `Upgrade` and `Connection` headers ask for a WebSocket.
    pub fn is_websocket_request(request: &UpgradeRequest) -> bool {
        let upgrade = request
            .get("Upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let connection = request
            .get("Connection")
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);
        request.method().eq_ignore_ascii_case("GET") && upgrade && connection
    }
}

impl HandshakeVerifier for HeaderVerifier {
    fn verify(&self, request: &UpgradeRequest) -> Result<ProtocolGeneration> {
        if !Self::is_websocket_request(request) {
            return Err(WsError::HandshakeRejected("not a websocket upgrade".into()));
        }

        if let Some(v) = request.get("Sec-WebSocket-Version") {
            let version = v
                .parse::<u8>()
                .ok()
                .and_then(ModernVersion::new)
                .ok_or_else(|| WsError::UnsupportedVersion(v.to_owned()))?;
            return Ok(ProtocolGeneration::Modern(version));
        }

        if request.get("Sec-WebSocket-Key1").is_some() && request.get("Sec-WebSocket-Key2").is_some() {
            return Ok(ProtocolGeneration::Legacy76);
        }

        Ok(ProtocolGeneration::Legacy75)
    }
}
