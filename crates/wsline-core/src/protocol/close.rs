//! Close status codes and CLOSE frame payloads.
//!
//! Only `NORMAL` and `PROTOCOL_ERROR` are ever generated by this engine; the
//! other codes are carried through opaquely when a peer reports them.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, Violation};

pub const NORMAL: u16 = 1000;
pub const GOING_AWAY: u16 = 1001;
pub const PROTOCOL_ERROR: u16 = 1002;
pub const UNSUPPORTED_DATA: u16 = 1003;
pub const INVALID_PAYLOAD: u16 = 1007;
pub const POLICY_VIOLATION: u16 = 1008;
pub const MESSAGE_TOO_BIG: u16 = 1009;
pub const INTERNAL_ERROR: u16 = 1011;

/// Longest reason that fits a control payload next to the 2-byte code.
pub const MAX_REASON_BYTES: usize = 123;

/// Status carried by a CLOSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: Option<String>,
}

impl CloseInfo {
    /// Code only.
    pub fn code(code: u16) -> Self {
        Self {
            code: Some(code),
            reason: None,
        }
    }

    /// Code plus reason; the reason is cut to `MAX_REASON_BYTES` on a char boundary.
    pub fn with_reason(code: u16, reason: &str) -> Self {
        let mut end = reason.len().min(MAX_REASON_BYTES);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            code: Some(code),
            reason: Some(reason[..end].to_owned()),
        }
    }

    /// Parse a received CLOSE payload.
    ///
    /// Empty payload → no code. One byte → violation. Otherwise a big-endian
    /// code followed by an optional UTF-8 reason.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload {
            [] => Ok(Self::default()),
            [_] => Err(Violation::InvalidClosePayload.into()),
            [hi, lo, rest @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                let reason = if rest.is_empty() {
                    None
                } else {
                    let s = std::str::from_utf8(rest).map_err(|_| Violation::InvalidUtf8)?;
                    Some(s.to_owned())
                };
                Ok(Self {
                    code: Some(code),
                    reason,
                })
            }
        }
    }

    /// Serialize as a CLOSE payload. Without a code the payload is empty and
    /// any reason is dropped.
    pub fn to_payload(&self) -> Bytes {
        let Some(code) = self.code else {
            return Bytes::new();
        };
        let reason = self.reason.as_deref().unwrap_or("");
        let mut buf = BytesMut::with_capacity(2 + reason.len());
        buf.put_u16(code);
        buf.put_slice(reason.as_bytes());
        buf.freeze()
    }

    /// Payload echoed back to a peer-initiated close: same code, no reason.
    pub fn echo_payload(&self) -> Bytes {
        CloseInfo {
            code: self.code,
            reason: None,
        }
        .to_payload()
    }
}
