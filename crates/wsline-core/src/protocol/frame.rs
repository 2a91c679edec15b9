//! Modern frame model: opcodes, frames, endpoint role.

use bytes::Bytes;

use crate::error::Violation;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// 4-bit frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parse the low nibble of header byte 0. Reserved values are violations.
    pub fn from_u8(v: u8) -> Result<Self, Violation> {
        match v {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(Violation::ReservedOpcode(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, Ping and Pong.
    pub fn is_control(self) -> bool {
        self.as_u8() >= 0x8
    }

    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Continuation => "continuation",
            Opcode::Text => "text",
            Opcode::Binary => "binary",
            Opcode::Close => "close",
            Opcode::Ping => "ping",
            Opcode::Pong => "pong",
        }
    }
}

/// Which side of the connection a codec works for.
///
/// A `Server` decoder requires masked frames; a `Client` decoder rejects them.
/// A `Server` encoder never masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// One decoded frame. `payload` is already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub fin: bool,
    pub masked: bool,
    pub payload_len: u64,
    pub mask_key: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    /// Unmasked single frame, as a server would emit it.
    pub fn new(opcode: Opcode, fin: bool, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            opcode,
            fin,
            masked: false,
            payload_len: payload.len() as u64,
            mask_key: None,
            payload,
        }
    }
}
