//! Shared error type across wsline crates.

use thiserror::Error;

use crate::protocol::close;

/// Stable error classification (used by logs, metrics and test vectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O failure on the underlying byte stream.
    Transport,
    /// Malformed frame or illegal frame sequence.
    Protocol,
    /// The request was not a WebSocket upgrade.
    HandshakeRejected,
    /// Upgrade request with a version this engine does not speak.
    UnsupportedVersion,
    /// Session already closing or closed.
    Closed,
    /// Outbound queue full.
    Backpressure,
    /// Operation not available for the negotiated protocol generation.
    Unsupported,
    /// Invalid configuration.
    Config,
}

impl ErrorKind {
    /// String representation used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::HandshakeRejected => "HANDSHAKE_REJECTED",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::Closed => "CLOSED",
            ErrorKind::Backpressure => "BACKPRESSURE",
            ErrorKind::Unsupported => "UNSUPPORTED",
            ErrorKind::Config => "CONFIG",
        }
    }
}

/// Fatal protocol violations. Every variant closes the session with 1002.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("reserved bits set")]
    ReservedBits,
    #[error("reserved opcode {0:#x}")]
    ReservedOpcode(u8),
    #[error("client frame without mask")]
    UnmaskedFrame,
    #[error("server frame with mask")]
    MaskedFrame,
    #[error("64-bit length with high bit set")]
    LengthHighBit,
    #[error("frame payload of {0} bytes exceeds limit")]
    FrameTooLarge(u64),
    #[error("message exceeds limit")]
    MessageTooLarge,
    #[error("fragmented control frame")]
    FragmentedControl,
    #[error("control frame payload of {0} bytes")]
    ControlTooLong(u64),
    #[error("continuation without an open message")]
    UnexpectedContinuation,
    #[error("data frame while a message is open")]
    MessageAlreadyOpen,
    #[error("control frame handed to assembler")]
    ControlFrameInAssembler,
    #[error("malformed close payload")]
    InvalidClosePayload,
    #[error("invalid utf-8")]
    InvalidUtf8,
    #[error("unknown legacy frame type {0:#x}")]
    LegacyFrameType(u8),
    #[error("legacy length overflow")]
    LegacyLengthOverflow,
    #[error("decoder already failed")]
    Poisoned,
}

impl Violation {
    /// Stable tag, used as a metric label and in test vectors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Violation::ReservedBits => "RESERVED_BITS",
            Violation::ReservedOpcode(_) => "RESERVED_OPCODE",
            Violation::UnmaskedFrame => "UNMASKED_FRAME",
            Violation::MaskedFrame => "MASKED_FRAME",
            Violation::LengthHighBit => "LENGTH_HIGH_BIT",
            Violation::FrameTooLarge(_) => "FRAME_TOO_LARGE",
            Violation::MessageTooLarge => "MESSAGE_TOO_LARGE",
            Violation::FragmentedControl => "FRAGMENTED_CONTROL",
            Violation::ControlTooLong(_) => "CONTROL_TOO_LONG",
            Violation::UnexpectedContinuation => "UNEXPECTED_CONTINUATION",
            Violation::MessageAlreadyOpen => "MESSAGE_ALREADY_OPEN",
            Violation::ControlFrameInAssembler => "CONTROL_IN_ASSEMBLER",
            Violation::InvalidClosePayload => "INVALID_CLOSE_PAYLOAD",
            Violation::InvalidUtf8 => "INVALID_UTF8",
            Violation::LegacyFrameType(_) => "LEGACY_FRAME_TYPE",
            Violation::LegacyLengthOverflow => "LEGACY_LENGTH_OVERFLOW",
            Violation::Poisoned => "POISONED",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, WsError>;

/// Unified error type used by core and session.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),
    #[error("protocol violation: {0}")]
    Protocol(#[from] Violation),
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
    #[error("session closed")]
    Closed,
    #[error("outbound queue full")]
    Backpressure,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("config: {0}")]
    Config(String),
}

impl WsError {
    /// Map to the stable classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WsError::Transport(_) => ErrorKind::Transport,
            WsError::Protocol(_) => ErrorKind::Protocol,
            WsError::HandshakeRejected(_) => ErrorKind::HandshakeRejected,
            WsError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            WsError::Closed => ErrorKind::Closed,
            WsError::Backpressure => ErrorKind::Backpressure,
            WsError::Unsupported(_) => ErrorKind::Unsupported,
            WsError::Config(_) => ErrorKind::Config,
        }
    }

    /// Close code this engine sends for the error, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            WsError::Protocol(_) => Some(close::PROTOCOL_ERROR),
            _ => None,
        }
    }

    /// The violation behind a protocol error.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            WsError::Protocol(v) => Some(v),
            _ => None,
        }
    }
}
