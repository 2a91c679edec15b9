//! Control frames (PING / PONG / CLOSE) and the session lifecycle states they drive.
//!
//! The handler is pure: it looks at the current state and a control frame and
//! tells the session what to write and which state to move to. Writing and
//! the actual transitions stay with the session, which owns the state.

use bytes::Bytes;

use crate::error::{Result, Violation};
use crate::protocol::close::CloseInfo;
use crate::protocol::frame::{Frame, Opcode};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Created,
    Started,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Started => "started",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// What the session must do in response to a control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Write a PONG carrying this payload.
    Pong(Bytes),
    /// Peer answered one of our pings.
    Heartbeat,
    /// Peer-initiated close: go `Closing`, write a CLOSE with `reply`, then
    /// shut the transport down and go `Closed`.
    EchoClose { info: CloseInfo, reply: Bytes },
    /// Peer echoed our close: shut the transport down and go `Closed`.
    Closed { info: CloseInfo },
    /// Nothing to do in the current state.
    Ignore,
}

/// Stateless interpreter for control frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControlHandler;

impl ControlHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, state: SessionState, frame: &Frame) -> Result<ControlAction> {
        match frame.opcode {
            // Pings are answered until the peer's CLOSE arrives, including while ours is pending.
            Opcode::Ping if answers_pings(state) => Ok(ControlAction::Pong(frame.payload.clone())),
            Opcode::Pong if answers_pings(state) => Ok(ControlAction::Heartbeat),
            Opcode::Ping | Opcode::Pong => Ok(ControlAction::Ignore),

            Opcode::Close => {
                let info = CloseInfo::parse(&frame.payload)?;
                match state {
                    SessionState::Open => {
                        let reply = info.echo_payload();
                        Ok(ControlAction::EchoClose { info, reply })
                    }
                    SessionState::Closing => Ok(ControlAction::Closed { info }),
                    _ => Ok(ControlAction::Ignore),
                }
            }

            _ => Err(Violation::ControlFrameInAssembler.into()),
        }
    }
}

fn answers_pings(state: SessionState) -> bool {
    matches!(state, SessionState::Open | SessionState::Closing)
}
