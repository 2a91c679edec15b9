//! Cloneable, thread-safe front of a running session.
//!
//! Every call is fire-and-forget: commands are queued with `try_send` and
//! encoded and written later on the session's own task.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use wsline_core::error::{Result, WsError};
use wsline_core::protocol::frame::MAX_CONTROL_PAYLOAD;
use wsline_core::protocol::{Opcode, ProtocolGeneration, SessionState};

#[derive(Debug)]
pub(crate) enum Command {
    Text(String),
    Binary(Bytes),
    Raw(Opcode, Bytes),
}

#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub(crate) id: u64,
    generation: ProtocolGeneration,
    commands: mpsc::Sender<Command>,
    stop: mpsc::Sender<()>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: u64,
        generation: ProtocolGeneration,
        commands: mpsc::Sender<Command>,
        stop: mpsc::Sender<()>,
        state: Arc<watch::Sender<SessionState>>,
    ) -> Self {
        Self {
            id,
            generation,
            commands,
            stop,
            state,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.enqueue(Command::Text(text.into()))
    }

    pub fn send_binary(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(Command::Binary(payload.into()))
    }

    /// Send one frame with an arbitrary opcode (e.g. an application PING).
    ///
    /// Modern framing only. Sending CLOSE starts a local close handshake.
    pub fn send_raw_frame(&self, opcode: Opcode, payload: impl Into<Bytes>) -> Result<()> {
        if self.generation.is_legacy() {
            return Err(WsError::Unsupported("raw frames require modern framing"));
        }
        let payload = payload.into();
        if opcode.is_control() && payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WsError::Unsupported("control frame payload over 125 bytes"));
        }
        self.enqueue(Command::Raw(opcode, payload))
    }

    /// Ask the session to close. Safe to call any number of times from anywhere.
    ///
    /// A session that was never started goes straight to `Closed`; starting it
    /// later only releases the transport and reports `closed`.
    pub fn stop(&self) {
        let unstarted = self.state.send_if_modified(|s| {
            if *s == SessionState::Created {
                *s = SessionState::Closed;
                true
            } else {
                false
            }
        });
        if !unstarted {
            // Full means a stop is already pending.
            let _ = self.stop.try_send(());
        }
    }

    /// Resolves once the session reached `Closed`.
    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    fn enqueue(&self, cmd: Command) -> Result<()> {
        if self.state() >= SessionState::Closing {
            return Err(WsError::Closed);
        }
        self.commands.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WsError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => WsError::Closed,
        })
    }
}
