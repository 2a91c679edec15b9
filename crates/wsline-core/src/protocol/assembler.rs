//! Message reassembly across CONTINUATION frames.
//!
//! Text payloads are kept as opaque bytes here; UTF-8 validation happens when
//! the session hands a completed text message to the application.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, Violation};
use crate::protocol::frame::{Frame, Opcode};

/// Data message kind, fixed by the first fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Binary => "binary",
        }
    }
}

/// Outcome of feeding one data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    InProgress,
    Complete { kind: MessageKind, payload: Bytes },
}

#[derive(Debug)]
struct InFlightMessage {
    kind: MessageKind,
    payload: BytesMut,
}

/// Accumulates one logical message at a time, bounded by `max_message_bytes`.
#[derive(Debug)]
pub struct MessageAssembler {
    max_message_bytes: usize,
    current: Option<InFlightMessage>,
}

impl MessageAssembler {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            max_message_bytes,
            current: None,
        }
    }

    /// True while a fragmented message is open.
    pub fn in_progress(&self) -> bool {
        self.current.is_some()
    }

    /// Feed one data frame.
    ///
    /// On a violation the in-flight message (if any) is discarded.
    pub fn consume(&mut self, frame: Frame) -> Result<Assembled> {
        let res = self.step(frame);
        if res.is_err() {
            self.current = None;
        }
        res
    }

    fn step(&mut self, frame: Frame) -> Result<Assembled> {
        let kind = match frame.opcode {
            Opcode::Text => Some(MessageKind::Text),
            Opcode::Binary => Some(MessageKind::Binary),
            Opcode::Continuation => None,
            _ => return Err(Violation::ControlFrameInAssembler.into()),
        };

        match (kind, self.current.is_some()) {
            (Some(_), true) => Err(Violation::MessageAlreadyOpen.into()),
            (None, false) => Err(Violation::UnexpectedContinuation.into()),

            (Some(kind), false) => {
                self.check_len(frame.payload.len())?;
                if frame.fin {
                    return Ok(Assembled::Complete {
                        kind,
                        payload: frame.payload,
                    });
                }
                let mut payload = BytesMut::with_capacity(frame.payload.len());
                payload.extend_from_slice(&frame.payload);
                self.current = Some(InFlightMessage { kind, payload });
                Ok(Assembled::InProgress)
            }

            (None, true) => {
                let buffered = self.current.as_ref().map_or(0, |m| m.payload.len());
                self.check_len(buffered.saturating_add(frame.payload.len()))?;
                let Some(mut msg) = self.current.take() else {
                    return Err(Violation::UnexpectedContinuation.into());
                };
                msg.payload.extend_from_slice(&frame.payload);
                if !frame.fin {
                    self.current = Some(msg);
                    return Ok(Assembled::InProgress);
                }
                Ok(Assembled::Complete {
                    kind: msg.kind,
                    payload: msg.payload.freeze(),
                })
            }
        }
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_message_bytes {
            return Err(Violation::MessageTooLarge.into());
        }
        Ok(())
    }
}
