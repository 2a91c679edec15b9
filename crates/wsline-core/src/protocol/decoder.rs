//! Resumable modern frame decoder (panic-free).
//!
//! Parsing rules:
//! - Never index the input buffer, always go through `Buf` after a
//!   `remaining()` check.
//! - A sub-state that lacks bytes parks itself and returns `Ok(None)`; the
//!   next call resumes exactly where the previous one stopped.
//! - Payload bytes are unmasked in place as they are moved out of the input
//!   buffer, keeping the key phase across reads.
//! - After the first violation the decoder is poisoned.

use bytes::{Buf, BytesMut};

use crate::error::{Result, Violation};
use crate::protocol::frame::{Frame, Opcode, Role, MAX_CONTROL_PAYLOAD};
use crate::protocol::mask::apply_mask_offset;

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN7_BITS: u8 = 0x7F;

// Never reserve more than this up front, whatever the header claims.
const MAX_PREALLOC: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
struct Head {
    fin: bool,
    opcode: Opcode,
    masked: bool,
    len: u64,
}

#[derive(Debug)]
enum State {
    HeaderByte1,
    HeaderByte2 { fin: bool, opcode: Opcode },
    ExtendedLength { head: Head, width: usize },
    MaskKey { head: Head },
    Payload { head: Head, key: Option<[u8; 4]>, buf: BytesMut },
    Failed,
}

/// Incremental decoder for length-prefixed, maskable frames.
#[derive(Debug)]
pub struct FrameDecoder {
    role: Role,
    max_frame_bytes: u64,
    state: State,
}

impl FrameDecoder {
    pub fn new(role: Role, max_frame_bytes: usize) -> Self {
        Self {
            role,
            max_frame_bytes: max_frame_bytes as u64,
            state: State::HeaderByte1,
        }
    }

    /// True between frames (no partial header or payload retained).
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::HeaderByte1)
    }

    /// True once a violation has been reported.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed)
    }

    /// Decode at most one frame from `src`, consuming the bytes it uses.
    ///
    /// Returns `Ok(None)` when more input is needed.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            // A `?` below leaves the state at `Failed`.
            match std::mem::replace(&mut self.state, State::Failed) {
                State::Failed => return Err(Violation::Poisoned.into()),

                State::HeaderByte1 => {
                    if src.remaining() < 1 {
                        self.state = State::HeaderByte1;
                        return Ok(None);
                    }
                    let b = src.get_u8();
                    if b & RSV_BITS != 0 {
                        return Err(Violation::ReservedBits.into());
                    }
                    let opcode = Opcode::from_u8(b & OPCODE_BITS)?;
                    let fin = b & FIN_BIT != 0;
                    if opcode.is_control() && !fin {
                        return Err(Violation::FragmentedControl.into());
                    }
                    self.state = State::HeaderByte2 { fin, opcode };
                }

                State::HeaderByte2 { fin, opcode } => {
                    if src.remaining() < 1 {
                        self.state = State::HeaderByte2 { fin, opcode };
                        return Ok(None);
                    }
                    let b = src.get_u8();
                    let masked = b & MASK_BIT != 0;
                    self.check_mask(masked)?;

                    let head = Head { fin, opcode, masked, len: 0 };
                    self.state = match b & LEN7_BITS {
                        126 => State::ExtendedLength { head, width: 2 },
                        127 => State::ExtendedLength { head, width: 8 },
                        n => self.after_length(Head { len: u64::from(n), ..head })?,
                    };
                }

                State::ExtendedLength { head, width } => {
                    if src.remaining() < width {
                        self.state = State::ExtendedLength { head, width };
                        return Ok(None);
                    }
                    let len = if width == 2 {
                        u64::from(src.get_u16())
                    } else {
                        let v = src.get_u64();
                        if v >> 63 != 0 {
                            return Err(Violation::LengthHighBit.into());
                        }
                        v
                    };
                    self.state = self.after_length(Head { len, ..head })?;
                }

                State::MaskKey { head } => {
                    if src.remaining() < 4 {
                        self.state = State::MaskKey { head };
                        return Ok(None);
                    }
                    let mut key = [0u8; 4];
                    src.copy_to_slice(&mut key);
                    self.state = State::Payload {
                        head,
                        key: Some(key),
                        buf: payload_buf(head.len),
                    };
                }

                State::Payload { head, key, mut buf } => {
                    let have = buf.len() as u64;
                    let take = (head.len - have).min(src.remaining() as u64) as usize;
                    if take > 0 {
                        let mut chunk = src.split_to(take);
                        if let Some(key) = key {
                            apply_mask_offset(&mut chunk, key, have);
                        }
                        buf.extend_from_slice(&chunk);
                    }

                    if (buf.len() as u64) < head.len {
                        self.state = State::Payload { head, key, buf };
                        return Ok(None);
                    }

                    self.state = State::HeaderByte1;
                    tracing::trace!(opcode = head.opcode.as_str(), fin = head.fin, len = head.len, "frame decoded");
                    return Ok(Some(Frame {
                        opcode: head.opcode,
                        fin: head.fin,
                        masked: head.masked,
                        payload_len: head.len,
                        mask_key: key,
                        payload: buf.freeze(),
                    }));
                }
            }
        }
    }

    /// Lazy sequence of the frames currently decodable from `src`.
    ///
    /// Ends when more input is needed, or right after yielding an error.
    pub fn frames<'a>(&'a mut self, src: &'a mut BytesMut) -> Frames<'a> {
        Frames {
            decoder: self,
            src,
            done: false,
        }
    }

    fn check_mask(&self, masked: bool) -> Result<()> {
        match (self.role, masked) {
            (Role::Server, false) => Err(Violation::UnmaskedFrame.into()),
            (Role::Client, true) => Err(Violation::MaskedFrame.into()),
            _ => Ok(()),
        }
    }

    fn after_length(&self, head: Head) -> Result<State> {
        if head.opcode.is_control() && head.len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(Violation::ControlTooLong(head.len).into());
        }
        if head.len > self.max_frame_bytes {
            return Err(Violation::FrameTooLarge(head.len).into());
        }
        Ok(if head.masked {
            State::MaskKey { head }
        } else {
            State::Payload {
                head,
                key: None,
                buf: payload_buf(head.len),
            }
        })
    }
}

fn payload_buf(len: u64) -> BytesMut {
    BytesMut::with_capacity((len as usize).min(MAX_PREALLOC))
}

/// Iterator returned by [`FrameDecoder::frames`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    src: &'a mut BytesMut,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decoder.decode(self.src) {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
