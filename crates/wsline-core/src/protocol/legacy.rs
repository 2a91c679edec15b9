//! Hixie-75 / Hixie-76 framing.
//!
//! Wire format:
//! - text:   `0x00`, payload, `0xFF` (a literal `0xFF` always terminates)
//! - binary: type byte with the high bit set, 7-bit big-endian length groups
//!   (high bit = more groups follow), then exactly that many bytes
//! - Hixie-76 only: `0xFF 0x00` is the closing frame
//!
//! No masking, no fragmentation, no ping/pong.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, Violation};
use crate::protocol::generation::ProtocolGeneration;

const TEXT_START: u8 = 0x00;
const TEXT_END: u8 = 0xFF;
const BINARY_TYPE: u8 = 0x80;
const CLOSE_TYPE: u8 = 0xFF;
const MORE_GROUPS: u8 = 0x80;

// A u64 needs at most ten 7-bit groups.
const MAX_LENGTH_GROUPS: usize = 10;

/// One decoded legacy frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyFrame {
    Text(Bytes),
    Binary(Bytes),
    Close,
}

/// Buffered legacy decoder/encoder.
#[derive(Debug)]
pub struct LegacyCodec {
    closing_frame: bool,
    max_message_bytes: usize,
    // Bytes of a pending text body already searched for the terminator.
    scanned: usize,
}

impl LegacyCodec {
    pub fn new(generation: ProtocolGeneration, max_message_bytes: usize) -> Self {
        Self {
            closing_frame: generation == ProtocolGeneration::Legacy76,
            max_message_bytes,
            scanned: 0,
        }
    }

    /// Decode one frame from the front of `src`, or `Ok(None)` if incomplete.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LegacyFrame>> {
        let Some(&frame_type) = src.first() else {
            return Ok(None);
        };

        if frame_type & BINARY_TYPE == 0 {
            if frame_type != TEXT_START {
                return Err(Violation::LegacyFrameType(frame_type).into());
            }
            return self.decode_text(src);
        }
        self.decode_binary(frame_type, src)
    }

    fn decode_text(&mut self, src: &mut BytesMut) -> Result<Option<LegacyFrame>> {
        let from = self.scanned.max(1);
        let body = src.get(from..).unwrap_or_default();

        let Some(pos) = body.iter().position(|b| *b == TEXT_END) else {
            if src.len() - 1 > self.max_message_bytes {
                return Err(Violation::MessageTooLarge.into());
            }
            self.scanned = src.len();
            return Ok(None);
        };

        let len = from - 1 + pos;
        if len > self.max_message_bytes {
            return Err(Violation::MessageTooLarge.into());
        }

        self.scanned = 0;
        src.advance(1);
        let payload = src.split_to(len).freeze();
        src.advance(1);
        Ok(Some(LegacyFrame::Text(payload)))
    }

    fn decode_binary(&mut self, frame_type: u8, src: &mut BytesMut) -> Result<Option<LegacyFrame>> {
        let mut len: u64 = 0;
        let mut idx = 1;
        loop {
            let Some(&b) = src.get(idx) else {
                return Ok(None);
            };
            idx += 1;
            if idx - 1 > MAX_LENGTH_GROUPS {
                return Err(Violation::LegacyLengthOverflow.into());
            }
            len = len
                .checked_mul(128)
                .and_then(|l| l.checked_add(u64::from(b & !MORE_GROUPS)))
                .ok_or(Violation::LegacyLengthOverflow)?;
            if len > self.max_message_bytes as u64 {
                return Err(Violation::MessageTooLarge.into());
            }
            if b & MORE_GROUPS == 0 {
                break;
            }
        }

        if self.closing_frame && frame_type == CLOSE_TYPE && len == 0 {
            src.advance(idx);
            return Ok(Some(LegacyFrame::Close));
        }

        let len = len as usize;
        if src.len() < idx + len {
            src.reserve(idx + len - src.len());
            return Ok(None);
        }

        src.advance(idx);
        Ok(Some(LegacyFrame::Binary(src.split_to(len).freeze())))
    }

    /// `0x00`, payload, `0xFF`.
    pub fn encode_text(&self, payload: &[u8], dst: &mut BytesMut) {
        dst.reserve(payload.len() + 2);
        dst.put_u8(TEXT_START);
        dst.put_slice(payload);
        dst.put_u8(TEXT_END);
    }

    /// `0x80`, length groups, payload.
    pub fn encode_binary(&self, payload: &[u8], dst: &mut BytesMut) {
        let mut groups = [0u8; MAX_LENGTH_GROUPS];
        let mut n = 0;
        let mut v = payload.len() as u64;
        loop {
            groups[n] = (v & 0x7f) as u8;
            n += 1;
            v >>= 7;
            if v == 0 {
                break;
            }
        }

        dst.reserve(1 + n + payload.len());
        dst.put_u8(BINARY_TYPE);
        for (i, g) in groups[..n].iter().enumerate().rev() {
            dst.put_u8(if i == 0 { *g } else { *g | MORE_GROUPS });
        }
        dst.put_slice(payload);
    }

    /// Closing frame; returns false for Hixie-75, which has none.
    pub fn encode_close(&self, dst: &mut BytesMut) -> bool {
        if !self.closing_frame {
            return false;
        }
        dst.put_slice(&[CLOSE_TYPE, 0x00]);
        true
    }
}
