//! Modern frame encoder.

use bytes::{BufMut, BytesMut};

use crate::protocol::frame::{Opcode, Role};
use crate::protocol::mask::apply_mask;

/// Serializes opcode + payload into wire frames.
///
/// Frames written for `Role::Server` are never masked; the mask key argument
/// is only honored for `Role::Client`.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    role: Role,
}

impl FrameEncoder {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    /// Append one frame to `dst`.
    pub fn encode_frame(
        &self,
        opcode: Opcode,
        fin: bool,
        payload: &[u8],
        mask: Option<[u8; 4]>,
        dst: &mut BytesMut,
    ) {
        let mask = match self.role {
            Role::Server => None,
            Role::Client => mask,
        };

        let len = payload.len();
        dst.reserve(header_len(len, mask.is_some()) + len);

        let b0 = (if fin { 0x80 } else { 0x00 }) | opcode.as_u8();
        dst.put_u8(b0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= usize::from(u16::MAX) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(payload),
        }
    }

    /// Append a whole message, fragmenting data payloads above `max_frame_bytes`.
    ///
    /// Control opcodes are always written as a single frame.
    pub fn encode_message(&self, opcode: Opcode, payload: &[u8], max_frame_bytes: usize, dst: &mut BytesMut) {
        if opcode.is_control() || payload.len() <= max_frame_bytes || max_frame_bytes == 0 {
            self.encode_frame(opcode, true, payload, None, dst);
            return;
        }

        let mut chunks = payload.chunks(max_frame_bytes).peekable();
        let mut op = opcode;
        while let Some(chunk) = chunks.next() {
            let fin = chunks.peek().is_none();
            self.encode_frame(op, fin, chunk, None, dst);
            op = Opcode::Continuation;
        }
    }
}

fn header_len(len: usize, masked: bool) -> usize {
    let ext = if len < 126 {
        0
    } else if len <= usize::from(u16::MAX) {
        2
    } else {
        8
    };
    2 + ext + if masked { 4 } else { 0 }
}
