//! XOR masking of payload bytes (RFC 6455 §5.3).

/// XOR `buf` with `key`, starting at key position 0.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    apply_mask_offset(buf, key, 0);
}

/// XOR `buf` with `key`, as if `buf` started `offset` bytes into the payload.
///
/// Used when a payload arrives in several reads: each chunk is unmasked with
/// the running payload offset so the key phase stays aligned.
#[inline]
pub fn apply_mask_offset(buf: &mut [u8], key: [u8; 4], offset: u64) {
    let phase = (offset % 4) as usize;
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= key[(phase + i) & 3];
    }
}
