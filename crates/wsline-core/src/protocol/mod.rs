//! Protocol modules (modern hybi framing + legacy Hixie framing).
//!
//! - `decoder` / `encoder` / `assembler`: length-prefixed, masked framing
//!   shared by drafts 8..15.
//! - `legacy`: terminator / length-prefix framing of Hixie-75 and Hixie-76.
//! - `control`: ping/pong/close handling and the session state enum.
//!
//! All parsers work on `bytes::BytesMut` buffers and report "need more input"
//! as `Ok(None)`, keeping partial state between calls.

pub mod assembler;
pub mod close;
pub mod control;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod generation;
pub mod legacy;
pub mod mask;

pub use assembler::{Assembled, MessageAssembler, MessageKind};
pub use close::CloseInfo;
pub use control::{ControlAction, ControlHandler, SessionState};
pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
pub use frame::{Frame, Opcode, Role};
pub use generation::{ModernVersion, ProtocolGeneration};
pub use legacy::{LegacyCodec, LegacyFrame};
