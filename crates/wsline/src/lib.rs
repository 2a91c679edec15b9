//! Top-level facade crate for wsline.
//!
//! Re-exports the framing core and the session engine so users can depend on a single crate.

pub mod core {
    pub use wsline_core::*;
}

pub mod session {
    pub use wsline_session::*;
}
