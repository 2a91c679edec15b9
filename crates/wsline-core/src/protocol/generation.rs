//! Negotiated protocol generation.

use std::fmt;

/// Hybi draft version in the modern range (8..=15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModernVersion(u8);

impl ModernVersion {
    pub const MIN: u8 = 8;
    pub const MAX: u8 = 15;

    /// `None` outside 8..=15.
    pub fn new(v: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&v).then_some(Self(v))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Framing family chosen once at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolGeneration {
    Legacy75,
    Legacy76,
    Modern(ModernVersion),
}

impl ProtocolGeneration {
    pub fn is_legacy(self) -> bool {
        matches!(self, ProtocolGeneration::Legacy75 | ProtocolGeneration::Legacy76)
    }

    /// Metric label ("hixie75", "hixie76", "modern").
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolGeneration::Legacy75 => "hixie75",
            ProtocolGeneration::Legacy76 => "hixie76",
            ProtocolGeneration::Modern(_) => "modern",
        }
    }
}

impl fmt::Display for ProtocolGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolGeneration::Modern(v) => write!(f, "hybi-{}", v.get()),
            other => f.write_str(other.as_str()),
        }
    }
}
