//! Engine config: strict YAML, validated before use.

pub mod schema;

use std::fs;
use std::path::Path;

use wsline_core::error::{Result, WsError};

pub use schema::{EngineConfig, SessionConfig};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| WsError::Config(format!("cannot read {}: {e}", path.display())))?;
    let cfg = load_from_str(&raw)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Unknown keys, missing required limits and out-of-range values are all
/// `WsError::Config`.
pub fn load_from_str(raw: &str) -> Result<EngineConfig> {
    let cfg: EngineConfig = serde_yaml::from_str(raw).map_err(|e| WsError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}
