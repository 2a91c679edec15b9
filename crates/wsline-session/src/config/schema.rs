use std::time::Duration;

use serde::Deserialize;
use wsline_core::error::{Result, WsError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub version: u32,

    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WsError::Config(format!("unsupported config version {}", self.version)));
        }
        self.session.validate()
    }
}

/// Per-session limits and timeouts.
///
/// `max_message_bytes` and `close_timeout_ms` have no defaults: a deployment
/// must choose them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub max_message_bytes: usize,

    pub close_timeout_ms: u64,

    /// Defaults to `max_message_bytes`.
    #[serde(default)]
    pub max_frame_bytes: Option<usize>,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
}

impl SessionConfig {
    pub fn new(max_message_bytes: usize, close_timeout: Duration) -> Self {
        Self {
            max_message_bytes,
            close_timeout_ms: close_timeout.as_millis() as u64,
            max_frame_bytes: None,
            outbound_queue: default_outbound_queue(),
            read_chunk_bytes: default_read_chunk_bytes(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_MESSAGE_LIMIT).contains(&self.max_message_bytes) {
            return Err(WsError::Config(
                "session.max_message_bytes must be between 1 and 1073741824".into(),
            ));
        }
        if !(100..=600_000).contains(&self.close_timeout_ms) {
            return Err(WsError::Config(
                "session.close_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        if let Some(frame) = self.max_frame_bytes {
            if frame == 0 || frame > self.max_message_bytes {
                return Err(WsError::Config(
                    "session.max_frame_bytes must be between 1 and max_message_bytes".into(),
                ));
            }
        }
        if !(1..=65_536).contains(&self.outbound_queue) {
            return Err(WsError::Config(
                "session.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        if !(512..=1_048_576).contains(&self.read_chunk_bytes) {
            return Err(WsError::Config(
                "session.read_chunk_bytes must be between 512 and 1048576".into(),
            ));
        }
        Ok(())
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes.unwrap_or(self.max_message_bytes)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

const MAX_MESSAGE_LIMIT: usize = 1 << 30;

fn default_outbound_queue() -> usize {
    1024
}
fn default_read_chunk_bytes() -> usize {
    8192
}
