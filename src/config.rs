//! Link configuration
//!
//! ```rust
//! use toad_readout::config::{LinkConfig, LinkMode};
//!
//! let config = LinkConfig::from_yaml_str(
//!     "card_id: 2\nsource_link: tcp://*:5556\nmode: pubsub\nlayout: legacy\n",
//! )
//! .unwrap();
//! assert_eq!(config.mode, LinkMode::PubSub);
//! assert_eq!(config.bind_address(), "0.0.0.0:5556");
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{HeaderLayout, TimingConstants};
use crate::{ReadoutError, Result};

/// Largest frame the wire format can declare: 1023 clusters in the current layout.
pub const MAX_FRAME_BYTES: usize = HeaderLayout::Current.frame_len(HeaderLayout::MAX_CLUSTERS);

/// How payload messages are framed by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Every payload is preceded by a routing-identity part.
    #[default]
    Stream,

    /// Payloads arrive bare.
    PubSub,
}

impl LinkMode {
    /// Whether an identity part precedes each payload.
    pub fn identity_framed(self) -> bool {
        matches!(self, LinkMode::Stream)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkMode::Stream => "stream",
            LinkMode::PubSub => "pubsub",
        }
    }
}

/// Configuration for one physical link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub card_id: u32,
    pub link_tag: u32,

    /// Endpoint the front-end card connects to, e.g. `tcp://*:5556`.
    pub source_link: String,

    pub mode: LinkMode,

    /// Transport poll timeout in milliseconds.
    pub receiver_timeout_ms: u64,

    /// Sink enqueue timeout in milliseconds.
    pub sink_timeout_ms: u64,

    pub layout: HeaderLayout,
    pub timing: TimingConstants,

    /// Drop stray data words up to the next header after a desynchronization.
    pub resync_on_desync: bool,

    /// Accumulator size above which buffered bytes are discarded.
    pub max_buffer_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            card_id: 0,
            link_tag: 0,
            source_link: "tcp://127.0.0.1:5556".to_string(),
            mode: LinkMode::default(),
            receiver_timeout_ms: 100,
            sink_timeout_ms: 10,
            layout: HeaderLayout::default(),
            timing: TimingConstants::default(),
            resync_on_desync: false,
            max_buffer_bytes: 16 * 1024 * 1024,
        }
    }
}

impl LinkConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ReadoutError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_link.trim().is_empty() {
            return Err(ReadoutError::config_error("source_link is empty"));
        }
        if self.receiver_timeout_ms == 0 {
            return Err(ReadoutError::config_error("receiver_timeout_ms must be positive"));
        }
        if self.sink_timeout_ms == 0 {
            return Err(ReadoutError::config_error("sink_timeout_ms must be positive"));
        }
        if self.timing.sample_freq == 0 {
            return Err(ReadoutError::config_error("timing.sample_freq must be positive"));
        }
        if self.max_buffer_bytes < MAX_FRAME_BYTES {
            return Err(ReadoutError::config_error(format!(
                "max_buffer_bytes ({}) is smaller than the largest frame ({} bytes)",
                self.max_buffer_bytes, MAX_FRAME_BYTES
            )));
        }
        Ok(())
    }

    /// Socket address to listen on, derived from `source_link`.
    ///
    /// Strips a `tcp://` scheme and maps the `*` wildcard host to `0.0.0.0`.
    pub fn bind_address(&self) -> String {
        let addr = self.source_link.trim();
        let addr = addr.strip_prefix("tcp://").unwrap_or(addr);
        match addr.strip_prefix("*:") {
            Some(port) => format!("0.0.0.0:{port}"),
            None => addr.to_string(),
        }
    }

    pub fn receiver_timeout(&self) -> Duration {
        Duration::from_millis(self.receiver_timeout_ms)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }
}
