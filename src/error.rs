//! Error types for link readout and frame decoding.
//!
//! All errors implement `std::error::Error` and carry enough structured context
//! to tell an operator what to do next.
//!
//! ## Error Categories
//!
//! - **Protocol Errors**: word-alignment loss and cluster-count mismatches
//! - **Sink Errors**: downstream queue timeouts and closed queues
//! - **Transport Errors**: receive failures on the front-end link
//! - **Configuration Errors**: invalid or unreadable link configuration
//! - **Lifecycle Errors**: commands issued in the wrong link state
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use toad_readout::ReadoutError;
//! use std::time::Duration;
//!
//! let error = ReadoutError::SinkTimeout { sink: "toad_0".into(), timeout: Duration::from_millis(10) };
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for readout operations.
pub type Result<T, E = ReadoutError> = std::result::Result<T, E>;

/// Main error type for readout operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadoutError {
    #[error("Stream desynchronized at byte {offset}: expected header word, found {word:#018x}")]
    Desynchronized { offset: usize, word: u64 },

    #[error("FEC {fec_id}: frame declared {declared} clusters but {decoded} were decoded")]
    ClusterMismatch { fec_id: u16, declared: u16, decoded: usize },

    #[error("Sink '{sink}' did not accept record within {timeout:?}")]
    SinkTimeout { sink: String, timeout: Duration },

    #[error("Sink '{sink}' is closed")]
    SinkClosed { sink: String },

    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid link configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Link lifecycle error: {reason}")]
    Lifecycle { reason: String },
}

impl ReadoutError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReadoutError::Desynchronized { .. } => false,
            ReadoutError::ClusterMismatch { .. } => true,
            ReadoutError::SinkTimeout { .. } => true,
            ReadoutError::SinkClosed { .. } => false,
            ReadoutError::Transport { .. } => true,
            ReadoutError::Config { .. } => false,
            ReadoutError::File { .. } => false,
            ReadoutError::Lifecycle { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ReadoutError::Desynchronized { .. } => vec![
                "Restart the link to skip to the next header word",
                "Check the front-end firmware header layout matches the configured layout",
                "Enable resync_on_desync to skip stray data words automatically",
            ],
            ReadoutError::ClusterMismatch { .. } => vec![
                "Inspect padding counts reported by the front-end card",
                "Verify the configured header layout",
            ],
            ReadoutError::SinkTimeout { .. } => vec![
                "Increase the sink timeout",
                "Increase the downstream queue capacity",
                "Check the downstream consumer keeps up with the link rate",
            ],
            ReadoutError::SinkClosed { .. } => {
                vec!["Check the downstream consumer is still running", "Reconfigure the sink"]
            }
            ReadoutError::Transport { .. } => vec![
                "Check the front-end card is connected",
                "Verify the source link endpoint",
                "Check network connectivity to the card",
            ],
            ReadoutError::Config { .. } => vec![
                "Check configuration values against the documented defaults",
                "Validate the YAML configuration file",
            ],
            ReadoutError::File { .. } => {
                vec!["Check the configuration file exists and is readable", "Check file permissions"]
            }
            ReadoutError::Lifecycle { .. } => vec![
                "Configure the link before starting it",
                "Set a sink before starting the link",
            ],
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        ReadoutError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ReadoutError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        ReadoutError::Config { reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        ReadoutError::File { path, source }
    }

    /// Helper constructor for lifecycle errors.
    pub fn lifecycle(reason: impl Into<String>) -> Self {
        ReadoutError::Lifecycle { reason: reason.into() }
    }
}

impl From<std::io::Error> for ReadoutError {
    fn from(err: std::io::Error) -> Self {
        ReadoutError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_yaml_ng::Error> for ReadoutError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ReadoutError::Config { reason: err.to_string() }
    }
}
