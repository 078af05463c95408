//! Streaming ingestion and bit-level frame decoding for TOAD detector front-end links.
//!
//! A PACMAN/TOAD front-end card streams 64-bit big-endian words: a header word,
//! a timestamp word and a variable number of data words carrying six 10-bit
//! samples each. This crate reassembles frames split across transport
//! messages, decodes them into timestamped sample records and forwards the
//! records to a bounded sink, one worker per physical link.
//!
//! # Features
//!
//! - **Bit-exact decoding**: explicit shift/mask field access, two header layouts
//! - **Partial delivery**: frames spanning any number of messages decode identically
//! - **Backpressure**: sink sends time out and drop rather than stall the link
//! - **Lock-free telemetry**: atomic counters readable while the link runs
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use toad_readout::{LinkConfig, LinkHandler, Readout};
//!
//! fn main() -> toad_readout::Result<()> {
//!     toad_readout::init_tracing();
//!     let config = LinkConfig::load("toad_link.yaml")?;
//!     let (mut link, sender, mut records) = Readout::loopback(config, 1024)?;
//!
//!     let frame = toad_readout::encoder::FrameBuilder::new().samples(&[5]).encode();
//!     sender.blocking_send_message(Some(b"card".as_slice()), &frame)?;
//!
//!     if let Some(record) = records.blocking_recv() {
//!         println!("fec {} adc {}", record.fec_id, record.adc);
//!     }
//!     link.stop()
//! }
//! ```

use std::sync::Arc;

// Core types and error handling
mod error;
pub mod types;

// Decoding pipeline
pub mod assembler;
pub mod decoder;
pub mod encoder;

// Ingestion
pub mod config;
pub mod counters;
pub mod driver;
pub mod link;
pub mod sink;
pub mod transport;
pub mod transports;

// Core exports
pub use error::*;
pub use types::*;

pub use assembler::{ByteAccumulator, DecodeOutput, DecodeStatus, StreamAssembler};
pub use config::{LinkConfig, LinkMode};
pub use counters::{CounterSnapshot, LinkCounters, LinkInfo};
pub use decoder::{FrameDecoder, FrameSummary};
pub use link::{LinkHandler, LinkState, StreamLink};
pub use sink::{QueueSink, RecordReceiver, Sink};
pub use transport::Transport;
pub use transports::{ChannelTransport, MessageSender, TcpTransport};

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns quietly if a global subscriber is already set.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Entry point for building running links.
pub struct Readout;

impl Readout {
    /// Listen on `config.source_link` and start ingesting into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The endpoint cannot be bound
    /// - The worker thread cannot be spawned
    pub fn listen(config: LinkConfig, sink: Arc<dyn Sink>) -> Result<StreamLink> {
        let mut link = StreamLink::from_config(config, sink)?;
        link.start()?;
        Ok(link)
    }

    /// Start an in-process link.
    ///
    /// Messages injected through the returned sender are decoded by the link
    /// and the records delivered to the returned receiver, which holds at most
    /// `capacity` undelivered records.
    pub fn loopback(
        config: LinkConfig,
        capacity: usize,
    ) -> Result<(StreamLink, MessageSender, RecordReceiver)> {
        let (transport, sender) = ChannelTransport::pair(capacity);
        let sink_name = format!("toad_{}_{}", config.card_id, config.link_tag);
        let (sink, records) = QueueSink::bounded(sink_name, capacity);

        let mut link = StreamLink::new(transport);
        link.set_sink(Arc::new(sink));
        link.configure(config)?;
        link.start()?;
        Ok((link, sender, records))
    }
}
