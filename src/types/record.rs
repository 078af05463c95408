//! Decoded sample records and their downstream form

use serde::{Deserialize, Serialize};

/// Hardware timing constants used to build frame timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConstants {
    /// SAMPA ticks per time window.
    pub ticks_per_window: u64,

    /// SAMPA sampling frequency in Hz.
    pub sample_freq: u64,

    /// Accelerator clock frequency in Hz (reported, not used in timestamps).
    pub accelerator_clock_hz: u64,
}

impl Default for TimingConstants {
    fn default() -> Self {
        Self { ticks_per_window: 1024, sample_freq: 20_000_000, accelerator_clock_hz: 56_000_000 }
    }
}

/// 64-bit frame timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// One decoded physical sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: Timestamp,
    pub fec_id: u16,

    /// Explicit channel from a legacy header.
    pub channel: Option<u8>,

    /// Position of this sample within its frame.
    pub cluster: u16,

    /// Raw 10-bit ADC value.
    pub value: u16,

    /// Whether the frame header passed its parity check.
    pub parity_ok: bool,
}

/// Record shape pushed to the downstream sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadoutRecord {
    pub card_id: u32,
    pub link_tag: u32,
    pub timestamp: u64,
    pub fec_id: u16,
    pub channel: u8,
    pub cluster: u16,
    pub adc: u16,
    pub header_parity_ok: bool,
}

impl ReadoutRecord {
    /// Tag a decoded sample with the identity of the link it arrived on.
    pub fn from_sample(sample: &SampleRecord, card_id: u32, link_tag: u32) -> Self {
        Self {
            card_id,
            link_tag,
            timestamp: sample.timestamp.value(),
            fec_id: sample.fec_id,
            channel: sample.channel.unwrap_or(0),
            cluster: sample.cluster,
            adc: sample.value,
            header_parity_ok: sample.parity_ok,
        }
    }
}
