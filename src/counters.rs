//! Link counters and telemetry snapshots
//!
//! [`LinkCounters`] is written by the ingestion worker and read from any
//! thread without locking. Every field is an independent atomic, so a snapshot
//! taken while the worker runs may mix values from adjacent iterations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::assembler::DecodeOutput;

/// Lock-free counters for one link.
#[derive(Debug)]
pub struct LinkCounters {
    records_decoded: AtomicU64,
    records_forwarded: AtomicU64,
    records_dropped: AtomicU64,
    frames_decoded: AtomicU64,
    bytes_received: AtomicU64,
    window_bytes: AtomicU64,
    last_record_size: AtomicU64,
    last_timestamp: AtomicU64,
    zero_receives: AtomicU64,
    desync_errors: AtomicU64,
    cluster_mismatches: AtomicU64,
    parity_failures: AtomicU64,
    transport_errors: AtomicU64,
    transport_connected: AtomicBool,

    epoch: Instant,
    window_start_micros: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub records_decoded: u64,
    pub records_forwarded: u64,
    pub records_dropped: u64,
    pub frames_decoded: u64,
    pub bytes_received: u64,
    /// Size in bytes of the last received payload.
    pub last_record_size: u64,
    pub last_timestamp: u64,
    pub zero_receives: u64,
    pub desync_errors: u64,
    pub cluster_mismatches: u64,
    pub parity_failures: u64,
    pub transport_errors: u64,
}

/// Identity and configuration of a link, as reported alongside its counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub card_id: u32,
    pub link_tag: u32,
    pub source_link: String,
    pub mode: String,
    pub layout: String,
    pub sink_name: Option<String>,
    pub running: bool,
}

/// Telemetry snapshot returned by [`LinkCounters::collect`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkInfo {
    #[serde(flatten)]
    pub status: LinkStatus,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub sink_is_set: bool,
    pub transport_connected: bool,
    /// Received MB/s since the previous collection.
    pub bandwidth_mb_s: f64,
}

impl Default for LinkCounters {
    fn default() -> Self {
        Self {
            records_decoded: AtomicU64::new(0),
            records_forwarded: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            window_bytes: AtomicU64::new(0),
            last_record_size: AtomicU64::new(0),
            last_timestamp: AtomicU64::new(0),
            zero_receives: AtomicU64::new(0),
            desync_errors: AtomicU64::new(0),
            cluster_mismatches: AtomicU64::new(0),
            parity_failures: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            transport_connected: AtomicBool::new(false),
            epoch: Instant::now(),
            window_start_micros: AtomicU64::new(0),
        }
    }
}

impl LinkCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A non-empty payload arrived.
    pub fn record_payload(&self, bytes: usize) {
        let bytes = bytes as u64;
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.window_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.last_record_size.store(bytes, Ordering::Relaxed);
    }

    pub fn record_zero_receive(&self) {
        self.zero_receives.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold the result of one assembler pass into the totals.
    pub fn record_decode(&self, output: &DecodeOutput) {
        self.records_decoded.fetch_add(output.records.len() as u64, Ordering::Relaxed);
        self.frames_decoded.fetch_add(output.frames as u64, Ordering::Relaxed);
        self.cluster_mismatches.fetch_add(output.mismatches.len() as u64, Ordering::Relaxed);
        self.parity_failures.fetch_add(output.parity_failures as u64, Ordering::Relaxed);
        if let Some(ts) = output.last_timestamp {
            self.last_timestamp.store(ts.value(), Ordering::Relaxed);
        }
    }

    pub fn record_desync(&self) {
        self.desync_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.records_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.transport_connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.transport_connected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            records_decoded: self.records_decoded.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            last_record_size: self.last_record_size.load(Ordering::Relaxed),
            last_timestamp: self.last_timestamp.load(Ordering::Relaxed),
            zero_receives: self.zero_receives.load(Ordering::Relaxed),
            desync_errors: self.desync_errors.load(Ordering::Relaxed),
            cluster_mismatches: self.cluster_mismatches.load(Ordering::Relaxed),
            parity_failures: self.parity_failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }

    /// Take a telemetry snapshot and start a new bandwidth window.
    ///
    /// The window reset is not atomic with respect to the writer; bytes
    /// arriving during collection may land in either window.
    pub fn collect(&self, status: LinkStatus, sink_is_set: bool) -> LinkInfo {
        let now = self.epoch.elapsed().as_micros() as u64;
        let start = self.window_start_micros.swap(now, Ordering::Relaxed);
        let window_bytes = self.window_bytes.swap(0, Ordering::Relaxed);
        let elapsed_secs = now.saturating_sub(start) as f64 / 1_000_000.0;
        let bandwidth_mb_s =
            if elapsed_secs > 0.0 { window_bytes as f64 / elapsed_secs / 1_000_000.0 } else { 0.0 };

        let info = LinkInfo {
            status,
            counters: self.snapshot(),
            sink_is_set,
            transport_connected: self.is_connected(),
            bandwidth_mb_s,
        };
        debug!(
            card_id = info.status.card_id,
            link_tag = info.status.link_tag,
            records = info.counters.records_decoded,
            bytes = info.counters.bytes_received,
            bandwidth_mb_s,
            "Collected link info"
        );
        info
    }

    /// Zero every counter and restart the bandwidth window.
    pub fn reset(&self) {
        for counter in [
            &self.records_decoded,
            &self.records_forwarded,
            &self.records_dropped,
            &self.frames_decoded,
            &self.bytes_received,
            &self.window_bytes,
            &self.last_record_size,
            &self.last_timestamp,
            &self.zero_receives,
            &self.desync_errors,
            &self.cluster_mismatches,
            &self.parity_failures,
            &self.transport_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.window_start_micros.store(self.epoch.elapsed().as_micros() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::StreamAssembler;
    use crate::decoder::FrameDecoder;
    use crate::encoder::{FrameBuilder, encode_stream};
    use std::sync::Arc;

    #[test]
    fn payloads_update_byte_totals_and_last_size() {
        let counters = LinkCounters::new();
        counters.record_payload(100);
        counters.record_payload(24);
        counters.record_zero_receive();

        let snap = counters.snapshot();
        assert_eq!(snap.bytes_received, 124);
        assert_eq!(snap.last_record_size, 24);
        assert_eq!(snap.zero_receives, 1);
    }

    #[test]
    fn decode_output_is_folded_in() {
        let stream = encode_stream(&[
            FrameBuilder::new().raw_timestamp(5).samples(&[1, 2]),
            FrameBuilder::new().raw_timestamp(9).samples(&[3]).corrupt_parity(),
        ]);
        let mut asm = StreamAssembler::new(FrameDecoder::default());
        asm.extend(&stream);
        let output = asm.decode_available();

        let counters = LinkCounters::new();
        counters.record_decode(&output);
        let snap = counters.snapshot();
        assert_eq!(snap.records_decoded, 3);
        assert_eq!(snap.frames_decoded, 2);
        assert_eq!(snap.parity_failures, 1);
        assert_eq!(snap.last_timestamp, 9);
    }

    #[test]
    fn collect_resets_the_bandwidth_window_only() {
        let counters = LinkCounters::new();
        counters.record_payload(2_000_000);
        std::thread::sleep(std::time::Duration::from_millis(5));

        let first = counters.collect(LinkStatus::default(), true);
        assert!(first.bandwidth_mb_s > 0.0);
        assert_eq!(first.counters.bytes_received, 2_000_000);

        let second = counters.collect(LinkStatus::default(), true);
        assert_eq!(second.bandwidth_mb_s, 0.0);
        assert_eq!(second.counters.bytes_received, 2_000_000);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(LinkCounters::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.record_forwarded();
                        counters.record_payload(1);
                    }
                })
            })
            .collect();
        for _ in 0..10 {
            let _ = counters.collect(LinkStatus::default(), false);
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = counters.snapshot();
        assert_eq!(snap.records_forwarded, 4000);
        assert_eq!(snap.bytes_received, 4000);
    }

    #[test]
    fn info_serializes_flat() {
        let counters = LinkCounters::new();
        counters.record_payload(8);
        let status = LinkStatus { card_id: 3, source_link: "tcp://*:5556".into(), ..Default::default() };
        let yaml = serde_yaml_ng::to_string(&counters.collect(status, false)).unwrap();
        assert!(yaml.contains("card_id: 3"));
        assert!(yaml.contains("bytes_received: 8"));
        assert!(yaml.contains("bandwidth_mb_s"));
    }

    #[test]
    fn reset_zeroes_everything() {
        let counters = LinkCounters::new();
        counters.record_payload(10);
        counters.record_desync();
        counters.reset();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }
}
