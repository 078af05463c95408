//! Frame decoding: header + timestamp word + data words into sample records
//!
//! The decoder works on exactly one frame at a time. Deciding where frames
//! start and whether enough bytes have arrived is the job of
//! [`StreamAssembler`](crate::assembler::StreamAssembler).

use tracing::{trace, warn};

use crate::types::{
    DataWord, HeaderFields, HeaderLayout, SampleRecord, Timestamp, TimingConstants, Word,
    parity_check, read_data_word, read_header,
};

/// Outcome of decoding one complete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    pub header: HeaderFields,
    pub timestamp: Timestamp,
    pub parity_ok: bool,
    /// Samples appended to the output for this frame.
    pub samples: usize,
}

impl FrameSummary {
    /// Whether the decoded sample count matches the header's declared count.
    pub fn is_consistent(&self) -> bool {
        self.samples == self.header.num_clusters as usize
    }
}

/// Bit-level decoder for one header layout and hardware revision.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    layout: HeaderLayout,
    timing: TimingConstants,
}

impl FrameDecoder {
    pub fn new(layout: HeaderLayout, timing: TimingConstants) -> Self {
        Self { layout, timing }
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    pub fn timing(&self) -> TimingConstants {
        self.timing
    }

    pub fn read_header(&self, word: u64) -> HeaderFields {
        read_header(word, self.layout)
    }

    pub fn read_data_word(&self, word: u64) -> DataWord {
        read_data_word(word)
    }

    pub fn parity_check(&self, header_word: u64, transmitted_parity_bit: bool) -> bool {
        parity_check(header_word, transmitted_parity_bit, self.layout)
    }

    /// Combine the raw timestamp word with the header's time window and sample.
    ///
    /// Arithmetic wraps at 64 bits.
    pub fn compute_timestamp(&self, raw_ts_word: u64, header: &HeaderFields) -> Timestamp {
        let window = (header.time_window as u64)
            .wrapping_mul(self.timing.ticks_per_window)
            .wrapping_mul(self.timing.sample_freq);
        let sample = (header.time_sample as u64).wrapping_mul(self.timing.sample_freq);
        Timestamp(raw_ts_word.wrapping_add(window).wrapping_add(sample))
    }

    /// Length in bytes of the frame introduced by `header`.
    pub fn frame_len(&self, header: &HeaderFields) -> usize {
        self.layout.frame_len(header.num_clusters)
    }

    /// Decode one complete frame, appending its samples to `out`.
    ///
    /// `frame` must start with a header word and hold at least
    /// [`frame_len`](Self::frame_len) bytes; extra trailing bytes are ignored.
    /// Returns `None` if the slice is shorter than the frame it declares.
    pub fn decode_frame(&self, frame: &[u8], out: &mut Vec<SampleRecord>) -> Option<FrameSummary> {
        let header_word = Word::from_be_slice(frame)?.value();
        let header = self.read_header(header_word);
        let frame_len = self.frame_len(&header);
        let frame = frame.get(..frame_len)?;

        let parity_ok = self.parity_check(header_word, header.parity_bit);
        if !parity_ok {
            warn!(fec_id = header.fec_id, word = %format!("{header_word:#018x}"), "Header parity check failed");
        }

        let timestamp = match self.layout {
            HeaderLayout::Current => {
                let raw = Word::from_be_slice(&frame[Word::BYTES..])?.value();
                self.compute_timestamp(raw, &header)
            }
            HeaderLayout::Legacy => Timestamp(header.flat_timestamp.unwrap_or(0) as u64),
        };

        let before = out.len();
        for chunk in frame[self.layout.data_offset()..].chunks_exact(Word::BYTES) {
            let Some(word) = Word::from_be_slice(chunk) else { continue };
            let data = self.read_data_word(word.value());
            for &value in data.valid_samples() {
                let cluster = (out.len() - before) as u16;
                out.push(SampleRecord {
                    timestamp,
                    fec_id: header.fec_id,
                    channel: header.channel,
                    cluster,
                    value,
                    parity_ok,
                });
            }
        }

        let summary = FrameSummary { header, timestamp, parity_ok, samples: out.len() - before };
        trace!(
            fec_id = header.fec_id,
            clusters = header.num_clusters,
            samples = summary.samples,
            timestamp = timestamp.value(),
            "Decoded frame"
        );
        Some(summary)
    }
}
