//! Stream assembly: carry partial frames across transport messages
//!
//! Transport messages do not respect frame boundaries. [`StreamAssembler`]
//! accumulates received bytes and decodes every complete frame at the head of
//! the buffer, leaving a trailing partial frame in place until more bytes arrive.

use std::collections::VecDeque;

use tracing::{error, trace, warn};

use crate::ReadoutError;
use crate::decoder::FrameDecoder;
use crate::types::{SampleRecord, Timestamp, Word};

/// FIFO of received but not yet decoded bytes.
#[derive(Debug, Default)]
pub struct ByteAccumulator {
    bytes: VecDeque<u8>,
}

impl ByteAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { bytes: VecDeque::with_capacity(capacity) }
    }

    /// Append bytes at the tail.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.bytes.extend(bytes);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Drop every buffered byte, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.bytes.len();
        self.bytes.clear();
        dropped
    }

    /// Big-endian word starting `offset` bytes from the head.
    pub fn word_at(&self, offset: usize) -> Option<Word> {
        if self.bytes.len() < offset + Word::BYTES {
            return None;
        }
        let value =
            self.bytes.range(offset..offset + Word::BYTES).fold(0u64, |acc, &b| (acc << 8) | b as u64);
        Some(Word(value))
    }

    /// Remove `count` bytes from the head.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.bytes.len());
        self.bytes.drain(..count);
    }

    /// Buffered bytes as one slice.
    pub fn make_contiguous(&mut self) -> &[u8] {
        self.bytes.make_contiguous()
    }
}

/// A frame whose decoded sample count differs from its declared cluster count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterMismatch {
    pub fec_id: u16,
    pub declared: u16,
    pub decoded: usize,
}

impl From<ClusterMismatch> for ReadoutError {
    fn from(m: ClusterMismatch) -> Self {
        ReadoutError::ClusterMismatch { fec_id: m.fec_id, declared: m.declared, decoded: m.decoded }
    }
}

/// Why a `decode_available` call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Every buffered byte was decoded.
    Drained,

    /// The head of the buffer holds a partial frame (or partial header word).
    NeedMoreData { needed: usize, buffered: usize },

    /// A data word sits where a header word was expected. Nothing was consumed
    /// from that point on.
    Desynchronized { offset: usize, word: u64 },
}

impl DecodeStatus {
    /// Whether this status needs operator or resync action.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeStatus::Desynchronized { .. })
    }

    pub fn into_error(self) -> Option<ReadoutError> {
        match self {
            DecodeStatus::Desynchronized { offset, word } => {
                Some(ReadoutError::Desynchronized { offset, word })
            }
            _ => None,
        }
    }
}

/// Everything one `decode_available` call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutput {
    pub records: Vec<SampleRecord>,
    pub frames: usize,
    pub status: DecodeStatus,
    pub mismatches: Vec<ClusterMismatch>,
    pub parity_failures: usize,

    /// Timestamp of the last complete frame, including frames with no samples.
    pub last_timestamp: Option<Timestamp>,
}

impl DecodeOutput {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            frames: 0,
            status: DecodeStatus::Drained,
            mismatches: Vec::new(),
            parity_failures: 0,
            last_timestamp: None,
        }
    }
}

/// Accumulates link bytes and decodes complete frames from the head.
#[derive(Debug)]
pub struct StreamAssembler {
    decoder: FrameDecoder,
    buffer: ByteAccumulator,

    /// Bytes consumed since the assembler was created.
    stream_offset: usize,
}

impl StreamAssembler {
    pub fn new(decoder: FrameDecoder) -> Self {
        Self { decoder, buffer: ByteAccumulator::with_capacity(64 * 1024), stream_offset: 0 }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Stream position of the head of the buffer.
    pub fn stream_offset(&self) -> usize {
        self.stream_offset
    }

    /// Append one received message.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Drop all buffered bytes, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.buffer.clear();
        self.stream_offset += dropped;
        dropped
    }

    /// Drop leading data words until the head is a header word or fewer than
    /// 8 bytes remain. Returns the number of bytes dropped.
    pub fn resynchronize(&mut self) -> usize {
        let mut dropped = 0;
        while let Some(word) = self.buffer.word_at(dropped) {
            if word.is_header() {
                break;
            }
            dropped += Word::BYTES;
        }
        self.buffer.consume(dropped);
        self.stream_offset += dropped;
        if dropped > 0 {
            warn!(dropped, offset = self.stream_offset, "Resynchronized on next header word");
        }
        dropped
    }

    /// Decode every complete frame at the head of the buffer.
    ///
    /// Never blocks. Consumed frames are removed from the buffer; a trailing
    /// partial frame, or everything from a desynchronized word onward, stays put.
    pub fn decode_available(&mut self) -> DecodeOutput {
        let mut output = DecodeOutput::new();

        loop {
            let buffered = self.buffer.len();
            let Some(word) = self.buffer.word_at(0) else {
                if buffered > 0 {
                    output.status = DecodeStatus::NeedMoreData { needed: Word::BYTES, buffered };
                }
                break;
            };

            if !word.is_header() {
                error!(
                    offset = self.stream_offset,
                    word = %format!("{:#018x}", word.value()),
                    "Expected header word, stream desynchronized"
                );
                output.status =
                    DecodeStatus::Desynchronized { offset: self.stream_offset, word: word.value() };
                break;
            }

            let header = self.decoder.read_header(word.value());
            let frame_len = self.decoder.frame_len(&header);
            if buffered < frame_len {
                trace!(needed = frame_len, buffered, "Partial frame, waiting for more data");
                output.status = DecodeStatus::NeedMoreData { needed: frame_len, buffered };
                break;
            }

            let frame = self.buffer.make_contiguous();
            let Some(summary) = self.decoder.decode_frame(frame, &mut output.records) else {
                // Length was checked above; treat as partial to stay non-fatal.
                output.status = DecodeStatus::NeedMoreData { needed: frame_len, buffered };
                break;
            };

            if !summary.is_consistent() {
                warn!(
                    fec_id = header.fec_id,
                    declared = header.num_clusters,
                    decoded = summary.samples,
                    "Cluster count mismatch"
                );
                output.mismatches.push(ClusterMismatch {
                    fec_id: header.fec_id,
                    declared: header.num_clusters,
                    decoded: summary.samples,
                });
            }
            if !summary.parity_ok {
                output.parity_failures += 1;
            }

            output.frames += 1;
            output.last_timestamp = Some(summary.timestamp);
            self.buffer.consume(frame_len);
            self.stream_offset += frame_len;
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{FrameBuilder, encode_data_word, encode_stream};
    use crate::types::{HeaderLayout, TimingConstants};
    use proptest::prelude::*;

    fn assembler() -> StreamAssembler {
        StreamAssembler::new(FrameDecoder::default())
    }

    fn values(records: &[SampleRecord]) -> Vec<u16> {
        records.iter().map(|r| r.value).collect()
    }

    #[test]
    fn accumulator_reads_big_endian_words() {
        let mut acc = ByteAccumulator::new();
        acc.extend_from_slice(&[0xAA, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(acc.word_at(0), Some(Word(0xAA01_0203_0405_0607)));
        assert_eq!(acc.word_at(1), Some(Word(0x0102_0304_0506_0708)));
        assert_eq!(acc.word_at(2), None);

        acc.consume(4);
        assert_eq!(acc.len(), 5);
        assert_eq!(acc.make_contiguous(), &[0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(acc.clear(), 5);
        assert!(acc.is_empty());
    }

    #[test]
    fn empty_buffer_is_drained() {
        let output = assembler().decode_available();
        assert_eq!(output.status, DecodeStatus::Drained);
        assert!(output.records.is_empty());
    }

    #[test]
    fn decodes_several_frames_from_one_message() {
        let stream = encode_stream(&[
            FrameBuilder::new().fec_id(1).samples(&[1, 2, 3]),
            FrameBuilder::new().fec_id(2).samples(&[4, 5, 6, 7, 8, 9, 10]),
            FrameBuilder::new().fec_id(3).raw_timestamp(77),
        ]);

        let mut asm = assembler();
        asm.extend(&stream);
        let output = asm.decode_available();

        assert_eq!(output.status, DecodeStatus::Drained);
        assert_eq!(output.frames, 3);
        assert_eq!(values(&output.records), (1..=10).collect::<Vec<_>>());
        assert_eq!(output.last_timestamp, Some(Timestamp(77)));
        assert_eq!(asm.buffered(), 0);
        assert_eq!(asm.stream_offset(), stream.len());
    }

    #[test]
    fn single_bytes_complete_a_frame_on_the_last_call() {
        let frame = FrameBuilder::new().fec_id(4).samples(&[5]).encode();
        assert_eq!(frame.len(), 24);

        let mut asm = assembler();
        for (i, byte) in frame.iter().enumerate() {
            asm.extend(std::slice::from_ref(byte));
            let output = asm.decode_available();
            if i < 23 {
                assert!(output.records.is_empty(), "record emitted early at byte {i}");
                assert!(matches!(output.status, DecodeStatus::NeedMoreData { .. }));
            } else {
                assert_eq!(values(&output.records), vec![5]);
                assert_eq!(output.status, DecodeStatus::Drained);
            }
        }
    }

    #[test]
    fn partial_frame_reports_needed_length() {
        let frame = FrameBuilder::new().samples(&[1; 7]).encode();
        let mut asm = assembler();
        asm.extend(&frame[..20]);

        let output = asm.decode_available();
        assert_eq!(output.status, DecodeStatus::NeedMoreData { needed: 32, buffered: 20 });
        assert_eq!(asm.buffered(), 20);
    }

    #[test]
    fn desync_leaves_buffer_untouched() {
        let mut stream = encode_data_word(&[9, 9]).to_be_bytes().to_vec();
        stream.extend(FrameBuilder::new().samples(&[42]).encode());

        let mut asm = assembler();
        asm.extend(&stream);
        let output = asm.decode_available();
        assert!(output.status.is_fatal());
        assert!(output.records.is_empty());
        assert_eq!(asm.buffered(), stream.len());
        assert!(matches!(
            output.status.into_error(),
            Some(ReadoutError::Desynchronized { offset: 0, .. })
        ));

        // Calling again without realignment reports the same position.
        assert!(asm.decode_available().status.is_fatal());
        assert_eq!(asm.buffered(), stream.len());

        assert_eq!(asm.resynchronize(), 8);
        let output = asm.decode_available();
        assert_eq!(output.status, DecodeStatus::Drained);
        assert_eq!(values(&output.records), vec![42]);
    }

    #[test]
    fn desync_after_a_good_frame_keeps_earlier_records() {
        let mut stream = FrameBuilder::new().samples(&[1, 2]).encode();
        stream.extend(encode_data_word(&[3]).to_be_bytes());

        let mut asm = assembler();
        asm.extend(&stream);
        let output = asm.decode_available();
        assert_eq!(values(&output.records), vec![1, 2]);
        assert_eq!(
            output.status,
            DecodeStatus::Desynchronized { offset: 24, word: encode_data_word(&[3]) }
        );
        assert_eq!(asm.buffered(), 8);
    }

    #[test]
    fn cluster_mismatch_is_reported_and_records_kept() {
        let mut frame = FrameBuilder::new().fec_id(8).samples(&[1, 2, 3]).encode();
        frame[16..24].copy_from_slice(&encode_data_word(&[1, 2]).to_be_bytes());

        let mut asm = assembler();
        asm.extend(&frame);
        let output = asm.decode_available();
        assert_eq!(values(&output.records), vec![1, 2]);
        assert_eq!(output.mismatches, vec![ClusterMismatch { fec_id: 8, declared: 3, decoded: 2 }]);
        assert!(matches!(
            ReadoutError::from(output.mismatches[0]),
            ReadoutError::ClusterMismatch { declared: 3, decoded: 2, .. }
        ));
    }

    #[test]
    fn parity_failures_are_counted() {
        let stream = encode_stream(&[
            FrameBuilder::new().samples(&[1]).corrupt_parity(),
            FrameBuilder::new().samples(&[2]),
        ]);
        let mut asm = assembler();
        asm.extend(&stream);
        let output = asm.decode_available();
        assert_eq!(output.parity_failures, 1);
        assert_eq!(output.records.len(), 2);
    }

    #[test]
    fn legacy_frames_have_no_timestamp_word() {
        let stream = encode_stream(&[
            FrameBuilder::new().layout(HeaderLayout::Legacy).channel(3).raw_timestamp(10).samples(&[7]),
            FrameBuilder::new().layout(HeaderLayout::Legacy).channel(4).raw_timestamp(11).samples(&[8]),
        ]);
        assert_eq!(stream.len(), 32);

        let mut asm =
            StreamAssembler::new(FrameDecoder::new(HeaderLayout::Legacy, TimingConstants::default()));
        asm.extend(&stream);
        let output = asm.decode_available();
        assert_eq!(output.frames, 2);
        assert_eq!(output.records[1].channel, Some(4));
        assert_eq!(output.records[1].timestamp, Timestamp(11));
    }

    #[test]
    fn clear_advances_stream_offset() {
        let mut asm = assembler();
        asm.extend(&[0u8; 13]);
        assert_eq!(asm.clear(), 13);
        assert_eq!(asm.buffered(), 0);
        assert_eq!(asm.stream_offset(), 13);
    }

    prop_compose! {
        fn arb_frame()(
            fec_id in 0u16..=0xFFFF,
            time_window in 0u32..(1 << 20),
            time_sample in 0u16..1024,
            raw in any::<u64>(),
            samples in prop::collection::vec(0u16..1024, 0..40)
        ) -> FrameBuilder {
            FrameBuilder::new()
                .fec_id(fec_id)
                .time_window(time_window)
                .time_sample(time_sample)
                .raw_timestamp(raw)
                .samples(&samples)
        }
    }

    proptest! {
        #[test]
        fn split_delivery_matches_single_delivery(
            frames in prop::collection::vec(arb_frame(), 1..5),
            split in any::<prop::sample::Index>()
        ) {
            let stream = encode_stream(&frames);
            let cut = split.index(stream.len() + 1);

            let mut whole = assembler();
            whole.extend(&stream);
            let expected = whole.decode_available().records;

            let mut parts = assembler();
            parts.extend(&stream[..cut]);
            let mut records = parts.decode_available().records;
            parts.extend(&stream[cut..]);
            let last = parts.decode_available();
            records.extend(last.records);

            prop_assert_eq!(last.status, DecodeStatus::Drained);
            prop_assert_eq!(records, expected);
        }

        #[test]
        fn round_trip_preserves_sample_order(
            samples in prop::collection::vec(0u16..1024, 0..60),
            raw in any::<u64>()
        ) {
            let bytes = FrameBuilder::new().raw_timestamp(raw).samples(&samples).encode();
            let mut asm = assembler();
            asm.extend(&bytes);
            let output = asm.decode_available();

            prop_assert_eq!(values(&output.records), samples);
            prop_assert!(output.records.iter().all(|r| r.timestamp == Timestamp(raw)));
            prop_assert!(output.mismatches.is_empty());
            prop_assert_eq!(output.parity_failures, 0);
        }
    }
}
