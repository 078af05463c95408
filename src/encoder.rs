//! Synthetic frame encoding
//!
//! The inverse of the decoder's bit layout. Used to emulate a TOAD front-end
//! card when no hardware is attached, and to build fixtures for tests and
//! benchmarks. Header parity is computed so that frames pass the parity check
//! unless [`FrameBuilder::corrupt_parity`] is requested.

use crate::types::layout::{current, data, legacy};
use tracing::warn;

use crate::types::{HeaderLayout, Word, expected_parity};

/// Pack up to six samples into a data word, padding the remaining slots.
///
/// Samples fill the most-significant slots first; values are truncated to 10 bits.
pub fn encode_data_word(samples: &[u16]) -> u64 {
    let samples = &samples[..samples.len().min(data::SAMPLES_PER_WORD)];
    let padding = (data::SAMPLES_PER_WORD - samples.len()) as u64;
    let word = samples
        .iter()
        .enumerate()
        .fold(0u64, |word, (i, &value)| data::slot(i).put(word, value as u64));
    data::PADDING.put(word, padding)
}

/// Builder for one complete frame.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    layout: HeaderLayout,
    fec_id: u16,
    channel: u8,
    time_window: u32,
    time_sample: u16,
    raw_timestamp: u64,
    reserved: u8,
    samples: Vec<u16>,
    declared_clusters: Option<u16>,
    corrupt_parity: bool,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(mut self, layout: HeaderLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn fec_id(mut self, fec_id: u16) -> Self {
        self.fec_id = fec_id;
        self
    }

    /// Channel field, only encoded by the legacy layout.
    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn time_window(mut self, time_window: u32) -> Self {
        self.time_window = time_window;
        self
    }

    pub fn time_sample(mut self, time_sample: u16) -> Self {
        self.time_sample = time_sample;
        self
    }

    /// Raw timestamp word (current layout) or flat 32-bit header timestamp (legacy).
    pub fn raw_timestamp(mut self, raw_timestamp: u64) -> Self {
        self.raw_timestamp = raw_timestamp;
        self
    }

    pub fn reserved(mut self, reserved: u8) -> Self {
        self.reserved = reserved;
        self
    }

    /// Sample values in transmission order.
    ///
    /// A frame carries at most [`HeaderLayout::MAX_CLUSTERS`] samples; any beyond that are dropped.
    pub fn samples(mut self, samples: &[u16]) -> Self {
        let kept = samples.len().min(HeaderLayout::MAX_CLUSTERS as usize);
        if kept < samples.len() {
            warn!(supplied = samples.len(), kept, "Frame sample count exceeds the header field");
        }
        self.samples = samples[..kept].to_vec();
        self
    }

    /// Declare a cluster count different from the number of samples supplied.
    ///
    /// Values above [`HeaderLayout::MAX_CLUSTERS`] are clamped to it.
    pub fn declared_clusters(mut self, clusters: u16) -> Self {
        self.declared_clusters = Some(clusters.min(HeaderLayout::MAX_CLUSTERS));
        self
    }

    /// Flip the transmitted parity bit so the header fails its parity check.
    pub fn corrupt_parity(mut self) -> Self {
        self.corrupt_parity = true;
        self
    }

    fn num_clusters(&self) -> u16 {
        self.declared_clusters.unwrap_or(self.samples.len() as u16)
    }

    /// The encoded header word, parity bit included.
    pub fn header_word(&self) -> u64 {
        let word = 1u64 << 63;
        let clusters = self.num_clusters() as u64;
        let word = match self.layout {
            HeaderLayout::Current => {
                let fec = self.fec_id as u64;
                let word = current::FEC_ID_HIGH.put(word, fec >> current::FEC_ID_LOW_BITS);
                let word = current::FEC_ID_LOW.put(word, fec);
                let word = current::NUM_CLUSTERS.put(word, clusters);
                let word = current::TIME_WINDOW.put(word, self.time_window as u64);
                let word = current::TIME_SAMPLE.put(word, self.time_sample as u64);
                current::RESERVED.put(word, self.reserved as u64)
            }
            HeaderLayout::Legacy => {
                let word = legacy::FEC_ID.put(word, self.fec_id as u64);
                let word = legacy::NUM_CLUSTERS.put(word, clusters);
                let word = legacy::CHANNEL.put(word, self.channel as u64);
                let word = legacy::TIMESTAMP.put(word, self.raw_timestamp);
                legacy::RESERVED.put(word, self.reserved as u64)
            }
        };
        let parity = expected_parity(word, self.layout) ^ self.corrupt_parity;
        self.layout.parity_field().put(word, parity as u64)
    }

    /// Data words in transmission order.
    pub fn data_words(&self) -> Vec<u64> {
        self.samples.chunks(data::SAMPLES_PER_WORD).map(encode_data_word).collect()
    }

    /// Encode the frame as big-endian bytes.
    pub fn encode(&self) -> Vec<u8> {
        let data_words = self.data_words();
        let mut out = Vec::with_capacity(Word::BYTES * (2 + data_words.len()));
        out.extend_from_slice(&self.header_word().to_be_bytes());
        if self.layout.timestamp_words() > 0 {
            out.extend_from_slice(&self.raw_timestamp.to_be_bytes());
        }
        for word in data_words {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out
    }
}

/// Concatenate encoded frames into one byte stream.
pub fn encode_stream(frames: &[FrameBuilder]) -> Vec<u8> {
    frames.iter().flat_map(FrameBuilder::encode).collect()
}

/// Deterministic stream of `frames` frames with `clusters` samples each.
///
/// Sample values cycle through the 10-bit range; FEC ids and time windows
/// advance per frame.
pub fn sample_stream(frames: usize, clusters: u16) -> Vec<u8> {
    let builders: Vec<FrameBuilder> = (0..frames)
        .map(|i| {
            let samples: Vec<u16> =
                (0..clusters).map(|c| ((i * 7 + c as usize * 13) % 1024) as u16).collect();
            FrameBuilder::new()
                .fec_id((i % 0xFFFF) as u16)
                .time_window(i as u32 & 0xF_FFFF)
                .time_sample((i % 1024) as u16)
                .raw_timestamp(i as u64 * 1_000)
                .samples(&samples)
        })
        .collect();
    encode_stream(&builders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parity_check, read_data_word, read_header};

    #[test]
    fn encoded_header_round_trips() {
        let builder = FrameBuilder::new()
            .fec_id(0xFFFF)
            .time_window(0xF_FFFF)
            .time_sample(1023)
            .samples(&[1; 13]);
        let word = builder.header_word();
        let header = read_header(word, HeaderLayout::Current);
        assert!(header.is_header);
        assert_eq!(header.fec_id, 0xFFFF);
        assert_eq!(header.time_window, 0xF_FFFF);
        assert_eq!(header.time_sample, 1023);
        assert_eq!(header.num_clusters, 13);
        assert!(parity_check(word, header.parity_bit, HeaderLayout::Current));
    }

    #[test]
    fn data_words_pad_only_the_last_word() {
        let builder = FrameBuilder::new().samples(&[3; 8]);
        let words = builder.data_words();
        assert_eq!(words.len(), 2);
        assert_eq!(read_data_word(words[0]).padding, 0);
        assert_eq!(read_data_word(words[1]).padding, 4);
        assert_eq!(read_data_word(words[1]).valid_samples(), &[3, 3]);
    }

    #[test]
    fn oversized_sample_list_stays_self_consistent() {
        let builder = FrameBuilder::new().samples(&[9; 1030]);
        let header = read_header(builder.header_word(), HeaderLayout::Current);
        assert_eq!(header.num_clusters, HeaderLayout::MAX_CLUSTERS);
        assert_eq!(builder.data_words().len(), HeaderLayout::data_words(HeaderLayout::MAX_CLUSTERS));
        assert_eq!(builder.encode().len(), HeaderLayout::Current.frame_len(HeaderLayout::MAX_CLUSTERS));

        let declared = FrameBuilder::new().declared_clusters(u16::MAX).header_word();
        assert_eq!(read_header(declared, HeaderLayout::Current).num_clusters, HeaderLayout::MAX_CLUSTERS);
    }

    #[test]
    fn sample_stream_has_expected_length() {
        let stream = sample_stream(4, 7);
        assert_eq!(stream.len(), 4 * HeaderLayout::Current.frame_len(7));
    }
}
