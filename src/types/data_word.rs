//! Data word decoding

use super::bitfield::Word;
use super::layout::data;

/// Six 10-bit sample slots plus the padding count of one data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataWord {
    /// Sample slots in transmission order (most significant first).
    pub samples: [u16; data::SAMPLES_PER_WORD],

    /// Number of trailing slots that carry no sample.
    pub padding: u8,

    /// Discriminator bit; `false` for a genuine data word.
    pub is_header: bool,
}

impl DataWord {
    /// Number of slots carrying real samples.
    pub fn valid_count(&self) -> usize {
        data::SAMPLES_PER_WORD.saturating_sub(self.padding as usize)
    }

    /// The slots carrying real samples, in transmission order.
    pub fn valid_samples(&self) -> &[u16] {
        &self.samples[..self.valid_count()]
    }
}

/// Decode a data word.
pub fn read_data_word(word: u64) -> DataWord {
    let w = Word(word);
    let mut samples = [0u16; data::SAMPLES_PER_WORD];
    for (i, sample) in samples.iter_mut().enumerate() {
        *sample = w.field(data::slot(i)) as u16;
    }
    DataWord { samples, padding: w.field(data::PADDING) as u8, is_header: w.is_header() }
}
