//! Header word decoding

use serde::{Deserialize, Serialize};

use super::bitfield::{Word, xor_fold};
use super::layout::{HeaderLayout, current, legacy};

/// Fields decoded from one 64-bit header word.
///
/// No range validation happens here; a garbage header yields garbage fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFields {
    /// Discriminator bit; `true` for a genuine header word.
    pub is_header: bool,

    /// Transmitted header parity bit.
    pub parity_bit: bool,

    /// Number of samples that follow in the data words.
    pub num_clusters: u16,

    /// Front-end card identifier.
    pub fec_id: u16,

    /// Coarse time window (current layout only, 0 otherwise).
    pub time_window: u32,

    /// Sample within the time window (current layout only, 0 otherwise).
    pub time_sample: u16,

    /// Reserved bits, right-aligned.
    pub reserved: u8,

    /// Explicit channel field (legacy layout only).
    pub channel: Option<u8>,

    /// Flat 32-bit timestamp carried in the header (legacy layout only).
    pub flat_timestamp: Option<u32>,
}

impl HeaderFields {
    /// Data words that follow the header (and timestamp word, if any).
    pub fn num_data_words(&self) -> usize {
        HeaderLayout::data_words(self.num_clusters)
    }

    /// Padding expected on the final data word for this cluster count.
    pub fn expected_padding(&self) -> usize {
        self.num_data_words() * super::layout::data::SAMPLES_PER_WORD
            - self.num_clusters as usize
    }
}

/// Decode a header word according to `layout`.
pub fn read_header(word: u64, layout: HeaderLayout) -> HeaderFields {
    let w = Word(word);
    match layout {
        HeaderLayout::Current => {
            let fec_high = w.field(current::FEC_ID_HIGH);
            let fec_low = w.field(current::FEC_ID_LOW);
            HeaderFields {
                is_header: w.is_header(),
                parity_bit: w.field(current::PARITY) == 1,
                num_clusters: w.field(current::NUM_CLUSTERS) as u16,
                fec_id: ((fec_high << current::FEC_ID_LOW_BITS) | fec_low) as u16,
                time_window: w.field(current::TIME_WINDOW) as u32,
                time_sample: w.field(current::TIME_SAMPLE) as u16,
                reserved: w.field(current::RESERVED) as u8,
                channel: None,
                flat_timestamp: None,
            }
        }
        HeaderLayout::Legacy => HeaderFields {
            is_header: w.is_header(),
            parity_bit: w.field(legacy::PARITY) == 1,
            num_clusters: w.field(legacy::NUM_CLUSTERS) as u16,
            fec_id: w.field(legacy::FEC_ID) as u16,
            time_window: 0,
            time_sample: 0,
            reserved: w.field(legacy::RESERVED) as u8,
            channel: Some(w.field(legacy::CHANNEL) as u8),
            flat_timestamp: Some(w.field(legacy::TIMESTAMP) as u32),
        },
    }
}

/// Parity the front end should have transmitted for `header_word`.
///
/// The XOR-fold covers every bit of the word except the parity bit itself.
pub fn expected_parity(header_word: u64, layout: HeaderLayout) -> bool {
    xor_fold(header_word & !layout.parity_field().bits())
}

/// Check the transmitted parity bit against the XOR-fold of the header word.
pub fn parity_check(header_word: u64, transmitted_parity_bit: bool, layout: HeaderLayout) -> bool {
    expected_parity(header_word, layout) == transmitted_parity_bit
}
