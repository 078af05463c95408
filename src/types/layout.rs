//! Wire layouts for TOAD header and data words
//!
//! Every protocol word is 64 bits, transmitted most-significant byte first.
//! Bit 63 of every word is the header/data discriminator.
//!
//! Two header layouts exist in deployed firmware and nothing on the wire tells
//! them apart, so the layout is a per-link configuration constant.

use serde::{Deserialize, Serialize};

use super::bitfield::{Field, Word};

/// Current header layout: split FEC id, time window + time sample.
pub mod current {
    use super::Field;

    pub const RESERVED: Field = Field::new(0, 6);
    pub const PARITY: Field = Field::new(6, 1);
    pub const TIME_SAMPLE: Field = Field::new(7, 10);
    pub const TIME_WINDOW: Field = Field::new(17, 20);
    pub const FEC_ID_LOW: Field = Field::new(37, 11);
    pub const NUM_CLUSTERS: Field = Field::new(48, 10);
    pub const FEC_ID_HIGH: Field = Field::new(58, 5);

    /// Width of the low FEC id part; the high part is shifted above it.
    pub const FEC_ID_LOW_BITS: u32 = 11;
}

/// Legacy header layout: 9-bit FEC id, explicit channel, flat 32-bit timestamp.
pub mod legacy {
    use super::Field;

    pub const FEC_ID: Field = Field::new(0, 9);
    pub const NUM_CLUSTERS: Field = Field::new(9, 10);
    pub const CHANNEL: Field = Field::new(19, 5);
    pub const TIMESTAMP: Field = Field::new(24, 32);
    pub const PARITY: Field = Field::new(56, 1);
    pub const DATA_PARITY: Field = Field::new(57, 1);
    pub const PADDING: Field = Field::new(58, 3);
    pub const RESERVED: Field = Field::new(61, 2);
}

/// Data word layout, shared by both header layouts.
pub mod data {
    use super::Field;

    pub const PADDING: Field = Field::new(60, 3);
    pub const SAMPLE_BITS: u32 = 10;
    pub const SAMPLES_PER_WORD: usize = 6;

    /// Offset of the most-significant sample slot; later slots sit 10 bits lower.
    pub const FIRST_SLOT_OFFSET: u32 = 50;

    /// Field for sample slot `index`, 0 being the first transmitted (most significant).
    ///
    /// `index` must be below [`SAMPLES_PER_WORD`].
    pub(crate) const fn slot(index: usize) -> Field {
        debug_assert!(index < SAMPLES_PER_WORD);
        Field::new(FIRST_SLOT_OFFSET - SAMPLE_BITS * index as u32, SAMPLE_BITS)
    }
}

/// Header layout selected for a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    /// Split FEC id with time window/sample; a raw timestamp word follows the header.
    #[default]
    Current,

    /// 9-bit FEC id, 5-bit channel and a flat 32-bit timestamp inside the header.
    Legacy,
}

impl HeaderLayout {
    /// Largest cluster count the 10-bit header field can declare, in either layout.
    pub const MAX_CLUSTERS: u16 = (1 << 10) - 1;

    pub const fn as_str(self) -> &'static str {
        match self {
            HeaderLayout::Current => "current",
            HeaderLayout::Legacy => "legacy",
        }
    }

    /// Position of the transmitted header parity bit.
    pub const fn parity_field(self) -> Field {
        match self {
            HeaderLayout::Current => current::PARITY,
            HeaderLayout::Legacy => legacy::PARITY,
        }
    }

    /// Words between the header and the first data word.
    pub const fn timestamp_words(self) -> usize {
        match self {
            HeaderLayout::Current => 1,
            HeaderLayout::Legacy => 0,
        }
    }

    /// Data words needed to carry `num_clusters` samples.
    pub const fn data_words(num_clusters: u16) -> usize {
        (num_clusters as usize).div_ceil(data::SAMPLES_PER_WORD)
    }

    /// Total frame length in bytes: header, timestamp words and data words.
    pub const fn frame_len(self, num_clusters: u16) -> usize {
        Word::BYTES * (1 + self.timestamp_words() + Self::data_words(num_clusters))
    }

    /// Offset of the first data word within a frame, in bytes.
    pub const fn data_offset(self) -> usize {
        Word::BYTES * (1 + self.timestamp_words())
    }
}
