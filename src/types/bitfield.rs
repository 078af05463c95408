//! Bit-field access over 64-bit protocol words

use serde::{Deserialize, Serialize};

/// Mask with the low `width` bits set.
#[inline]
pub const fn mask(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

/// Extract a `width`-bit field starting at bit `offset` (bit 0 = LSB).
///
/// Callers guarantee `width + offset <= 64`.
#[inline]
pub const fn extract(word: u64, width: u32, offset: u32) -> u64 {
    if offset >= 64 {
        return 0;
    }
    (word >> offset) & mask(width)
}

/// Write `value` into a `width`-bit field at `offset`, leaving other bits untouched.
///
/// Bits of `value` above `width` are discarded.
#[inline]
pub const fn deposit(word: u64, value: u64, width: u32, offset: u32) -> u64 {
    if offset >= 64 {
        return word;
    }
    let field = mask(width) << offset;
    (word & !field) | ((value << offset) & field)
}

/// Reduce all 64 bits to one by successive halving XOR.
#[inline]
pub const fn xor_fold(word: u64) -> bool {
    let mut y = word;
    y ^= y >> 32;
    y ^= y >> 16;
    y ^= y >> 8;
    y ^= y >> 4;
    y ^= y >> 2;
    y ^= y >> 1;
    y & 1 == 1
}

/// Fixed position of a field within a protocol word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: u32,
    pub width: u32,
}

impl Field {
    pub const fn new(offset: u32, width: u32) -> Self {
        Self { offset, width }
    }

    #[inline]
    pub const fn get(self, word: u64) -> u64 {
        extract(word, self.width, self.offset)
    }

    #[inline]
    pub const fn put(self, word: u64, value: u64) -> u64 {
        deposit(word, value, self.width, self.offset)
    }

    /// Mask of the bits this field occupies.
    pub const fn bits(self) -> u64 {
        mask(self.width) << self.offset
    }
}

/// One 64-bit protocol word as read off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Word(pub u64);

impl Word {
    /// Size of a protocol word in bytes.
    pub const BYTES: usize = 8;

    /// Bit distinguishing header (`1`) from data (`0`) words.
    pub const DISCRIMINATOR: Field = Field::new(63, 1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Assemble a word from 8 bytes, most-significant byte first.
    ///
    /// Returns `None` if fewer than 8 bytes are supplied.
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let chunk: [u8; Self::BYTES] = bytes.get(..Self::BYTES)?.try_into().ok()?;
        Some(Self(u64::from_be_bytes(chunk)))
    }

    pub fn field(&self, field: Field) -> u64 {
        field.get(self.0)
    }

    /// Check if a specific bit is set.
    pub fn is_set(&self, bit: u32) -> bool {
        extract(self.0, 1, bit) == 1
    }

    pub fn is_header(&self) -> bool {
        self.field(Self::DISCRIMINATOR) == 1
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn extract_matches_shift_and_mask() {
        assert_eq!(extract(0xFF00, 8, 8), 0xFF);
        assert_eq!(extract(0x8000_0000_0000_0000, 1, 63), 1);
        assert_eq!(extract(u64::MAX, 64, 0), u64::MAX);
        assert_eq!(extract(0x1234, 0, 4), 0);
    }

    #[test]
    fn word_reads_big_endian() {
        let bytes = [0x80, 0, 0, 0, 0, 0, 0, 0x01, 0xAA];
        let word = Word::from_be_slice(&bytes).expect("8 bytes available");
        assert_eq!(word.value(), 0x8000_0000_0000_0001);
        assert!(word.is_header());
        assert!(word.is_set(0));
        assert!(Word::from_be_slice(&bytes[..7]).is_none());
    }

    proptest! {
        #[test]
        fn deposit_then_extract_returns_field(
            word in any::<u64>(),
            value in any::<u64>(),
            offset in 0u32..64,
            width in 1u32..=64,
        ) {
            prop_assume!(offset + width <= 64);
            let packed = deposit(word, value, width, offset);
            prop_assert_eq!(extract(packed, width, offset), value & mask(width));
            // Bits outside the field are untouched
            let outside = !(mask(width) << offset);
            prop_assert_eq!(packed & outside, word & outside);
        }

        #[test]
        fn xor_fold_is_popcount_parity(word in any::<u64>()) {
            prop_assert_eq!(xor_fold(word), word.count_ones() % 2 == 1);
        }
    }
}
