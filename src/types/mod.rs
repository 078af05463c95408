//! Core types for the TOAD wire format.
//!
//! This module provides the bit-level building blocks of the decoder:
//! - [`Word`] and [`Field`] give typed access to 64-bit protocol words
//! - [`HeaderLayout`] selects one of the two header bit layouts
//! - [`HeaderFields`] and [`DataWord`] hold decoded header and data words
//! - [`SampleRecord`] is one decoded sample, [`ReadoutRecord`] its downstream form
//!
//! ## Wire Format
//!
//! Every word is 64 bits read most-significant byte first, bit 0 being the LSB.
//! Bit 63 is set on header words and clear on data words. A data word carries
//! six 10-bit samples (bits 50..59 first) and a 3-bit padding count (bits 60..62).
//!
//! ## Usage Example
//!
//! ```rust
//! use toad_readout::types::{HeaderLayout, read_header, read_data_word};
//!
//! let header = read_header(0x8001_0000_0000_0000, HeaderLayout::Current);
//! assert!(header.is_header);
//! assert_eq!(header.num_clusters, 1);
//!
//! let data = read_data_word(0x5014_0000_0000_0000);
//! assert_eq!(data.valid_samples(), &[5]);
//! ```

pub mod bitfield;
mod data_word;
mod header;
pub mod layout;
mod record;

// Re-export all public types
pub use bitfield::{Field, Word, deposit, extract, xor_fold};
pub use data_word::{DataWord, read_data_word};
pub use header::{HeaderFields, expected_parity, parity_check, read_header};
pub use layout::HeaderLayout;
pub use record::{ReadoutRecord, SampleRecord, Timestamp, TimingConstants};
