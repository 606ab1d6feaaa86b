//! Intel-HEX data model
//!
//! [`HexRecord`] is a single `:CCAAAATTDD..KK` line; [`HexImage`] is a sparse
//! map of 32-bit addresses to bytes, stored as an ordered sequence of
//! contiguous blocks and able to parse and emit complete hex files.

mod image;
mod record;

pub use image::{Block, Endian, HexImage};
pub use record::{HexRecord, RecordType};

pub(crate) use image::emit_record;
