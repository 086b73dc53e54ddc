//! Codec layer: block compression, integer array compression and inline
//! scalar encodings.

pub mod compression;
pub mod inline;
pub mod integer;

pub use compression::{compress_block, decompress_block};
pub use integer::CompressedInt;
