//! Generic byte-block compression.
//!
//! Used for the token blob, fixed-size record arrays and as the back end of
//! the integer codec. Blocks are plain zlib streams; the uncompressed size
//! is always known to the caller from the surrounding layout.
//!
//! Other USD implementations use a different block codec, so files written
//! here do not interchange with them.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Compress a block.
pub fn compress_block(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a block that must expand to exactly `expected_size` bytes.
pub fn decompress_block(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let out = decompress_block_bounded(data, expected_size)?;
    if out.len() != expected_size {
        return Err(Error::corrupt(format!(
            "decompressed block has {} bytes, expected {}",
            out.len(),
            expected_size
        )));
    }
    Ok(out)
}

/// Decompress a block of unknown size, failing if it expands past `max_size`.
pub fn decompress_block_bounded(data: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(max_size);
    decoder
        .by_ref()
        .take(max_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::corrupt(format!("failed to decompress block: {}", e)))?;
    if out.len() > max_size {
        return Err(Error::corrupt(format!(
            "decompressed block exceeds {} bytes",
            max_size
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let original = b"TOKENS\0STRINGS\0FIELDS\0".repeat(100);
        let compressed = compress_block(&original).expect("compress");
        assert!(compressed.len() < original.len());
        let decompressed = decompress_block(&compressed, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_empty_block() {
        let compressed = compress_block(&[]).expect("compress");
        assert!(decompress_block(&compressed, 0).expect("decompress").is_empty());
    }

    #[test]
    fn test_size_mismatch_is_corrupt() {
        let compressed = compress_block(b"hello world").expect("compress");
        assert!(matches!(decompress_block(&compressed, 5), Err(Error::CorruptData(_))));
        assert!(matches!(decompress_block(&compressed, 50), Err(Error::CorruptData(_))));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(
            decompress_block(b"definitely not zlib", 10),
            Err(Error::CorruptData(_))
        ));
    }
}
