//! Integer array compression in 32-bit and 64-bit widths.
//!
//! Values are delta-encoded from a running previous value starting at zero.
//! The most common delta is stored once; every element then gets a 2-bit
//! code saying whether its delta is the common one or how many bytes hold
//! it. Encoded layout before block compression:
//!
//! ```text
//! [common delta: 4 or 8 bytes][codes: ceil(n / 4) bytes][variable-width deltas]
//! ```
//!
//! Code meanings: `0` common, `1..=3` small, medium and full width, which
//! are 1/2/4 bytes for the 32-bit codec and 2/4/8 bytes for the 64-bit one.
//! The encoded buffer is then passed through [`compress_block`].

use std::collections::HashMap;

use bytemuck::Pod;

use super::compression::{compress_block, decompress_block_bounded};
use crate::util::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Width {
    W32,
    W64,
}

impl Width {
    #[inline]
    const fn common_size(self) -> usize {
        match self {
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    /// Bytes used by each 2-bit code.
    #[inline]
    const fn code_sizes(self) -> [usize; 4] {
        match self {
            Width::W32 => [0, 1, 2, 4],
            Width::W64 => [0, 2, 4, 8],
        }
    }

    /// Upper bound of the encoded (uncompressed) buffer for `n` values.
    #[inline]
    const fn max_encoded_size(self, n: usize) -> usize {
        self.common_size() + n.div_ceil(4) + n * self.code_sizes()[3]
    }

    fn code_for(self, delta: i64, common: i64) -> u8 {
        if delta == common {
            return 0;
        }
        match self {
            Width::W32 => {
                if i8::try_from(delta).is_ok() {
                    1
                } else if i16::try_from(delta).is_ok() {
                    2
                } else {
                    3
                }
            }
            Width::W64 => {
                if i16::try_from(delta).is_ok() {
                    1
                } else if i32::try_from(delta).is_ok() {
                    2
                } else {
                    3
                }
            }
        }
    }
}

/// Most frequent delta; ties go to the larger value.
fn most_common(deltas: &[i64]) -> i64 {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &d in deltas {
        *counts.entry(d).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(d, _)| d)
        .unwrap_or(0)
}

fn encode(deltas: &[i64], width: Width) -> Vec<u8> {
    let n = deltas.len();
    let common = most_common(deltas);
    let sizes = width.code_sizes();

    let mut out = Vec::with_capacity(width.max_encoded_size(n));
    out.extend_from_slice(&common.to_le_bytes()[..width.common_size()]);
    let codes_start = out.len();
    out.resize(codes_start + n.div_ceil(4), 0);

    for (i, &d) in deltas.iter().enumerate() {
        let code = width.code_for(d, common);
        out[codes_start + i / 4] |= code << ((i % 4) * 2);
        let size = sizes[code as usize];
        out.extend_from_slice(&d.to_le_bytes()[..size]);
    }
    out
}

/// Sign-extend `bytes` (little-endian, 1..=8 bytes) to i64.
#[inline]
fn read_signed(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    let shift = 64 - bytes.len() * 8;
    (i64::from_le_bytes(buf) << shift) >> shift
}

fn decode(data: &[u8], n: usize, width: Width) -> Result<Vec<i64>> {
    let sizes = width.code_sizes();
    let common_size = width.common_size();
    let codes_len = n.div_ceil(4);
    if data.len() < common_size + codes_len {
        return Err(Error::corrupt(format!(
            "compressed integers truncated: {} bytes for {} values",
            data.len(),
            n
        )));
    }
    let common = read_signed(&data[..common_size]);
    let codes = &data[common_size..common_size + codes_len];
    let mut pos = common_size + codes_len;

    let mut out = Vec::with_capacity(n);
    let mut prev: i64 = 0;
    for i in 0..n {
        let code = (codes[i / 4] >> ((i % 4) * 2)) & 3;
        let delta = if code == 0 {
            common
        } else {
            let size = sizes[code as usize];
            let bytes = data.get(pos..pos + size).ok_or_else(|| {
                Error::corrupt(format!("compressed integers truncated at value {}", i))
            })?;
            pos += size;
            read_signed(bytes)
        };
        prev = prev.wrapping_add(delta);
        out.push(prev);
    }
    Ok(out)
}

fn compress_deltas(deltas: &[i64], width: Width) -> Result<Vec<u8>> {
    compress_block(&encode(deltas, width))
}

fn decompress_values(data: &[u8], n: usize, width: Width) -> Result<Vec<i64>> {
    let encoded = decompress_block_bounded(data, width.max_encoded_size(n))?;
    decode(&encoded, n, width)
}

/// Integer element types that can go through the integer codec.
pub trait CompressedInt: Pod {
    fn compress(values: &[Self]) -> Result<Vec<u8>>;
    fn decompress(data: &[u8], count: usize) -> Result<Vec<Self>>;
}

impl CompressedInt for i32 {
    fn compress(values: &[i32]) -> Result<Vec<u8>> {
        let mut prev = 0i32;
        let deltas: Vec<i64> = values
            .iter()
            .map(|&v| {
                let d = v.wrapping_sub(prev);
                prev = v;
                d as i64
            })
            .collect();
        compress_deltas(&deltas, Width::W32)
    }

    fn decompress(data: &[u8], count: usize) -> Result<Vec<i32>> {
        Ok(decompress_values(data, count, Width::W32)?
            .into_iter()
            .map(|v| v as i32)
            .collect())
    }
}

impl CompressedInt for u32 {
    fn compress(values: &[u32]) -> Result<Vec<u8>> {
        i32::compress(bytemuck::cast_slice(values))
    }

    fn decompress(data: &[u8], count: usize) -> Result<Vec<u32>> {
        Ok(i32::decompress(data, count)?.into_iter().map(|v| v as u32).collect())
    }
}

impl CompressedInt for i64 {
    fn compress(values: &[i64]) -> Result<Vec<u8>> {
        let mut prev = 0i64;
        let deltas: Vec<i64> = values
            .iter()
            .map(|&v| {
                let d = v.wrapping_sub(prev);
                prev = v;
                d
            })
            .collect();
        compress_deltas(&deltas, Width::W64)
    }

    fn decompress(data: &[u8], count: usize) -> Result<Vec<i64>> {
        decompress_values(data, count, Width::W64)
    }
}

impl CompressedInt for u64 {
    fn compress(values: &[u64]) -> Result<Vec<u8>> {
        i64::compress(bytemuck::cast_slice(values))
    }

    fn decompress(data: &[u8], count: usize) -> Result<Vec<u64>> {
        Ok(i64::decompress(data, count)?.into_iter().map(|v| v as u64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic xorshift so tests don't need a rand dependency.
    fn pseudo_random(n: usize, mut seed: u64) -> Vec<u64> {
        (0..n)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                seed
            })
            .collect()
    }

    fn roundtrip<T: CompressedInt + PartialEq + std::fmt::Debug>(values: &[T]) {
        let compressed = T::compress(values).expect("compress");
        let decompressed = T::decompress(&compressed, values.len()).expect("decompress");
        assert_eq!(decompressed, values);
    }

    #[test]
    fn test_all_zero() {
        roundtrip(&vec![0i32; 1000]);
        roundtrip(&vec![0u32; 17]);
        roundtrip(&vec![0i64; 1000]);
        roundtrip(&vec![0u64; 16]);
    }

    #[test]
    fn test_monotonic() {
        roundtrip(&(0..5000).collect::<Vec<i32>>());
        roundtrip(&(0..5000u32).map(|v| v * 3).collect::<Vec<u32>>());
        roundtrip(&(0..5000i64).map(|v| v * 1_000_000_007).collect::<Vec<i64>>());
        roundtrip(&(0..100u64).collect::<Vec<u64>>());
    }

    #[test]
    fn test_random() {
        let r = pseudo_random(4096, 0x9E37_79B9_7F4A_7C15);
        roundtrip(&r.iter().map(|&v| v as i32).collect::<Vec<_>>());
        roundtrip(&r.iter().map(|&v| v as u32).collect::<Vec<_>>());
        roundtrip(&r.iter().map(|&v| v as i64).collect::<Vec<_>>());
        roundtrip(&r);
    }

    #[test]
    fn test_extremes_wrap() {
        roundtrip(&[i32::MIN, i32::MAX, 0, i32::MIN, -1, 1]);
        roundtrip(&[u32::MAX, 0, u32::MAX]);
        roundtrip(&[i64::MIN, i64::MAX, 0, -1]);
        roundtrip(&[u64::MAX, 0, 1 << 63]);
    }

    #[test]
    fn test_empty() {
        roundtrip::<i32>(&[]);
        roundtrip::<u64>(&[]);
    }

    #[test]
    fn test_common_value_tie_prefers_larger() {
        assert_eq!(most_common(&[1, 1, 5, 5, 3]), 5);
        assert_eq!(most_common(&[-2, -2, 7]), -2);
        assert_eq!(most_common(&[]), 0);
    }

    #[test]
    fn test_encoded_layout() {
        // deltas: 1, 1, 1, 200 -> common 1, last needs i16
        let enc = encode(&[1, 1, 1, 200], Width::W32);
        assert_eq!(&enc[..4], &1i32.to_le_bytes());
        assert_eq!(enc[4], 0b10_00_00_00);
        assert_eq!(&enc[5..], &200i16.to_le_bytes());
        let dec = decode(&enc, 4, Width::W32).expect("decode");
        assert_eq!(dec, vec![1, 2, 3, 203]);
    }

    #[test]
    fn test_truncated_is_corrupt() {
        let enc = encode(&[1, 1000, -1000, 70000], Width::W32);
        assert!(decode(&enc[..enc.len() - 1], 4, Width::W32).is_err());
        assert!(decode(&enc[..2], 4, Width::W32).is_err());
        assert!(i32::decompress(b"junk", 4).is_err());
    }
}
