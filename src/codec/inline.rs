//! Exact 32-bit inline encodings for scalar values.
//!
//! A value is inlined into its [`ValueRep`](crate::format::ValueRep) payload
//! only when the encoding is lossless; otherwise it is written to the file.

use half::f16;

/// Scalar component that may be stored as an exact `i8`.
pub trait InlineComponent: Copy + PartialEq {
    fn to_i8_exact(self) -> Option<i8>;
    fn from_i8(i: i8) -> Self;
}

impl InlineComponent for f64 {
    fn to_i8_exact(self) -> Option<i8> {
        let i = self as i8;
        (i as f64 == self).then_some(i)
    }
    fn from_i8(i: i8) -> Self {
        i as f64
    }
}

impl InlineComponent for f32 {
    fn to_i8_exact(self) -> Option<i8> {
        let i = self as i8;
        (i as f32 == self).then_some(i)
    }
    fn from_i8(i: i8) -> Self {
        i as f32
    }
}

impl InlineComponent for f16 {
    fn to_i8_exact(self) -> Option<i8> {
        let f = self.to_f32();
        let i = f as i8;
        (i as f32 == f).then_some(i)
    }
    fn from_i8(i: i8) -> Self {
        f16::from_f32(i as f32)
    }
}

impl InlineComponent for i32 {
    fn to_i8_exact(self) -> Option<i8> {
        i8::try_from(self).ok()
    }
    fn from_i8(i: i8) -> Self {
        i as i32
    }
}

/// Pack up to four components as exact `i8` bytes.
pub fn encode_components<T: InlineComponent>(components: &[T]) -> Option<u32> {
    if components.len() > 4 {
        return None;
    }
    let mut bytes = [0u8; 4];
    for (b, &c) in bytes.iter_mut().zip(components) {
        *b = c.to_i8_exact()? as u8;
    }
    Some(u32::from_le_bytes(bytes))
}

/// Inverse of [`encode_components`].
pub fn decode_components<T: InlineComponent, const N: usize>(bits: u32) -> [T; N] {
    let bytes = bits.to_le_bytes();
    std::array::from_fn(|i| T::from_i8(bytes.get(i).copied().unwrap_or(0) as i8))
}

/// Pack a square row-major matrix whose off-diagonal entries are zero and
/// whose diagonal entries are exact `i8`s.
pub fn encode_diagonal(m: &[f64], dim: usize) -> Option<u32> {
    if dim > 4 || m.len() != dim * dim {
        return None;
    }
    let mut diag = [0f64; 4];
    for r in 0..dim {
        for c in 0..dim {
            let v = m[r * dim + c];
            if r == c {
                diag[r] = v;
            } else if v != 0.0 {
                return None;
            }
        }
    }
    encode_components(&diag[..dim])
}

/// Inverse of [`encode_diagonal`]: a `dim * dim` row-major matrix.
pub fn decode_diagonal(bits: u32, dim: usize) -> Vec<f64> {
    let diag: [f64; 4] = decode_components(bits);
    let mut out = vec![0f64; dim * dim];
    for i in 0..dim.min(4) {
        out[i * dim + i] = diag[i];
    }
    out
}

/// Doubles inline when exactly representable as `f32`.
pub fn encode_f64(v: f64) -> Option<u32> {
    let f = v as f32;
    (f as f64 == v).then(|| f.to_bits())
}

pub fn decode_f64(bits: u32) -> f64 {
    f32::from_bits(bits) as f64
}

/// Signed 64-bit values inline when they fit in 32 bits.
pub fn encode_i64(v: i64) -> Option<u32> {
    i32::try_from(v).ok().map(|i| i as u32)
}

pub fn decode_i64(bits: u32) -> i64 {
    bits as i32 as i64
}

/// Unsigned 64-bit values inline when they fit in 32 bits.
pub fn encode_u64(v: u64) -> Option<u32> {
    u32::try_from(v).ok()
}

pub fn decode_u64(bits: u32) -> u64 {
    bits as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f64_inline() {
        assert_eq!(encode_f64(1.5).map(decode_f64), Some(1.5));
        assert_eq!(encode_f64(-0.25).map(decode_f64), Some(-0.25));
        assert!(encode_f64(0.1).is_none());
        assert!(encode_f64(f64::NAN).is_none());
        assert!(encode_f64(1e300).is_none());
    }

    #[test]
    fn test_int64_inline() {
        assert_eq!(encode_i64(-5).map(decode_i64), Some(-5));
        assert_eq!(encode_i64(i32::MIN as i64).map(decode_i64), Some(i32::MIN as i64));
        assert!(encode_i64(i32::MAX as i64 + 1).is_none());
        assert_eq!(encode_u64(u32::MAX as u64).map(decode_u64), Some(u32::MAX as u64));
        assert!(encode_u64(1 << 32).is_none());
    }

    #[test]
    fn test_vector_components() {
        let bits = encode_components(&[1.0f32, -2.0, 127.0]).expect("inline");
        let back: [f32; 3] = decode_components(bits);
        assert_eq!(back, [1.0, -2.0, 127.0]);
        assert!(encode_components(&[0.5f32, 0.0]).is_none());
        assert!(encode_components(&[128i32]).is_none());
        assert!(encode_components(&[300.0f64]).is_none());

        let h = [f16::from_f32(3.0), f16::from_f32(-4.0)];
        let back: [f16; 2] = decode_components(encode_components(&h).expect("inline"));
        assert_eq!(back, h);
    }

    #[test]
    fn test_diagonal_matrix() {
        let ident = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let bits = encode_diagonal(&ident, 3).expect("identity inlines");
        assert_eq!(decode_diagonal(bits, 3), ident.to_vec());

        let scaled = [2.0, 0.0, 0.0, -3.0];
        assert_eq!(decode_diagonal(encode_diagonal(&scaled, 2).expect("inline"), 2), scaled.to_vec());

        let off = [1.0, 0.5, 0.0, 1.0];
        assert!(encode_diagonal(&off, 2).is_none());
        let big = [1000.0, 0.0, 0.0, 1.0];
        assert!(encode_diagonal(&big, 2).is_none());
    }
}
