//! Array encodings.
//!
//! Arrays are stored as an element count followed by the elements. From
//! 0.5 integer arrays of at least [`MIN_COMPRESSED_ARRAY_SIZE`] elements
//! go through the integer codec; from 0.6 floating point arrays are either
//! stored as compressed integers (`'i'`) when every element is integral,
//! or as a lookup table plus compressed indexes (`'t'`) when there are few
//! distinct values.

use bytemuck::Pod;
use half::f16;

use super::reader::ValueReader;
use super::writer::ValueWriter;
use crate::codec::CompressedInt;
use crate::format::{TypeEnum, ValueRep, Version};
use crate::util::{Error, Result};
use crate::value::{Array, ArrayValue};

/// Arrays shorter than this are never compressed.
pub const MIN_COMPRESSED_ARRAY_SIZE: usize = 16;

/// Arrays smaller than this are copied even when they could alias the
/// mapping.
pub const MIN_ZERO_COPY_BYTES: usize = 2048;

/// Largest lookup table a float array may be encoded with.
const MAX_LUT_SIZE: usize = 1024;

const CODE_INTS: u8 = b'i';
const CODE_LUT: u8 = b't';

/// Floating point element types with compressed encodings.
pub trait FloatElem: Pod + PartialEq {
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
    fn bits(self) -> u64;
}

impl FloatElem for f16 {
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
    fn from_f64(v: f64) -> Self {
        f16::from_f64(v)
    }
    fn bits(self) -> u64 {
        self.to_bits() as u64
    }
}

impl FloatElem for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn bits(self) -> u64 {
        self.to_bits() as u64
    }
}

impl FloatElem for f64 {
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
    fn bits(self) -> u64 {
        self.to_bits()
    }
}

/// The element as an `i32`, if it round-trips exactly. Negative zero does
/// not, since its sign would be lost.
fn as_integral<T: FloatElem>(v: T) -> Option<i32> {
    let f = v.to_f64();
    if f < i32::MIN as f64 || f > i32::MAX as f64 || f.is_nan() {
        return None;
    }
    let i = f as i32;
    (T::from_f64(i as f64).bits() == v.bits()).then_some(i)
}

/// Lookup table and per-element indexes, if the array has few enough
/// distinct values.
fn build_lut<T: FloatElem>(values: &[T]) -> Option<(Vec<T>, Vec<u32>)> {
    let max_lut = (values.len() / 4).min(MAX_LUT_SIZE);
    let mut lut: Vec<T> = Vec::new();
    let mut indexes = Vec::with_capacity(values.len());
    for &v in values {
        let index = match lut.iter().position(|x| x.bits() == v.bits()) {
            Some(i) => i,
            None if lut.len() < max_lut => {
                lut.push(v);
                lut.len() - 1
            }
            None => return None,
        };
        indexes.push(index as u32);
    }
    (!lut.is_empty()).then_some((lut, indexes))
}

impl ValueReader<'_> {
    /// Seek to the array and read its element count. `None` for the empty
    /// array, which has no storage.
    fn read_array_count(&mut self, rep: ValueRep) -> Result<Option<usize>> {
        if rep.payload() == 0 {
            return Ok(None);
        }
        self.seek(rep.payload())?;
        if self.version() < Version::COMPRESSED_INT_ARRAYS {
            // Rank, always one.
            self.read_u32()?;
        }
        let n = if self.version() < Version::WIDE_ARRAY_COUNTS {
            self.read_u32()? as u64
        } else {
            self.read_u64()?
        };
        if n > self.remaining() {
            return Err(Error::corrupt(format!("array count {} exceeds file size", n)));
        }
        Ok(Some(n as usize))
    }

    /// `n` elements at the cursor, aliasing the mapping when allowed.
    fn read_elements<T: Pod>(&mut self, n: usize) -> Result<Array<T>> {
        #[cfg(feature = "mmap")]
        {
            let nbytes = n.saturating_mul(std::mem::size_of::<T>());
            if self.file.config.zero_copy_arrays && nbytes >= MIN_ZERO_COPY_BYTES {
                let start = self.tell();
                let mapped = self
                    .stream
                    .mapping()
                    .and_then(|map| Array::mapped(map.clone(), start as usize, n));
                if let Some(array) = mapped {
                    self.seek(start + nbytes as u64)?;
                    return Ok(array);
                }
            }
        }
        Ok(Array::new(self.read_pod_vec(n)?))
    }

    fn read_compressed<T: CompressedInt>(&mut self, n: usize) -> Result<Vec<T>> {
        let size = self.read_u64()?;
        let data = self.read_bytes(size)?;
        T::decompress(&data, n)
    }

    /// Array stored as plain elements.
    pub(super) fn raw_array<T: Pod>(&mut self, rep: ValueRep) -> Result<Array<T>> {
        match self.read_array_count(rep)? {
            Some(n) => self.read_elements(n),
            None => Ok(Array::default()),
        }
    }

    pub(super) fn int_array<T: CompressedInt>(&mut self, rep: ValueRep) -> Result<Array<T>> {
        let Some(n) = self.read_array_count(rep)? else {
            return Ok(Array::default());
        };
        if self.version() < Version::COMPRESSED_INT_ARRAYS
            || !rep.is_compressed()
            || n < MIN_COMPRESSED_ARRAY_SIZE
        {
            return self.read_elements(n);
        }
        Ok(Array::new(self.read_compressed(n)?))
    }

    pub(super) fn float_array<T: FloatElem>(&mut self, rep: ValueRep) -> Result<Array<T>> {
        let Some(n) = self.read_array_count(rep)? else {
            return Ok(Array::default());
        };
        if self.version() < Version::COMPRESSED_FLOAT_ARRAYS
            || !rep.is_compressed()
            || n < MIN_COMPRESSED_ARRAY_SIZE
        {
            return self.read_elements(n);
        }
        match self.read_u8()? {
            CODE_INTS => {
                let ints: Vec<i32> = self.read_compressed(n)?;
                Ok(ints.into_iter().map(|i| T::from_f64(i as f64)).collect())
            }
            CODE_LUT => {
                let lut_size = self.read_u32()? as usize;
                let lut: Vec<T> = self.read_pod_vec(lut_size)?;
                let indexes: Vec<u32> = self.read_compressed(n)?;
                indexes
                    .into_iter()
                    .map(|i| {
                        lut.get(i as usize).copied().ok_or_else(|| {
                            Error::corrupt(format!("lookup index {} out of {} entries", i, lut_size))
                        })
                    })
                    .collect()
            }
            code => Err(Error::corrupt(format!("unknown float array encoding {:#04x}", code))),
        }
    }
}

impl ValueWriter<'_> {
    fn write_count(&mut self, n: usize) -> Result<()> {
        if self.write_version() < Version::WIDE_ARRAY_COUNTS {
            self.write_u32(n as u32)
        } else {
            self.write_u64(n as u64)
        }
    }

    /// Elements aligned to eight bytes so readers can alias them.
    fn write_uncompressed<T: Pod>(&mut self, t: TypeEnum, values: &[T]) -> Result<ValueRep> {
        let rep = ValueRep::array(t, self.align(8)?);
        self.write_count(values.len())?;
        self.write_pod_slice(values)?;
        Ok(rep)
    }

    fn write_int_array<T: CompressedInt>(&mut self, t: TypeEnum, values: &[T]) -> Result<ValueRep> {
        let mut rep = ValueRep::array(t, self.tell());
        self.write_count(values.len())?;
        if values.len() < MIN_COMPRESSED_ARRAY_SIZE {
            self.write_pod_slice(values)?;
        } else {
            self.write_compressed_ints(values)?;
            rep.set_is_compressed();
        }
        Ok(rep)
    }

    fn write_float_array<T: FloatElem>(&mut self, t: TypeEnum, values: &[T]) -> Result<ValueRep> {
        if self.write_version() < Version::COMPRESSED_FLOAT_ARRAYS
            || values.len() < MIN_COMPRESSED_ARRAY_SIZE
        {
            return self.write_uncompressed(t, values);
        }
        let mut rep = ValueRep::array(t, self.tell());
        if let Some(ints) = values.iter().map(|&v| as_integral(v)).collect::<Option<Vec<i32>>>() {
            self.write_count(values.len())?;
            rep.set_is_compressed();
            self.write_u8(CODE_INTS)?;
            self.write_compressed_ints(&ints)?;
            return Ok(rep);
        }
        if let Some((lut, indexes)) = build_lut(values) {
            self.write_count(values.len())?;
            rep.set_is_compressed();
            self.write_u8(CODE_LUT)?;
            self.write_u32(lut.len() as u32)?;
            self.write_pod_slice(&lut)?;
            self.write_compressed_ints(&indexes)?;
            return Ok(rep);
        }
        self.write_uncompressed(t, values)
    }

    fn write_array(&mut self, array: &ArrayValue) -> Result<ValueRep> {
        let t = array.type_enum();
        if self.write_version() < Version::COMPRESSED_INT_ARRAYS {
            let rep = ValueRep::array(t, self.align(8)?);
            self.write_u32(1)?;
            self.write_u32(array.len() as u32)?;
            self.write_elements(array)?;
            return Ok(rep);
        }
        match array {
            ArrayValue::Int(a) => self.write_int_array(t, a),
            ArrayValue::UInt(a) => self.write_int_array(t, a),
            ArrayValue::Int64(a) => self.write_int_array(t, a),
            ArrayValue::UInt64(a) => self.write_int_array(t, a),
            ArrayValue::Half(a) => self.write_float_array(t, a),
            ArrayValue::Float(a) => self.write_float_array(t, a),
            ArrayValue::Double(a) => self.write_float_array(t, a),
            _ => {
                let rep = ValueRep::array(t, self.align(8)?);
                self.write_count(array.len())?;
                self.write_elements(array)?;
                Ok(rep)
            }
        }
    }

    /// Element bytes without any header. Strings and tokens are stored as
    /// table indexes.
    fn write_elements(&mut self, array: &ArrayValue) -> Result<()> {
        match array {
            ArrayValue::Bool(v) => {
                let bytes: Vec<u8> = v.iter().map(|&b| b as u8).collect();
                self.write_bytes(&bytes)
            }
            ArrayValue::String(v) => {
                let indices: Vec<u32> = v.iter().map(|s| self.add_string(s).0).collect();
                self.write_pod_slice(&indices)
            }
            ArrayValue::Token(v) => {
                let indices: Vec<u32> = v.iter().map(|s| self.add_token(s).0).collect();
                self.write_pod_slice(&indices)
            }
            ArrayValue::AssetPath(v) => {
                let indices: Vec<u32> = v.iter().map(|a| self.add_token(a.as_str()).0).collect();
                self.write_pod_slice(&indices)
            }
            other => {
                let bytes = other.pod_bytes().unwrap_or_default();
                self.write_bytes(bytes)
            }
        }
    }

    /// Encode an array, reusing identical arrays already written in this
    /// session. Empty arrays have no storage.
    pub(super) fn pack_array(&mut self, array: &ArrayValue) -> Result<ValueRep> {
        let t = array.type_enum();
        if array.is_empty() {
            return Ok(ValueRep::array(t, 0));
        }
        if t == TypeEnum::TimeCode {
            self.ctx.request_upgrade(Version::TIME_CODE, "a timecode array is written");
        }
        let mut key = Vec::new();
        array.fingerprint(&mut key);
        if let Some(&rep) = self.ctx.array_dedup[t as usize].get(&key) {
            return Ok(rep);
        }
        let rep = self.write_array(array)?;
        self.ctx.array_dedup[t as usize].insert(key, rep);
        Ok(rep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_detection() {
        assert_eq!(as_integral(3.0f32), Some(3));
        assert_eq!(as_integral(-7.0f64), Some(-7));
        assert_eq!(as_integral(0.5f64), None);
        assert_eq!(as_integral(-0.0f64), None);
        assert_eq!(as_integral(f64::NAN), None);
        assert_eq!(as_integral(3e10f64), None);
        assert_eq!(as_integral(f16::from_f32(12.0)), Some(12));
    }

    #[test]
    fn test_lut_limits() {
        let few: Vec<f32> = (0..64).map(|i| [0.25, 0.5, 0.75][i % 3]).collect();
        let (lut, indexes) = build_lut(&few).expect("three distinct values fit");
        assert_eq!(lut, vec![0.25, 0.5, 0.75]);
        assert_eq!(indexes[..4], [0, 1, 2, 0]);

        let distinct: Vec<f32> = (0..64).map(|i| i as f32 + 0.5).collect();
        assert!(build_lut(&distinct).is_none());
    }
}
