//! Value decoding.
//!
//! [`ValueReader`] is a cursor over a crate file's bytes that knows the
//! file's tables. Scalars and arrays are decoded through a handler table
//! indexed by type tag; tags without a handler are reported as
//! unsupported.

use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian};
use bytemuck::Pod;
use glam::{DMat2, DMat3, DMat4, DVec2, DVec3, DVec4, IVec2, IVec3, IVec4, Vec2, Vec3, Vec4};
use half::f16;

use super::CrateFile;
use crate::codec::inline::{decode_components, decode_diagonal, decode_f64, decode_i64, decode_u64};
use crate::format::{
    PathIndex, StringIndex, TokenIndex, TypeEnum, ValueRep, Version, LIST_OP_HAS_ADDED,
    LIST_OP_HAS_APPENDED, LIST_OP_HAS_DELETED, LIST_OP_HAS_EXPLICIT, LIST_OP_HAS_ORDERED,
    LIST_OP_HAS_PREPENDED, LIST_OP_IS_EXPLICIT,
};
use crate::stream::ByteStream;
use crate::util::{Error, Result};
use crate::value::{
    ArrayValue, AssetPath, Dictionary, LayerOffset, ListOp, Path, Payload, Permission, Reference,
    Specifier, TimeCode, TimeSamples, Token, Value, Variability, VariantSelectionMap,
};

/// Deepest nesting of dictionaries and time samples a file may use.
const MAX_NESTING: usize = 64;

pub(crate) struct ValueReader<'a> {
    pub(super) file: &'a CrateFile,
    pub(super) stream: Box<dyn ByteStream>,
    depth: usize,
}

impl<'a> ValueReader<'a> {
    pub fn new(file: &'a CrateFile, stream: Box<dyn ByteStream>) -> Self {
        Self { file, stream, depth: 0 }
    }

    /// Independent cursor one nesting level down.
    fn fork(&self) -> Result<Self> {
        if self.depth >= MAX_NESTING {
            return Err(Error::invalid("values nested too deeply"));
        }
        Ok(Self { file: self.file, stream: self.stream.boxed_clone(), depth: self.depth + 1 })
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.file.file_version()
    }

    #[inline]
    pub fn tell(&self) -> u64 {
        self.stream.tell()
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.stream.size() {
            return Err(Error::UnexpectedEof(offset));
        }
        self.stream.seek(offset);
        Ok(())
    }

    pub(super) fn remaining(&self) -> u64 {
        self.stream.size().saturating_sub(self.tell())
    }

    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.stream.read(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(&self.read_exact::<4>()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(&self.read_exact::<8>()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(&self.read_exact::<8>()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(&self.read_exact::<8>()?))
    }

    pub fn read_pod<T: Pod>(&mut self) -> Result<T> {
        let mut value = T::zeroed();
        self.stream.read(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        if len > self.remaining() {
            return Err(Error::UnexpectedEof(self.tell().saturating_add(len)));
        }
        let mut buf = vec![0u8; len as usize];
        self.stream.read(&mut buf)?;
        Ok(buf)
    }

    /// `n` elements copied out of the file.
    pub fn read_pod_vec<T: Pod>(&mut self, n: usize) -> Result<Vec<T>> {
        let nbytes = n
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| Error::corrupt(format!("element count {} overflows", n)))?;
        if nbytes as u64 > self.remaining() {
            return Err(Error::UnexpectedEof(self.tell().saturating_add(nbytes as u64)));
        }
        let mut out = vec![T::zeroed(); n];
        self.stream.read(bytemuck::cast_slice_mut(&mut out))?;
        Ok(out)
    }

    /// A 64-bit element count, rejected if `min_elem_size`-byte elements
    /// could not fit in the rest of the file.
    fn read_count(&mut self, min_elem_size: u64) -> Result<usize> {
        let n = self.read_u64()?;
        if n.saturating_mul(min_elem_size.max(1)) > self.remaining() {
            return Err(Error::corrupt(format!("element count {} exceeds file size", n)));
        }
        Ok(n as usize)
    }

    /// Follow a relative forward offset written in front of a nested value.
    fn jump(&mut self) -> Result<()> {
        let start = self.tell();
        let offset = self.read_i64()?;
        let target = (start as i64)
            .checked_add(offset)
            .filter(|t| *t >= 0)
            .ok_or_else(|| Error::corrupt(format!("bad value offset {} at {}", offset, start)))?;
        self.seek(target as u64)
    }

    pub fn read_token(&mut self) -> Result<Token> {
        let index = TokenIndex::new(self.read_u32()?);
        Ok(self.file.tables.token(index)?.clone())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let index = StringIndex::new(self.read_u32()?);
        Ok(self.file.tables.string(index)?.to_string())
    }

    pub fn read_path(&mut self) -> Result<Path> {
        let index = PathIndex::new(self.read_u32()?);
        Ok(self.file.tables.path(index)?.clone())
    }

    fn read_layer_offset(&mut self) -> Result<LayerOffset> {
        Ok(LayerOffset::new(self.read_f64()?, self.read_f64()?))
    }

    fn read_vec<T>(&mut self, min_elem_size: u64, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let n = self.read_count(min_elem_size)?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(item(self)?);
        }
        Ok(out)
    }

    fn read_list_op<T>(&mut self, min_elem_size: u64, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<ListOp<T>> {
        let header = self.read_u8()?;
        let mut op = ListOp { is_explicit: header & LIST_OP_IS_EXPLICIT != 0, ..ListOp::default() };
        if header & LIST_OP_HAS_EXPLICIT != 0 {
            op.explicit_items = self.read_vec(min_elem_size, &mut item)?;
        }
        if header & LIST_OP_HAS_ADDED != 0 {
            op.added_items = self.read_vec(min_elem_size, &mut item)?;
        }
        if header & LIST_OP_HAS_PREPENDED != 0 {
            op.prepended_items = self.read_vec(min_elem_size, &mut item)?;
        }
        if header & LIST_OP_HAS_APPENDED != 0 {
            op.appended_items = self.read_vec(min_elem_size, &mut item)?;
        }
        if header & LIST_OP_HAS_DELETED != 0 {
            op.deleted_items = self.read_vec(min_elem_size, &mut item)?;
        }
        if header & LIST_OP_HAS_ORDERED != 0 {
            op.ordered_items = self.read_vec(min_elem_size, &mut item)?;
        }
        Ok(op)
    }

    fn read_dictionary(&mut self) -> Result<Dictionary> {
        let n = self.read_count(12)?;
        let mut dict = Dictionary::new();
        for _ in 0..n {
            let key = self.read_string()?;
            let value = self.read_value()?;
            dict.insert(key, value);
        }
        Ok(dict)
    }

    fn read_reference(&mut self) -> Result<Reference> {
        Ok(Reference {
            asset_path: self.read_string()?,
            prim_path: self.read_path()?,
            layer_offset: self.read_layer_offset()?,
            custom_data: self.read_dictionary()?,
        })
    }

    fn read_payload(&mut self) -> Result<Payload> {
        let asset_path = self.read_string()?;
        let prim_path = self.read_path()?;
        let layer_offset = if self.version() >= Version::PAYLOAD_LAYER_OFFSETS {
            self.read_layer_offset()?
        } else {
            LayerOffset::IDENTITY
        };
        Ok(Payload { asset_path, prim_path, layer_offset })
    }

    /// A nested, self-describing value: a jump to its rep, then the rep.
    /// Leaves the cursor just past the rep.
    fn read_value(&mut self) -> Result<Value> {
        self.jump()?;
        let rep = ValueRep(self.read_u64()?);
        self.fork()?.unpack(rep)
    }

    fn read_time_samples(&mut self, rep: ValueRep) -> Result<Value> {
        self.seek(rep.payload())?;
        self.jump()?;
        let times_rep = ValueRep(self.read_u64()?);
        if !times_rep.is_array() || times_rep.type_enum() != Some(TypeEnum::Double) {
            return Err(Error::corrupt(format!("time samples at {} have times rep {:?}", rep.payload(), times_rep)));
        }
        let file = self.file;
        let times = file.shared_times(times_rep, || match self.fork()?.unpack(times_rep)? {
            Value::Array(ArrayValue::Double(times)) => Ok(times.into_vec()),
            other => Err(Error::mismatch("double[]", other.type_name())),
        })?;
        self.jump()?;
        let n = self.read_count(8)?;
        if n != times.len() {
            return Err(Error::corrupt(format!(
                "time samples have {} times but {} values",
                times.len(),
                n
            )));
        }
        Ok(Value::TimeSamples(TimeSamples::in_file(rep, times, self.tell())))
    }

    /// Value reps of lazily held time samples.
    pub fn time_sample_reps(&mut self, samples: &TimeSamples) -> Result<Vec<ValueRep>> {
        self.seek(samples.values_file_offset)?;
        let reps: Vec<u64> = self.read_pod_vec(samples.len())?;
        Ok(reps.into_iter().map(ValueRep).collect())
    }

    /// Inline payload, or the value stored at the rep's offset.
    fn inline_or_read<T>(
        &mut self,
        rep: ValueRep,
        inline: impl FnOnce(u32) -> T,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if rep.is_inlined() {
            Ok(inline(rep.inline_bits()))
        } else {
            self.seek(rep.payload())?;
            read(self)
        }
    }

    /// Value stored at the rep's offset; such types are never inlined.
    fn stored<T>(&mut self, rep: ValueRep, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if rep.is_inlined() {
            return Err(Error::corrupt(format!("{:?} cannot be inlined", rep)));
        }
        self.seek(rep.payload())?;
        read(self)
    }

    fn pod_or_inline<T: Pod>(&mut self, rep: ValueRep, inline: impl FnOnce(u32) -> T) -> Result<T> {
        self.inline_or_read(rep, inline, |r| r.read_pod())
    }

    fn token_value(&mut self, rep: ValueRep) -> Result<Token> {
        if rep.is_inlined() {
            return Ok(self.file.tables.token(TokenIndex::new(rep.inline_bits()))?.clone());
        }
        self.stored(rep, |r| r.read_token())
    }

    fn enum_value<T>(&mut self, rep: ValueRep, decode: fn(u32) -> Option<T>, what: &str) -> Result<T> {
        let raw = self.inline_or_read(rep, |bits| bits, |r| r.read_u32())?;
        decode(raw).ok_or_else(|| Error::corrupt(format!("invalid {} value {}", what, raw)))
    }

    /// Decode any value.
    pub fn unpack(&mut self, rep: ValueRep) -> Result<Value> {
        let t = rep.type_enum().ok_or(Error::UnsupportedType(rep.type_tag()))?;
        let handler = &handlers()[t as usize];
        if rep.is_array() {
            let read = handler.array.ok_or(Error::UnsupportedType(rep.type_tag()))?;
            Ok(Value::Array(read(self, rep)?))
        } else {
            let read = handler.scalar.ok_or(Error::UnsupportedType(rep.type_tag()))?;
            read(self, rep)
        }
    }
}

type ScalarFn = fn(&mut ValueReader<'_>, ValueRep) -> Result<Value>;
type ArrayFn = fn(&mut ValueReader<'_>, ValueRep) -> Result<ArrayValue>;

#[derive(Clone, Copy, Default)]
struct Handler {
    scalar: Option<ScalarFn>,
    array: Option<ArrayFn>,
}

struct HandlerTable([Handler; TypeEnum::COUNT]);

impl HandlerTable {
    fn scalar(&mut self, t: TypeEnum, f: ScalarFn) -> &mut Self {
        self.0[t as usize].scalar = Some(f);
        self
    }

    fn array(&mut self, t: TypeEnum, f: ArrayFn) -> &mut Self {
        self.0[t as usize].array = Some(f);
        self
    }
}

fn token_values(r: &ValueReader<'_>, indices: Vec<u32>) -> Result<Vec<Token>> {
    indices
        .into_iter()
        .map(|i| r.file.tables.token(TokenIndex::new(i)).cloned())
        .collect()
}

fn handlers() -> &'static [Handler; TypeEnum::COUNT] {
    static TABLE: OnceLock<[Handler; TypeEnum::COUNT]> = OnceLock::new();
    TABLE.get_or_init(|| {
        use TypeEnum as T;
        let mut t = HandlerTable([Handler::default(); TypeEnum::COUNT]);

        // Bitwise scalars that fit the payload are always inlined.
        t.scalar(T::Bool, |r, rep| Ok(Value::Bool(r.inline_or_read(rep, |b| b != 0, |r| Ok(r.read_u8()? != 0))?)))
            .scalar(T::UChar, |r, rep| Ok(Value::UChar(r.pod_or_inline(rep, |b| b as u8)?)))
            .scalar(T::Int, |r, rep| Ok(Value::Int(r.pod_or_inline(rep, |b| b as i32)?)))
            .scalar(T::UInt, |r, rep| Ok(Value::UInt(r.pod_or_inline(rep, |b| b)?)))
            .scalar(T::Half, |r, rep| Ok(Value::Half(r.pod_or_inline(rep, |b| f16::from_bits(b as u16))?)))
            .scalar(T::Float, |r, rep| Ok(Value::Float(r.pod_or_inline(rep, f32::from_bits)?)))
            .scalar(T::Vec2h, |r, rep| Ok(Value::Vec2h(r.pod_or_inline(rep, bytemuck::cast)?)));

        // Wider scalars inline only when exactly representable.
        t.scalar(T::Int64, |r, rep| Ok(Value::Int64(r.pod_or_inline(rep, decode_i64)?)))
            .scalar(T::UInt64, |r, rep| Ok(Value::UInt64(r.pod_or_inline(rep, decode_u64)?)))
            .scalar(T::Double, |r, rep| Ok(Value::Double(r.pod_or_inline(rep, decode_f64)?)))
            .scalar(T::TimeCode, |r, rep| Ok(Value::TimeCode(r.pod_or_inline(rep, |b| TimeCode(decode_f64(b)))?)))
            .scalar(T::Matrix2d, |r, rep| {
                Ok(Value::Matrix2d(r.pod_or_inline(rep, |b| DMat2::from_cols_slice(&decode_diagonal(b, 2)))?))
            })
            .scalar(T::Matrix3d, |r, rep| {
                Ok(Value::Matrix3d(r.pod_or_inline(rep, |b| DMat3::from_cols_slice(&decode_diagonal(b, 3)))?))
            })
            .scalar(T::Matrix4d, |r, rep| {
                Ok(Value::Matrix4d(r.pod_or_inline(rep, |b| DMat4::from_cols_slice(&decode_diagonal(b, 4)))?))
            })
            .scalar(T::Vec2d, |r, rep| Ok(Value::Vec2d(r.pod_or_inline(rep, |b| DVec2::from_array(decode_components(b)))?)))
            .scalar(T::Vec2f, |r, rep| Ok(Value::Vec2f(r.pod_or_inline(rep, |b| Vec2::from_array(decode_components(b)))?)))
            .scalar(T::Vec2i, |r, rep| Ok(Value::Vec2i(r.pod_or_inline(rep, |b| IVec2::from_array(decode_components(b)))?)))
            .scalar(T::Vec3d, |r, rep| Ok(Value::Vec3d(r.pod_or_inline(rep, |b| DVec3::from_array(decode_components(b)))?)))
            .scalar(T::Vec3f, |r, rep| Ok(Value::Vec3f(r.pod_or_inline(rep, |b| Vec3::from_array(decode_components(b)))?)))
            .scalar(T::Vec3h, |r, rep| Ok(Value::Vec3h(r.pod_or_inline(rep, decode_components)?)))
            .scalar(T::Vec3i, |r, rep| Ok(Value::Vec3i(r.pod_or_inline(rep, |b| IVec3::from_array(decode_components(b)))?)))
            .scalar(T::Vec4d, |r, rep| Ok(Value::Vec4d(r.pod_or_inline(rep, |b| DVec4::from_array(decode_components(b)))?)))
            .scalar(T::Vec4f, |r, rep| Ok(Value::Vec4f(r.pod_or_inline(rep, |b| Vec4::from_array(decode_components(b)))?)))
            .scalar(T::Vec4h, |r, rep| Ok(Value::Vec4h(r.pod_or_inline(rep, decode_components)?)))
            .scalar(T::Vec4i, |r, rep| Ok(Value::Vec4i(r.pod_or_inline(rep, |b| IVec4::from_array(decode_components(b)))?)));

        t.scalar(T::Quatd, |r, rep| Ok(Value::Quatd(r.stored(rep, |r| r.read_pod())?)))
            .scalar(T::Quatf, |r, rep| Ok(Value::Quatf(r.stored(rep, |r| r.read_pod())?)))
            .scalar(T::Quath, |r, rep| Ok(Value::Quath(r.stored(rep, |r| r.read_pod())?)));

        // Interned values inline their table index.
        t.scalar(T::String, |r, rep| {
            if rep.is_inlined() {
                let index = StringIndex::new(rep.inline_bits());
                return Ok(Value::String(r.file.tables.string(index)?.to_string()));
            }
            Ok(Value::String(r.stored(rep, |r| r.read_string())?))
        })
        .scalar(T::Token, |r, rep| Ok(Value::Token(r.token_value(rep)?)))
        .scalar(T::AssetPath, |r, rep| Ok(Value::AssetPath(AssetPath::new(r.token_value(rep)?.as_str()))));

        t.scalar(T::Specifier, |r, rep| Ok(Value::Specifier(r.enum_value(rep, Specifier::from_u32, "specifier")?)))
            .scalar(T::Permission, |r, rep| Ok(Value::Permission(r.enum_value(rep, Permission::from_u32, "permission")?)))
            .scalar(T::Variability, |r, rep| {
                Ok(Value::Variability(r.enum_value(rep, Variability::from_u32, "variability")?))
            })
            .scalar(T::ValueBlock, |_, _| Ok(Value::ValueBlock));

        t.scalar(T::Dictionary, |r, rep| {
            if rep.is_inlined() {
                return Ok(Value::Dictionary(Dictionary::new()));
            }
            Ok(Value::Dictionary(r.stored(rep, |r| r.read_dictionary())?))
        })
        .scalar(T::TokenListOp, |r, rep| Ok(Value::TokenListOp(r.stored(rep, |r| r.read_list_op(4, |r| r.read_token()))?)))
        .scalar(T::StringListOp, |r, rep| Ok(Value::StringListOp(r.stored(rep, |r| r.read_list_op(4, |r| r.read_string()))?)))
        .scalar(T::PathListOp, |r, rep| Ok(Value::PathListOp(r.stored(rep, |r| r.read_list_op(4, |r| r.read_path()))?)))
        .scalar(T::ReferenceListOp, |r, rep| {
            Ok(Value::ReferenceListOp(r.stored(rep, |r| r.read_list_op(32, |r| r.read_reference()))?))
        })
        .scalar(T::PayloadListOp, |r, rep| {
            Ok(Value::PayloadListOp(r.stored(rep, |r| r.read_list_op(8, |r| r.read_payload()))?))
        })
        .scalar(T::IntListOp, |r, rep| Ok(Value::IntListOp(r.stored(rep, |r| r.read_list_op(4, |r| r.read_pod()))?)))
        .scalar(T::Int64ListOp, |r, rep| Ok(Value::Int64ListOp(r.stored(rep, |r| r.read_list_op(8, |r| r.read_pod()))?)))
        .scalar(T::UIntListOp, |r, rep| Ok(Value::UIntListOp(r.stored(rep, |r| r.read_list_op(4, |r| r.read_pod()))?)))
        .scalar(T::UInt64ListOp, |r, rep| Ok(Value::UInt64ListOp(r.stored(rep, |r| r.read_list_op(8, |r| r.read_pod()))?)))
        .scalar(T::PathVector, |r, rep| Ok(Value::PathVector(r.stored(rep, |r| r.read_vec(4, |r| r.read_path()))?)))
        .scalar(T::TokenVector, |r, rep| Ok(Value::TokenVector(r.stored(rep, |r| r.read_vec(4, |r| r.read_token()))?)))
        .scalar(T::StringVector, |r, rep| Ok(Value::StringVector(r.stored(rep, |r| r.read_vec(4, |r| r.read_string()))?)))
        .scalar(T::DoubleVector, |r, rep| Ok(Value::DoubleVector(r.stored(rep, |r| r.read_vec(8, |r| r.read_f64()))?)))
        .scalar(T::LayerOffsetVector, |r, rep| {
            Ok(Value::LayerOffsetVector(r.stored(rep, |r| r.read_vec(16, |r| r.read_layer_offset()))?))
        })
        .scalar(T::VariantSelectionMap, |r, rep| {
            let pairs = r.stored(rep, |r| r.read_vec(8, |r| Ok((r.read_string()?, r.read_string()?))))?;
            Ok(Value::VariantSelectionMap(pairs.into_iter().collect::<VariantSelectionMap>()))
        })
        .scalar(T::Payload, |r, rep| Ok(Value::Payload(r.stored(rep, |r| r.read_payload())?)))
        .scalar(T::TimeSamples, |r, rep| {
            if rep.is_inlined() {
                return Err(Error::corrupt("time samples cannot be inlined"));
            }
            r.read_time_samples(rep)
        });

        t.array(T::Bool, |r, rep| Ok(ArrayValue::Bool(r.raw_array::<u8>(rep)?.iter().map(|&b| b != 0).collect())))
            .array(T::UChar, |r, rep| Ok(ArrayValue::UChar(r.raw_array(rep)?)))
            .array(T::Int, |r, rep| Ok(ArrayValue::Int(r.int_array(rep)?)))
            .array(T::UInt, |r, rep| Ok(ArrayValue::UInt(r.int_array(rep)?)))
            .array(T::Int64, |r, rep| Ok(ArrayValue::Int64(r.int_array(rep)?)))
            .array(T::UInt64, |r, rep| Ok(ArrayValue::UInt64(r.int_array(rep)?)))
            .array(T::Half, |r, rep| Ok(ArrayValue::Half(r.float_array(rep)?)))
            .array(T::Float, |r, rep| Ok(ArrayValue::Float(r.float_array(rep)?)))
            .array(T::Double, |r, rep| Ok(ArrayValue::Double(r.float_array(rep)?)))
            .array(T::String, |r, rep| {
                let indices = r.raw_array::<u32>(rep)?;
                let strings = indices
                    .iter()
                    .map(|&i| r.file.tables.string(StringIndex::new(i)).map(str::to_string))
                    .collect::<Result<_>>()?;
                Ok(ArrayValue::String(strings))
            })
            .array(T::Token, |r, rep| {
                let indices = r.raw_array::<u32>(rep)?.into_vec();
                Ok(ArrayValue::Token(token_values(r, indices)?))
            })
            .array(T::AssetPath, |r, rep| {
                let indices = r.raw_array::<u32>(rep)?.into_vec();
                let tokens = token_values(r, indices)?;
                Ok(ArrayValue::AssetPath(tokens.iter().map(|t| AssetPath::new(t.as_str())).collect()))
            })
            .array(T::Matrix2d, |r, rep| Ok(ArrayValue::Matrix2d(r.raw_array(rep)?)))
            .array(T::Matrix3d, |r, rep| Ok(ArrayValue::Matrix3d(r.raw_array(rep)?)))
            .array(T::Matrix4d, |r, rep| Ok(ArrayValue::Matrix4d(r.raw_array(rep)?)))
            .array(T::Quatd, |r, rep| Ok(ArrayValue::Quatd(r.raw_array(rep)?)))
            .array(T::Quatf, |r, rep| Ok(ArrayValue::Quatf(r.raw_array(rep)?)))
            .array(T::Quath, |r, rep| Ok(ArrayValue::Quath(r.raw_array(rep)?)))
            .array(T::Vec2d, |r, rep| Ok(ArrayValue::Vec2d(r.raw_array(rep)?)))
            .array(T::Vec2f, |r, rep| Ok(ArrayValue::Vec2f(r.raw_array(rep)?)))
            .array(T::Vec2h, |r, rep| Ok(ArrayValue::Vec2h(r.raw_array(rep)?)))
            .array(T::Vec2i, |r, rep| Ok(ArrayValue::Vec2i(r.raw_array(rep)?)))
            .array(T::Vec3d, |r, rep| Ok(ArrayValue::Vec3d(r.raw_array(rep)?)))
            .array(T::Vec3f, |r, rep| Ok(ArrayValue::Vec3f(r.raw_array(rep)?)))
            .array(T::Vec3h, |r, rep| Ok(ArrayValue::Vec3h(r.raw_array(rep)?)))
            .array(T::Vec3i, |r, rep| Ok(ArrayValue::Vec3i(r.raw_array(rep)?)))
            .array(T::Vec4d, |r, rep| Ok(ArrayValue::Vec4d(r.raw_array(rep)?)))
            .array(T::Vec4f, |r, rep| Ok(ArrayValue::Vec4f(r.raw_array(rep)?)))
            .array(T::Vec4h, |r, rep| Ok(ArrayValue::Vec4h(r.raw_array(rep)?)))
            .array(T::Vec4i, |r, rep| Ok(ArrayValue::Vec4i(r.raw_array(rep)?)))
            .array(T::TimeCode, |r, rep| Ok(ArrayValue::TimeCode(r.raw_array(rep)?)));

        t.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_coverage() {
        let table = handlers();
        for tag in 0..TypeEnum::COUNT as u8 {
            let Some(t) = TypeEnum::from_u8(tag) else { continue };
            let h = &table[tag as usize];
            match t {
                TypeEnum::Invalid
                | TypeEnum::Value
                | TypeEnum::UnregisteredValue
                | TypeEnum::UnregisteredValueListOp => assert!(h.scalar.is_none(), "{}", t),
                _ => assert!(h.scalar.is_some(), "missing scalar handler for {}", t),
            }
            assert_eq!(h.array.is_some(), t.supports_array(), "array handler for {}", t);
        }
    }
}
