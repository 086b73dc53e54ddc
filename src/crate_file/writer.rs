//! Value encoding and table interning for a packing session.

use byteorder::{LittleEndian, WriteBytesExt};
use bytemuck::Pod;

use super::tables::{PackingContext, Tables};
use crate::codec::inline::{encode_components, encode_diagonal, encode_f64, encode_i64, encode_u64};
use crate::format::{
    Field, FieldIndex, FieldSetIndex, PathIndex, StringIndex, TokenIndex, TypeEnum, ValueRep,
    Version,
};
use crate::util::Result;
use crate::value::{
    ArrayValue, Dictionary, LayerOffset, ListOp, Path, Payload, Reference, TimeSamples, Token, Value,
};

/// Writes values at the output head, interning names into the tables.
pub(crate) struct ValueWriter<'a> {
    pub(super) tables: &'a mut Tables,
    pub(super) ctx: &'a mut PackingContext,
}

impl<'a> ValueWriter<'a> {
    pub fn new(tables: &'a mut Tables, ctx: &'a mut PackingContext) -> Self {
        Self { tables, ctx }
    }

    #[inline]
    pub fn write_version(&self) -> Version {
        self.ctx.write_version
    }

    #[inline]
    pub fn tell(&self) -> u64 {
        self.ctx.out.tell()
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.ctx.out.seek(offset)
    }

    pub fn align(&mut self, alignment: u64) -> Result<u64> {
        self.ctx.out.align(alignment)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ctx.out.put(bytes)
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        Ok(self.ctx.out.write_u8(v)?)
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        Ok(self.ctx.out.write_u32::<LittleEndian>(v)?)
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        Ok(self.ctx.out.write_i32::<LittleEndian>(v)?)
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        Ok(self.ctx.out.write_u64::<LittleEndian>(v)?)
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        Ok(self.ctx.out.write_i64::<LittleEndian>(v)?)
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        Ok(self.ctx.out.write_f64::<LittleEndian>(v)?)
    }

    pub fn write_pod<T: Pod>(&mut self, v: &T) -> Result<()> {
        self.write_bytes(bytemuck::bytes_of(v))
    }

    pub fn write_pod_slice<T: Pod>(&mut self, v: &[T]) -> Result<()> {
        self.write_bytes(bytemuck::cast_slice(v))
    }

    // Interning.

    pub fn add_token(&mut self, s: &str) -> TokenIndex {
        if let Some(&index) = self.ctx.token_to_index.get(s) {
            return index;
        }
        let index = TokenIndex::new(self.tables.tokens.len() as u32);
        let token = Token::new(s);
        self.tables.tokens.push(token.clone());
        self.ctx.token_to_index.insert(token, index);
        index
    }

    pub fn add_string(&mut self, s: &str) -> StringIndex {
        if let Some(&index) = self.ctx.string_to_index.get(s) {
            return index;
        }
        let token = self.add_token(s);
        let index = StringIndex::new(self.tables.strings.len() as u32);
        self.tables.strings.push(token);
        self.ctx.string_to_index.insert(s.to_string(), index);
        index
    }

    /// Intern a path along with its ancestors and, for target paths, the
    /// target. Ancestors always receive smaller indices.
    pub fn add_path(&mut self, path: &Path) -> PathIndex {
        if let Some(&index) = self.ctx.path_to_index.get(path) {
            return index;
        }
        if !path.is_empty() {
            if let Some(target) = path.target_path() {
                self.add_path(target);
            }
            if !path.is_root() {
                self.add_path(&path.parent());
            }
            if path.is_prim_property_path() {
                self.add_token(path.name());
            } else {
                self.add_token(&path.element_string());
            }
        }
        let index = PathIndex::new(self.tables.paths.len() as u32);
        self.tables.paths.push(path.clone());
        self.ctx.path_to_index.insert(path.clone(), index);
        index
    }

    pub fn add_field(&mut self, name: &str, value: &Value) -> Result<FieldIndex> {
        let field = Field::new(self.add_token(name), self.pack(value)?);
        if let Some(&index) = self.ctx.field_to_index.get(&field) {
            return Ok(index);
        }
        let index = FieldIndex::new(self.tables.fields.len() as u32);
        self.tables.fields.push(field);
        self.ctx.field_to_index.insert(field, index);
        Ok(index)
    }

    pub fn add_field_set(&mut self, fields: &[FieldIndex]) -> FieldSetIndex {
        if let Some(&index) = self.ctx.field_set_to_index.get(fields) {
            return index;
        }
        let index = FieldSetIndex::new(self.tables.field_sets.len() as u32);
        self.tables.field_sets.extend_from_slice(fields);
        self.tables.field_sets.push(FieldIndex::INVALID);
        self.ctx.field_set_to_index.insert(fields.to_vec(), index);
        index
    }

    // Value packing.

    /// Write a placeholder offset, run `write`, then point the placeholder
    /// at the end of what `write` produced.
    pub fn recursive_write<T>(&mut self, write: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let offset_loc = self.tell();
        self.write_i64(0)?;
        let out = write(self)?;
        let end = self.tell();
        self.seek(offset_loc)?;
        self.write_i64((end - offset_loc) as i64)?;
        self.seek(end)?;
        Ok(out)
    }

    /// A nested value: its data, then its rep.
    fn write_value(&mut self, value: &Value) -> Result<()> {
        let rep = self.recursive_write(|w| w.pack(value))?;
        self.write_u64(rep.data())
    }

    /// Write `value` at the head unless identical content was already
    /// written in this session.
    fn write_deduped(&mut self, value: &Value, write: impl FnOnce(&mut Self) -> Result<()>) -> Result<ValueRep> {
        let t = value.type_enum();
        let mut key = Vec::new();
        value.fingerprint(&mut key);
        if let Some(&rep) = self.ctx.scalar_dedup[t as usize].get(&key) {
            return Ok(rep);
        }
        let rep = ValueRep::at(t, self.tell());
        write(self)?;
        self.ctx.scalar_dedup[t as usize].insert(key, rep);
        Ok(rep)
    }

    fn inline_or_write(
        &mut self,
        value: &Value,
        bits: Option<u32>,
        write: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<ValueRep> {
        match bits {
            Some(bits) => Ok(ValueRep::inlined(value.type_enum(), bits)),
            None => self.write_deduped(value, write),
        }
    }

    fn write_token(&mut self, s: &str) -> Result<()> {
        let index = self.add_token(s);
        self.write_u32(index.0)
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        let index = self.add_string(s);
        self.write_u32(index.0)
    }

    fn write_path(&mut self, p: &Path) -> Result<()> {
        let index = self.add_path(p);
        self.write_u32(index.0)
    }

    fn write_layer_offset(&mut self, lo: &LayerOffset) -> Result<()> {
        self.write_f64(lo.offset)?;
        self.write_f64(lo.scale)
    }

    fn write_vec<T>(&mut self, items: &[T], mut item: impl FnMut(&mut Self, &T) -> Result<()>) -> Result<()> {
        self.write_u64(items.len() as u64)?;
        for x in items {
            item(self, x)?;
        }
        Ok(())
    }

    fn write_list_op<T: Clone + PartialEq>(
        &mut self,
        op: &ListOp<T>,
        mut item: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        self.write_u8(op.header())?;
        for items in [
            &op.explicit_items,
            &op.added_items,
            &op.prepended_items,
            &op.appended_items,
            &op.deleted_items,
            &op.ordered_items,
        ] {
            if !items.is_empty() {
                self.write_vec(items, &mut item)?;
            }
        }
        Ok(())
    }

    fn write_dictionary(&mut self, dict: &Dictionary) -> Result<()> {
        self.write_u64(dict.len() as u64)?;
        for (key, value) in dict {
            self.write_string(key)?;
            self.write_value(value)?;
        }
        Ok(())
    }

    fn write_reference(&mut self, r: &Reference) -> Result<()> {
        self.write_string(&r.asset_path)?;
        self.write_path(&r.prim_path)?;
        self.write_layer_offset(&r.layer_offset)?;
        self.write_dictionary(&r.custom_data)
    }

    fn write_payload(&mut self, p: &Payload) -> Result<()> {
        self.write_string(&p.asset_path)?;
        self.write_path(&p.prim_path)?;
        if self.write_version() >= Version::PAYLOAD_LAYER_OFFSETS {
            self.write_layer_offset(&p.layer_offset)?;
        }
        Ok(())
    }

    fn list_op_upgrade<T: Clone + PartialEq>(&mut self, op: &ListOp<T>) {
        if op.uses_prepend_or_append() {
            self.ctx.request_upgrade(
                Version::LIST_OP_PREPEND_APPEND,
                "a list op uses prepended or appended items",
            );
        }
    }

    fn pack_list_op<T: Clone + PartialEq>(
        &mut self,
        value: &Value,
        op: &ListOp<T>,
        item: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<ValueRep> {
        self.list_op_upgrade(op);
        self.write_deduped(value, |w| w.write_list_op(op, item))
    }

    fn pack_time_samples(&mut self, samples: &TimeSamples) -> Result<ValueRep> {
        if !samples.is_in_memory() {
            return Ok(samples.value_rep());
        }
        let rep = ValueRep::at(TypeEnum::TimeSamples, self.tell());
        let times = Value::Array(ArrayValue::Double(samples.times().to_vec().into()));
        let times_rep = self.recursive_write(|w| w.pack(&times))?;
        self.write_u64(times_rep.data())?;
        let reps = self.recursive_write(|w| samples.values().iter().map(|v| w.pack(v)).collect::<Result<Vec<_>>>())?;
        self.write_u64(reps.len() as u64)?;
        for r in reps {
            self.write_u64(r.data())?;
        }
        Ok(rep)
    }

    /// Encode a value and return its rep.
    pub fn pack(&mut self, value: &Value) -> Result<ValueRep> {
        let t = value.type_enum();
        let inlined = |bits: u32| Ok(ValueRep::inlined(t, bits));
        match value {
            Value::Bool(v) => inlined(*v as u32),
            Value::UChar(v) => inlined(*v as u32),
            Value::Int(v) => inlined(*v as u32),
            Value::UInt(v) => inlined(*v),
            Value::Half(v) => inlined(v.to_bits() as u32),
            Value::Float(v) => inlined(v.to_bits()),
            Value::Vec2h(v) => inlined(bytemuck::cast(*v)),
            Value::Specifier(v) => inlined(*v as u32),
            Value::Permission(v) => inlined(*v as u32),
            Value::Variability(v) => inlined(*v as u32),
            Value::ValueBlock => inlined(0),
            Value::String(s) => inlined(self.add_string(s).0),
            Value::Token(s) => inlined(self.add_token(s).0),
            Value::AssetPath(a) => inlined(self.add_token(a.as_str()).0),

            Value::Int64(v) => self.inline_or_write(value, encode_i64(*v), |w| w.write_pod(v)),
            Value::UInt64(v) => self.inline_or_write(value, encode_u64(*v), |w| w.write_pod(v)),
            Value::Double(v) => self.inline_or_write(value, encode_f64(*v), |w| w.write_f64(*v)),
            Value::Matrix2d(m) => self.inline_or_write(value, encode_diagonal(&m.to_cols_array(), 2), |w| w.write_pod(m)),
            Value::Matrix3d(m) => self.inline_or_write(value, encode_diagonal(&m.to_cols_array(), 3), |w| w.write_pod(m)),
            Value::Matrix4d(m) => self.inline_or_write(value, encode_diagonal(&m.to_cols_array(), 4), |w| w.write_pod(m)),
            Value::Vec2d(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec2f(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec2i(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec3d(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec3f(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec3h(v) => self.inline_or_write(value, encode_components(v), |w| w.write_pod(v)),
            Value::Vec3i(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec4d(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec4f(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Vec4h(v) => self.inline_or_write(value, encode_components(v), |w| w.write_pod(v)),
            Value::Vec4i(v) => self.inline_or_write(value, encode_components(&v.to_array()), |w| w.write_pod(v)),
            Value::Dictionary(d) if d.is_empty() => inlined(0),

            Value::Quatd(q) => self.write_deduped(value, |w| w.write_pod(q)),
            Value::Quatf(q) => self.write_deduped(value, |w| w.write_pod(q)),
            Value::Quath(q) => self.write_deduped(value, |w| w.write_pod(q)),
            Value::TimeCode(tc) => {
                self.ctx.request_upgrade(Version::TIME_CODE, "a timecode value is written");
                self.write_deduped(value, |w| w.write_f64(tc.0))
            }
            Value::Dictionary(d) => self.write_deduped(value, |w| w.write_dictionary(d)),

            Value::TokenListOp(op) => self.pack_list_op(value, op, |w, x| w.write_token(x)),
            Value::StringListOp(op) => self.pack_list_op(value, op, |w, x| w.write_string(x)),
            Value::PathListOp(op) => self.pack_list_op(value, op, |w, x| w.write_path(x)),
            Value::ReferenceListOp(op) => self.pack_list_op(value, op, |w, x| w.write_reference(x)),
            Value::IntListOp(op) => self.pack_list_op(value, op, |w, x| w.write_pod(x)),
            Value::Int64ListOp(op) => self.pack_list_op(value, op, |w, x| w.write_pod(x)),
            Value::UIntListOp(op) => self.pack_list_op(value, op, |w, x| w.write_pod(x)),
            Value::UInt64ListOp(op) => self.pack_list_op(value, op, |w, x| w.write_pod(x)),
            Value::PayloadListOp(op) => {
                self.ctx.request_upgrade(Version::PAYLOAD_LAYER_OFFSETS, "a payload list op is written");
                self.pack_list_op(value, op, |w, x| w.write_payload(x))
            }
            Value::Payload(p) => {
                if !p.layer_offset.is_identity() {
                    self.ctx.request_upgrade(
                        Version::PAYLOAD_LAYER_OFFSETS,
                        "a payload has a non-identity layer offset",
                    );
                }
                self.write_deduped(value, |w| w.write_payload(p))
            }

            Value::PathVector(v) => self.write_deduped(value, |w| w.write_vec(v, |w, p| w.write_path(p))),
            Value::TokenVector(v) => self.write_deduped(value, |w| w.write_vec(v, |w, s| w.write_token(s))),
            Value::StringVector(v) => self.write_deduped(value, |w| w.write_vec(v, |w, s| w.write_string(s))),
            Value::DoubleVector(v) => self.write_deduped(value, |w| {
                w.write_u64(v.len() as u64)?;
                w.write_pod_slice(v)
            }),
            Value::LayerOffsetVector(v) => {
                self.write_deduped(value, |w| w.write_vec(v, |w, lo| w.write_layer_offset(lo)))
            }
            Value::VariantSelectionMap(m) => self.write_deduped(value, |w| {
                w.write_u64(m.len() as u64)?;
                for (set, variant) in m {
                    w.write_string(set)?;
                    w.write_string(variant)?;
                }
                Ok(())
            }),

            Value::TimeSamples(ts) => self.pack_time_samples(ts),
            Value::Array(a) => self.pack_array(a),
            Value::Rep(rep) => Ok(*rep),
        }
    }
}
