//! In-memory value model.
//!
//! [`Value`] is the dynamically typed field value stored in specs. Each
//! variant corresponds to one [`TypeEnum`] tag; arrays of the array-capable
//! types live in [`ArrayValue`]. A [`Value::Rep`] is a value that has not
//! been read from its file yet.
//!
//! Matrices and quaternions use the glam types with the file's memory
//! layout: a `DMat4`'s columns hold the rows of a scene-description matrix.

mod array;
mod json;
mod list_op;
mod path;
mod time_samples;
mod token;
mod types;

use glam::{DMat2, DMat3, DMat4, DQuat, DVec2, DVec3, DVec4, IVec2, IVec3, IVec4, Quat, Vec2, Vec3, Vec4};
use half::f16;

pub use array::*;
pub use json::*;
pub use list_op::*;
pub use path::*;
pub use time_samples::*;
pub use token::*;
pub use types::*;

use crate::format::{TypeEnum, ValueRep};

/// A field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    UChar(u8),
    Int(i32),
    UInt(u32),
    Int64(i64),
    UInt64(u64),
    Half(f16),
    Float(f32),
    Double(f64),
    String(String),
    Token(Token),
    AssetPath(AssetPath),
    Matrix2d(DMat2),
    Matrix3d(DMat3),
    Matrix4d(DMat4),
    Quatd(DQuat),
    Quatf(Quat),
    Quath(Quath),
    Vec2d(DVec2),
    Vec2f(Vec2),
    Vec2h(Vec2h),
    Vec2i(IVec2),
    Vec3d(DVec3),
    Vec3f(Vec3),
    Vec3h(Vec3h),
    Vec3i(IVec3),
    Vec4d(DVec4),
    Vec4f(Vec4),
    Vec4h(Vec4h),
    Vec4i(IVec4),
    Dictionary(Dictionary),
    TokenListOp(ListOp<Token>),
    StringListOp(ListOp<String>),
    PathListOp(ListOp<Path>),
    ReferenceListOp(ListOp<Reference>),
    IntListOp(ListOp<i32>),
    Int64ListOp(ListOp<i64>),
    UIntListOp(ListOp<u32>),
    UInt64ListOp(ListOp<u64>),
    PayloadListOp(ListOp<Payload>),
    PathVector(Vec<Path>),
    TokenVector(Vec<Token>),
    Specifier(Specifier),
    Permission(Permission),
    Variability(Variability),
    VariantSelectionMap(VariantSelectionMap),
    TimeSamples(TimeSamples),
    Payload(Payload),
    DoubleVector(Vec<f64>),
    LayerOffsetVector(Vec<LayerOffset>),
    StringVector(Vec<String>),
    ValueBlock,
    TimeCode(TimeCode),
    Array(ArrayValue),
    /// A value still in the file, identified by its rep.
    Rep(ValueRep),
}

/// Array of one of the array-capable element types.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    UChar(Array<u8>),
    Int(Array<i32>),
    UInt(Array<u32>),
    Int64(Array<i64>),
    UInt64(Array<u64>),
    Half(Array<f16>),
    Float(Array<f32>),
    Double(Array<f64>),
    String(Vec<String>),
    Token(Vec<Token>),
    AssetPath(Vec<AssetPath>),
    Matrix2d(Array<DMat2>),
    Matrix3d(Array<DMat3>),
    Matrix4d(Array<DMat4>),
    Quatd(Array<DQuat>),
    Quatf(Array<Quat>),
    Quath(Array<Quath>),
    Vec2d(Array<DVec2>),
    Vec2f(Array<Vec2>),
    Vec2h(Array<Vec2h>),
    Vec2i(Array<IVec2>),
    Vec3d(Array<DVec3>),
    Vec3f(Array<Vec3>),
    Vec3h(Array<Vec3h>),
    Vec3i(Array<IVec3>),
    Vec4d(Array<DVec4>),
    Vec4f(Array<Vec4>),
    Vec4h(Array<Vec4h>),
    Vec4i(Array<IVec4>),
    TimeCode(Array<TimeCode>),
}

/// Expand `$body` once per plain-old-data array variant, binding the
/// inner [`Array`] to `$a`.
macro_rules! with_pod_array {
    ($value:expr, $a:ident => $body:expr, $other:pat => $fallback:expr) => {
        match $value {
            ArrayValue::UChar($a) => $body,
            ArrayValue::Int($a) => $body,
            ArrayValue::UInt($a) => $body,
            ArrayValue::Int64($a) => $body,
            ArrayValue::UInt64($a) => $body,
            ArrayValue::Half($a) => $body,
            ArrayValue::Float($a) => $body,
            ArrayValue::Double($a) => $body,
            ArrayValue::Matrix2d($a) => $body,
            ArrayValue::Matrix3d($a) => $body,
            ArrayValue::Matrix4d($a) => $body,
            ArrayValue::Quatd($a) => $body,
            ArrayValue::Quatf($a) => $body,
            ArrayValue::Quath($a) => $body,
            ArrayValue::Vec2d($a) => $body,
            ArrayValue::Vec2f($a) => $body,
            ArrayValue::Vec2h($a) => $body,
            ArrayValue::Vec2i($a) => $body,
            ArrayValue::Vec3d($a) => $body,
            ArrayValue::Vec3f($a) => $body,
            ArrayValue::Vec3h($a) => $body,
            ArrayValue::Vec3i($a) => $body,
            ArrayValue::Vec4d($a) => $body,
            ArrayValue::Vec4f($a) => $body,
            ArrayValue::Vec4h($a) => $body,
            ArrayValue::Vec4i($a) => $body,
            ArrayValue::TimeCode($a) => $body,
            $other => $fallback,
        }
    };
}
pub(crate) use with_pod_array;

impl ArrayValue {
    pub fn type_enum(&self) -> TypeEnum {
        match self {
            ArrayValue::Bool(_) => TypeEnum::Bool,
            ArrayValue::UChar(_) => TypeEnum::UChar,
            ArrayValue::Int(_) => TypeEnum::Int,
            ArrayValue::UInt(_) => TypeEnum::UInt,
            ArrayValue::Int64(_) => TypeEnum::Int64,
            ArrayValue::UInt64(_) => TypeEnum::UInt64,
            ArrayValue::Half(_) => TypeEnum::Half,
            ArrayValue::Float(_) => TypeEnum::Float,
            ArrayValue::Double(_) => TypeEnum::Double,
            ArrayValue::String(_) => TypeEnum::String,
            ArrayValue::Token(_) => TypeEnum::Token,
            ArrayValue::AssetPath(_) => TypeEnum::AssetPath,
            ArrayValue::Matrix2d(_) => TypeEnum::Matrix2d,
            ArrayValue::Matrix3d(_) => TypeEnum::Matrix3d,
            ArrayValue::Matrix4d(_) => TypeEnum::Matrix4d,
            ArrayValue::Quatd(_) => TypeEnum::Quatd,
            ArrayValue::Quatf(_) => TypeEnum::Quatf,
            ArrayValue::Quath(_) => TypeEnum::Quath,
            ArrayValue::Vec2d(_) => TypeEnum::Vec2d,
            ArrayValue::Vec2f(_) => TypeEnum::Vec2f,
            ArrayValue::Vec2h(_) => TypeEnum::Vec2h,
            ArrayValue::Vec2i(_) => TypeEnum::Vec2i,
            ArrayValue::Vec3d(_) => TypeEnum::Vec3d,
            ArrayValue::Vec3f(_) => TypeEnum::Vec3f,
            ArrayValue::Vec3h(_) => TypeEnum::Vec3h,
            ArrayValue::Vec3i(_) => TypeEnum::Vec3i,
            ArrayValue::Vec4d(_) => TypeEnum::Vec4d,
            ArrayValue::Vec4f(_) => TypeEnum::Vec4f,
            ArrayValue::Vec4h(_) => TypeEnum::Vec4h,
            ArrayValue::Vec4i(_) => TypeEnum::Vec4i,
            ArrayValue::TimeCode(_) => TypeEnum::TimeCode,
        }
    }

    pub fn len(&self) -> usize {
        with_pod_array!(self, a => a.len(), other => match other {
            ArrayValue::Bool(v) => v.len(),
            ArrayValue::String(v) => v.len(),
            ArrayValue::Token(v) => v.len(),
            ArrayValue::AssetPath(v) => v.len(),
            _ => 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the elements alias mapped file memory.
    pub fn is_zero_copy(&self) -> bool {
        with_pod_array!(self, a => a.is_zero_copy(), _ => false)
    }

    /// Raw element bytes for plain-old-data arrays.
    pub fn pod_bytes(&self) -> Option<&[u8]> {
        with_pod_array!(self, a => Some(a.as_bytes()), _ => None)
    }

    pub(crate) fn fingerprint(&self, out: &mut Vec<u8>) {
        out.push(self.type_enum() as u8);
        put_len(out, self.len());
        match self {
            ArrayValue::Bool(v) => out.extend(v.iter().map(|&b| b as u8)),
            ArrayValue::String(v) => v.iter().for_each(|s| put_str(out, s)),
            ArrayValue::Token(v) => v.iter().for_each(|s| put_str(out, s)),
            ArrayValue::AssetPath(v) => v.iter().for_each(|s| put_str(out, &s.0)),
            other => out.extend_from_slice(other.pod_bytes().unwrap_or(&[])),
        }
    }
}

impl Value {
    /// Type tag of the value.
    pub fn type_enum(&self) -> TypeEnum {
        match self {
            Value::Bool(_) => TypeEnum::Bool,
            Value::UChar(_) => TypeEnum::UChar,
            Value::Int(_) => TypeEnum::Int,
            Value::UInt(_) => TypeEnum::UInt,
            Value::Int64(_) => TypeEnum::Int64,
            Value::UInt64(_) => TypeEnum::UInt64,
            Value::Half(_) => TypeEnum::Half,
            Value::Float(_) => TypeEnum::Float,
            Value::Double(_) => TypeEnum::Double,
            Value::String(_) => TypeEnum::String,
            Value::Token(_) => TypeEnum::Token,
            Value::AssetPath(_) => TypeEnum::AssetPath,
            Value::Matrix2d(_) => TypeEnum::Matrix2d,
            Value::Matrix3d(_) => TypeEnum::Matrix3d,
            Value::Matrix4d(_) => TypeEnum::Matrix4d,
            Value::Quatd(_) => TypeEnum::Quatd,
            Value::Quatf(_) => TypeEnum::Quatf,
            Value::Quath(_) => TypeEnum::Quath,
            Value::Vec2d(_) => TypeEnum::Vec2d,
            Value::Vec2f(_) => TypeEnum::Vec2f,
            Value::Vec2h(_) => TypeEnum::Vec2h,
            Value::Vec2i(_) => TypeEnum::Vec2i,
            Value::Vec3d(_) => TypeEnum::Vec3d,
            Value::Vec3f(_) => TypeEnum::Vec3f,
            Value::Vec3h(_) => TypeEnum::Vec3h,
            Value::Vec3i(_) => TypeEnum::Vec3i,
            Value::Vec4d(_) => TypeEnum::Vec4d,
            Value::Vec4f(_) => TypeEnum::Vec4f,
            Value::Vec4h(_) => TypeEnum::Vec4h,
            Value::Vec4i(_) => TypeEnum::Vec4i,
            Value::Dictionary(_) => TypeEnum::Dictionary,
            Value::TokenListOp(_) => TypeEnum::TokenListOp,
            Value::StringListOp(_) => TypeEnum::StringListOp,
            Value::PathListOp(_) => TypeEnum::PathListOp,
            Value::ReferenceListOp(_) => TypeEnum::ReferenceListOp,
            Value::IntListOp(_) => TypeEnum::IntListOp,
            Value::Int64ListOp(_) => TypeEnum::Int64ListOp,
            Value::UIntListOp(_) => TypeEnum::UIntListOp,
            Value::UInt64ListOp(_) => TypeEnum::UInt64ListOp,
            Value::PayloadListOp(_) => TypeEnum::PayloadListOp,
            Value::PathVector(_) => TypeEnum::PathVector,
            Value::TokenVector(_) => TypeEnum::TokenVector,
            Value::Specifier(_) => TypeEnum::Specifier,
            Value::Permission(_) => TypeEnum::Permission,
            Value::Variability(_) => TypeEnum::Variability,
            Value::VariantSelectionMap(_) => TypeEnum::VariantSelectionMap,
            Value::TimeSamples(_) => TypeEnum::TimeSamples,
            Value::Payload(_) => TypeEnum::Payload,
            Value::DoubleVector(_) => TypeEnum::DoubleVector,
            Value::LayerOffsetVector(_) => TypeEnum::LayerOffsetVector,
            Value::StringVector(_) => TypeEnum::StringVector,
            Value::ValueBlock => TypeEnum::ValueBlock,
            Value::TimeCode(_) => TypeEnum::TimeCode,
            Value::Array(a) => a.type_enum(),
            Value::Rep(rep) => rep.type_enum().unwrap_or(TypeEnum::Invalid),
        }
    }

    pub fn is_array(&self) -> bool {
        match self {
            Value::Array(_) => true,
            Value::Rep(rep) => rep.is_array(),
            _ => false,
        }
    }

    /// Type name, with `[]` for arrays.
    pub fn type_name(&self) -> String {
        if self.is_array() {
            format!("{}[]", self.type_enum().name())
        } else {
            self.type_enum().name().to_string()
        }
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Value::Token(t) => Some(t),
            _ => None,
        }
    }

    /// String content of string, token and asset-path values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Token(t) => Some(t),
            Value::AssetPath(a) => Some(&a.0),
            _ => None,
        }
    }

    /// Numeric scalars widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            Value::UChar(v) => v as f64,
            Value::Int(v) => v as f64,
            Value::UInt(v) => v as f64,
            Value::Int64(v) => v as f64,
            Value::UInt64(v) => v as f64,
            Value::Half(v) => v.to_f64(),
            Value::Float(v) => v as f64,
            Value::Double(v) => v,
            Value::TimeCode(v) => v.0,
            _ => return None,
        })
    }

    pub fn as_time_samples(&self) -> Option<&TimeSamples> {
        match self {
            Value::TimeSamples(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Canonical content bytes, used to deduplicate values of one type.
    ///
    /// Floats contribute their bit patterns, so `0.0` and `-0.0` stay
    /// distinct.
    pub(crate) fn fingerprint(&self, out: &mut Vec<u8>) {
        use bytemuck::bytes_of;

        out.push(self.type_enum() as u8);
        match self {
            Value::Bool(v) => out.push(*v as u8),
            Value::UChar(v) => out.push(*v),
            Value::Int(v) => out.extend_from_slice(bytes_of(v)),
            Value::UInt(v) => out.extend_from_slice(bytes_of(v)),
            Value::Int64(v) => out.extend_from_slice(bytes_of(v)),
            Value::UInt64(v) => out.extend_from_slice(bytes_of(v)),
            Value::Half(v) => out.extend_from_slice(bytes_of(v)),
            Value::Float(v) => out.extend_from_slice(bytes_of(v)),
            Value::Double(v) => out.extend_from_slice(bytes_of(v)),
            Value::String(s) => put_str(out, s),
            Value::Token(t) => put_str(out, t),
            Value::AssetPath(a) => put_str(out, &a.0),
            Value::Matrix2d(m) => out.extend_from_slice(bytes_of(m)),
            Value::Matrix3d(m) => out.extend_from_slice(bytes_of(m)),
            Value::Matrix4d(m) => out.extend_from_slice(bytes_of(m)),
            Value::Quatd(q) => out.extend_from_slice(bytes_of(q)),
            Value::Quatf(q) => out.extend_from_slice(bytes_of(q)),
            Value::Quath(q) => out.extend_from_slice(bytes_of(q)),
            Value::Vec2d(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec2f(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec2h(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec2i(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec3d(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec3f(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec3h(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec3i(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec4d(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec4f(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec4h(v) => out.extend_from_slice(bytes_of(v)),
            Value::Vec4i(v) => out.extend_from_slice(bytes_of(v)),
            Value::Dictionary(d) => {
                put_len(out, d.len());
                for (k, v) in d {
                    put_str(out, k);
                    v.fingerprint(out);
                }
            }
            Value::TokenListOp(op) => put_list_op(out, op, |o, t| put_str(o, t)),
            Value::StringListOp(op) => put_list_op(out, op, |o, s| put_str(o, s)),
            Value::PathListOp(op) => put_list_op(out, op, put_path),
            Value::ReferenceListOp(op) => put_list_op(out, op, put_reference),
            Value::IntListOp(op) => put_list_op(out, op, |o, v| o.extend_from_slice(bytes_of(v))),
            Value::Int64ListOp(op) => put_list_op(out, op, |o, v| o.extend_from_slice(bytes_of(v))),
            Value::UIntListOp(op) => put_list_op(out, op, |o, v| o.extend_from_slice(bytes_of(v))),
            Value::UInt64ListOp(op) => put_list_op(out, op, |o, v| o.extend_from_slice(bytes_of(v))),
            Value::PayloadListOp(op) => put_list_op(out, op, put_payload),
            Value::PathVector(v) => {
                put_len(out, v.len());
                v.iter().for_each(|p| put_path(out, p));
            }
            Value::TokenVector(v) => {
                put_len(out, v.len());
                v.iter().for_each(|t| put_str(out, t));
            }
            Value::StringVector(v) => {
                put_len(out, v.len());
                v.iter().for_each(|s| put_str(out, s));
            }
            Value::DoubleVector(v) => {
                put_len(out, v.len());
                out.extend_from_slice(bytemuck::cast_slice(v));
            }
            Value::LayerOffsetVector(v) => {
                put_len(out, v.len());
                v.iter().for_each(|lo| put_layer_offset(out, lo));
            }
            Value::Specifier(v) => out.push(*v as u8),
            Value::Permission(v) => out.push(*v as u8),
            Value::Variability(v) => out.push(*v as u8),
            Value::VariantSelectionMap(m) => {
                put_len(out, m.len());
                for (k, v) in m {
                    put_str(out, k);
                    put_str(out, v);
                }
            }
            Value::TimeSamples(ts) => {
                out.extend_from_slice(bytes_of(&ts.value_rep));
                put_len(out, ts.times.len());
                out.extend_from_slice(bytemuck::cast_slice(ts.times.as_slice()));
                put_len(out, ts.values.len());
                ts.values.iter().for_each(|v| v.fingerprint(out));
            }
            Value::Payload(p) => put_payload(out, p),
            Value::ValueBlock => {}
            Value::TimeCode(t) => out.extend_from_slice(bytes_of(t)),
            Value::Array(a) => a.fingerprint(out),
            Value::Rep(rep) => out.extend_from_slice(bytes_of(rep)),
        }
    }
}

fn put_len(out: &mut Vec<u8>, n: usize) {
    out.extend_from_slice(&(n as u64).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn put_path(out: &mut Vec<u8>, p: &Path) {
    put_str(out, &p.to_string());
}

fn put_layer_offset(out: &mut Vec<u8>, lo: &LayerOffset) {
    out.extend_from_slice(&lo.offset.to_bits().to_le_bytes());
    out.extend_from_slice(&lo.scale.to_bits().to_le_bytes());
}

fn put_reference(out: &mut Vec<u8>, r: &Reference) {
    put_str(out, &r.asset_path);
    put_path(out, &r.prim_path);
    put_layer_offset(out, &r.layer_offset);
    Value::Dictionary(r.custom_data.clone()).fingerprint(out);
}

fn put_payload(out: &mut Vec<u8>, p: &Payload) {
    put_str(out, &p.asset_path);
    put_path(out, &p.prim_path);
    put_layer_offset(out, &p.layer_offset);
}

fn put_list_op<T>(out: &mut Vec<u8>, op: &ListOp<T>, put: impl Fn(&mut Vec<u8>, &T)) {
    out.push(op.is_explicit as u8);
    for items in [
        &op.explicit_items,
        &op.added_items,
        &op.prepended_items,
        &op.appended_items,
        &op.deleted_items,
        &op.ordered_items,
    ] {
        put_len(out, items.len());
        items.iter().for_each(|x| put(out, x));
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    u8 => UChar,
    i32 => Int,
    u32 => UInt,
    i64 => Int64,
    u64 => UInt64,
    f16 => Half,
    f32 => Float,
    f64 => Double,
    String => String,
    Token => Token,
    AssetPath => AssetPath,
    DMat2 => Matrix2d,
    DMat3 => Matrix3d,
    DMat4 => Matrix4d,
    DQuat => Quatd,
    Quat => Quatf,
    DVec2 => Vec2d,
    Vec2 => Vec2f,
    IVec2 => Vec2i,
    DVec3 => Vec3d,
    Vec3 => Vec3f,
    IVec3 => Vec3i,
    DVec4 => Vec4d,
    Vec4 => Vec4f,
    IVec4 => Vec4i,
    Dictionary => Dictionary,
    Specifier => Specifier,
    Permission => Permission,
    Variability => Variability,
    TimeSamples => TimeSamples,
    Payload => Payload,
    TimeCode => TimeCode,
    ArrayValue => Array,
    ListOp<Token> => TokenListOp,
    ListOp<Path> => PathListOp,
    ListOp<Reference> => ReferenceListOp,
    ListOp<Payload> => PayloadListOp,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

macro_rules! impl_from_array {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for ArrayValue {
                fn from(v: Vec<$ty>) -> Self {
                    ArrayValue::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_array! {
    bool => Bool,
    u8 => UChar,
    i32 => Int,
    u32 => UInt,
    i64 => Int64,
    u64 => UInt64,
    f16 => Half,
    f32 => Float,
    f64 => Double,
    String => String,
    Token => Token,
    AssetPath => AssetPath,
    DMat2 => Matrix2d,
    DMat3 => Matrix3d,
    DMat4 => Matrix4d,
    DQuat => Quatd,
    Quat => Quatf,
    DVec2 => Vec2d,
    Vec2 => Vec2f,
    IVec2 => Vec2i,
    DVec3 => Vec3d,
    Vec3 => Vec3f,
    IVec3 => Vec3i,
    DVec4 => Vec4d,
    Vec4 => Vec4f,
    IVec4 => Vec4i,
    TimeCode => TimeCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(v: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        v.fingerprint(&mut out);
        out
    }

    #[test]
    fn test_type_enum_and_names() {
        assert_eq!(Value::from(1.5f32).type_enum(), TypeEnum::Float);
        let arr = Value::Array(vec![1i32, 2, 3].into());
        assert!(arr.is_array());
        assert_eq!(arr.type_name(), "int[]");
        assert_eq!(Value::ValueBlock.type_name(), "valueBlock");
        assert_eq!(Value::Rep(ValueRep::array(TypeEnum::Vec3f, 8)).type_name(), "float3[]");
    }

    #[test]
    fn test_fingerprint_distinguishes_content() {
        assert_eq!(fp(&Value::Double(1.0)), fp(&Value::Double(1.0)));
        assert_ne!(fp(&Value::Double(0.0)), fp(&Value::Double(-0.0)));
        assert_ne!(fp(&Value::from("ab")), fp(&Value::Token(Token::new("ab"))));

        let mut a = Dictionary::new();
        a.insert("x".into(), Value::Int(1));
        let mut b = a.clone();
        assert_eq!(fp(&Value::Dictionary(a.clone())), fp(&Value::Dictionary(b.clone())));
        b.insert("y".into(), Value::Int(1));
        assert_ne!(fp(&Value::Dictionary(a)), fp(&Value::Dictionary(b)));

        // Length prefixes keep concatenations apart.
        let s1 = Value::StringVector(vec!["ab".into(), "c".into()]);
        let s2 = Value::StringVector(vec!["a".into(), "bc".into()]);
        assert_ne!(fp(&s1), fp(&s2));
    }

    #[test]
    fn test_numeric_access() {
        assert_eq!(Value::Int(-3).as_f64(), Some(-3.0));
        assert_eq!(Value::Half(f16::from_f32(0.5)).as_f64(), Some(0.5));
        assert_eq!(Value::from("x").as_f64(), None);
        assert_eq!(Value::Token(Token::new("model")).as_str(), Some("model"));
    }

    #[test]
    fn test_array_value_len() {
        let a = ArrayValue::from(vec![true, false]);
        assert_eq!(a.len(), 2);
        assert_eq!(a.type_enum(), TypeEnum::Bool);
        assert!(a.pod_bytes().is_none());
        let b = ArrayValue::from(vec![Vec3::ONE; 4]);
        assert_eq!(b.pod_bytes().map(|x| x.len()), Some(48));
        assert!(!b.is_zero_copy());
    }
}
