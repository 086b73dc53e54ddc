//! JSON rendering of values, used by the command-line dump.

use half::f16;
use serde_json::{json, Map, Value as Json};

use super::{ArrayValue, LayerOffset, ListOp, Payload, Reference, Value};

fn float(v: f64) -> Json {
    serde_json::Number::from_f64(v)
        .map(Json::Number)
        .unwrap_or_else(|| Json::String(v.to_string()))
}

fn floats(values: impl IntoIterator<Item = f64>) -> Json {
    Json::Array(values.into_iter().map(float).collect())
}

fn halves(values: &[f16]) -> Json {
    floats(values.iter().map(|h| h.to_f64()))
}

fn rows<const N: usize>(rows: [[f64; N]; N]) -> Json {
    Json::Array(rows.into_iter().map(floats).collect())
}

fn list_op<T>(op: &ListOp<T>, item: impl Fn(&T) -> Json) -> Json {
    let mut obj = Map::new();
    if op.is_explicit {
        obj.insert("explicit".into(), Json::Array(op.explicit_items.iter().map(&item).collect()));
    }
    for (key, items) in [
        ("added", &op.added_items),
        ("prepended", &op.prepended_items),
        ("appended", &op.appended_items),
        ("deleted", &op.deleted_items),
        ("ordered", &op.ordered_items),
    ] {
        if !items.is_empty() {
            obj.insert(key.into(), Json::Array(items.iter().map(&item).collect()));
        }
    }
    Json::Object(obj)
}

fn layer_offset(lo: &LayerOffset) -> Json {
    json!({ "offset": float(lo.offset), "scale": float(lo.scale) })
}

fn reference(r: &Reference) -> Json {
    let mut obj = json!({ "assetPath": r.asset_path, "primPath": r.prim_path.to_string() });
    if !r.layer_offset.is_identity() {
        obj["layerOffset"] = layer_offset(&r.layer_offset);
    }
    if !r.custom_data.is_empty() {
        obj["customData"] = dictionary(&r.custom_data);
    }
    obj
}

fn payload(p: &Payload) -> Json {
    let mut obj = json!({ "assetPath": p.asset_path, "primPath": p.prim_path.to_string() });
    if !p.layer_offset.is_identity() {
        obj["layerOffset"] = layer_offset(&p.layer_offset);
    }
    obj
}

fn dictionary(d: &super::Dictionary) -> Json {
    Json::Object(d.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

impl Value {
    /// Render as JSON. Unread values render as their rep description.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(v) => json!(v),
            Value::UChar(v) => json!(v),
            Value::Int(v) => json!(v),
            Value::UInt(v) => json!(v),
            Value::Int64(v) => json!(v),
            Value::UInt64(v) => json!(v),
            Value::Half(v) => float(v.to_f64()),
            Value::Float(v) => float(*v as f64),
            Value::Double(v) => float(*v),
            Value::String(s) => json!(s),
            Value::Token(t) => json!(t.as_str()),
            Value::AssetPath(a) => json!(a.to_string()),
            Value::Matrix2d(m) => rows(m.to_cols_array_2d()),
            Value::Matrix3d(m) => rows(m.to_cols_array_2d()),
            Value::Matrix4d(m) => rows(m.to_cols_array_2d()),
            Value::Quatd(q) => floats(q.to_array()),
            Value::Quatf(q) => floats(q.to_array().map(f64::from)),
            Value::Quath(q) => halves(q),
            Value::Vec2d(v) => floats(v.to_array()),
            Value::Vec2f(v) => floats(v.to_array().map(f64::from)),
            Value::Vec2h(v) => halves(v),
            Value::Vec2i(v) => json!(v.to_array()),
            Value::Vec3d(v) => floats(v.to_array()),
            Value::Vec3f(v) => floats(v.to_array().map(f64::from)),
            Value::Vec3h(v) => halves(v),
            Value::Vec3i(v) => json!(v.to_array()),
            Value::Vec4d(v) => floats(v.to_array()),
            Value::Vec4f(v) => floats(v.to_array().map(f64::from)),
            Value::Vec4h(v) => halves(v),
            Value::Vec4i(v) => json!(v.to_array()),
            Value::Dictionary(d) => dictionary(d),
            Value::TokenListOp(op) => list_op(op, |t| json!(t.as_str())),
            Value::StringListOp(op) => list_op(op, |s| json!(s)),
            Value::PathListOp(op) => list_op(op, |p| json!(p.to_string())),
            Value::ReferenceListOp(op) => list_op(op, reference),
            Value::IntListOp(op) => list_op(op, |v| json!(v)),
            Value::Int64ListOp(op) => list_op(op, |v| json!(v)),
            Value::UIntListOp(op) => list_op(op, |v| json!(v)),
            Value::UInt64ListOp(op) => list_op(op, |v| json!(v)),
            Value::PayloadListOp(op) => list_op(op, payload),
            Value::PathVector(v) => Json::Array(v.iter().map(|p| json!(p.to_string())).collect()),
            Value::TokenVector(v) => Json::Array(v.iter().map(|t| json!(t.as_str())).collect()),
            Value::Specifier(s) => json!(format!("{:?}", s).to_lowercase()),
            Value::Permission(p) => json!(format!("{:?}", p).to_lowercase()),
            Value::Variability(v) => json!(format!("{:?}", v).to_lowercase()),
            Value::VariantSelectionMap(m) => json!(m),
            Value::TimeSamples(ts) => {
                if ts.is_in_memory() {
                    Json::Object(
                        ts.times()
                            .iter()
                            .zip(ts.values())
                            .map(|(t, v)| (t.to_string(), v.to_json()))
                            .collect(),
                    )
                } else {
                    json!({ "times": floats(ts.times().iter().copied()) })
                }
            }
            Value::Payload(p) => payload(p),
            Value::DoubleVector(v) => floats(v.iter().copied()),
            Value::LayerOffsetVector(v) => Json::Array(v.iter().map(layer_offset).collect()),
            Value::StringVector(v) => json!(v),
            Value::ValueBlock => json!(null),
            Value::TimeCode(t) => float(t.0),
            Value::Array(a) => a.to_json(),
            Value::Rep(rep) => json!(format!("{:?}", rep)),
        }
    }
}

impl ArrayValue {
    /// JSON array of the elements; tuple elements become nested arrays.
    pub fn to_json(&self) -> Json {
        macro_rules! each {
            ($v:expr, $variant:ident) => {
                Json::Array($v.iter().map(|x| Value::$variant(x.clone()).to_json()).collect())
            };
        }
        match self {
            ArrayValue::Bool(v) => each!(v, Bool),
            ArrayValue::UChar(v) => each!(v, UChar),
            ArrayValue::Int(v) => each!(v, Int),
            ArrayValue::UInt(v) => each!(v, UInt),
            ArrayValue::Int64(v) => each!(v, Int64),
            ArrayValue::UInt64(v) => each!(v, UInt64),
            ArrayValue::Half(v) => each!(v, Half),
            ArrayValue::Float(v) => each!(v, Float),
            ArrayValue::Double(v) => each!(v, Double),
            ArrayValue::String(v) => each!(v, String),
            ArrayValue::Token(v) => each!(v, Token),
            ArrayValue::AssetPath(v) => each!(v, AssetPath),
            ArrayValue::Matrix2d(v) => each!(v, Matrix2d),
            ArrayValue::Matrix3d(v) => each!(v, Matrix3d),
            ArrayValue::Matrix4d(v) => each!(v, Matrix4d),
            ArrayValue::Quatd(v) => each!(v, Quatd),
            ArrayValue::Quatf(v) => each!(v, Quatf),
            ArrayValue::Quath(v) => each!(v, Quath),
            ArrayValue::Vec2d(v) => each!(v, Vec2d),
            ArrayValue::Vec2f(v) => each!(v, Vec2f),
            ArrayValue::Vec2h(v) => each!(v, Vec2h),
            ArrayValue::Vec2i(v) => each!(v, Vec2i),
            ArrayValue::Vec3d(v) => each!(v, Vec3d),
            ArrayValue::Vec3f(v) => each!(v, Vec3f),
            ArrayValue::Vec3h(v) => each!(v, Vec3h),
            ArrayValue::Vec3i(v) => each!(v, Vec3i),
            ArrayValue::Vec4d(v) => each!(v, Vec4d),
            ArrayValue::Vec4f(v) => each!(v, Vec4f),
            ArrayValue::Vec4h(v) => each!(v, Vec4h),
            ArrayValue::Vec4i(v) => each!(v, Vec4i),
            ArrayValue::TimeCode(v) => each!(v, TimeCode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Path, TimeSamples, Token};
    use glam::{DMat4, Vec3};

    #[test]
    fn test_scalar_json() {
        assert_eq!(Value::Int(5).to_json(), json!(5));
        assert_eq!(Value::Token(Token::new("model")).to_json(), json!("model"));
        assert_eq!(Value::Vec3f(Vec3::new(1.0, 2.0, 3.0)).to_json(), json!([1.0, 2.0, 3.0]));
        assert_eq!(Value::Double(f64::NAN).to_json(), json!("NaN"));
        let m = Value::Matrix4d(DMat4::IDENTITY).to_json();
        assert_eq!(m[0], json!([1.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_compound_json() {
        let op = ListOp::explicit(vec![Path::parse("/A").expect("path")]);
        assert_eq!(Value::PathListOp(op).to_json(), json!({ "explicit": ["/A"] }));

        let ts = TimeSamples::new([(0.0, Value::Double(1.0)), (1.0, Value::Double(2.0))]);
        assert_eq!(Value::TimeSamples(ts).to_json(), json!({ "0": 1.0, "1": 2.0 }));

        let arr = ArrayValue::from(vec![1i32, 2]);
        assert_eq!(Value::Array(arr).to_json(), json!([1, 2]));
    }
}
