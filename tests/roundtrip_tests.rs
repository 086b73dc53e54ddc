//! Integration tests for saving crate files and reading them back.

use std::collections::BTreeMap;

use glam::{DMat4, DVec3, IVec3, Vec3};
use half::f16;
use tempfile::TempDir;

use usdc::crate_file::CrateFile;
use usdc::data::CrateData;
use usdc::format::{SpecType, Version};
use usdc::value::{
    Array, ArrayValue, AssetPath, LayerOffset, ListOp, Path, Payload, Reference, Specifier, TimeCode,
    TimeSamples, Token, Value, Variability,
};
use usdc::CrateConfig;

fn p(s: &str) -> Path {
    Path::parse(s).expect("Failed to parse path")
}

fn config(version: Version) -> CrateConfig {
    CrateConfig::default().with_default_write_version(version)
}

fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Values covering inline and out-of-line encodings of most types.
fn sample_fields() -> Vec<(&'static str, Value)> {
    let mut dict = BTreeMap::new();
    dict.insert("answer".to_string(), Value::Int(42));
    dict.insert("name".to_string(), Value::String("crate".to_string()));
    dict.insert("nested".to_string(), Value::Dictionary(BTreeMap::new()));

    vec![
        ("bool", Value::Bool(true)),
        ("uchar", Value::UChar(200)),
        ("int", Value::Int(-7)),
        ("uint", Value::UInt(4_000_000_000)),
        ("int64Small", Value::Int64(-12)),
        ("int64Big", Value::Int64(i64::MIN + 3)),
        ("uint64Big", Value::UInt64(u64::MAX - 1)),
        ("half", Value::Half(f16::from_f32(1.5))),
        ("float", Value::Float(0.1)),
        ("doubleExact", Value::Double(0.25)),
        ("doubleWide", Value::Double(0.1)),
        ("string", Value::String("hello world".to_string())),
        ("token", Value::Token(Token::new("model"))),
        ("asset", Value::AssetPath(AssetPath::new("./textures/wood.png"))),
        ("matrixIdentity", Value::Matrix4d(DMat4::IDENTITY)),
        ("matrixFull", Value::Matrix4d(DMat4::from_translation(DVec3::new(1.5, 2.0, -3.25)))),
        ("vecSmall", Value::Vec3i(IVec3::new(1, -2, 3))),
        ("vecFloat", Value::Vec3f(Vec3::new(0.5, 1.0, 2.0))),
        ("dict", Value::Dictionary(dict)),
        ("emptyDict", Value::Dictionary(BTreeMap::new())),
        ("tokenOp", Value::TokenListOp(ListOp::explicit(vec![Token::new("a"), Token::new("b")]))),
        ("pathOp", Value::PathListOp(ListOp { added_items: vec![p("/X")], ..Default::default() })),
        (
            "references",
            Value::ReferenceListOp(ListOp::explicit(vec![Reference {
                asset_path: "ref.usd".to_string(),
                prim_path: p("/Ref"),
                layer_offset: LayerOffset::new(10.0, 2.0),
                custom_data: BTreeMap::new(),
            }])),
        ),
        ("pathVector", Value::PathVector(vec![p("/A"), p("/B/C")])),
        ("tokenVector", Value::TokenVector(vec![Token::new("x"), Token::new("y")])),
        ("specifier", Value::Specifier(Specifier::Over)),
        ("variability", Value::Variability(Variability::Uniform)),
        ("doubles", Value::DoubleVector(vec![1.0, 2.5, -3.0])),
        ("offsets", Value::LayerOffsetVector(vec![LayerOffset::new(1.0, 1.0)])),
        ("strings", Value::StringVector(vec!["one".to_string(), "two".to_string()])),
        ("block", Value::ValueBlock),
        ("ints", Value::Array(ArrayValue::Int(Array::new((0..100).collect())))),
        ("emptyInts", Value::Array(ArrayValue::Int(Array::new(Vec::new())))),
        ("points", Value::Array(ArrayValue::Vec3f(Array::new(vec![Vec3::ZERO, Vec3::ONE, Vec3::X])))),
        ("tokens", Value::Array(ArrayValue::Token(vec![Token::new("p"), Token::new("q")]))),
        ("bools", Value::Array(ArrayValue::Bool(vec![true, false, true]))),
    ]
}

fn write_sample_store(path: &std::path::Path, cfg: CrateConfig) -> usdc::Result<()> {
    let mut data = CrateData::with_config(cfg);
    let prim = p("/Root");
    data.create_spec(&prim, SpecType::Prim)?;
    for (name, value) in sample_fields() {
        data.set_field(&prim, name, value)?;
    }
    data.save(path)
}

#[test]
fn test_roundtrip_all_value_kinds() {
    let dir = temp_dir();
    let path = dir.path().join("values.usdc");
    write_sample_store(&path, config(Version::DEFAULT_NEW_FILE)).expect("Failed to save");

    let data = CrateData::open_with(&path, CrateConfig::default()).expect("Failed to open");
    let prim = p("/Root");
    for (name, expected) in sample_fields() {
        let value = data.get_field(&prim, name).expect("Failed to read field");
        assert_eq!(value.as_ref(), Some(&expected), "field '{}'", name);
    }
}

#[test]
fn test_roundtrip_across_write_versions() {
    let versions = [
        Version::PATH_HEADER_FIX,
        Version::COMPRESSED_STRUCTURE,
        Version::COMPRESSED_INT_ARRAYS,
        Version::COMPRESSED_FLOAT_ARRAYS,
        Version::WIDE_ARRAY_COUNTS,
        Version::PAYLOAD_LAYER_OFFSETS,
        Version::TIME_CODE,
    ];
    for version in versions {
        let dir = temp_dir();
        let path = dir.path().join("versions.usdc");
        write_sample_store(&path, config(version)).expect("Failed to save");

        let file = CrateFile::open_with(&path, CrateConfig::default()).expect("Failed to open file");
        assert_eq!(file.file_version(), version);

        let data = CrateData::open_with(&path, CrateConfig::default()).expect("Failed to open");
        for (name, expected) in sample_fields() {
            let value = data.get_field(&p("/Root"), name).expect("Failed to read field");
            assert_eq!(value.as_ref(), Some(&expected), "field '{}' at version {}", name, version);
        }
    }
}

#[test]
fn test_pread_and_asset_backends_agree() {
    let dir = temp_dir();
    let path = dir.path().join("backends.usdc");
    write_sample_store(&path, config(Version::DEFAULT_NEW_FILE)).expect("Failed to save");

    let pread = CrateData::open_with(&path, CrateConfig::default().with_pread(true)).expect("pread open");
    assert_eq!(pread.file().backend_kind(), Some("pread"));

    let bytes = std::fs::read(&path).expect("Failed to read file");
    let asset = std::sync::Arc::new(usdc::stream::MemoryAsset::new(bytes));
    let in_memory = CrateData::open_asset("memory", asset, CrateConfig::default()).expect("asset open");
    assert_eq!(in_memory.file().backend_kind(), Some("asset"));

    for (name, _) in sample_fields() {
        let a = pread.get_field(&p("/Root"), name).expect("pread field");
        let b = in_memory.get_field(&p("/Root"), name).expect("asset field");
        assert_eq!(a, b, "field '{}'", name);
    }
}

#[test]
fn test_end_to_end_scenario() {
    let dir = temp_dir();
    let path = dir.path().join("scene.usdc");
    let cfg = CrateConfig::default();

    {
        let mut data = CrateData::with_config(cfg);
        data.create_spec(&p("/A"), SpecType::Prim).expect("create /A");
        data.set_field(&p("/A"), "kind", Value::Token(Token::new("model"))).expect("set kind");
        data.create_spec(&p("/A/x"), SpecType::Attribute).expect("create /A/x");
        data.set_field(&p("/A/x"), "default", Value::Int(5)).expect("set default");
        let samples = TimeSamples::new([(0.0, Value::Double(1.0)), (1.0, Value::Double(2.0))]);
        data.set_field(&p("/A/x"), "timeSamples", Value::TimeSamples(samples)).expect("set samples");
        data.save(&path).expect("Failed to save");
    }

    let original = std::fs::read(&path).expect("Failed to read file");

    let mut data = CrateData::open_with(&path, cfg).expect("Failed to open");
    assert!(data.has_spec(&p("/A")));
    assert_eq!(data.get_field(&p("/A"), "kind").expect("kind"), Some(Value::Token(Token::new("model"))));
    assert_eq!(data.get_field(&p("/A/x"), "default").expect("default"), Some(Value::Int(5)));
    assert_eq!(data.num_time_samples_for_path(&p("/A/x")), 2);
    assert_eq!(data.query_time_sample(&p("/A/x"), 1.0).expect("query"), Some(Value::Double(2.0)));
    assert_eq!(data.query_time_sample(&p("/A/x"), 0.5).expect("query"), None);

    assert!(data.can_incremental_save(&path));
    data.save(&path).expect("Failed to re-save");
    let resaved = std::fs::read(&path).expect("Failed to read file");
    assert_eq!(original.len(), resaved.len());
    assert!(original == resaved, "re-save without edits changed the file");
}

#[test]
fn test_edit_and_incremental_save() {
    let dir = temp_dir();
    let path = dir.path().join("edit.usdc");
    let cfg = CrateConfig::default();
    write_sample_store(&path, cfg).expect("Failed to save");

    let mut data = CrateData::open_with(&path, cfg).expect("Failed to open");
    data.set_field(&p("/Root"), "int", Value::Int(99)).expect("set");
    data.erase_field(&p("/Root"), "string");
    data.create_spec(&p("/Root.size"), SpecType::Attribute).expect("create");
    data.set_time_sample(&p("/Root.size"), 3.0, Value::Float(3.5)).expect("sample");
    data.save(&path).expect("Failed to save in place");

    let data = CrateData::open_with(&path, cfg).expect("Failed to reopen");
    assert_eq!(data.get_field(&p("/Root"), "int").expect("int"), Some(Value::Int(99)));
    assert_eq!(data.get_field(&p("/Root"), "string").expect("string"), None);
    assert_eq!(
        data.get_field(&p("/Root"), "ints").expect("ints"),
        Some(Value::Array(ArrayValue::Int(Array::new((0..100).collect()))))
    );
    assert_eq!(data.query_time_sample(&p("/Root.size"), 3.0).expect("query"), Some(Value::Float(3.5)));
}

#[test]
fn test_time_samples_edit_after_reopen() {
    let dir = temp_dir();
    let path = dir.path().join("samples.usdc");
    let cfg = CrateConfig::default();
    let attrs = [p("/P.a"), p("/P.b")];
    {
        let mut data = CrateData::with_config(cfg);
        data.create_spec(&p("/P"), SpecType::Prim).expect("create");
        for attr in &attrs {
            data.create_spec(attr, SpecType::Attribute).expect("create");
            for t in 0..4 {
                let value = Value::Array(ArrayValue::Float(Array::new(vec![t as f32 * 0.1; 8])));
                data.set_time_sample(attr, t as f64, value).expect("sample");
            }
        }
        data.save(&path).expect("save");
    }

    let mut data = CrateData::open_with(&path, cfg).expect("open");
    assert_eq!(data.list_all_time_samples(), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(data.bracketing_time_samples(1.5), Some((1.0, 2.0)));
    data.set_time_sample(&attrs[0], 1.5, Value::Array(ArrayValue::Float(Array::new(vec![9.0; 8])))).expect("set");
    data.erase_time_sample(&attrs[0], 0.0).expect("erase");
    assert_eq!(data.list_time_samples_for_path(&attrs[0]), vec![1.0, 1.5, 2.0, 3.0]);
    assert_eq!(data.list_time_samples_for_path(&attrs[1]), vec![0.0, 1.0, 2.0, 3.0]);

    let copy = dir.path().join("samples_copy.usdc");
    assert!(!data.can_incremental_save(&copy));
    data.save(&copy).expect("save copy");

    let reopened = CrateData::open_with(&copy, cfg).expect("open copy");
    assert_eq!(reopened.list_time_samples_for_path(&attrs[0]), vec![1.0, 1.5, 2.0, 3.0]);
    assert_eq!(
        reopened.query_time_sample(&attrs[0], 2.0).expect("query"),
        Some(Value::Array(ArrayValue::Float(Array::new(vec![0.2; 8]))))
    );
    assert_eq!(
        reopened.query_time_sample(&attrs[1], 0.0).expect("query"),
        Some(Value::Array(ArrayValue::Float(Array::new(vec![0.0; 8]))))
    );
    // The source store is unchanged by saving a copy.
    assert_eq!(data.asset_path(), path.display().to_string());
}

#[test]
fn test_copy_preserves_values_from_other_file() {
    let dir = temp_dir();
    let src = dir.path().join("src.usdc");
    let dst = dir.path().join("dst.usdc");
    write_sample_store(&src, CrateConfig::default()).expect("save");

    let mut data = CrateData::open_with(&src, CrateConfig::default()).expect("open");
    data.save(&dst).expect("copy");
    drop(data);
    std::fs::remove_file(&src).expect("remove source");

    let copy = CrateData::open_with(&dst, CrateConfig::default()).expect("open copy");
    for (name, expected) in sample_fields() {
        assert_eq!(copy.get_field(&p("/Root"), name).expect("field").as_ref(), Some(&expected), "field '{}'", name);
    }
}

#[test]
fn test_payload_upgrades_version() {
    let dir = temp_dir();
    let path = dir.path().join("payload.usdc");
    let cfg = config(Version::WIDE_ARRAY_COUNTS);

    let plain = Payload::new("plain.usd", p("/Plain"));
    let mut offset = Payload::new("offset.usd", p("/Offset"));
    offset.layer_offset = LayerOffset::new(5.0, 1.0);
    {
        let mut data = CrateData::with_config(cfg);
        for (prim, payload) in [(p("/A"), &plain), (p("/B"), &offset)] {
            data.create_spec(&prim, SpecType::Prim).expect("create");
            data.set_field(&prim, "payload", Value::PayloadListOp(ListOp::explicit(vec![payload.clone()])))
                .expect("set payload");
        }
        data.save(&path).expect("save");
    }

    let file = CrateFile::open_with(&path, cfg).expect("open file");
    assert_eq!(file.file_version(), Version::PAYLOAD_LAYER_OFFSETS);

    let data = CrateData::open_with(&path, cfg).expect("open");
    assert_eq!(
        data.get_field(&p("/A"), "payload").expect("payload"),
        Some(Value::PayloadListOp(ListOp::explicit(vec![plain])))
    );
    assert_eq!(
        data.get_field(&p("/B"), "payload").expect("payload"),
        Some(Value::PayloadListOp(ListOp::explicit(vec![offset])))
    );
}

#[test]
fn test_identity_payload_keeps_version() {
    let dir = temp_dir();
    let path = dir.path().join("payload.usdc");
    let cfg = config(Version::WIDE_ARRAY_COUNTS);
    {
        let mut data = CrateData::with_config(cfg);
        data.create_spec(&p("/A"), SpecType::Prim).expect("create");
        data.set_field(&p("/A"), "payload", Value::Payload(Payload::new("a.usd", p("/A")))).expect("set");
        data.save(&path).expect("save");
    }
    let file = CrateFile::open_with(&path, cfg).expect("open file");
    assert_eq!(file.file_version(), Version::WIDE_ARRAY_COUNTS);
}

#[test]
fn test_timecode_upgrades_version() {
    let dir = temp_dir();
    let path = dir.path().join("timecode.usdc");
    let cfg = config(Version::WIDE_ARRAY_COUNTS);
    {
        let mut data = CrateData::with_config(cfg);
        data.create_spec(&p("/A"), SpecType::Prim).expect("create");
        data.set_field(&p("/A"), "startTime", Value::TimeCode(TimeCode(24.0))).expect("set");
        data.save(&path).expect("save");
    }
    let data = CrateData::open_with(&path, cfg).expect("open");
    assert_eq!(data.file().file_version(), Version::TIME_CODE);
    assert_eq!(data.get_field(&p("/A"), "startTime").expect("field"), Some(Value::TimeCode(TimeCode(24.0))));
}
