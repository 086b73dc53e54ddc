//! Integration tests for the on-disk encodings: array compression, version
//! gates and the path tree.

use std::collections::BTreeSet;
use std::sync::mpsc;
use std::time::Duration;

use glam::{DMat4, DVec3, IVec3};
use tempfile::NamedTempFile;

use usdc::crate_file::CrateFile;
use usdc::data::CrateData;
use usdc::format::{BootStrap, SpecType, TypeEnum, ValueRep, Version};
use usdc::value::{Array, ArrayValue, ListOp, Path, TimeSamples, Token, Value};
use usdc::{CrateConfig, Error};

fn p(s: &str) -> Path {
    Path::parse(s).expect("Failed to parse path")
}

fn config(version: Version) -> CrateConfig {
    CrateConfig::default().with_default_write_version(version)
}

/// Rep of a field as stored in the file.
fn stored_rep(file: &CrateFile, spec_path: &str, field: &str) -> ValueRep {
    let target = p(spec_path);
    for spec in file.specs() {
        if file.spec_path(spec).expect("spec path") != &target {
            continue;
        }
        let fields = file.spec_fields(spec).expect("spec fields");
        if let Some((_, rep)) = fields.into_iter().find(|(name, _)| name.as_str() == field) {
            return rep;
        }
    }
    panic!("no field '{}' on <{}>", field, spec_path);
}

fn array_fields() -> Vec<(&'static str, ArrayValue)> {
    vec![
        ("ints", ArrayValue::Int(Array::new((0..100).collect()))),
        ("shortInts", ArrayValue::Int(Array::new((0..8).collect()))),
        ("int64s", ArrayValue::Int64(Array::new((0..64).map(|i| i * 1_000_000_007).collect()))),
        ("integralFloats", ArrayValue::Float(Array::new((0..50).map(|i| i as f32 * 2.0).collect()))),
        ("lutFloats", ArrayValue::Float(Array::new((0..64).map(|i| [0.5, 1.25, -3.75, 8.125][i % 4]).collect()))),
        ("lutDoubles", ArrayValue::Double(Array::new((0..40).map(|i| if i % 2 == 0 { 0.1 } else { 0.2 }).collect()))),
        ("rawFloats", ArrayValue::Float(Array::new((0..64).map(|i| i as f32 * 0.37 + 0.01).collect()))),
    ]
}

fn write_arrays(path: &std::path::Path, version: Version) {
    let mut data = CrateData::with_config(config(version));
    data.create_spec(&p("/Mesh"), SpecType::Prim).expect("create");
    for (name, array) in array_fields() {
        data.set_field(&p("/Mesh"), name, Value::Array(array)).expect("set");
    }
    data.save(path).expect("Failed to save");
}

#[test]
fn test_array_compression_choices() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    write_arrays(temp.path(), Version::DEFAULT_NEW_FILE);

    let file = CrateFile::open_with(temp.path(), CrateConfig::default()).expect("Failed to open");
    let expect = [
        ("ints", true),
        ("shortInts", false),
        ("int64s", true),
        ("integralFloats", true),
        ("lutFloats", true),
        ("lutDoubles", true),
        ("rawFloats", false),
    ];
    for (name, compressed) in expect {
        let rep = stored_rep(&file, "/Mesh", name);
        assert!(rep.is_array(), "'{}' should be an array rep", name);
        assert_eq!(rep.is_compressed(), compressed, "compression of '{}'", name);
    }

    let data = CrateData::open_with(temp.path(), CrateConfig::default()).expect("Failed to open");
    for (name, array) in array_fields() {
        assert_eq!(data.get_field(&p("/Mesh"), name).expect("field"), Some(Value::Array(array)), "'{}'", name);
    }
}

#[test]
fn test_arrays_before_compression_versions() {
    for version in [Version::PATH_HEADER_FIX, Version::COMPRESSED_STRUCTURE, Version::COMPRESSED_INT_ARRAYS] {
        let temp = NamedTempFile::new().expect("Failed to create temp file");
        write_arrays(temp.path(), version);

        let file = CrateFile::open_with(temp.path(), CrateConfig::default()).expect("Failed to open");
        assert_eq!(stored_rep(&file, "/Mesh", "ints").is_compressed(), version >= Version::COMPRESSED_INT_ARRAYS);
        assert!(!stored_rep(&file, "/Mesh", "lutFloats").is_compressed());

        let data = CrateData::open_with(temp.path(), CrateConfig::default()).expect("Failed to open");
        for (name, array) in array_fields() {
            let value = data.get_field(&p("/Mesh"), name).expect("field");
            assert_eq!(value, Some(Value::Array(array)), "'{}' at version {}", name, version);
        }
    }
}

#[test]
fn test_zero_copy_arrays_match_copies() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    write_arrays(temp.path(), Version::DEFAULT_NEW_FILE);

    let copied = CrateData::open_with(temp.path(), CrateConfig::default().with_zero_copy_arrays(false)).expect("open");
    let mapped = CrateData::open_with(temp.path(), CrateConfig::default().with_zero_copy_arrays(true)).expect("open");
    for (name, _) in array_fields() {
        let a = copied.get_field(&p("/Mesh"), name).expect("field");
        let b = mapped.get_field(&p("/Mesh"), name).expect("field");
        assert_eq!(a, b, "'{}'", name);
    }
}

#[test]
fn test_prepend_list_op_upgrades_version() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let cfg = config(Version::PATH_HEADER_FIX);
    {
        let mut data = CrateData::with_config(cfg);
        data.create_spec(&p("/A"), SpecType::Prim).expect("create");
        data.set_field(&p("/A"), "apiSchemas", Value::TokenListOp(ListOp::prepended(vec![Token::new("Skel")])))
            .expect("set");
        data.save(temp.path()).expect("save");
    }

    let file = CrateFile::open_with(temp.path(), cfg).expect("open");
    assert_eq!(file.file_version(), Version::LIST_OP_PREPEND_APPEND);

    let bytes = std::fs::read(temp.path()).expect("read");
    let result = BootStrap::parse(&bytes, bytes.len() as u64, Version::PATH_HEADER_FIX);
    assert!(matches!(result, Err(Error::UnsupportedVersion { .. })));
}

#[test]
fn test_newer_file_is_rejected() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    {
        let mut data = CrateData::with_config(CrateConfig::default());
        data.create_spec(&p("/A"), SpecType::Prim).expect("create");
        data.save(temp.path()).expect("save");
    }
    let mut bytes = std::fs::read(temp.path()).expect("read");
    bytes[9] = 99;
    std::fs::write(temp.path(), &bytes).expect("write");

    let result = CrateFile::open(temp.path());
    assert!(matches!(result, Err(Error::UnsupportedVersion { .. })));
}

fn tree_paths() -> Vec<(Path, SpecType)> {
    let mut out = vec![(p("/World"), SpecType::Prim)];
    for i in 0..6 {
        let group = format!("/World/Group{}", i);
        out.push((p(&group), SpecType::Prim));
        for j in 0..(i + 1) {
            let leaf = format!("{}/Leaf{}", group, j);
            out.push((p(&leaf), SpecType::Prim));
            out.push((p(&format!("{}.points", leaf)), SpecType::Attribute));
            if j % 2 == 0 {
                out.push((p(&format!("{}.material", leaf)), SpecType::Relationship));
            }
        }
        out.push((p(&format!("{}/Leaf0/Deep/Deeper", group)), SpecType::Prim));
    }
    out.push((p("/World/Group0/Leaf0/Deep"), SpecType::Prim));
    out.push((p("/Other"), SpecType::Prim));
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out.dedup_by(|a, b| a.0 == b.0);
    out
}

#[test]
fn test_path_tree_roundtrip_both_layouts() {
    for version in [Version::LIST_OP_PREPEND_APPEND, Version::DEFAULT_NEW_FILE] {
        let temp = NamedTempFile::new().expect("Failed to create temp file");
        {
            let mut data = CrateData::with_config(config(version));
            for (path, spec_type) in tree_paths() {
                data.create_spec(&path, spec_type).expect("create");
            }
            data.set_field(
                &p("/World/Group0/Leaf0.material"),
                "targetPaths",
                Value::PathListOp(ListOp::explicit(vec![p("/World/Looks/Red")])),
            )
            .expect("set targets");
            data.save(temp.path()).expect("save");
        }

        let data = CrateData::open_with(temp.path(), config(version)).expect("open");
        let mut found = BTreeSet::new();
        data.visit_specs(|path, spec_type| {
            if !path.is_target_path() {
                found.insert((path.to_string(), spec_type.to_string()));
            }
            true
        });
        let expected: BTreeSet<(String, String)> =
            tree_paths().into_iter().map(|(path, t)| (path.to_string(), t.to_string())).collect();
        assert_eq!(found, expected, "path tree at version {}", version);

        let target = p("/World/Group0/Leaf0.material[/World/Looks/Red]");
        assert!(data.has_spec(&target), "target spec at version {}", version);
        assert_eq!(
            data.get_field(&p("/World/Group0/Leaf0.material"), "targetChildren").expect("children"),
            Some(Value::PathVector(vec![p("/World/Looks/Red")]))
        );
    }
}

#[test]
fn test_truncated_file_is_rejected() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    {
        let mut data = CrateData::with_config(CrateConfig::default());
        data.create_spec(&p("/A"), SpecType::Prim).expect("create");
        data.set_field(&p("/A"), "ints", Value::Array(ArrayValue::Int(Array::new((0..500).collect()))))
            .expect("set");
        data.save(temp.path()).expect("save");
    }
    let bytes = std::fs::read(temp.path()).expect("read");
    std::fs::write(temp.path(), &bytes[..bytes.len() / 2]).expect("write");

    assert!(CrateFile::open(temp.path()).is_err());
}

#[test]
fn test_scalars_inline_only_when_exact() {
    let fields = [
        ("int64Small", Value::Int64(-12), true),
        ("int64Big", Value::Int64(i64::MIN + 3), false),
        ("uint64Small", Value::UInt64(70_000), true),
        ("uint64Big", Value::UInt64(u64::MAX - 1), false),
        ("doubleExact", Value::Double(0.25), true),
        ("doubleWide", Value::Double(0.1), false),
        ("matrixIdentity", Value::Matrix4d(DMat4::IDENTITY), true),
        ("matrixDiagonal", Value::Matrix4d(DMat4::from_diagonal(glam::DVec4::new(2.0, -3.0, 4.0, 1.0))), true),
        ("matrixFull", Value::Matrix4d(DMat4::from_translation(DVec3::new(1.5, 2.0, -3.25))), false),
        ("vecSmall", Value::Vec3i(IVec3::new(1, -2, 127)), true),
        ("vecLarge", Value::Vec3i(IVec3::new(1, -2, 128)), false),
        ("int", Value::Int(i32::MIN), true),
        ("float", Value::Float(0.1), true),
        ("token", Value::Token(Token::new("model")), true),
        ("string", Value::String("hello".to_string()), true),
    ];

    let temp = NamedTempFile::new().expect("Failed to create temp file");
    {
        let mut data = CrateData::with_config(CrateConfig::default());
        data.create_spec(&p("/A"), SpecType::Prim).expect("create");
        for (name, value, _) in &fields {
            data.set_field(&p("/A"), name, value.clone()).expect("set");
        }
        data.save(temp.path()).expect("save");
    }

    let file = CrateFile::open_with(temp.path(), CrateConfig::default()).expect("open");
    for (name, value, inlined) in &fields {
        let rep = stored_rep(&file, "/A", name);
        assert_eq!(rep.is_inlined(), *inlined, "inlining of '{}'", name);
        assert!(!rep.is_array(), "'{}' is not an array", name);
        if !inlined {
            assert!(rep.payload() > 0, "'{}' should point into the file", name);
        }
        assert_eq!(&file.unpack_value(rep).expect("unpack"), value, "'{}'", name);
    }
}

#[test]
fn test_corrupt_times_rep_fails_open() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    {
        let mut data = CrateData::with_config(CrateConfig::default());
        data.create_spec(&p("/A"), SpecType::Prim).expect("create");
        data.create_spec(&p("/A.x"), SpecType::Attribute).expect("create");
        let samples = TimeSamples::new([(0.0, Value::Double(1.5)), (1.0, Value::Double(2.5))]);
        data.set_field(&p("/A.x"), "timeSamples", Value::TimeSamples(samples)).expect("set");
        data.save(temp.path()).expect("save");
    }

    let rep = {
        let file = CrateFile::open_with(temp.path(), CrateConfig::default()).expect("open");
        stored_rep(&file, "/A.x", "timeSamples")
    };
    assert_eq!(rep.type_enum(), Some(TypeEnum::TimeSamples));

    // Point the times rep back at the time samples themselves.
    let mut bytes = std::fs::read(temp.path()).expect("read");
    let start = rep.payload() as usize;
    let mut jump = [0u8; 8];
    jump.copy_from_slice(&bytes[start..start + 8]);
    let times_at = (start as i64 + i64::from_le_bytes(jump)) as usize;
    let bad = ValueRep::at(TypeEnum::TimeSamples, rep.payload());
    bytes[times_at..times_at + 8].copy_from_slice(&bad.0.to_le_bytes());
    std::fs::write(temp.path(), &bytes).expect("write");

    let (tx, rx) = mpsc::channel();
    let path = temp.path().to_path_buf();
    std::thread::spawn(move || {
        let result = CrateData::open_with(&path, CrateConfig::default()).map(|_| ());
        let _ = tx.send(result);
    });
    let result = rx.recv_timeout(Duration::from_secs(10)).expect("open did not return");
    assert!(matches!(result, Err(Error::CorruptData(_))), "got {:?}", result);
}
