//! Interned structural tables and the dedup state of a packing session.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

use crate::format::{
    Field, FieldIndex, FieldSetIndex, PathIndex, Spec, StringIndex, TokenIndex, TypeEnum,
    ValueRep, Version,
};
use crate::stream::BufferedOutput;
use crate::util::{Error, Result};
use crate::value::{Path, Token};

/// The six structural tables of a crate file.
///
/// Strings are stored as token handles; field sets are runs of field
/// handles each terminated by [`FieldIndex::INVALID`].
#[derive(Clone, Debug, Default)]
pub struct Tables {
    pub tokens: Vec<Token>,
    pub strings: Vec<TokenIndex>,
    pub paths: Vec<Path>,
    pub fields: Vec<Field>,
    pub field_sets: Vec<FieldIndex>,
    pub specs: Vec<Spec>,
}

impl Tables {
    pub fn token(&self, index: TokenIndex) -> Result<&Token> {
        self.tokens
            .get(index.get())
            .ok_or_else(|| Error::invalid(format!("token index {} out of range", index.0)))
    }

    pub fn string(&self, index: StringIndex) -> Result<&str> {
        let token = self
            .strings
            .get(index.get())
            .ok_or_else(|| Error::invalid(format!("string index {} out of range", index.0)))?;
        Ok(self.token(*token)?.as_str())
    }

    pub fn path(&self, index: PathIndex) -> Result<&Path> {
        self.paths
            .get(index.get())
            .ok_or_else(|| Error::invalid(format!("path index {} out of range", index.0)))
    }

    pub fn field(&self, index: FieldIndex) -> Result<&Field> {
        self.fields
            .get(index.get())
            .ok_or_else(|| Error::invalid(format!("field index {} out of range", index.0)))
    }

    /// Field handles of the run starting at `index`.
    pub fn field_set(&self, index: FieldSetIndex) -> Result<&[FieldIndex]> {
        let run = self
            .field_sets
            .get(index.get()..)
            .ok_or_else(|| Error::invalid(format!("field set index {} out of range", index.0)))?;
        let end = run.iter().position(|f| !f.is_valid()).unwrap_or(run.len());
        Ok(&run[..end])
    }
}

/// Per-session state: dedup maps seeded from the existing tables, the
/// output sink and the version being written.
pub(crate) struct PackingContext {
    pub token_to_index: HashMap<Token, TokenIndex>,
    pub string_to_index: HashMap<String, StringIndex>,
    pub path_to_index: HashMap<Path, PathIndex>,
    pub field_to_index: HashMap<Field, FieldIndex>,
    pub field_set_to_index: HashMap<Vec<FieldIndex>, FieldSetIndex>,
    /// Scalar dedup, one map per type tag, keyed by value content.
    pub scalar_dedup: Vec<HashMap<Vec<u8>, ValueRep>>,
    /// Array dedup, one map per element type tag.
    pub array_dedup: Vec<HashMap<Vec<u8>, ValueRep>>,
    /// Sections this library does not interpret, carried over verbatim.
    pub unknown_sections: Vec<(String, Vec<u8>)>,
    pub file_name: PathBuf,
    pub write_version: Version,
    pub out: BufferedOutput,
}

impl PackingContext {
    /// Build the context. The dedup maps are filled in parallel.
    pub fn new(
        tables: &Tables,
        unknown_sections: Vec<(String, Vec<u8>)>,
        file_name: PathBuf,
        write_version: Version,
        out: BufferedOutput,
    ) -> Self {
        let mut token_to_index = HashMap::new();
        let mut string_to_index = HashMap::new();
        let mut path_to_index = HashMap::new();
        let mut field_to_index = HashMap::new();
        let mut field_set_to_index = HashMap::new();

        rayon::scope(|s| {
            s.spawn(|_| {
                token_to_index = tables
                    .tokens
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (t.clone(), TokenIndex::new(i as u32)))
                    .collect();
            });
            s.spawn(|_| {
                string_to_index = (0..tables.strings.len())
                    .filter_map(|i| {
                        let idx = StringIndex::new(i as u32);
                        tables.string(idx).ok().map(|s| (s.to_string(), idx))
                    })
                    .collect();
            });
            s.spawn(|_| {
                path_to_index = tables
                    .paths
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| !p.is_empty())
                    .map(|(i, p)| (p.clone(), PathIndex::new(i as u32)))
                    .collect();
            });
            s.spawn(|_| {
                field_to_index = tables
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (*f, FieldIndex::new(i as u32)))
                    .collect();
            });
            s.spawn(|_| {
                let mut start = 0;
                for (i, f) in tables.field_sets.iter().enumerate() {
                    if !f.is_valid() {
                        field_set_to_index
                            .insert(tables.field_sets[start..i].to_vec(), FieldSetIndex::new(start as u32));
                        start = i + 1;
                    }
                }
            });
        });

        Self {
            token_to_index,
            string_to_index,
            path_to_index,
            field_to_index,
            field_set_to_index,
            scalar_dedup: vec![HashMap::new(); TypeEnum::COUNT],
            array_dedup: vec![HashMap::new(); TypeEnum::COUNT],
            unknown_sections,
            file_name,
            write_version,
            out,
        }
    }

    /// Raise the write version to at least `version`, logging why.
    pub fn request_upgrade(&mut self, version: Version, reason: &str) {
        if !self.write_version.can_read(version) {
            warn!(
                "upgrading crate file <{}> from version {} to {}: {}",
                self.file_name.display(),
                self.write_version,
                version,
                reason
            );
            self.write_version = version;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_set_runs() -> Result<()> {
        let tables = Tables {
            field_sets: vec![
                FieldIndex::new(0),
                FieldIndex::new(1),
                FieldIndex::INVALID,
                FieldIndex::new(2),
                FieldIndex::INVALID,
            ],
            ..Default::default()
        };
        assert_eq!(tables.field_set(FieldSetIndex::new(0))?, &[FieldIndex::new(0), FieldIndex::new(1)]);
        assert_eq!(tables.field_set(FieldSetIndex::new(3))?, &[FieldIndex::new(2)]);
        assert!(tables.field_set(FieldSetIndex::new(9)).is_err());
        Ok(())
    }

    #[test]
    fn test_string_goes_through_tokens() -> Result<()> {
        let tables = Tables {
            tokens: vec![Token::new(";-)"), Token::new("hello")],
            strings: vec![TokenIndex::new(1)],
            ..Default::default()
        };
        assert_eq!(tables.string(StringIndex::new(0))?, "hello");
        assert!(tables.string(StringIndex::new(1)).is_err());
        assert!(tables.token(TokenIndex::INVALID).is_err());
        Ok(())
    }

    fn context(tables: &Tables, dir: &tempfile::TempDir) -> Result<PackingContext> {
        let path = dir.path().join("dedup.usdc");
        let out = BufferedOutput::new(std::fs::File::create(&path)?)?;
        Ok(PackingContext::new(tables, Vec::new(), path, Version::DEFAULT_NEW_FILE, out))
    }

    #[test]
    fn test_interning_is_idempotent() -> Result<()> {
        use super::super::writer::ValueWriter;
        use crate::value::Value;

        let dir = tempfile::tempdir()?;
        let mut tables = Tables::default();
        let mut ctx = context(&tables, &dir)?;
        let prim = Path::parse("/World/Cube")?;
        let prop = Path::parse("/World/Cube.size")?;

        let (token, path, field, wide, set) = {
            let mut w = ValueWriter::new(&mut tables, &mut ctx);
            let token = w.add_token("model");
            let path = w.add_path(&prop);
            let field = w.add_field("size", &Value::Int(5))?;
            let wide = w.add_field("offset", &Value::Double(0.1))?;
            let set = w.add_field_set(&[field, wide]);

            assert_eq!(w.add_token("model"), token);
            assert_eq!(w.add_path(&prop), path);
            assert_eq!(w.add_field("size", &Value::Int(5))?, field);
            assert_eq!(w.add_field("offset", &Value::Double(0.1))?, wide);
            assert_eq!(w.add_field_set(&[field, wide]), set);
            assert_ne!(w.add_field_set(&[wide, field]), set);
            assert_ne!(w.add_field("size", &Value::Int(6))?, field);
            (token, path, field, wide, set)
        };
        let counts = (tables.tokens.len(), tables.paths.len(), tables.fields.len(), tables.field_sets.len());

        // Ancestors were interned with the property path.
        assert!(tables.paths.iter().any(|p| *p == prim));
        assert!(tables.paths.iter().any(|p| *p == Path::root()));

        // A fresh session over the same tables hands out the same indices.
        drop(ctx);
        let mut ctx = context(&tables, &dir)?;
        let mut w = ValueWriter::new(&mut tables, &mut ctx);
        assert_eq!(w.add_token("model"), token);
        assert_eq!(w.add_path(&prop), path);
        assert_eq!(w.add_field("size", &Value::Int(5))?, field);
        assert_eq!(w.add_field_set(&[field, wide]), set);
        assert_eq!(
            (tables.tokens.len(), tables.paths.len(), tables.fields.len(), tables.field_sets.len()),
            counts
        );
        Ok(())
    }
}
