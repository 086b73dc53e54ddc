//! Structural sections: tokens, strings, fields, field sets, paths and
//! specs, in both the legacy record layout and the compressed layout used
//! from 0.4.

use byteorder::{ByteOrder, LittleEndian};
use bytemuck::Pod;
use rayon::prelude::*;
use tracing::debug;

use super::paths;
use super::tables::Tables;
use super::writer::ValueWriter;
use crate::codec::{compress_block, decompress_block, CompressedInt};
use crate::format::{
    Field, FieldIndex, FieldSetIndex, PathIndex, Section, Spec, SpecType, TableOfContents,
    TokenIndex, ValueRep, Version, FIELDSETS_SECTION, FIELDS_SECTION, PATHS_SECTION,
    SPECS_SECTION, STRINGS_SECTION, TOKENS_SECTION,
};
use crate::util::{Error, Result};
use crate::value::Token;

/// Read cursor over the structural bytes of a file. Offsets are absolute
/// file offsets; `base` is the file offset of `data[0]`.
#[derive(Clone)]
pub(crate) struct SectionCursor<'a> {
    data: &'a [u8],
    base: u64,
    pos: usize,
}

impl<'a> SectionCursor<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, base, pos: 0 }
    }

    pub fn tell(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        let pos = offset
            .checked_sub(self.base)
            .filter(|p| *p <= self.data.len() as u64)
            .ok_or_else(|| Error::invalid(format!("offset {} outside structural data", offset)))?;
        self.pos = pos as usize;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: u64) -> Result<&'a [u8]> {
        let end = (self.pos as u64)
            .checked_add(len)
            .filter(|e| *e <= self.data.len() as u64)
            .ok_or(Error::UnexpectedEof(self.tell().saturating_add(len)))?;
        let out = &self.data[self.pos..end as usize];
        self.pos = end as usize;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.read_bytes(8)?))
    }

    /// An element count, rejected if that many `min_elem_size`-byte
    /// elements could not fit in the remaining bytes.
    pub fn read_count(&mut self, min_elem_size: u64) -> Result<usize> {
        let n = self.read_u64()?;
        let remaining = (self.data.len() - self.pos) as u64;
        if n.saturating_mul(min_elem_size) > remaining {
            return Err(Error::corrupt(format!("count {} exceeds section size", n)));
        }
        Ok(n as usize)
    }

    pub fn read_pod_vec<T: Pod>(&mut self, n: usize) -> Result<Vec<T>> {
        let nbytes = (n as u64).saturating_mul(std::mem::size_of::<T>() as u64);
        Ok(bytemuck::pod_collect_to_vec(self.read_bytes(nbytes)?))
    }

    /// `n` integers through the integer codec, prefixed by their encoded
    /// size.
    pub fn read_compressed<T: CompressedInt>(&mut self, n: usize) -> Result<Vec<T>> {
        let size = self.read_u64()?;
        T::decompress(self.read_bytes(size)?, n)
    }

    fn at_section(&mut self, toc: &TableOfContents, name: &str) -> Result<bool> {
        match toc.get(name) {
            Some(section) => {
                self.seek(section.start as u64)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn read_tokens(c: &mut SectionCursor<'_>, version: Version) -> Result<Vec<Token>> {
    let n = c.read_count(1)?;
    let chars = if version < Version::COMPRESSED_STRUCTURE {
        let total = c.read_u64()?;
        c.read_bytes(total)?.to_vec()
    } else {
        let uncompressed = c.read_u64()?;
        let compressed = c.read_u64()?;
        decompress_block(c.read_bytes(compressed)?, uncompressed as usize)?
    };

    let mut spans = Vec::with_capacity(n);
    let mut start = 0;
    for (i, &b) in chars.iter().enumerate() {
        if spans.len() == n {
            break;
        }
        if b == 0 {
            spans.push((start, i));
            start = i + 1;
        }
    }
    if spans.len() != n {
        return Err(Error::corrupt(format!("expected {} tokens, found {}", n, spans.len())));
    }
    spans
        .into_par_iter()
        .map(|(s, e)| Ok(Token::from(String::from_utf8(chars[s..e].to_vec())?)))
        .collect()
}

fn read_fields(c: &mut SectionCursor<'_>, version: Version) -> Result<Vec<Field>> {
    if version < Version::COMPRESSED_STRUCTURE {
        let n = c.read_count(16)?;
        return (0..n)
            .map(|_| {
                c.read_u32()?;
                let token = TokenIndex::new(c.read_u32()?);
                Ok(Field::new(token, ValueRep(c.read_u64()?)))
            })
            .collect();
    }
    let n = c.read_count(1)?;
    let tokens: Vec<u32> = c.read_compressed(n)?;
    let reps_size = c.read_u64()?;
    let reps = decompress_block(c.read_bytes(reps_size)?, n * 8)?;
    Ok(tokens
        .into_iter()
        .zip(reps.chunks_exact(8))
        .map(|(t, r)| Field::new(TokenIndex::new(t), ValueRep(LittleEndian::read_u64(r))))
        .collect())
}

fn read_field_sets(c: &mut SectionCursor<'_>, version: Version) -> Result<Vec<FieldIndex>> {
    let raw: Vec<u32> = if version < Version::COMPRESSED_STRUCTURE {
        let n = c.read_count(4)?;
        c.read_pod_vec(n)?
    } else {
        let n = c.read_count(1)?;
        c.read_compressed(n)?
    };
    Ok(raw.into_iter().map(FieldIndex::new).collect())
}

fn spec_type(raw: u32) -> Result<SpecType> {
    SpecType::from_u32(raw).ok_or_else(|| Error::corrupt(format!("invalid spec type {}", raw)))
}

fn read_specs(c: &mut SectionCursor<'_>, version: Version) -> Result<Vec<Spec>> {
    if version < Version::COMPRESSED_STRUCTURE {
        let legacy = version == Version::INITIAL;
        let n = c.read_count(if legacy { 16 } else { 12 })?;
        return (0..n)
            .map(|_| {
                if legacy {
                    c.read_u32()?;
                }
                let path = PathIndex::new(c.read_u32()?);
                let field_set = FieldSetIndex::new(c.read_u32()?);
                Ok(Spec::new(path, spec_type(c.read_u32()?)?, field_set))
            })
            .collect();
    }
    let n = c.read_count(1)?;
    let paths: Vec<u32> = c.read_compressed(n)?;
    let field_sets: Vec<u32> = c.read_compressed(n)?;
    let types: Vec<u32> = c.read_compressed(n)?;
    paths
        .into_iter()
        .zip(field_sets)
        .zip(types)
        .map(|((p, f), t)| Ok(Spec::new(PathIndex::new(p), spec_type(t)?, FieldSetIndex::new(f))))
        .collect()
}

/// Decode every structural section present in `toc`. `data` holds the
/// file bytes starting at offset `base`.
pub(crate) fn read_tables(data: &[u8], base: u64, toc: &TableOfContents, version: Version) -> Result<Tables> {
    let mut c = SectionCursor::new(data, base);
    let mut tables = Tables::default();

    if c.at_section(toc, TOKENS_SECTION)? {
        tables.tokens = read_tokens(&mut c, version)?;
    }
    if c.at_section(toc, STRINGS_SECTION)? {
        let n = c.read_count(4)?;
        let raw: Vec<u32> = c.read_pod_vec(n)?;
        tables.strings = raw.into_iter().map(TokenIndex::new).collect();
    }
    if c.at_section(toc, FIELDS_SECTION)? {
        tables.fields = read_fields(&mut c, version)?;
    }
    if c.at_section(toc, FIELDSETS_SECTION)? {
        tables.field_sets = read_field_sets(&mut c, version)?;
    }
    if c.at_section(toc, PATHS_SECTION)? {
        tables.paths = paths::read_paths(&mut c, &tables.tokens, version)?;
    }
    if c.at_section(toc, SPECS_SECTION)? {
        tables.specs = read_specs(&mut c, version)?;
    }

    debug!(
        tokens = tables.tokens.len(),
        strings = tables.strings.len(),
        fields = tables.fields.len(),
        field_sets = tables.field_sets.len(),
        paths = tables.paths.len(),
        specs = tables.specs.len(),
        "read structural sections"
    );
    Ok(tables)
}

impl ValueWriter<'_> {
    /// Integers through the integer codec, prefixed by their encoded size.
    pub(super) fn write_compressed_ints<T: CompressedInt>(&mut self, values: &[T]) -> Result<()> {
        let data = T::compress(values)?;
        self.write_u64(data.len() as u64)?;
        self.write_bytes(&data)
    }

    fn write_tokens(&mut self) -> Result<()> {
        let mut chars = Vec::new();
        for token in &self.tables.tokens {
            chars.extend_from_slice(token.as_bytes());
            chars.push(0);
        }
        self.write_u64(self.tables.tokens.len() as u64)?;
        if self.write_version() < Version::COMPRESSED_STRUCTURE {
            self.write_u64(chars.len() as u64)?;
            return self.write_bytes(&chars);
        }
        let compressed = compress_block(&chars)?;
        self.write_u64(chars.len() as u64)?;
        self.write_u64(compressed.len() as u64)?;
        self.write_bytes(&compressed)
    }

    fn write_strings(&mut self) -> Result<()> {
        let raw: Vec<u32> = self.tables.strings.iter().map(|t| t.0).collect();
        self.write_u64(raw.len() as u64)?;
        self.write_pod_slice(&raw)
    }

    fn write_fields(&mut self) -> Result<()> {
        let n = self.tables.fields.len();
        self.write_u64(n as u64)?;
        if self.write_version() < Version::COMPRESSED_STRUCTURE {
            let records: Vec<(u32, u32, u64)> = self
                .tables
                .fields
                .iter()
                .map(|f| (0, f.token_index.0, f.value_rep.data()))
                .collect();
            for (pad, token, rep) in records {
                self.write_u32(pad)?;
                self.write_u32(token)?;
                self.write_u64(rep)?;
            }
            return Ok(());
        }
        let tokens: Vec<u32> = self.tables.fields.iter().map(|f| f.token_index.0).collect();
        self.write_compressed_ints(&tokens)?;
        let mut reps = vec![0u8; n * 8];
        for (chunk, f) in reps.chunks_exact_mut(8).zip(&self.tables.fields) {
            LittleEndian::write_u64(chunk, f.value_rep.data());
        }
        let compressed = compress_block(&reps)?;
        self.write_u64(compressed.len() as u64)?;
        self.write_bytes(&compressed)
    }

    fn write_field_sets(&mut self) -> Result<()> {
        let raw: Vec<u32> = self.tables.field_sets.iter().map(|f| f.0).collect();
        self.write_u64(raw.len() as u64)?;
        if self.write_version() < Version::COMPRESSED_STRUCTURE {
            self.write_pod_slice(&raw)
        } else {
            self.write_compressed_ints(&raw)
        }
    }

    fn write_specs(&mut self) -> Result<()> {
        let columns: Vec<(u32, u32, u32)> = self
            .tables
            .specs
            .iter()
            .map(|s| (s.path_index.0, s.field_set_index.0, s.spec_type as u32))
            .collect();
        self.write_u64(columns.len() as u64)?;
        let version = self.write_version();
        if version < Version::COMPRESSED_STRUCTURE {
            for (path, field_set, spec_type) in columns {
                if version == Version::INITIAL {
                    self.write_u32(0)?;
                }
                self.write_u32(path)?;
                self.write_u32(field_set)?;
                self.write_u32(spec_type)?;
            }
            return Ok(());
        }
        let paths: Vec<u32> = columns.iter().map(|c| c.0).collect();
        let field_sets: Vec<u32> = columns.iter().map(|c| c.1).collect();
        let types: Vec<u32> = columns.iter().map(|c| c.2).collect();
        self.write_compressed_ints(&paths)?;
        self.write_compressed_ints(&field_sets)?;
        self.write_compressed_ints(&types)
    }

    fn write_section(
        &mut self,
        name: &str,
        sections: &mut Vec<Section>,
        write: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let start = self.tell();
        write(self)?;
        let size = self.tell() - start;
        sections.push(Section::new(name, start as i64, size as i64)?);
        Ok(())
    }

    /// Write carried-over unknown sections and then the six structural
    /// sections at the head, returning their table of contents entries.
    pub(super) fn write_structure(&mut self) -> Result<Vec<Section>> {
        let mut sections = Vec::new();
        for (name, bytes) in std::mem::take(&mut self.ctx.unknown_sections) {
            self.write_section(&name, &mut sections, |w| w.write_bytes(&bytes))?;
        }
        self.write_section(TOKENS_SECTION, &mut sections, |w| w.write_tokens())?;
        self.write_section(STRINGS_SECTION, &mut sections, |w| w.write_strings())?;
        self.write_section(FIELDS_SECTION, &mut sections, |w| w.write_fields())?;
        self.write_section(FIELDSETS_SECTION, &mut sections, |w| w.write_field_sets())?;
        self.write_section(PATHS_SECTION, &mut sections, |w| w.write_paths())?;
        self.write_section(SPECS_SECTION, &mut sections, |w| w.write_specs())?;
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_bounds() -> Result<()> {
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let mut c = SectionCursor::new(&data, 100);
        assert_eq!(c.read_u32()?, 1);
        assert_eq!(c.tell(), 104);
        c.seek(100)?;
        assert_eq!(c.read_pod_vec::<u32>(2)?, vec![1, 2]);
        assert!(c.read_u8().is_err());
        assert!(c.seek(99).is_err());
        assert!(c.seek(109).is_err());
        Ok(())
    }

    #[test]
    fn test_token_count_mismatch() {
        let mut data = Vec::new();
        data.extend_from_slice(&3u64.to_le_bytes());
        data.extend_from_slice(&4u64.to_le_bytes());
        data.extend_from_slice(b"a\0b\0");
        let mut c = SectionCursor::new(&data, 0);
        assert!(read_tokens(&mut c, Version::new(0, 3, 0)).is_err());

        data[0] = 2;
        let mut c = SectionCursor::new(&data, 0);
        let tokens = read_tokens(&mut c, Version::new(0, 3, 0)).expect("two tokens");
        assert_eq!(tokens, vec![Token::new("a"), Token::new("b")]);
    }
}
