//! Crate file on-disk layout: bootstrap, sections and fixed-size records.
//!
//! All multi-byte values are little-endian. The bootstrap sits at offset 0
//! and points at the table of contents, which is written after every
//! section.

use byteorder::{ByteOrder, LittleEndian};

use super::version::Version;
use crate::util::{Error, Result};

/// Identifier at the start of every crate file.
pub const CRATE_MAGIC: &[u8; 8] = b"PXR-USDC";

/// Size of the bootstrap block: ident, version, toc offset, 8 reserved words.
pub const BOOTSTRAP_SIZE: usize = 8 + 8 + 8 + 8 * 8;

/// Maximum significant bytes of a section name.
pub const SECTION_NAME_MAX_LEN: usize = 15;

/// On-disk size of one table-of-contents record.
pub const SECTION_RECORD_SIZE: usize = SECTION_NAME_MAX_LEN + 1 + 8 + 8;

pub const TOKENS_SECTION: &str = "TOKENS";
pub const STRINGS_SECTION: &str = "STRINGS";
pub const FIELDS_SECTION: &str = "FIELDS";
pub const FIELDSETS_SECTION: &str = "FIELDSETS";
pub const PATHS_SECTION: &str = "PATHS";
pub const SPECS_SECTION: &str = "SPECS";

/// Sections this library reads and writes itself, in write order.
pub const KNOWN_SECTIONS: [&str; 6] = [
    TOKENS_SECTION,
    STRINGS_SECTION,
    FIELDS_SECTION,
    FIELDSETS_SECTION,
    PATHS_SECTION,
    SPECS_SECTION,
];

/// True for the six structural section names.
#[inline]
pub fn is_known_section(name: &str) -> bool {
    KNOWN_SECTIONS.contains(&name)
}

/// Legacy path tree header bits.
pub const PATH_HAS_CHILD: u8 = 1 << 0;
pub const PATH_HAS_SIBLING: u8 = 1 << 1;
pub const PATH_IS_PRIM_PROPERTY: u8 = 1 << 2;

/// Path item header size from 0.1.0 on: index, element token, bits, padding.
pub const PATH_HEADER_SIZE: usize = 12;
/// Path item header size in 0.0.1 files, with 4 leading padding bytes.
pub const PATH_HEADER_SIZE_0_0_1: usize = 16;

/// Legacy field record: 4 padding bytes, token index, value rep.
pub const FIELD_RECORD_SIZE: usize = 16;
/// Legacy spec record: path index, field set index, spec type.
pub const SPEC_RECORD_SIZE: usize = 12;
/// Spec record in 0.0.1 files, with 4 leading padding bytes.
pub const SPEC_RECORD_SIZE_0_0_1: usize = 16;

/// List-op header bits.
pub const LIST_OP_IS_EXPLICIT: u8 = 1 << 0;
pub const LIST_OP_HAS_EXPLICIT: u8 = 1 << 1;
pub const LIST_OP_HAS_ADDED: u8 = 1 << 2;
pub const LIST_OP_HAS_DELETED: u8 = 1 << 3;
pub const LIST_OP_HAS_ORDERED: u8 = 1 << 4;
pub const LIST_OP_HAS_PREPENDED: u8 = 1 << 5;
pub const LIST_OP_HAS_APPENDED: u8 = 1 << 6;

/// Bootstrap block at file offset zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootStrap {
    pub version: Version,
    pub toc_offset: i64,
}

impl BootStrap {
    pub fn new(version: Version) -> Self {
        Self { version, toc_offset: 0 }
    }

    /// Encode to the fixed 88-byte layout.
    pub fn to_bytes(&self) -> [u8; BOOTSTRAP_SIZE] {
        let mut out = [0u8; BOOTSTRAP_SIZE];
        out[0..8].copy_from_slice(CRATE_MAGIC);
        out[8..16].copy_from_slice(&self.version.to_bytes());
        LittleEndian::write_i64(&mut out[16..24], self.toc_offset);
        out
    }

    /// Decode and validate against the reader's version and the file size.
    pub fn parse(data: &[u8], file_size: u64, software: Version) -> Result<Self> {
        if data.len() < BOOTSTRAP_SIZE || file_size < BOOTSTRAP_SIZE as u64 {
            return Err(Error::invalid("file too small to contain bootstrap structure"));
        }
        if &data[0..8] != CRATE_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let mut ver = [0u8; 8];
        ver.copy_from_slice(&data[8..16]);
        let version = Version::from_bytes(ver);
        if !software.can_read(version) {
            return Err(Error::UnsupportedVersion {
                file: version.to_string(),
                software: software.to_string(),
            });
        }
        let toc_offset = LittleEndian::read_i64(&data[16..24]);
        if toc_offset < BOOTSTRAP_SIZE as i64 || toc_offset as u64 >= file_size {
            return Err(Error::invalid(format!(
                "table of contents at offset {} but file size is {}, possibly truncated",
                toc_offset, file_size
            )));
        }
        Ok(Self { version, toc_offset })
    }
}

/// One named byte range of the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub start: i64,
    pub size: i64,
}

impl Section {
    pub fn new(name: &str, start: i64, size: i64) -> Result<Self> {
        if name.len() > SECTION_NAME_MAX_LEN || name.as_bytes().contains(&0) {
            return Err(Error::invalid(format!("bad section name '{}'", name)));
        }
        Ok(Self { name: name.to_string(), start, size })
    }

    #[inline]
    pub fn end(&self) -> i64 {
        self.start + self.size
    }

    /// Encode to a 32-byte record with a NUL-padded name.
    pub fn to_bytes(&self) -> [u8; SECTION_RECORD_SIZE] {
        let mut out = [0u8; SECTION_RECORD_SIZE];
        let name = self.name.as_bytes();
        let n = name.len().min(SECTION_NAME_MAX_LEN);
        out[..n].copy_from_slice(&name[..n]);
        LittleEndian::write_i64(&mut out[16..24], self.start);
        LittleEndian::write_i64(&mut out[24..32], self.size);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SECTION_RECORD_SIZE {
            return Err(Error::UnexpectedEof(data.len() as u64));
        }
        let raw = &data[..SECTION_NAME_MAX_LEN + 1];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(SECTION_NAME_MAX_LEN);
        let name = String::from_utf8(raw[..len].to_vec())?;
        let start = LittleEndian::read_i64(&data[16..24]);
        let size = LittleEndian::read_i64(&data[24..32]);
        if start < 0 || size < 0 {
            return Err(Error::invalid(format!("section '{}' has negative extent", name)));
        }
        Ok(Self { name, start, size })
    }
}

/// Ordered list of sections. Lookup is linear; there are only a handful.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableOfContents {
    pub sections: Vec<Section>,
}

impl TableOfContents {
    /// Find a section by name.
    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Where a rewrite of the structural area starts. Falls back to just
    /// past the bootstrap for an empty table.
    pub fn minimum_section_start(&self) -> u64 {
        self.sections
            .iter()
            .map(|s| s.start as u64)
            .min()
            .unwrap_or(BOOTSTRAP_SIZE as u64)
    }

    /// The smallest range covering every section, as (start, len).
    pub fn structural_range(&self) -> Option<(u64, u64)> {
        let start = self.sections.iter().map(|s| s.start).min()?;
        let end = self.sections.iter().map(|s| s.end()).max()?;
        Some((start as u64, (end - start) as u64))
    }

    /// Validate every section against the file size.
    pub fn validate(&self, file_size: u64) -> Result<()> {
        for s in &self.sections {
            if s.end() as u64 > file_size {
                return Err(Error::invalid(format!(
                    "section '{}' [{}, {}) extends past end of file ({})",
                    s.name,
                    s.start,
                    s.end(),
                    file_size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_layout() {
        let mut b = BootStrap::new(Version::new(0, 8, 0));
        b.toc_offset = 1234;
        let bytes = b.to_bytes();
        assert_eq!(bytes.len(), 88);
        assert_eq!(&bytes[0..8], b"PXR-USDC");
        assert_eq!(&bytes[8..11], &[0, 8, 0]);
        assert_eq!(LittleEndian::read_i64(&bytes[16..24]), 1234);
        assert!(bytes[24..].iter().all(|&x| x == 0));

        let parsed = BootStrap::parse(&bytes, 4096, Version::SOFTWARE).expect("parse");
        assert_eq!(parsed, b);
    }

    #[test]
    fn test_bootstrap_rejects() {
        let mut b = BootStrap::new(Version::new(0, 10, 0));
        b.toc_offset = 100;
        let bytes = b.to_bytes();
        assert!(matches!(
            BootStrap::parse(&bytes, 4096, Version::SOFTWARE),
            Err(Error::UnsupportedVersion { .. })
        ));

        let mut bad = BootStrap::new(Version::SOFTWARE).to_bytes();
        bad[0] = b'X';
        assert!(matches!(
            BootStrap::parse(&bad, 4096, Version::SOFTWARE),
            Err(Error::InvalidMagic)
        ));

        let mut truncated = BootStrap::new(Version::SOFTWARE);
        truncated.toc_offset = 5000;
        assert!(BootStrap::parse(&truncated.to_bytes(), 4096, Version::SOFTWARE).is_err());
    }

    #[test]
    fn test_section_record() {
        let s = Section::new("FIELDSETS", 88, 40).expect("section");
        let bytes = s.to_bytes();
        assert_eq!(&bytes[0..9], b"FIELDSETS");
        assert!(bytes[9..16].iter().all(|&x| x == 0));
        assert_eq!(Section::from_bytes(&bytes).expect("decode"), s);

        assert!(Section::new("A_VERY_LONG_SECTION_NAME", 0, 0).is_err());
        let max = Section::new("FIFTEEN_CHARS__", 1, 2).expect("15 chars");
        assert_eq!(Section::from_bytes(&max.to_bytes()).expect("decode").name, "FIFTEEN_CHARS__");
    }

    #[test]
    fn test_minimum_section_start() {
        let mut toc = TableOfContents::default();
        assert_eq!(toc.minimum_section_start(), BOOTSTRAP_SIZE as u64);
        assert!(toc.structural_range().is_none());

        toc.sections.push(Section::new(TOKENS_SECTION, 500, 10).expect("s"));
        toc.sections.push(Section::new(STRINGS_SECTION, 300, 20).expect("s"));
        assert_eq!(toc.minimum_section_start(), 300);
        assert_eq!(toc.structural_range(), Some((300, 210)));
        assert!(toc.get(STRINGS_SECTION).is_some());
        assert!(toc.get(PATHS_SECTION).is_none());
        assert!(toc.validate(510).is_ok());
        assert!(toc.validate(509).is_err());
    }

    #[test]
    fn test_known_sections() {
        assert!(is_known_section("SPECS"));
        assert!(!is_known_section("CUSTOM"));
    }
}
