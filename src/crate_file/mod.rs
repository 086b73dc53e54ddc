//! The crate file store.
//!
//! [`CrateFile`] holds the structural tables of one crate file and the
//! backend its values are read from. Values stay in the file as
//! [`ValueRep`]s until unpacked; writing goes through a [`Packer`] session.
//!
//! ```no_run
//! use usdc::crate_file::CrateFile;
//!
//! let file = CrateFile::open("scene.usdc")?;
//! println!("version {}", file.file_version());
//! for section in file.sections() {
//!     println!("{:<10} {:>8} {:>8}", section.name, section.start, section.size);
//! }
//! # Ok::<(), usdc::Error>(())
//! ```

mod arrays;
mod packer;
mod paths;
mod reader;
mod sections;
mod tables;
mod writer;

pub use packer::Packer;
pub use tables::Tables;

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, trace};

pub(crate) use reader::ValueReader;

use crate::format::{
    is_known_section, BootStrap, Field, FieldIndex, Section, Spec, TableOfContents, ValueRep, Version,
    BOOTSTRAP_SIZE, SECTION_RECORD_SIZE,
};
use crate::stream::{Asset, Backend};
use crate::util::{CrateConfig, Error, Result};
use crate::value::{Path, TimeSamples, Token, Value};

/// One crate file: structural tables plus the bytes values live in.
pub struct CrateFile {
    /// Name the store was opened or last saved as; empty for a new store.
    asset_path: String,
    /// Canonical filesystem path, when the store is backed by a file.
    file_read_from: Option<PathBuf>,
    pub(crate) config: CrateConfig,
    backend: Option<Backend>,
    boot: BootStrap,
    toc: TableOfContents,
    pub(crate) tables: Tables,
    unknown_sections: Vec<(String, Vec<u8>)>,
    /// Times arrays shared between time-sample fields, keyed by their rep.
    shared_times: RwLock<HashMap<ValueRep, Arc<Vec<f64>>>>,
}

impl Default for CrateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CrateFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrateFile")
            .field("asset_path", &self.asset_path)
            .field("version", &self.boot.version)
            .field("backend", &self.backend)
            .field("specs", &self.tables.specs.len())
            .finish()
    }
}

impl CrateFile {
    /// An empty store with the process-wide config.
    pub fn new() -> Self {
        Self::with_config(*CrateConfig::global())
    }

    /// An empty store with an explicit config.
    pub fn with_config(config: CrateConfig) -> Self {
        Self {
            asset_path: String::new(),
            file_read_from: None,
            boot: BootStrap::new(config.default_write_version),
            config,
            backend: None,
            toc: TableOfContents::default(),
            tables: Tables::default(),
            unknown_sections: Vec::new(),
            shared_times: RwLock::new(HashMap::new()),
        }
    }

    /// Open a crate file from disk.
    pub fn open(path: impl AsRef<FsPath>) -> Result<Self> {
        Self::open_with(path, *CrateConfig::global())
    }

    /// Open a crate file from disk with an explicit config.
    pub fn open_with(path: impl AsRef<FsPath>, config: CrateConfig) -> Result<Self> {
        let path = path.as_ref();
        let backend = Backend::open_file(path, &config)?;
        let mut file = Self::with_config(config);
        file.load(backend)?;
        file.asset_path = path.display().to_string();
        file.file_read_from = path.canonicalize().ok();
        Ok(file)
    }

    /// Open a crate file held by an [`Asset`]. The store cannot be saved
    /// back to the asset; save it to a file instead.
    pub fn open_asset(name: &str, asset: Arc<dyn Asset>, config: CrateConfig) -> Result<Self> {
        let mut file = Self::with_config(config);
        file.load(Backend::Asset(asset))?;
        file.asset_path = name.to_string();
        Ok(file)
    }

    /// Read bootstrap, table of contents and structural sections.
    fn load(&mut self, backend: Backend) -> Result<()> {
        let size = backend.size();
        let head_len = BOOTSTRAP_SIZE.min(size as usize);
        let head = backend.read_bytes(0, head_len, &self.config)?;
        let boot = BootStrap::parse(&head, size, Version::SOFTWARE)?;

        let toc = read_toc(&backend, boot.toc_offset as u64, size, &self.config)?;
        toc.validate(size)?;

        let tables = match toc.structural_range() {
            Some((start, len)) => {
                let stream = backend.stream(&self.config);
                stream.prefetch(start, len);
                let data = structural_bytes(&backend, start, len, &self.config)?;
                sections::read_tables(&data, start, &toc, boot.version)?
            }
            None => Tables::default(),
        };

        let mut unknown_sections = Vec::new();
        for section in toc.sections.iter().filter(|s| !is_known_section(&s.name)) {
            let bytes = backend.read_bytes(section.start as u64, section.size as usize, &self.config)?;
            debug!("keeping unknown section '{}' ({} bytes)", section.name, bytes.len());
            unknown_sections.push((section.name.clone(), bytes));
        }

        debug!(
            "opened crate file: version {}, {} sections, {} specs via {}",
            boot.version,
            toc.sections.len(),
            tables.specs.len(),
            backend.kind()
        );
        self.backend = Some(backend);
        self.boot = boot;
        self.toc = toc;
        self.tables = tables;
        self.unknown_sections = unknown_sections;
        self.shared_times.write().clear();
        Ok(())
    }

    /// Version of the opened file, or the version a new store will be
    /// written as.
    #[inline]
    pub fn file_version(&self) -> Version {
        self.boot.version
    }

    /// Newest version this library reads and writes.
    #[inline]
    pub fn software_version(&self) -> Version {
        Version::SOFTWARE
    }

    pub fn asset_path(&self) -> &str {
        &self.asset_path
    }

    pub fn config(&self) -> &CrateConfig {
        &self.config
    }

    /// Backend name, `None` for a store not yet written.
    pub fn backend_kind(&self) -> Option<&'static str> {
        self.backend.as_ref().map(Backend::kind)
    }

    /// Sections in table-of-contents order.
    pub fn sections(&self) -> &[Section] {
        &self.toc.sections
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tables.tokens
    }

    pub fn paths(&self) -> &[Path] {
        &self.tables.paths
    }

    pub fn specs(&self) -> &[Spec] {
        &self.tables.specs
    }

    pub fn spec_path(&self, spec: &Spec) -> Result<&Path> {
        self.tables.path(spec.path_index)
    }

    /// Field names and value reps of a spec, in stored order.
    pub fn spec_fields(&self, spec: &Spec) -> Result<Vec<(Token, ValueRep)>> {
        self.tables
            .field_set(spec.field_set_index)?
            .iter()
            .map(|&index| {
                let Field { token_index, value_rep } = *self.tables.field(index)?;
                Ok((self.tables.token(token_index)?.clone(), value_rep))
            })
            .collect()
    }

    /// Hand the spec, field and field set tables to the caller. The next
    /// write session rebuilds them from the specs it is given.
    pub fn remove_structural_data(&mut self) -> (Vec<Spec>, Vec<Field>, Vec<FieldIndex>) {
        (
            std::mem::take(&mut self.tables.specs),
            std::mem::take(&mut self.tables.fields),
            std::mem::take(&mut self.tables.field_sets),
        )
    }

    /// A value reader positioned at the start of the file.
    pub(crate) fn reader(&self) -> Result<ValueReader<'_>> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| Error::other("store has no backing file"))?;
        Ok(ValueReader::new(self, backend.stream(&self.config)))
    }

    /// Decode a value rep.
    pub fn unpack_value(&self, rep: ValueRep) -> Result<Value> {
        trace!("unpacking {:?}", rep);
        self.reader()?.unpack(rep)
    }

    /// Value of one sample, reading it from the file if still lazy.
    pub fn time_sample_value(&self, samples: &TimeSamples, index: usize) -> Result<Value> {
        if index >= samples.len() {
            return Err(Error::other(format!(
                "sample {} out of range for {} samples",
                index,
                samples.len()
            )));
        }
        if samples.is_in_memory() {
            return match &samples.values[index] {
                Value::Rep(rep) => self.unpack_value(*rep),
                v => Ok(v.clone()),
            };
        }
        let mut reader = self.reader()?;
        reader.seek(samples.values_file_offset + 8 * index as u64)?;
        let rep = ValueRep(reader.read_u64()?);
        reader.unpack(rep)
    }

    /// Load every sample value into memory and drop the file linkage.
    pub fn make_time_sample_values_mutable(&self, samples: &mut TimeSamples) -> Result<()> {
        if samples.is_in_memory() {
            for value in &mut samples.values {
                if let Value::Rep(rep) = value {
                    *value = self.unpack_value(*rep)?;
                }
            }
            return Ok(());
        }
        let mut reader = self.reader()?;
        let reps = reader.time_sample_reps(samples)?;
        let values = reps.into_iter().map(|rep| reader.unpack(rep)).collect::<Result<Vec<_>>>()?;
        samples.values = values;
        samples.value_rep = ValueRep::default();
        samples.values_file_offset = 0;
        Ok(())
    }

    /// Times array for `times_rep`, decoded once and shared.
    pub(crate) fn shared_times(
        &self,
        times_rep: ValueRep,
        load: impl FnOnce() -> Result<Vec<f64>>,
    ) -> Result<Arc<Vec<f64>>> {
        if let Some(times) = self.shared_times.read().get(&times_rep) {
            return Ok(times.clone());
        }
        // No guard is held while loading: `load` may read other values.
        let times = Arc::new(load()?);
        let guard = self.shared_times.upgradable_read();
        if let Some(existing) = guard.get(&times_rep) {
            return Ok(existing.clone());
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        Ok(guard.entry(times_rep).or_insert(times).clone())
    }

    /// True if a session may write `path`: any path for a new store,
    /// otherwise only the file the store was read from.
    pub fn can_pack_to(&self, path: impl AsRef<FsPath>) -> bool {
        if self.asset_path.is_empty() {
            return true;
        }
        match (&self.file_read_from, path.as_ref().canonicalize()) {
            (Some(from), Ok(to)) => *from == to,
            _ => false,
        }
    }

    /// Begin a write session targeting `path`.
    pub fn start_packing(&mut self, path: impl AsRef<FsPath>) -> Result<Packer<'_>> {
        Packer::start(self, path.as_ref())
    }

    /// Adopt the file a session just wrote.
    fn finish_packing(&mut self, dest: &FsPath, boot: BootStrap, toc: TableOfContents) -> Result<()> {
        let same_file = self.file_read_from.is_some() && self.can_pack_to(dest);
        let backend = Backend::open_file(dest, &self.config)?;
        self.backend = Some(backend);
        self.boot = boot;
        self.toc = toc;
        self.asset_path = dest.display().to_string();
        self.file_read_from = dest.canonicalize().ok();
        if !same_file {
            self.shared_times.write().clear();
        }
        Ok(())
    }
}

/// Read the table of contents at `offset`.
fn read_toc(backend: &Backend, offset: u64, size: u64, config: &CrateConfig) -> Result<TableOfContents> {
    let count_bytes = backend.read_bytes(offset, 8, config)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&count_bytes);
    let count = u64::from_le_bytes(raw);
    let available = size.saturating_sub(offset + 8) / SECTION_RECORD_SIZE as u64;
    if count > available {
        return Err(Error::invalid(format!(
            "table of contents claims {} sections but only {} fit",
            count, available
        )));
    }
    let records = backend.read_bytes(offset + 8, count as usize * SECTION_RECORD_SIZE, config)?;
    let sections = records
        .chunks_exact(SECTION_RECORD_SIZE)
        .map(Section::from_bytes)
        .collect::<Result<Vec<_>>>()?;
    Ok(TableOfContents { sections })
}

/// Bytes of the structural range, borrowed from the mapping when there is one.
fn structural_bytes<'a>(backend: &'a Backend, start: u64, len: u64, config: &CrateConfig) -> Result<Cow<'a, [u8]>> {
    crate::stream::check_range(start, len as usize, backend.size())?;
    match backend {
        #[cfg(feature = "mmap")]
        Backend::Mmap(map) => Ok(Cow::Borrowed(&map[start as usize..(start + len) as usize])),
        _ => Ok(Cow::Owned(backend.read_bytes(start, len as usize, config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SpecType;
    use crate::stream::MemoryAsset;

    fn config() -> CrateConfig {
        CrateConfig::default()
    }

    #[test]
    fn test_new_store_is_empty() {
        let file = CrateFile::with_config(config());
        assert_eq!(file.file_version(), Version::DEFAULT_NEW_FILE);
        assert!(file.sections().is_empty());
        assert!(file.backend_kind().is_none());
        assert!(file.can_pack_to("anywhere.usdc"));
        assert!(file.unpack_value(ValueRep::default()).is_err());
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let mut bytes = vec![0u8; 128];
        bytes[..8].copy_from_slice(b"NOTCRATE");
        let asset = Arc::new(MemoryAsset::new(bytes));
        assert!(matches!(CrateFile::open_asset("bad", asset, config()), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_open_rejects_short_file() {
        let asset = Arc::new(MemoryAsset::new(vec![0u8; 10]));
        assert!(CrateFile::open_asset("short", asset, config()).is_err());
    }

    #[test]
    fn test_write_then_open_asset() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("a.usdc");
        let mut file = CrateFile::with_config(config());
        {
            let mut packer = file.start_packing(&out)?;
            packer.pack_spec(
                &Path::parse("/A")?,
                SpecType::Prim,
                &[(Token::new("kind"), Value::Token(Token::new("model")))],
            )?;
            packer.close()?;
        }
        assert!(file.can_pack_to(&out));
        assert!(!file.can_pack_to(dir.path().join("b.usdc")));

        let bytes = std::fs::read(&out)?;
        let reopened = CrateFile::open_asset("mem", Arc::new(MemoryAsset::new(bytes)), config())?;
        assert_eq!(reopened.specs().len(), 1);
        let spec = reopened.specs()[0];
        assert_eq!(reopened.spec_path(&spec)?.to_string(), "/A");
        let fields = reopened.spec_fields(&spec)?;
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0.as_str(), "kind");
        assert_eq!(reopened.unpack_value(fields[0].1)?, Value::Token(Token::new("model")));
        Ok(())
    }

    #[test]
    fn test_shared_times_loads_once() -> Result<()> {
        let file = CrateFile::with_config(config());
        let rep = ValueRep(42);
        let a = file.shared_times(rep, || Ok(vec![1.0, 2.0]))?;
        let b = file.shared_times(rep, || Err(Error::other("loaded twice")))?;
        assert!(Arc::ptr_eq(&a, &b));
        Ok(())
    }

    #[test]
    fn test_abandoned_session_restores_tables() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("a.usdc");
        let mut file = CrateFile::with_config(config());
        {
            let mut packer = file.start_packing(&out)?;
            packer.pack_spec(&Path::parse("/A")?, SpecType::Prim, &[])?;
        }
        assert!(file.tables().tokens.is_empty());
        assert!(file.tables().specs.is_empty());
        assert!(!out.exists());
        Ok(())
    }
}
