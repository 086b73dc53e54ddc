//! Write sessions.
//!
//! A [`Packer`] is obtained from [`CrateFile::start_packing`]. Specs are
//! added with [`Packer::pack_spec`]; [`Packer::close`] writes every section,
//! the table of contents and the bootstrap, then reopens the written file
//! so the store can be read again. Dropping a packer without closing it
//! restores the tables to their state before the session.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path as FsPath, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use super::tables::{PackingContext, Tables};
use super::writer::ValueWriter;
use super::CrateFile;
use crate::format::{
    BootStrap, FieldIndex, Spec, SpecType, TableOfContents, TypeEnum, Version, SECTION_RECORD_SIZE,
};
use crate::stream::BufferedOutput;
use crate::util::{Error, Result};
use crate::value::{Path, TimeSamples, Token, Value};

/// Where the session's bytes go.
enum OutputTarget {
    /// A temporary sibling renamed over `dest` on success.
    Replace { temp: TempPath, dest: PathBuf },
    /// The file the store was read from, rewritten in place.
    Update { dest: PathBuf },
}

impl OutputTarget {
    fn dest(&self) -> &FsPath {
        match self {
            OutputTarget::Replace { dest, .. } | OutputTarget::Update { dest } => dest,
        }
    }
}

/// A spec whose fields cannot all be packed until the session closes.
struct DeferredSpec {
    path: Path,
    spec_type: SpecType,
    fields: Vec<FieldIndex>,
    ordinary: Vec<(Token, Value)>,
    time_samples: Vec<(Token, TimeSamples)>,
}

/// Sample time ordered by `total_cmp`.
#[derive(Clone, Copy, Debug)]
struct TimeKey(f64);

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// An open write session on a [`CrateFile`].
pub struct Packer<'a> {
    file: &'a mut CrateFile,
    ctx: Option<PackingContext>,
    target: Option<OutputTarget>,
    snapshot: Option<Tables>,
    deferred: Vec<DeferredSpec>,
}

/// Create the output of a replace session next to `dest`, carrying over
/// the permissions of any file it will replace.
fn create_replacement(dest: &FsPath) -> Result<(File, TempPath)> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let (file, temp) = tempfile::Builder::new()
        .prefix(".usdc-")
        .suffix(".tmp")
        .tempfile_in(&parent)?
        .into_parts();
    match std::fs::metadata(dest) {
        Ok(meta) => file.set_permissions(meta.permissions())?,
        #[cfg(unix)]
        Err(_) => {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        #[cfg(not(unix))]
        Err(_) => {}
    }
    Ok((file, temp))
}

impl<'a> Packer<'a> {
    pub(super) fn start(file: &'a mut CrateFile, dest: &FsPath) -> Result<Self> {
        let update = !file.asset_path.is_empty();
        if update && !file.can_pack_to(dest) {
            return Err(Error::PackingTarget(dest.display().to_string()));
        }

        let (out_file, target) = if update {
            let f = OpenOptions::new().read(true).write(true).open(dest)?;
            (f, OutputTarget::Update { dest: dest.to_path_buf() })
        } else {
            let (f, temp) = create_replacement(dest)?;
            (f, OutputTarget::Replace { temp, dest: dest.to_path_buf() })
        };

        let snapshot = file.tables.clone();
        file.tables.specs.clear();
        if file.tables.tokens.is_empty() {
            file.tables.tokens.push(Token::new(";-)"));
        }
        let write_version = if update {
            file.file_version()
        } else {
            file.config.default_write_version
        };

        let mut out = BufferedOutput::new(out_file)?;
        out.seek(file.toc.minimum_section_start())?;
        let ctx = PackingContext::new(
            &file.tables,
            file.unknown_sections.clone(),
            dest.to_path_buf(),
            write_version,
            out,
        );
        debug!(
            "packing <{}> at version {} ({})",
            dest.display(),
            write_version,
            if update { "update" } else { "replace" }
        );
        Ok(Self {
            file,
            ctx: Some(ctx),
            target: Some(target),
            snapshot: Some(snapshot),
            deferred: Vec::new(),
        })
    }

    fn ctx(&mut self) -> Result<&mut PackingContext> {
        self.ctx.as_mut().ok_or_else(|| Error::other("packing session already closed"))
    }

    fn writer(&mut self) -> Result<ValueWriter<'_>> {
        let ctx = self.ctx.as_mut().ok_or_else(|| Error::other("packing session already closed"))?;
        Ok(ValueWriter::new(&mut self.file.tables, ctx))
    }

    /// Version the session will write, including any upgrades so far.
    pub fn write_version(&self) -> Option<Version> {
        self.ctx.as_ref().map(|c| c.write_version)
    }

    /// Payload fields wait for close while the session writes the
    /// offset-less payload encoding, so one file never mixes encodings.
    fn defer_payload(&self, value: &Value) -> bool {
        let Some(ctx) = &self.ctx else { return false };
        if ctx.write_version >= Version::PAYLOAD_LAYER_OFFSETS {
            return false;
        }
        match value {
            Value::Payload(p) => p.layer_offset.is_identity(),
            Value::Rep(rep) => {
                rep.type_enum() == Some(TypeEnum::Payload)
                    && self.file.file_version() < Version::PAYLOAD_LAYER_OFFSETS
            }
            _ => false,
        }
    }

    /// Add one spec with its fields.
    pub fn pack_spec(&mut self, path: &Path, spec_type: SpecType, fields: &[(Token, Value)]) -> Result<()> {
        let mut indices = Vec::with_capacity(fields.len());
        let mut ordinary = Vec::new();
        let mut time_samples = Vec::new();

        let mut w = self.writer()?;
        let path_index = w.add_path(path);
        drop(w);

        for (name, value) in fields {
            match value {
                Value::TimeSamples(ts) if ts.is_in_memory() => {
                    time_samples.push((name.clone(), ts.clone()));
                }
                v if self.defer_payload(v) => ordinary.push((name.clone(), v.clone())),
                v => indices.push(self.writer()?.add_field(name, v)?),
            }
        }

        if ordinary.is_empty() && time_samples.is_empty() {
            let mut w = self.writer()?;
            let field_set = w.add_field_set(&indices);
            w.tables.specs.push(Spec::new(path_index, spec_type, field_set));
        } else {
            self.deferred.push(DeferredSpec {
                path: path.clone(),
                spec_type,
                fields: indices,
                ordinary,
                time_samples,
            });
        }
        Ok(())
    }

    /// Pack every deferred time sample value, grouped by time so that
    /// values for the same time sit together in the file.
    fn pack_deferred_time_samples(&mut self) -> Result<()> {
        let mut by_time: BTreeMap<TimeKey, Vec<(usize, usize, usize)>> = BTreeMap::new();
        for (s, spec) in self.deferred.iter().enumerate() {
            for (f, (_, ts)) in spec.time_samples.iter().enumerate() {
                for (i, &t) in ts.times().iter().enumerate() {
                    by_time.entry(TimeKey(t)).or_default().push((s, f, i));
                }
            }
        }
        let mut deferred = std::mem::take(&mut self.deferred);
        let result = (|| {
            let mut w = self.writer()?;
            for slots in by_time.values() {
                for &(s, f, i) in slots {
                    let value = &mut deferred[s].time_samples[f].1.values[i];
                    if !matches!(value, Value::Rep(_)) {
                        *value = Value::Rep(w.pack(value)?);
                    }
                }
            }
            Ok(())
        })();
        self.deferred = deferred;
        result
    }

    fn pack_deferred_specs(&mut self) -> Result<()> {
        let file_version = self.file.file_version();
        for spec in std::mem::take(&mut self.deferred) {
            let mut fields = spec.fields;
            for (name, value) in &spec.ordinary {
                let upgrade_rep = match value {
                    Value::Rep(rep) => {
                        rep.type_enum() == Some(TypeEnum::Payload)
                            && file_version < Version::PAYLOAD_LAYER_OFFSETS
                            && self.write_version().is_some_and(|v| v >= Version::PAYLOAD_LAYER_OFFSETS)
                    }
                    _ => false,
                };
                let value = match value {
                    Value::Rep(rep) if upgrade_rep => self.file.unpack_value(*rep)?,
                    v => v.clone(),
                };
                fields.push(self.writer()?.add_field(name, &value)?);
            }
            for (name, ts) in spec.time_samples {
                fields.push(self.writer()?.add_field(&name, &Value::TimeSamples(ts))?);
            }
            let mut w = self.writer()?;
            let path_index = w.add_path(&spec.path);
            let field_set = w.add_field_set(&fields);
            w.tables.specs.push(Spec::new(path_index, spec.spec_type, field_set));
        }
        Ok(())
    }

    /// Finish the session: write the structure, bootstrap and table of
    /// contents, then reopen the written file for reading.
    pub fn close(mut self) -> Result<()> {
        self.pack_deferred_time_samples()?;
        self.pack_deferred_specs()?;

        let sections = self.writer()?.write_structure()?;
        let ctx = self.ctx()?;
        let toc_offset = ctx.out.tell();
        let mut toc_bytes = Vec::with_capacity(8 + sections.len() * SECTION_RECORD_SIZE);
        toc_bytes.extend_from_slice(&(sections.len() as u64).to_le_bytes());
        for section in &sections {
            toc_bytes.extend_from_slice(&section.to_bytes());
        }
        ctx.out.put(&toc_bytes)?;
        let end = ctx.out.tell();

        let mut boot = BootStrap::new(ctx.write_version);
        boot.toc_offset = toc_offset as i64;
        ctx.out.seek(0)?;
        ctx.out.put(&boot.to_bytes())?;

        let ctx = self.ctx.take().ok_or_else(|| Error::other("packing session already closed"))?;
        let file = ctx.out.finish()?;
        let target = self.target.take().ok_or_else(|| Error::other("packing session already closed"))?;
        let dest = target.dest().to_path_buf();
        match target {
            OutputTarget::Update { .. } => {
                file.set_len(end)?;
                file.sync_all()?;
                drop(file);
            }
            OutputTarget::Replace { temp, dest } => {
                file.sync_all()?;
                drop(file);
                temp.persist(&dest).map_err(|e| Error::Io(e.error))?;
            }
        }

        self.snapshot = None;
        self.file.finish_packing(&dest, boot, TableOfContents { sections })?;
        debug!("wrote <{}>: {} bytes, version {}", dest.display(), end, boot.version);
        Ok(())
    }
}

impl Drop for Packer<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            warn!("packing session abandoned; restoring tables");
            self.file.tables = snapshot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_key_order() {
        let mut keys = vec![TimeKey(1.0), TimeKey(-0.5), TimeKey(0.0), TimeKey(-0.0)];
        keys.sort();
        assert_eq!(keys.iter().map(|k| k.0).collect::<Vec<_>>(), vec![-0.5, -0.0, 0.0, 1.0]);
        assert_eq!(TimeKey(2.0), TimeKey(2.0));
        assert_ne!(TimeKey(0.0), TimeKey(-0.0));
    }
}
