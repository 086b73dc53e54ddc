//! Spec-level access to a crate file.
//!
//! [`CrateData`] keeps every spec of a store in memory as a list of
//! (field name, value) pairs. Values read from the file stay as
//! [`Value::Rep`] until a caller asks for them, so saving back to the same
//! file rewrites only the structural sections.
//!
//! Relationship target and attribute connection specs are never stored;
//! their presence follows from the owning property's `targetPaths` or
//! `connectionPaths` list op.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path as FsPath;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::crate_file::CrateFile;
use crate::format::{Field, FieldIndex, FieldSetIndex, SpecType, TypeEnum, ValueRep, Version};
use crate::stream::Asset;
use crate::util::{CrateConfig, Error, Result};
use crate::value::{bracketing_times, ListOp, Path, Payload, TimeSamples, Token, Value};

/// Field names with special handling.
pub mod field_names {
    pub const TIME_SAMPLES: &str = "timeSamples";
    pub const PAYLOAD: &str = "payload";
    pub const TARGET_PATHS: &str = "targetPaths";
    pub const CONNECTION_PATHS: &str = "connectionPaths";
    pub const TARGET_CHILDREN: &str = "targetChildren";
    pub const CONNECTION_CHILDREN: &str = "connectionChildren";
}

use field_names::*;

#[derive(Clone, Debug)]
struct SpecData {
    spec_type: SpecType,
    fields: Vec<(Token, Value)>,
}

impl SpecData {
    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n.as_str() == name).map(|(_, v)| v)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.iter_mut().find(|(n, _)| n.as_str() == name).map(|(_, v)| v)
    }
}

/// Order specs are written in: prims before properties, properties
/// grouped by name.
fn save_order(a: &Path, b: &Path) -> Ordering {
    match (a.is_property_path(), b.is_property_path()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => a.name().cmp(b.name()).then_with(|| a.cmp(b)),
        (false, false) => a.cmp(b),
    }
}

/// A single payload as the list op it stands for. An empty asset path
/// means "no payload".
fn to_payload_list_op(value: Value) -> Value {
    match value {
        Value::Payload(p) if p.asset_path.is_empty() => Value::PayloadListOp(ListOp::explicit(Vec::new())),
        Value::Payload(p) => Value::PayloadListOp(ListOp::explicit(vec![p])),
        v => v,
    }
}

/// A payload list op as a single payload, when one can express it.
fn from_payload_list_op(value: &Value) -> Value {
    if let Value::PayloadListOp(op) = value {
        if op.is_explicit {
            match op.explicit_items.as_slice() {
                [] => return Value::Payload(Payload::default()),
                [p] if !p.asset_path.is_empty() => return Value::Payload(p.clone()),
                _ => {}
            }
        }
    }
    value.clone()
}

/// In-memory specs over a crate file.
pub struct CrateData {
    file: CrateFile,
    specs: HashMap<Path, SpecData>,
}

impl Default for CrateData {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CrateData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrateData").field("file", &self.file).field("specs", &self.specs.len()).finish()
    }
}

impl CrateData {
    /// An empty store.
    pub fn new() -> Self {
        Self::with_config(*CrateConfig::global())
    }

    pub fn with_config(config: CrateConfig) -> Self {
        Self { file: CrateFile::with_config(config), specs: HashMap::new() }
    }

    /// Open a crate file and load its specs.
    pub fn open(path: impl AsRef<FsPath>) -> Result<Self> {
        Self::from_file(CrateFile::open(path)?)
    }

    pub fn open_with(path: impl AsRef<FsPath>, config: CrateConfig) -> Result<Self> {
        Self::from_file(CrateFile::open_with(path, config)?)
    }

    pub fn open_asset(name: &str, asset: Arc<dyn Asset>, config: CrateConfig) -> Result<Self> {
        Self::from_file(CrateFile::open_asset(name, asset, config)?)
    }

    fn from_file(file: CrateFile) -> Result<Self> {
        let mut data = Self { file, specs: HashMap::new() };
        data.populate()?;
        Ok(data)
    }

    /// The underlying store.
    pub fn file(&self) -> &CrateFile {
        &self.file
    }

    pub fn asset_path(&self) -> &str {
        self.file.asset_path()
    }

    /// Number of stored specs.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Rebuild the specs from the file's structural tables.
    fn populate(&mut self) -> Result<()> {
        self.specs.clear();
        let (mut specs, fields, field_sets) = self.file.remove_structural_data();

        if self.file.file_version() < Version::PATH_HEADER_FIX {
            let tables = self.file.tables();
            specs.retain(|s| tables.path(s.path_index).map_or(true, |p| !p.is_target_path()));
        }

        let set_indices: HashSet<FieldSetIndex> = specs.iter().map(|s| s.field_set_index).collect();
        let file = &self.file;
        let live: HashMap<FieldSetIndex, Vec<(Token, Value)>> = set_indices
            .into_par_iter()
            .map(|index| {
                let run = field_run(&field_sets, index)?;
                let pairs = run
                    .iter()
                    .map(|f| {
                        let Field { token_index, value_rep } = *fields
                            .get(f.get())
                            .ok_or_else(|| Error::invalid(format!("field index {} out of range", f.0)))?;
                        Ok((file.tables().token(token_index)?.clone(), unpack_for_field(file, value_rep)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((index, pairs))
            })
            .collect::<Result<_>>()?;

        for spec in &specs {
            let path = self.file.tables().path(spec.path_index)?.clone();
            let fields = live.get(&spec.field_set_index).cloned().unwrap_or_default();
            self.specs.insert(path, SpecData { spec_type: spec.spec_type, fields });
        }
        debug!("loaded {} specs from <{}>", self.specs.len(), self.file.asset_path());
        Ok(())
    }

    /// True if `save(path)` rewrites the store's own file in place.
    pub fn can_incremental_save(&self, path: impl AsRef<FsPath>) -> bool {
        self.file.can_pack_to(path)
    }

    /// Save to `path`. Saving anywhere but the file the store was read
    /// from writes a full copy with every value resolved.
    pub fn save(&mut self, path: impl AsRef<FsPath>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::other("cannot save to an empty file name"));
        }
        if self.can_incremental_save(path) {
            return self.pack_into(path);
        }

        debug!("copying <{}> to <{}>", self.file.asset_path(), path.display());
        let mut copy = CrateData::with_config(*self.file.config());
        for (spec_path, spec) in &self.specs {
            let fields = spec
                .fields
                .iter()
                .map(|(name, value)| Ok((name.clone(), self.resolve(value)?)))
                .collect::<Result<Vec<_>>>()?;
            copy.specs.insert(spec_path.clone(), SpecData { spec_type: spec.spec_type, fields });
        }
        copy.pack_into(path)
    }

    fn pack_into(&mut self, path: &FsPath) -> Result<()> {
        let mut paths: Vec<Path> = self.specs.keys().cloned().collect();
        paths.par_sort_by(save_order);

        let mut packer = self.file.start_packing(path)?;
        for p in &paths {
            if let Some(spec) = self.specs.get(p) {
                packer.pack_spec(p, spec.spec_type, &spec.fields)?;
            }
        }
        packer.close()?;
        self.populate()
    }

    /// A value with nothing left in the file: reps unpacked, time samples
    /// loaded.
    fn resolve(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Rep(rep) => {
                let unpacked = self.file.unpack_value(*rep)?;
                match unpacked {
                    Value::Rep(_) => Err(Error::corrupt("value rep unpacked to another rep")),
                    v => self.resolve(&v),
                }
            }
            Value::TimeSamples(ts) => {
                let mut ts = ts.clone();
                self.file.make_time_sample_values_mutable(&mut ts)?;
                Ok(Value::TimeSamples(ts))
            }
            v => Ok(v.clone()),
        }
    }

    fn spec(&self, path: &Path) -> Option<&SpecData> {
        self.specs.get(path)
    }

    fn field_value(&self, path: &Path, field: &str) -> Option<&Value> {
        self.spec(path)?.field(field)
    }

    /// The `targetPaths` or `connectionPaths` list op of a property, with
    /// the spec type it implies.
    fn target_list_op(&self, path: &Path) -> Result<Option<(SpecType, ListOp<Path>)>> {
        if !path.is_prim_property_path() {
            return Ok(None);
        }
        for (field, spec_type) in [(TARGET_PATHS, SpecType::Relationship), (CONNECTION_PATHS, SpecType::Attribute)] {
            if let Some(value) = self.field_value(path, field) {
                return match self.resolve(value)? {
                    Value::PathListOp(op) => Ok(Some((spec_type, op))),
                    _ => Ok(None),
                };
            }
        }
        Ok(None)
    }

    fn target_list_op_or_warn(&self, path: &Path) -> Option<(SpecType, ListOp<Path>)> {
        self.target_list_op(path).unwrap_or_else(|e| {
            warn!("cannot read target list of <{}>: {}", path, e);
            None
        })
    }

    fn has_target_spec(&self, path: &Path) -> bool {
        let Some(target) = path.target_path() else { return false };
        match self.target_list_op_or_warn(&path.parent()) {
            Some((_, op)) => op.contains_added(target),
            None => false,
        }
    }

    pub fn has_spec(&self, path: &Path) -> bool {
        if path.is_target_path() {
            return self.has_target_spec(path);
        }
        self.specs.contains_key(path)
    }

    /// Add a spec, or change the type of an existing one.
    pub fn create_spec(&mut self, path: &Path, spec_type: SpecType) -> Result<()> {
        if spec_type == SpecType::Unknown {
            return Err(Error::other(format!("cannot create <{}> with unknown spec type", path)));
        }
        if path.is_target_path() {
            return Ok(());
        }
        self.specs
            .entry(path.clone())
            .or_insert_with(|| SpecData { spec_type, fields: Vec::new() })
            .spec_type = spec_type;
        Ok(())
    }

    pub fn erase_spec(&mut self, path: &Path) -> Result<()> {
        if path.is_target_path() {
            return Ok(());
        }
        self.specs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::SpecNotFound(path.to_string()))
    }

    /// Move one spec with its fields. Child specs are not moved.
    pub fn move_spec(&mut self, old_path: &Path, new_path: &Path) -> Result<()> {
        if old_path.is_target_path() {
            return Ok(());
        }
        if self.specs.contains_key(new_path) {
            return Err(Error::SpecExists(new_path.to_string()));
        }
        let spec = self
            .specs
            .remove(old_path)
            .ok_or_else(|| Error::SpecNotFound(old_path.to_string()))?;
        self.specs.insert(new_path.clone(), spec);
        Ok(())
    }

    pub fn spec_type(&self, path: &Path) -> SpecType {
        if path.is_root() {
            return SpecType::PseudoRoot;
        }
        if path.is_target_path() {
            if self.has_target_spec(path) {
                match self.spec_type(&path.parent()) {
                    SpecType::Relationship => return SpecType::RelationshipTarget,
                    SpecType::Attribute => return SpecType::Connection,
                    _ => {}
                }
            }
            return SpecType::Unknown;
        }
        self.spec(path).map_or(SpecType::Unknown, |s| s.spec_type)
    }

    pub fn has_field(&self, path: &Path, field: &str) -> bool {
        if self.field_value(path, field).is_some() {
            return true;
        }
        (field == TARGET_CHILDREN || field == CONNECTION_CHILDREN) && self.target_list_op_or_warn(path).is_some()
    }

    /// A field's value, fully read from the file. Payload fields are
    /// reported as payload list ops.
    pub fn get_field(&self, path: &Path, field: &str) -> Result<Option<Value>> {
        if let Some(value) = self.field_value(path, field) {
            let value = self.resolve(value)?;
            return Ok(Some(if field == PAYLOAD { to_payload_list_op(value) } else { value }));
        }
        if field == TARGET_CHILDREN || field == CONNECTION_CHILDREN {
            return Ok(self.target_list_op(path)?.map(|(_, op)| Value::PathVector(op.apply())));
        }
        Ok(None)
    }

    /// Set a field on an existing spec. Target and connection children
    /// are derived from list ops and setting them does nothing.
    pub fn set_field(&mut self, path: &Path, field: &str, value: Value) -> Result<()> {
        if path.is_target_path() {
            return Err(Error::InvalidPath(format!("cannot set '{}' on target spec <{}>", field, path)));
        }
        let spec = self.specs.get_mut(path).ok_or_else(|| Error::SpecNotFound(path.to_string()))?;
        if field == TARGET_CHILDREN || field == CONNECTION_CHILDREN {
            return Ok(());
        }
        let value = match field {
            TIME_SAMPLES if !matches!(value, Value::TimeSamples(_)) => {
                return Err(Error::mismatch("timeSamples", value.type_name()));
            }
            PAYLOAD => from_payload_list_op(&value),
            _ => value,
        };
        match spec.field_mut(field) {
            Some(slot) => *slot = value,
            None => spec.fields.push((Token::new(field), value)),
        }
        Ok(())
    }

    /// Remove a field. Returns whether it existed.
    pub fn erase_field(&mut self, path: &Path, field: &str) -> bool {
        let Some(spec) = self.specs.get_mut(path) else { return false };
        match spec.fields.iter().position(|(n, _)| n.as_str() == field) {
            Some(i) => {
                spec.fields.remove(i);
                true
            }
            None => false,
        }
    }

    /// Field names of a spec in stored order, plus derived children fields.
    pub fn list_fields(&self, path: &Path) -> Vec<Token> {
        let Some(spec) = self.spec(path) else { return Vec::new() };
        let mut names: Vec<Token> = spec.fields.iter().map(|(n, _)| n.clone()).collect();
        match self.target_list_op_or_warn(path) {
            Some((SpecType::Relationship, _)) => names.push(Token::new(TARGET_CHILDREN)),
            Some((SpecType::Attribute, _)) => names.push(Token::new(CONNECTION_CHILDREN)),
            _ => {}
        }
        names
    }

    /// Call `visitor` for every spec, including derived target and
    /// connection specs, until it returns false.
    pub fn visit_specs(&self, mut visitor: impl FnMut(&Path, SpecType) -> bool) {
        let mut paths: Vec<&Path> = self.specs.keys().collect();
        paths.par_sort_by(|a, b| save_order(a, b));
        for path in paths {
            let spec_type = self.specs[path].spec_type;
            if !visitor(path, spec_type) {
                return;
            }
            if spec_type != SpecType::Attribute && spec_type != SpecType::Relationship {
                continue;
            }
            let Some((_, op)) = self.target_list_op_or_warn(path) else { continue };
            let mut targets = if op.is_explicit {
                op.explicit_items
            } else {
                let mut all = op.added_items;
                all.extend(op.prepended_items);
                all.extend(op.appended_items);
                all.sort();
                all.dedup();
                all
            };
            let target_type = if spec_type == SpecType::Relationship {
                SpecType::RelationshipTarget
            } else {
                SpecType::Connection
            };
            for target in targets.drain(..) {
                match path.append_target(target) {
                    Ok(tp) => {
                        if !visitor(&tp, target_type) {
                            return;
                        }
                    }
                    Err(e) => warn!("skipping target of <{}>: {}", path, e),
                }
            }
        }
    }

    fn time_samples(&self, path: &Path) -> Option<&TimeSamples> {
        self.field_value(path, TIME_SAMPLES)?.as_time_samples()
    }

    /// Sample times of one spec.
    pub fn list_time_samples_for_path(&self, path: &Path) -> Vec<f64> {
        self.time_samples(path).map(|ts| ts.times().to_vec()).unwrap_or_default()
    }

    /// Union of every spec's sample times, sorted.
    pub fn list_all_time_samples(&self) -> Vec<f64> {
        let mut all: Vec<f64> = self
            .specs
            .values()
            .filter_map(|s| s.field(TIME_SAMPLES)?.as_time_samples())
            .flat_map(|ts| ts.times().iter().copied())
            .collect();
        all.sort_by(f64::total_cmp);
        all.dedup();
        all
    }

    pub fn num_time_samples_for_path(&self, path: &Path) -> usize {
        self.time_samples(path).map_or(0, TimeSamples::len)
    }

    /// Samples around `time` across all specs.
    pub fn bracketing_time_samples(&self, time: f64) -> Option<(f64, f64)> {
        bracketing_times(&self.list_all_time_samples(), time)
    }

    pub fn bracketing_time_samples_for_path(&self, path: &Path, time: f64) -> Option<(f64, f64)> {
        bracketing_times(self.time_samples(path)?.times(), time)
    }

    /// Value of the sample at exactly `time`.
    pub fn query_time_sample(&self, path: &Path, time: f64) -> Result<Option<Value>> {
        let Some(ts) = self.time_samples(path) else { return Ok(None) };
        match ts.index_of(time) {
            Some(i) => Ok(Some(self.file.time_sample_value(ts, i)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace one sample, creating the field if needed.
    pub fn set_time_sample(&mut self, path: &Path, time: f64, value: Value) -> Result<()> {
        let file = &self.file;
        let spec = self.specs.get_mut(path).ok_or_else(|| Error::SpecNotFound(path.to_string()))?;
        match spec.field_mut(TIME_SAMPLES) {
            Some(Value::TimeSamples(ts)) => {
                file.make_time_sample_values_mutable(ts)?;
                ts.insert(time, value);
            }
            Some(slot) => *slot = Value::TimeSamples(TimeSamples::new([(time, value)])),
            None => spec
                .fields
                .push((Token::new(TIME_SAMPLES), Value::TimeSamples(TimeSamples::new([(time, value)])))),
        }
        Ok(())
    }

    /// Remove one sample. Removing the last sample removes the field.
    pub fn erase_time_sample(&mut self, path: &Path, time: f64) -> Result<()> {
        let file = &self.file;
        let Some(spec) = self.specs.get_mut(path) else { return Ok(()) };
        let Some(Value::TimeSamples(ts)) = spec.field_mut(TIME_SAMPLES) else { return Ok(()) };
        if ts.index_of(time).is_none() {
            return Ok(());
        }
        if ts.len() == 1 {
            spec.fields.retain(|(n, _)| n.as_str() != TIME_SAMPLES);
            return Ok(());
        }
        file.make_time_sample_values_mutable(ts)?;
        ts.remove(time);
        Ok(())
    }
}

/// The field handles of the set starting at `index`.
fn field_run(field_sets: &[FieldIndex], index: FieldSetIndex) -> Result<&[FieldIndex]> {
    let run = field_sets
        .get(index.get()..)
        .ok_or_else(|| Error::invalid(format!("field set index {} out of range", index.0)))?;
    let end = run.iter().position(|f| !f.is_valid()).unwrap_or(run.len());
    Ok(&run[..end])
}

/// Field value as held in memory: inlined values and time samples are
/// decoded now, everything else stays in the file.
fn unpack_for_field(file: &CrateFile, rep: ValueRep) -> Result<Value> {
    if rep.is_inlined() || rep.type_enum() == Some(TypeEnum::TimeSamples) {
        file.unpack_value(rep)
    } else {
        Ok(Value::Rep(rep))
    }
}
