//! Time-varying field values.

use std::sync::Arc;

use super::Value;
use crate::format::ValueRep;

/// Sorted sample times with one value per time.
///
/// Samples read from a file start out lazy: `times` is loaded (and shared
/// between every field with the same times array) but the values are left
/// in the file as a run of value reps at `values_file_offset`. Mutating the
/// samples through the store moves them into memory, after which
/// `values` holds one entry per time and the file linkage is dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSamples {
    pub(crate) value_rep: ValueRep,
    pub(crate) times: Arc<Vec<f64>>,
    pub(crate) values: Vec<Value>,
    pub(crate) values_file_offset: u64,
}

impl TimeSamples {
    /// In-memory samples. Times are sorted; a repeated time keeps its last
    /// value.
    pub fn new(samples: impl IntoIterator<Item = (f64, Value)>) -> Self {
        let mut pairs: Vec<(f64, Value)> = samples.into_iter().collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut times = Vec::with_capacity(pairs.len());
        let mut values: Vec<Value> = Vec::with_capacity(pairs.len());
        for (t, v) in pairs {
            if times.last() == Some(&t) {
                if let Some(last) = values.last_mut() {
                    *last = v;
                }
            } else {
                times.push(t);
                values.push(v);
            }
        }
        Self { value_rep: ValueRep::default(), times: Arc::new(times), values, values_file_offset: 0 }
    }

    pub(crate) fn in_file(value_rep: ValueRep, times: Arc<Vec<f64>>, values_file_offset: u64) -> Self {
        Self { value_rep, times, values: Vec::new(), values_file_offset }
    }

    /// True once the values are held in memory rather than in the file.
    #[inline]
    pub fn is_in_memory(&self) -> bool {
        self.value_rep.data() == 0
    }

    /// Rep of the samples in the file they were read from.
    pub fn value_rep(&self) -> ValueRep {
        self.value_rep
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// In-memory values; empty while the samples are still lazy.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Index of an exact sample time.
    pub fn index_of(&self, time: f64) -> Option<usize> {
        self.times.binary_search_by(|t| t.total_cmp(&time)).ok()
    }

    /// Insert or replace a sample. Only valid in memory.
    pub(crate) fn insert(&mut self, time: f64, value: Value) {
        match self.times.binary_search_by(|t| t.total_cmp(&time)) {
            Ok(i) => self.values[i] = value,
            Err(i) => {
                Arc::make_mut(&mut self.times).insert(i, time);
                self.values.insert(i, value);
            }
        }
    }

    /// Remove a sample. Only valid in memory.
    pub(crate) fn remove(&mut self, time: f64) -> bool {
        match self.index_of(time) {
            Some(i) => {
                Arc::make_mut(&mut self.times).remove(i);
                self.values.remove(i);
                true
            }
            None => false,
        }
    }
}

/// The samples bracketing `time` in a sorted list.
///
/// Times before the first or after the last sample clamp to that sample;
/// an exact hit returns the same time twice. A NaN time has no bracket.
pub fn bracketing_times(times: &[f64], time: f64) -> Option<(f64, f64)> {
    let (first, last) = (*times.first()?, *times.last()?);
    if time.is_nan() {
        return None;
    }
    if time <= first {
        return Some((first, first));
    }
    if time >= last {
        return Some((last, last));
    }
    let i = times.partition_point(|&t| t < time);
    if times[i] == time {
        Some((time, time))
    } else {
        Some((times[i - 1], times[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups() {
        let ts = TimeSamples::new([
            (2.0, Value::Double(2.0)),
            (1.0, Value::Double(1.0)),
            (2.0, Value::Double(3.0)),
        ]);
        assert!(ts.is_in_memory());
        assert_eq!(ts.times(), &[1.0, 2.0]);
        assert_eq!(ts.values()[1], Value::Double(3.0));
        assert_eq!(ts.index_of(2.0), Some(1));
        assert_eq!(ts.index_of(1.5), None);
    }

    #[test]
    fn test_insert_remove() {
        let mut ts = TimeSamples::new([(1.0, Value::Int(1))]);
        ts.insert(0.0, Value::Int(0));
        ts.insert(1.0, Value::Int(10));
        assert_eq!(ts.times(), &[0.0, 1.0]);
        assert_eq!(ts.values(), &[Value::Int(0), Value::Int(10)]);
        assert!(ts.remove(0.0));
        assert!(!ts.remove(5.0));
        assert_eq!(ts.len(), 1);
    }

    #[test]
    fn test_bracketing() {
        let times = [1.0, 2.0, 4.0];
        assert_eq!(bracketing_times(&[], 1.0), None);
        assert_eq!(bracketing_times(&times, 0.0), Some((1.0, 1.0)));
        assert_eq!(bracketing_times(&times, 5.0), Some((4.0, 4.0)));
        assert_eq!(bracketing_times(&times, 2.0), Some((2.0, 2.0)));
        assert_eq!(bracketing_times(&times, 3.0), Some((2.0, 4.0)));
        assert_eq!(bracketing_times(&times, f64::NAN), None);
        assert_eq!(bracketing_times(&[1.0], f64::NAN), None);
    }
}
