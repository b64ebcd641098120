//! Hierarchical array stores (groups, attributes, typed datasets)
//!
//! Cooler, hitile, hibed and multivec files are all HDF5 trees. Readers talk
//! to them through [`Container`] so the same reading code runs against real
//! files (`Hdf5Container`, feature `hdf5`) and against trees built in memory.
//!
//! Paths are `/`-separated and relative to the root; the root group is `""`.
//! Slice reads are clipped to the dataset length, so reading past the end
//! returns fewer rows rather than an error.

#[cfg(feature = "hdf5")]
mod hdf5_store;

#[cfg(feature = "hdf5")]
pub use hdf5_store::Hdf5Container;

use crate::error::{TileError, TileResult};
use std::collections::BTreeMap;
use std::ops::Range;

/// Scalar attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            AttrValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

pub trait Container: Send + Sync {
    /// Whether a group or dataset exists at `path`
    fn exists(&self, path: &str) -> bool;

    /// Names of the direct children of a group, sorted
    fn members(&self, group: &str) -> TileResult<Vec<String>>;

    /// Attribute attached to a group or dataset
    fn attr(&self, path: &str, name: &str) -> TileResult<Option<AttrValue>>;

    fn shape(&self, path: &str) -> TileResult<Vec<usize>>;

    /// Read rows `range` of an integer dataset
    fn read_ints(&self, path: &str, range: Range<usize>) -> TileResult<Vec<i64>>;

    /// Read rows `range` of a float dataset; 2-D datasets come back row-major
    fn read_floats(&self, path: &str, range: Range<usize>) -> TileResult<Vec<f64>>;

    fn read_strings(&self, path: &str, range: Range<usize>) -> TileResult<Vec<String>>;

    /// Number of rows of a dataset
    fn len(&self, path: &str) -> TileResult<usize> {
        Ok(self.shape(path)?.first().copied().unwrap_or(0))
    }

    fn attr_int(&self, path: &str, name: &str) -> TileResult<Option<i64>> {
        Ok(self.attr(path, name)?.and_then(|a| a.as_int()))
    }

    fn attr_float(&self, path: &str, name: &str) -> TileResult<Option<f64>> {
        Ok(self.attr(path, name)?.and_then(|a| a.as_float()))
    }

    fn attr_str(&self, path: &str, name: &str) -> TileResult<Option<String>> {
        Ok(self.attr(path, name)?.and_then(|a| a.as_str().map(str::to_string)))
    }

    /// Read every row of an integer dataset
    fn read_all_ints(&self, path: &str) -> TileResult<Vec<i64>> {
        let n = self.len(path)?;
        self.read_ints(path, 0..n)
    }

    fn read_all_floats(&self, path: &str) -> TileResult<Vec<f64>> {
        let n = self.len(path)?;
        self.read_floats(path, 0..n)
    }

    fn read_all_strings(&self, path: &str) -> TileResult<Vec<String>> {
        let n = self.len(path)?;
        self.read_strings(path, 0..n)
    }
}

/// Join path segments, skipping empty ones
pub fn join(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{}/{}", parent.trim_end_matches('/'), child),
    }
}

#[derive(Debug, Clone)]
enum ArrayData {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strings(Vec<String>),
}

#[derive(Debug, Clone)]
struct MemoryDataset {
    data: ArrayData,
    /// Row width; 1 for 1-D datasets
    cols: usize,
    attrs: BTreeMap<String, AttrValue>,
}

impl MemoryDataset {
    fn rows(&self) -> usize {
        let n = match &self.data {
            ArrayData::Ints(v) => v.len(),
            ArrayData::Floats(v) => v.len(),
            ArrayData::Strings(v) => v.len(),
        };
        n / self.cols.max(1)
    }

    fn clip(&self, range: Range<usize>) -> Range<usize> {
        let rows = self.rows();
        let start = range.start.min(rows);
        let end = range.end.min(rows).max(start);
        start * self.cols..end * self.cols
    }
}

/// In-memory container used by tests and by callers that assemble data in process
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    groups: BTreeMap<String, BTreeMap<String, AttrValue>>,
    datasets: BTreeMap<String, MemoryDataset>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(String::new(), BTreeMap::new());
        Self { groups, datasets: BTreeMap::new() }
    }

    /// Create a group and any missing parents
    pub fn add_group(&mut self, path: &str) -> &mut Self {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join(&current, part);
            self.groups.entry(current.clone()).or_default();
        }
        self
    }

    pub fn set_attr<V: Into<AttrValue>>(&mut self, path: &str, name: &str, value: V) -> &mut Self {
        let value = value.into();
        if let Some(ds) = self.datasets.get_mut(path) {
            ds.attrs.insert(name.to_string(), value);
        } else {
            self.add_group(path);
            if let Some(attrs) = self.groups.get_mut(path) {
                attrs.insert(name.to_string(), value);
            }
        }
        self
    }

    pub fn add_ints(&mut self, path: &str, values: Vec<i64>) -> &mut Self {
        self.insert(path, ArrayData::Ints(values), 1)
    }

    pub fn add_floats(&mut self, path: &str, values: Vec<f64>) -> &mut Self {
        self.insert(path, ArrayData::Floats(values), 1)
    }

    /// Row-major 2-D float dataset with `cols` columns
    pub fn add_floats_2d(&mut self, path: &str, values: Vec<f64>, cols: usize) -> &mut Self {
        self.insert(path, ArrayData::Floats(values), cols.max(1))
    }

    pub fn add_strings<S: Into<String>>(&mut self, path: &str, values: Vec<S>) -> &mut Self {
        let values = values.into_iter().map(Into::into).collect();
        self.insert(path, ArrayData::Strings(values), 1)
    }

    fn insert(&mut self, path: &str, data: ArrayData, cols: usize) -> &mut Self {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.add_group(parent);
        }
        self.datasets.insert(
            path.to_string(),
            MemoryDataset { data, cols, attrs: BTreeMap::new() },
        );
        self
    }

    fn dataset(&self, path: &str) -> TileResult<&MemoryDataset> {
        self.datasets
            .get(path)
            .ok_or_else(|| TileError::corrupt(format!("missing dataset '{}'", path)))
    }
}

impl Default for MemoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Container for MemoryContainer {
    fn exists(&self, path: &str) -> bool {
        self.groups.contains_key(path) || self.datasets.contains_key(path)
    }

    fn members(&self, group: &str) -> TileResult<Vec<String>> {
        if !self.groups.contains_key(group) {
            return Err(TileError::corrupt(format!("missing group '{}'", group)));
        }
        let prefix = if group.is_empty() { String::new() } else { format!("{}/", group) };
        let direct_child = |path: &String| -> Option<String> {
            let rest = path.strip_prefix(&prefix)?;
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
        };

        let mut names: Vec<String> = self
            .groups
            .keys()
            .chain(self.datasets.keys())
            .filter_map(direct_child)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn attr(&self, path: &str, name: &str) -> TileResult<Option<AttrValue>> {
        if let Some(ds) = self.datasets.get(path) {
            return Ok(ds.attrs.get(name).cloned());
        }
        match self.groups.get(path) {
            Some(attrs) => Ok(attrs.get(name).cloned()),
            None => Err(TileError::corrupt(format!("missing group '{}'", path))),
        }
    }

    fn shape(&self, path: &str) -> TileResult<Vec<usize>> {
        let ds = self.dataset(path)?;
        if ds.cols > 1 {
            Ok(vec![ds.rows(), ds.cols])
        } else {
            Ok(vec![ds.rows()])
        }
    }

    fn read_ints(&self, path: &str, range: Range<usize>) -> TileResult<Vec<i64>> {
        let ds = self.dataset(path)?;
        let span = ds.clip(range);
        match &ds.data {
            ArrayData::Ints(v) => Ok(v[span].to_vec()),
            ArrayData::Floats(v) => Ok(v[span].iter().map(|&f| f as i64).collect()),
            ArrayData::Strings(_) => Err(TileError::corrupt(format!("'{}' is not numeric", path))),
        }
    }

    fn read_floats(&self, path: &str, range: Range<usize>) -> TileResult<Vec<f64>> {
        let ds = self.dataset(path)?;
        let span = ds.clip(range);
        match &ds.data {
            ArrayData::Floats(v) => Ok(v[span].to_vec()),
            ArrayData::Ints(v) => Ok(v[span].iter().map(|&i| i as f64).collect()),
            ArrayData::Strings(_) => Err(TileError::corrupt(format!("'{}' is not numeric", path))),
        }
    }

    fn read_strings(&self, path: &str, range: Range<usize>) -> TileResult<Vec<String>> {
        let ds = self.dataset(path)?;
        let span = ds.clip(range);
        match &ds.data {
            ArrayData::Strings(v) => Ok(v[span].to_vec()),
            _ => Err(TileError::corrupt(format!("'{}' is not a string dataset", path))),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}
