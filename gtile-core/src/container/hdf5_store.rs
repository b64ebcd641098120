//! HDF5-backed container for `.cool`, `.mcool`, `.hitile` and multivec files

use super::{AttrValue, Container};
use crate::error::{TileError, TileResult};
use hdf5::types::{FixedAscii, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Location};
use ndarray::s;
use parking_lot::Mutex;
use std::ops::Range;
use std::path::Path;

/// Read-only view of an HDF5 file.
///
/// libhdf5 is not reentrant in the default build, so every call goes
/// through one lock per file.
pub struct Hdf5Container {
    file: Mutex<File>,
}

impl Hdf5Container {
    pub fn open<P: AsRef<Path>>(path: P) -> TileResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TileError::not_found(format!("No such file: {}", path.display())));
        }
        let file = File::open(path)?;
        log::debug!("Opened HDF5 file {}", path.display());
        Ok(Self { file: Mutex::new(file) })
    }

    fn clip(ds: &Dataset, range: Range<usize>) -> Range<usize> {
        let rows = ds.shape().first().copied().unwrap_or(0);
        let start = range.start.min(rows);
        start..range.end.min(rows).max(start)
    }
}

fn attr_at(file: &File, path: &str, name: &str) -> TileResult<Option<AttrValue>> {
    if path.is_empty() {
        return read_attr(file, name);
    }
    if let Ok(group) = file.group(path) {
        return read_attr(&group, name);
    }
    let ds = file.dataset(path)?;
    read_attr(&ds, name)
}

fn read_attr(loc: &Location, name: &str) -> TileResult<Option<AttrValue>> {
    if !loc.attr_names()?.iter().any(|n| n == name) {
        return Ok(None);
    }
    let attr = loc.attr(name)?;
    let value = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Boolean => {
            AttrValue::Int(attr.read_scalar::<i64>()?)
        }
        TypeDescriptor::Float(_) => AttrValue::Float(attr.read_scalar::<f64>()?),
        TypeDescriptor::VarLenUnicode => AttrValue::Str(attr.read_scalar::<VarLenUnicode>()?.to_string()),
        TypeDescriptor::VarLenAscii => AttrValue::Str(attr.read_scalar::<VarLenAscii>()?.to_string()),
        TypeDescriptor::FixedAscii(_) | TypeDescriptor::FixedUnicode(_) => {
            AttrValue::Str(attr.read_scalar::<FixedAscii<256>>()?.to_string())
        }
        other => {
            return Err(TileError::corrupt(format!("attribute '{}' has unsupported type {:?}", name, other)))
        }
    };
    Ok(Some(value))
}

impl Container for Hdf5Container {
    fn exists(&self, path: &str) -> bool {
        let file = self.file.lock();
        path.is_empty() || file.link_exists(path)
    }

    fn members(&self, group: &str) -> TileResult<Vec<String>> {
        let file = self.file.lock();
        let mut names = if group.is_empty() {
            file.member_names()?
        } else {
            file.group(group)?.member_names()?
        };
        names.sort();
        Ok(names)
    }

    fn attr(&self, path: &str, name: &str) -> TileResult<Option<AttrValue>> {
        let file = self.file.lock();
        attr_at(&file, path, name)
    }

    fn shape(&self, path: &str) -> TileResult<Vec<usize>> {
        let file = self.file.lock();
        Ok(file.dataset(path)?.shape())
    }

    fn read_ints(&self, path: &str, range: Range<usize>) -> TileResult<Vec<i64>> {
        let file = self.file.lock();
        let ds = file.dataset(path)?;
        let span = Self::clip(&ds, range);
        if span.is_empty() {
            return Ok(Vec::new());
        }
        Ok(ds.read_slice_1d::<i64, _>(s![span])?.to_vec())
    }

    fn read_floats(&self, path: &str, range: Range<usize>) -> TileResult<Vec<f64>> {
        let file = self.file.lock();
        let ds = file.dataset(path)?;
        let span = Self::clip(&ds, range);
        if span.is_empty() {
            return Ok(Vec::new());
        }
        if ds.ndim() == 2 {
            let block = ds.read_slice_2d::<f64, _>(s![span, ..])?;
            Ok(block.iter().copied().collect())
        } else {
            Ok(ds.read_slice_1d::<f64, _>(s![span])?.to_vec())
        }
    }

    fn read_strings(&self, path: &str, range: Range<usize>) -> TileResult<Vec<String>> {
        let file = self.file.lock();
        let ds = file.dataset(path)?;
        let span = Self::clip(&ds, range);
        if span.is_empty() {
            return Ok(Vec::new());
        }
        let strings = match ds.dtype()?.to_descriptor()? {
            TypeDescriptor::VarLenUnicode => ds
                .read_slice_1d::<VarLenUnicode, _>(s![span])?
                .iter()
                .map(|s| s.to_string())
                .collect(),
            TypeDescriptor::VarLenAscii => ds
                .read_slice_1d::<VarLenAscii, _>(s![span])?
                .iter()
                .map(|s| s.to_string())
                .collect(),
            _ => ds
                .read_slice_1d::<FixedAscii<256>, _>(s![span])?
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        Ok(strings)
    }
}
