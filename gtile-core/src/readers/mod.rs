//! Format readers behind one closed set of variants
//!
//! Every reader answers `info`; numeric readers answer `fetch_rect` and
//! interval readers answer `fetch_features`. Readers are `Send + Sync`:
//! backends that are not thread-safe serialize through their own lock.

pub mod beddb;
pub mod bigwig;
pub mod cooler;
pub mod hitile;
pub mod multivec;

pub use beddb::{Bed2ddbReader, BeddbReader, FeatureTiles, RectLayout};
pub use bigwig::{BigWigReader, MemorySignal, SignalSource};
pub use cooler::{CoolerLayout, CoolerReader};
pub use hitile::HitileReader;
pub use multivec::MultivecReader;

#[cfg(feature = "bigwig")]
pub use bigwig::BigWigFile;

use crate::container::Container;
use crate::coords::ChromSizes;
use crate::error::{TileError, TileResult};
use crate::payload::{DenseBlock, Feature};
use crate::types::{DatasetDescriptor, FileType, TileRect, TilesetInfo, Transform, ZoomLevel};

pub enum Reader {
    Cooler(CoolerReader),
    Hitile(HitileReader),
    Hibed(HitileReader),
    BigWig(BigWigReader),
    Multivec(MultivecReader),
    Beddb(BeddbReader),
    Bed2ddb(Bed2ddbReader),
}

impl Reader {
    pub fn filetype(&self) -> FileType {
        match self {
            Reader::Cooler(_) => FileType::Cooler,
            Reader::Hitile(_) => FileType::Hitile,
            Reader::Hibed(_) => FileType::Hibed,
            Reader::BigWig(_) => FileType::Bigwig,
            Reader::Multivec(_) => FileType::Multivec,
            Reader::Beddb(_) => FileType::Beddb,
            Reader::Bed2ddb(_) => FileType::Bed2ddb,
        }
    }

    /// Whether tiles are dense numeric blocks rather than feature lists
    pub fn is_dense(&self) -> bool {
        matches!(
            self,
            Reader::Cooler(_) | Reader::Hitile(_) | Reader::BigWig(_) | Reader::Multivec(_)
        )
    }

    pub fn info(&self) -> TilesetInfo {
        match self {
            Reader::Cooler(r) => r.info(),
            Reader::Hitile(r) | Reader::Hibed(r) => r.info(),
            Reader::BigWig(r) => r.info(),
            Reader::Multivec(r) => r.info(),
            Reader::Beddb(r) => r.info(),
            Reader::Bed2ddb(r) => r.info(),
        }
    }

    /// Whether a tile lies inside the dataset at a zoom level
    pub fn contains_tile(&self, info: &TilesetInfo, zoom: ZoomLevel, x: u64, y: Option<u64>) -> bool {
        match self {
            Reader::Bed2ddb(r) => r.contains_tile(info, zoom, x, y.unwrap_or(0)),
            _ => info.contains_tile(zoom, x, y),
        }
    }

    pub fn fetch_rect(&self, zoom: ZoomLevel, rect: TileRect, transform: Transform) -> TileResult<DenseBlock> {
        match self {
            Reader::Cooler(r) => r.fetch_rect(zoom, rect, transform),
            Reader::Hitile(r) => r.fetch_rect(zoom, rect),
            Reader::BigWig(r) => r.fetch_rect(zoom, rect),
            Reader::Multivec(r) => r.fetch_rect(zoom, rect),
            other => Err(TileError::unsupported(format!(
                "{} tiles are not numeric",
                other.filetype()
            ))),
        }
    }

    pub fn fetch_features(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<FeatureTiles> {
        match self {
            Reader::Beddb(r) => r.fetch_features(zoom, rect),
            Reader::Bed2ddb(r) => r.fetch_features(zoom, rect),
            Reader::Hibed(r) => Ok(r
                .fetch_labels(zoom, rect)?
                .into_iter()
                .map(|(x, labels)| ((x, 0), labels.into_iter().map(Feature::Text).collect()))
                .collect()),
            other => Err(TileError::unsupported(format!(
                "{} tiles are not feature lists",
                other.filetype()
            ))),
        }
    }

    pub fn as_cooler(&self) -> Option<&CoolerReader> {
        match self {
            Reader::Cooler(r) => Some(r),
            _ => None,
        }
    }
}

/// Turns a registry entry into an open reader
pub trait DatasetOpener: Send + Sync {
    /// `coords` is the dataset's coordinate system from the catalog, if it names one
    fn open(&self, descriptor: &DatasetDescriptor, coords: Option<&ChromSizes>) -> TileResult<Reader>;
}

/// Build a reader over an already opened container
pub fn reader_from_container(filetype: FileType, container: Box<dyn Container>) -> TileResult<Reader> {
    match filetype {
        FileType::Cooler => Ok(Reader::Cooler(CoolerReader::open(container)?)),
        FileType::Hitile => Ok(Reader::Hitile(HitileReader::open(container)?)),
        FileType::Hibed => Ok(Reader::Hibed(HitileReader::open(container)?)),
        FileType::Multivec => Ok(Reader::Multivec(MultivecReader::open(container)?)),
        other => Err(TileError::unsupported(format!("{} is not an HDF5 format", other))),
    }
}

/// Opens datasets from local files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl DatasetOpener for FileOpener {
    fn open(&self, descriptor: &DatasetDescriptor, coords: Option<&ChromSizes>) -> TileResult<Reader> {
        let path = descriptor.path.as_path();
        if !path.exists() {
            return Err(TileError::not_found(format!("No such file: {}", path.display())));
        }

        match descriptor.filetype {
            FileType::Beddb => Ok(Reader::Beddb(BeddbReader::open(path)?)),
            FileType::Bed2ddb => Ok(Reader::Bed2ddb(Bed2ddbReader::open(path)?)),
            FileType::Bigwig => open_bigwig(path, coords),
            filetype => open_hdf5(filetype, path),
        }
    }
}

#[cfg(feature = "hdf5")]
fn open_hdf5(filetype: FileType, path: &std::path::Path) -> TileResult<Reader> {
    let container = crate::container::Hdf5Container::open(path)?;
    reader_from_container(filetype, Box::new(container))
}

#[cfg(not(feature = "hdf5"))]
fn open_hdf5(filetype: FileType, _path: &std::path::Path) -> TileResult<Reader> {
    Err(TileError::unsupported(format!(
        "{} files need the `hdf5` feature",
        filetype
    )))
}

#[cfg(feature = "bigwig")]
fn open_bigwig(path: &std::path::Path, coords: Option<&ChromSizes>) -> TileResult<Reader> {
    let source = BigWigFile::open(path)?;
    Ok(Reader::BigWig(BigWigReader::open(Box::new(source), coords)?))
}

#[cfg(not(feature = "bigwig"))]
fn open_bigwig(_path: &std::path::Path, _coords: Option<&ChromSizes>) -> TileResult<Reader> {
    Err(TileError::unsupported("bigwig files need the `bigwig` feature"))
}
