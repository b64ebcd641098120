//! bigWig-like signal tracks binned on the fly
//!
//! Zoom levels are powers of two: with `depth = ceil(log2(ceil(total / 1024)))`
//! the bin size at zoom `z` is `2^(depth - z)` bp, so the finest level is
//! one base per value. Tiles walk absolute coordinates through chromosome
//! boundaries and concatenate the per-chromosome summaries.

use crate::coords::ChromSizes;
use crate::error::TileResult;
use crate::payload::DenseBlock;
use crate::types::{TileRect, TilesetInfo, ZoomLevel, TRACK_TILE_SIZE};
use std::cmp::Ordering;

/// Binned access to a per-base signal
pub trait SignalSource: Send + Sync {
    /// Chromosomes as stored in the source, in file order
    fn chromsizes(&self) -> TileResult<Vec<(String, u64)>>;

    /// Mean of the covered bases in each of `bins` equal slices of
    /// `[start, end)`; NaN where nothing is covered
    fn summarize(&self, chrom: &str, start: u64, end: u64, bins: usize) -> TileResult<Vec<f32>>;
}

/// Integer bin edges used by both signal sources: edge `i` is
/// `start + i * (end - start) / bins`
pub fn bin_edges(start: u64, end: u64, bins: usize) -> Vec<u64> {
    let span = end.saturating_sub(start);
    (0..=bins as u64)
        .map(|i| start + i * span / bins.max(1) as u64)
        .collect()
}

/// Per-base signal held in memory; NaN marks uncovered bases
#[derive(Debug, Clone, Default)]
pub struct MemorySignal {
    chroms: Vec<(String, Vec<f32>)>,
}

impl MemorySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chrom<S: Into<String>>(mut self, name: S, values: Vec<f32>) -> Self {
        self.chroms.push((name.into(), values));
        self
    }
}

impl SignalSource for MemorySignal {
    fn chromsizes(&self) -> TileResult<Vec<(String, u64)>> {
        Ok(self.chroms.iter().map(|(n, v)| (n.clone(), v.len() as u64)).collect())
    }

    fn summarize(&self, chrom: &str, start: u64, end: u64, bins: usize) -> TileResult<Vec<f32>> {
        let Some((_, values)) = self.chroms.iter().find(|(n, _)| n == chrom) else {
            return Ok(vec![f32::NAN; bins]);
        };
        let edges = bin_edges(start, end, bins);
        let out = edges
            .windows(2)
            .map(|w| {
                let lo = (w[0] as usize).min(values.len());
                let hi = (w[1] as usize).min(values.len());
                let (sum, n) = values[lo..hi]
                    .iter()
                    .filter(|v| !v.is_nan())
                    .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1));
                if n == 0 {
                    f32::NAN
                } else {
                    (sum / n as f64) as f32
                }
            })
            .collect();
        Ok(out)
    }
}

#[cfg(feature = "bigwig")]
pub use file::BigWigFile;

#[cfg(feature = "bigwig")]
mod file {
    use super::{bin_edges, SignalSource};
    use crate::error::{TileError, TileResult};
    use bigtools::utils::reopen::ReopenableFile;
    use bigtools::BigWigRead;
    use parking_lot::Mutex;
    use std::path::Path;

    /// A local bigWig file read through `bigtools`
    pub struct BigWigFile {
        reader: Mutex<BigWigRead<ReopenableFile>>,
        chroms: Vec<(String, u64)>,
    }

    impl BigWigFile {
        pub fn open<P: AsRef<Path>>(path: P) -> TileResult<Self> {
            let path = path.as_ref();
            let path_str = path
                .to_str()
                .ok_or_else(|| TileError::malformed(format!("non UTF-8 path {}", path.display())))?;
            let reader = BigWigRead::open_file(path_str)
                .map_err(|e| TileError::corrupt(format!("cannot open bigWig {}: {}", path.display(), e)))?;
            let chroms = reader
                .chroms()
                .iter()
                .map(|c| (c.name.clone(), c.length as u64))
                .collect();
            Ok(Self { reader: Mutex::new(reader), chroms })
        }
    }

    impl SignalSource for BigWigFile {
        fn chromsizes(&self) -> TileResult<Vec<(String, u64)>> {
            Ok(self.chroms.clone())
        }

        fn summarize(&self, chrom: &str, start: u64, end: u64, bins: usize) -> TileResult<Vec<f32>> {
            if !self.chroms.iter().any(|(n, _)| n == chrom) {
                return Ok(vec![f32::NAN; bins]);
            }
            let edges = bin_edges(start, end, bins);
            let mut sums = vec![0.0f64; bins];
            let mut covered = vec![0u64; bins];

            let mut reader = self.reader.lock();
            let intervals = reader
                .get_interval(chrom, start as u32, end as u32)
                .map_err(|e| TileError::corrupt(format!("bigWig read failed: {}", e)))?;
            for interval in intervals {
                let value = interval.map_err(|e| TileError::corrupt(format!("bigWig read failed: {}", e)))?;
                if value.value.is_nan() {
                    continue;
                }
                let (vs, ve) = (value.start as u64, value.end as u64);
                // first bin whose right edge passes the interval start
                let mut b = edges.partition_point(|&e| e <= vs).saturating_sub(1);
                while b < bins && edges[b] < ve {
                    let overlap = ve.min(edges[b + 1]).saturating_sub(vs.max(edges[b]));
                    sums[b] += value.value as f64 * overlap as f64;
                    covered[b] += overlap;
                    b += 1;
                }
            }

            Ok(sums
                .iter()
                .zip(&covered)
                .map(|(&s, &n)| if n == 0 { f32::NAN } else { (s / n as f64) as f32 })
                .collect())
        }
    }
}

/// Natural ordering of chromosome names (`chr2` before `chr10`)
fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn chunks(s: &str) -> Vec<(bool, &str)> {
        let mut out = Vec::new();
        let mut start = 0;
        let bytes = s.as_bytes();
        for i in 1..=bytes.len() {
            if i == bytes.len() || bytes[i].is_ascii_digit() != bytes[start].is_ascii_digit() {
                out.push((bytes[start].is_ascii_digit(), &s[start..i]));
                start = i;
            }
        }
        out
    }

    let (ca, cb) = (chunks(a), chunks(b));
    for ((da, sa), (db, sb)) in ca.iter().zip(&cb) {
        let ord = match (da, db) {
            (true, true) => sa
                .trim_start_matches('0')
                .len()
                .cmp(&sb.trim_start_matches('0').len())
                .then_with(|| sa.trim_start_matches('0').cmp(sb.trim_start_matches('0'))),
            _ => sa.cmp(sb),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

pub struct BigWigReader {
    source: Box<dyn SignalSource>,
    chromsizes: ChromSizes,
    depth: u32,
}

impl BigWigReader {
    /// Open over a source; `coords` overrides the source's chromosome order
    pub fn open(source: Box<dyn SignalSource>, coords: Option<&ChromSizes>) -> TileResult<Self> {
        let chromsizes = match coords {
            Some(cs) => cs.clone(),
            None => {
                let mut chroms = source.chromsizes()?;
                chroms.sort_by(|a, b| natural_cmp(&a.0, &b.0));
                ChromSizes::new(chroms)
            }
        };
        let depth = quadtree_depth(chromsizes.total_length());
        Ok(Self { source, chromsizes, depth })
    }

    pub fn chromsizes(&self) -> &ChromSizes {
        &self.chromsizes
    }

    pub fn info(&self) -> TilesetInfo {
        let max_width = TRACK_TILE_SIZE as u64 * (1u64 << self.depth);
        TilesetInfo {
            min_pos: vec![0.0],
            max_pos: vec![self.chromsizes.total_length() as f64],
            max_zoom: self.depth,
            max_width: Some(max_width),
            tile_size: TRACK_TILE_SIZE,
            chromsizes: Some(
                self.chromsizes
                    .chroms()
                    .iter()
                    .map(|c| (c.name.clone(), c.length))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn bin_size(&self, zoom: ZoomLevel) -> u64 {
        1u64 << self.depth.saturating_sub(zoom)
    }

    /// Values for a run of tiles; each tile is walked on its own so the
    /// result does not depend on how tiles were grouped
    pub fn fetch_rect(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<DenseBlock> {
        let bin_size = self.bin_size(zoom);
        let tile_width = bin_size * TRACK_TILE_SIZE as u64;
        let mut data = Vec::with_capacity(rect.width() as usize * TRACK_TILE_SIZE);

        for x in rect.x_lo..=rect.x_hi {
            let mut tile = self.fetch_span(x * tile_width, (x + 1) * tile_width, bin_size)?;
            tile.resize(TRACK_TILE_SIZE, 0.0);
            data.extend(tile);
        }

        let rows = data.len();
        Ok(DenseBlock::from_rows(data, rows, 1))
    }

    fn fetch_span(&self, start: u64, end: u64, bin_size: u64) -> TileResult<Vec<f32>> {
        let mut out = Vec::new();
        for (idx, s, e) in self.chromsizes.abs_to_genomic(start, end) {
            let Some(chrom) = self.chromsizes.get(idx) else { continue };
            let n_bins = (e - s).div_ceil(bin_size) as usize;
            let mut values = self.source.summarize(&chrom.name, s, e, n_bins)?;
            // a trailing partial bin at the chromosome end is dropped
            if e == chrom.length && chrom.length % bin_size != 0 && !values.is_empty() {
                values.pop();
            }
            out.extend(values);
        }
        Ok(out)
    }
}

/// `ceil(log2(ceil(total / 1024)))`
pub fn quadtree_depth(total_length: u64) -> u32 {
    let tiles = total_length.div_ceil(TRACK_TILE_SIZE as u64).max(1);
    if tiles <= 1 {
        0
    } else {
        64 - (tiles - 1).leading_zeros()
    }
}
