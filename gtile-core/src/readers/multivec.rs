//! Multivec: several binned series per chromosome at multiple resolutions
//!
//! Layout: `chroms/{name,length}`, `resolutions/{bin}/values/{chrom}` as a
//! `[bins, n_series]` array, and an optional `info` group carrying
//! `tile-size` and `row_infos`.

use crate::container::Container;
use crate::coords::ChromSizes;
use crate::error::{TileError, TileResult};
use crate::payload::DenseBlock;
use crate::types::{TileRect, TilesetInfo, ZoomLevel};

const DEFAULT_TILE_SIZE: usize = 256;

pub struct MultivecReader {
    container: Box<dyn Container>,
    chromsizes: ChromSizes,
    /// Bin sizes, largest first (zoom order)
    resolutions: Vec<u64>,
    tile_size: usize,
    n_series: usize,
    row_infos: Option<Vec<String>>,
}

impl MultivecReader {
    pub fn open(container: Box<dyn Container>) -> TileResult<Self> {
        let names = container.read_all_strings("chroms/name")?;
        let lengths = container.read_all_ints("chroms/length")?;
        if names.len() != lengths.len() {
            return Err(TileError::corrupt("multivec chroms table is ragged"));
        }
        let chromsizes = ChromSizes::new(names.into_iter().zip(lengths.into_iter().map(|l| l.max(0) as u64)));

        let mut resolutions: Vec<u64> = container
            .members("resolutions")?
            .iter()
            .filter_map(|m| m.parse().ok())
            .filter(|&r: &u64| r > 0)
            .collect();
        if resolutions.is_empty() {
            return Err(TileError::corrupt("multivec file has no resolutions"));
        }
        resolutions.sort_unstable_by(|a, b| b.cmp(a));

        let tile_size = if container.exists("info") {
            container
                .attr_int("info", "tile-size")?
                .filter(|&t| t > 0)
                .map(|t| t as usize)
                .unwrap_or(DEFAULT_TILE_SIZE)
        } else {
            DEFAULT_TILE_SIZE
        };

        let n_series = Self::series_count(container.as_ref(), &chromsizes, resolutions[resolutions.len() - 1])?;

        let row_infos = if container.exists("info/row_infos") {
            Some(container.read_all_strings("info/row_infos")?)
        } else {
            None
        };

        Ok(Self { container, chromsizes, resolutions, tile_size, n_series, row_infos })
    }

    fn series_count(container: &dyn Container, chromsizes: &ChromSizes, resolution: u64) -> TileResult<usize> {
        for chrom in chromsizes.chroms() {
            let path = format!("resolutions/{}/values/{}", resolution, chrom.name);
            if container.exists(&path) {
                let shape = container.shape(&path)?;
                return Ok(shape.get(1).copied().unwrap_or(1));
            }
        }
        Err(TileError::corrupt("multivec file has no value arrays"))
    }

    pub fn n_series(&self) -> usize {
        self.n_series
    }

    pub fn info(&self) -> TilesetInfo {
        let mut ascending = self.resolutions.clone();
        ascending.reverse();
        TilesetInfo {
            min_pos: vec![0.0],
            max_pos: vec![self.chromsizes.total_length() as f64],
            max_zoom: (self.resolutions.len() - 1) as ZoomLevel,
            tile_size: self.tile_size,
            resolutions: Some(ascending),
            shape: Some(vec![self.tile_size, self.n_series]),
            row_infos: self.row_infos.clone(),
            ..Default::default()
        }
    }

    /// Rows of `tile_size` bins per tile, one column per series
    pub fn fetch_rect(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<DenseBlock> {
        let resolution = *self.resolutions.get(zoom as usize).ok_or_else(|| {
            TileError::out_of_bounds(format!("zoom {} exceeds max zoom {}", zoom, self.resolutions.len() - 1))
        })?;
        let tile_width = resolution * self.tile_size as u64;
        let per_tile = self.tile_size * self.n_series;

        let mut data = Vec::with_capacity(rect.width() as usize * per_tile);
        for x in rect.x_lo..=rect.x_hi {
            let mut tile = self.fetch_span(resolution, x * tile_width, (x + 1) * tile_width)?;
            tile.resize(per_tile, 0.0);
            data.extend(tile);
        }

        let rows = rect.width() as usize * self.tile_size;
        Ok(DenseBlock::from_rows(data, rows, self.n_series))
    }

    fn fetch_span(&self, resolution: u64, start: u64, end: u64) -> TileResult<Vec<f32>> {
        let mut out = Vec::new();
        for (idx, s, e) in self.chromsizes.abs_to_genomic(start, end) {
            let Some(chrom) = self.chromsizes.get(idx) else { continue };
            let path = format!("resolutions/{}/values/{}", resolution, chrom.name);
            let lo = (s / resolution) as usize;
            let hi = e.div_ceil(resolution) as usize;
            if !self.container.exists(&path) {
                log::debug!("multivec has no values for {}, zero-filling", chrom.name);
                out.resize(out.len() + (hi - lo) * self.n_series, 0.0);
                continue;
            }
            let values = self.container.read_floats(&path, lo..hi)?;
            out.extend(values.iter().map(|&v| v as f32));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainer;

    fn reader() -> MultivecReader {
        let mut c = MemoryContainer::new();
        c.add_strings("chroms/name", vec!["chr1", "chr2"]);
        c.add_ints("chroms/length", vec![6, 4]);
        c.set_attr("info", "tile-size", 4i64);
        c.add_strings("info/row_infos", vec!["a", "b"]);
        // finest: 1 bp bins, two series
        c.add_floats_2d("resolutions/1/values/chr1", (0..12).map(|v| v as f64).collect(), 2);
        c.add_floats_2d("resolutions/1/values/chr2", vec![100.0; 8], 2);
        c.add_floats_2d("resolutions/4/values/chr1", vec![1.0, 1.0, 2.0, 2.0], 2);
        c.add_floats_2d("resolutions/4/values/chr2", vec![3.0, 3.0], 2);
        MultivecReader::open(Box::new(c)).unwrap()
    }

    #[test]
    fn test_info() {
        let info = reader().info();
        assert_eq!(info.resolutions, Some(vec![1, 4]));
        assert_eq!(info.max_zoom, 1);
        assert_eq!(info.shape, Some(vec![4, 2]));
        assert_eq!(info.row_infos, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(info.max_pos, vec![10.0]);
    }

    #[test]
    fn test_tile_keeps_series_axis() {
        let r = reader();
        let block = r.fetch_rect(1, TileRect::single(1, 0)).unwrap();
        assert_eq!((block.rows, block.cols), (4, 2));
        // positions 4..8: chr1 bins 4,5 then chr2 bins 0,1
        assert_eq!(block.data, vec![8.0, 9.0, 10.0, 11.0, 100.0, 100.0, 100.0, 100.0]);
    }

    #[test]
    fn test_coarse_tile_pads_past_end() {
        let r = reader();
        let block = r.fetch_rect(0, TileRect::single(0, 0)).unwrap();
        assert_eq!(&block.data[..6], &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        assert_eq!(&block.data[6..], &[0.0, 0.0]);
        assert!(r.fetch_rect(2, TileRect::single(0, 0)).is_err());
    }
}
