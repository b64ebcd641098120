//! Cooler contact matrices: single, hierarchical (`max-zoom`) and multires layouts
//!
//! A cooler stores the upper triangle of a symmetric binned matrix as a
//! pixel table (`bin1_id <= bin2_id`, sorted by `bin1_id`) indexed by
//! `indexes/bin1_offset`. Every read mirrors the table back into a full
//! block so callers never see the triangle.

use crate::container::{join, Container};
use crate::coords::{BinIndex, ChromSizes};
use crate::error::{TileError, TileResult};
use crate::payload::DenseBlock;
use crate::types::{TileRect, TilesetInfo, Transform, TransformInfo, ZoomLevel, MATRIX_TILE_SIZE};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolerLayout {
    /// One resolution at the root
    Single,
    /// Groups `0..=max_zoom`, each with a `bin-size` attribute
    Hierarchical,
    /// Groups `resolutions/{bin_size}`
    Multires,
}

/// One resolution of a cooler
#[derive(Debug, Clone)]
pub struct CoolerLevel {
    pub group: String,
    pub chromsizes: ChromSizes,
    pub bins: BinIndex,
    /// Weight columns present at this level (never includes `Default`)
    pub transforms: Vec<Transform>,
}

impl CoolerLevel {
    pub fn bin_size(&self) -> u64 {
        self.bins.bin_size()
    }

    fn path(&self, rel: &str) -> String {
        join(&self.group, rel)
    }
}

pub struct CoolerReader {
    container: Box<dyn Container>,
    layout: CoolerLayout,
    /// Indexed by zoom level; level 0 is the coarsest
    levels: Vec<CoolerLevel>,
}

impl CoolerReader {
    pub fn open(container: Box<dyn Container>) -> TileResult<Self> {
        let (layout, groups) = detect_layout(container.as_ref())?;
        let levels = groups
            .into_iter()
            .map(|group| read_level(container.as_ref(), group))
            .collect::<TileResult<Vec<_>>>()?;

        log::debug!("Cooler layout {:?} with {} levels", layout, levels.len());
        Ok(Self { container, layout, levels })
    }

    pub fn layout(&self) -> CoolerLayout {
        self.layout
    }

    pub fn levels(&self) -> &[CoolerLevel] {
        &self.levels
    }

    pub fn max_zoom(&self) -> ZoomLevel {
        (self.levels.len() - 1) as ZoomLevel
    }

    pub fn level(&self, zoom: ZoomLevel) -> TileResult<&CoolerLevel> {
        self.levels.get(zoom as usize).ok_or_else(|| {
            TileError::out_of_bounds(format!("zoom {} exceeds max zoom {}", zoom, self.max_zoom()))
        })
    }

    /// Level used for a fragment zoom-out: `zoomout` steps coarser than the
    /// finest level, clamped to the coarsest one
    pub fn level_for_zoomout(&self, zoomout: u32) -> usize {
        (self.levels.len() - 1).saturating_sub(zoomout as usize)
    }

    /// Transforms present at every level
    pub fn available_transforms(&self) -> Vec<Transform> {
        Transform::ALL
            .iter()
            .copied()
            .filter(|t| *t != Transform::Default)
            .filter(|t| self.levels.iter().all(|level| level.transforms.contains(t)))
            .collect()
    }

    pub fn info(&self) -> TilesetInfo {
        let finest = &self.levels[self.levels.len() - 1];
        let total = finest.chromsizes.total_length() as f64;

        let mut transforms = vec![TransformInfo::from(Transform::Default)];
        transforms.extend(self.available_transforms().into_iter().map(TransformInfo::from));

        let mut info = TilesetInfo {
            min_pos: vec![0.0, 0.0],
            max_pos: vec![total, total],
            max_zoom: self.max_zoom(),
            tile_size: MATRIX_TILE_SIZE,
            bins_per_dimension: Some(MATRIX_TILE_SIZE),
            transforms: Some(transforms),
            ..Default::default()
        };

        match self.layout {
            CoolerLayout::Multires => {
                let mut resolutions: Vec<u64> = self.levels.iter().map(|l| l.bin_size()).collect();
                resolutions.sort_unstable();
                info.resolutions = Some(resolutions);
                info.chromsizes = Some(
                    finest
                        .chromsizes
                        .chroms()
                        .iter()
                        .map(|c| (c.name.clone(), c.length))
                        .collect(),
                );
            }
            CoolerLayout::Single | CoolerLayout::Hierarchical => {
                let max_width = finest.bin_size() * MATRIX_TILE_SIZE as u64 * (1u64 << self.max_zoom());
                info.max_width = Some(max_width);
            }
        }
        info
    }

    /// Dense block covering a rectangle of tiles; rows follow y, columns follow x.
    ///
    /// Only stored pixels receive values, so a NaN weight only marks pixels
    /// that have counts.
    pub fn fetch_rect(&self, zoom: ZoomLevel, rect: TileRect, transform: Transform) -> TileResult<DenseBlock> {
        let level = self.level(zoom)?;
        let bin_size = level.bin_size();
        let tile_width = bin_size * MATRIX_TILE_SIZE as u64;

        let x0 = rect.x_lo * tile_width;
        let y0 = rect.y_lo * tile_width;
        let cols = rect.width() as usize * MATRIX_TILE_SIZE;
        let rows = rect.height() as usize * MATRIX_TILE_SIZE;
        let mut block = DenseBlock::zeros(rows, cols);

        let xbins = bin_span(level, x0, (rect.x_hi + 1) * tile_width);
        let ybins = bin_span(level, y0, (rect.y_hi + 1) * tile_width);
        if xbins.is_empty() || ybins.is_empty() {
            return Ok(block);
        }

        let transform = self.effective_transform(level, transform);
        let wx = self.read_weights(level, transform, &xbins)?;
        let wy = self.read_weights(level, transform, &ybins)?;

        let chromsizes = &level.chromsizes;
        let cell = |bin: u64, origin: u64, limit: usize| -> Option<usize> {
            let abs = level.bins.bin_to_abs(chromsizes, bin);
            let idx = (abs.checked_sub(origin)? / bin_size) as usize;
            (idx < limit).then_some(idx)
        };

        self.scan_pixels(level, xbins.clone(), |b1, b2, count| {
            if !ybins.contains(&b2) {
                return;
            }
            if let (Some(c), Some(r)) = (cell(b1, x0, cols), cell(b2, y0, rows)) {
                let v = apply_transform(count, weight_at(&wx, &xbins, b1), weight_at(&wy, &ybins, b2), transform);
                block.add(r, c, v as f32);
            }
        })?;

        // lower triangle, mirrored from the stored upper one
        self.scan_pixels(level, ybins.clone(), |b1, b2, count| {
            if b1 == b2 || !xbins.contains(&b2) {
                return;
            }
            if let (Some(c), Some(r)) = (cell(b2, x0, cols), cell(b1, y0, rows)) {
                let v = apply_transform(count, weight_at(&wx, &xbins, b2), weight_at(&wy, &ybins, b1), transform);
                block.add(r, c, v as f32);
            }
        })?;

        Ok(block)
    }

    /// Full dense matrix over absolute bin ranges of one level.
    ///
    /// Bins below 0 or past the last bin are zero-filled. With `balance`
    /// every in-range cell is scaled by `weight[i] * weight[j]`, so a NaN
    /// weight turns its whole row and column NaN.
    pub fn fetch_region(&self, level_idx: usize, rows: Range<i64>, cols: Range<i64>, balance: bool) -> TileResult<Vec<f64>> {
        let level = self
            .levels
            .get(level_idx)
            .ok_or_else(|| TileError::out_of_bounds(format!("no cooler level {}", level_idx)))?;

        let nrows = (rows.end - rows.start).max(0) as usize;
        let ncols = (cols.end - cols.start).max(0) as usize;
        let mut matrix = vec![0.0f64; nrows * ncols];

        let n_bins = level.bins.n_bins() as i64;
        let clip = |r: &Range<i64>| r.start.clamp(0, n_bins) as u64..r.end.clamp(0, n_bins) as u64;
        let row_bins = clip(&rows);
        let col_bins = clip(&cols);
        if row_bins.is_empty() || col_bins.is_empty() {
            return Ok(matrix);
        }

        let at = |row_bin: u64, col_bin: u64| {
            (row_bin as i64 - rows.start) as usize * ncols + (col_bin as i64 - cols.start) as usize
        };

        self.scan_pixels(level, row_bins.clone(), |b1, b2, count| {
            if col_bins.contains(&b2) {
                matrix[at(b1, b2)] += count;
            }
        })?;
        self.scan_pixels(level, col_bins.clone(), |b1, b2, count| {
            if b1 != b2 && row_bins.contains(&b2) {
                matrix[at(b2, b1)] += count;
            }
        })?;

        if balance {
            if level.transforms.contains(&Transform::Weight) {
                let wr = self.read_weights(level, Transform::Weight, &row_bins)?;
                let wc = self.read_weights(level, Transform::Weight, &col_bins)?;
                for r in row_bins.clone() {
                    let w1 = weight_at(&wr, &row_bins, r);
                    for c in col_bins.clone() {
                        matrix[at(r, c)] *= w1 * weight_at(&wc, &col_bins, c);
                    }
                }
            } else {
                log::debug!("No weight column at {}, returning raw counts", level.group);
            }
        }

        Ok(matrix)
    }

    fn effective_transform(&self, level: &CoolerLevel, transform: Transform) -> Transform {
        if transform == Transform::Default || level.transforms.contains(&transform) {
            transform
        } else {
            log::debug!("Transform {} not present at '{}', using default", transform.as_str(), level.group);
            Transform::Default
        }
    }

    fn read_weights(&self, level: &CoolerLevel, transform: Transform, bins: &Range<u64>) -> TileResult<Option<Vec<f64>>> {
        if transform == Transform::Default {
            return Ok(None);
        }
        let path = level.path(&format!("bins/{}", transform.as_str()));
        let weights = self
            .container
            .read_floats(&path, bins.start as usize..bins.end as usize)?;
        Ok(Some(weights))
    }

    /// Visit every stored pixel whose `bin1_id` lies in `bin1s`
    fn scan_pixels<F>(&self, level: &CoolerLevel, bin1s: Range<u64>, mut visit: F) -> TileResult<()>
    where
        F: FnMut(u64, u64, f64),
    {
        if bin1s.is_empty() {
            return Ok(());
        }
        let offsets = self.container.read_ints(
            &level.path("indexes/bin1_offset"),
            bin1s.start as usize..bin1s.end as usize + 1,
        )?;
        let (Some(&first), Some(&last)) = (offsets.first(), offsets.last()) else {
            return Ok(());
        };
        if offsets.len() < 2 || last <= first {
            return Ok(());
        }
        let span = first.max(0) as usize..last.max(0) as usize;

        let bin1_ids = self.container.read_ints(&level.path("pixels/bin1_id"), span.clone())?;
        let bin2_ids = self.container.read_ints(&level.path("pixels/bin2_id"), span.clone())?;
        let counts = self.container.read_floats(&level.path("pixels/count"), span)?;
        if bin1_ids.len() != bin2_ids.len() || bin1_ids.len() != counts.len() {
            return Err(TileError::corrupt(format!("pixel columns at '{}' differ in length", level.group)));
        }

        for ((&b1, &b2), &count) in bin1_ids.iter().zip(&bin2_ids).zip(&counts) {
            if b1 < 0 || b2 < 0 {
                return Err(TileError::corrupt(format!("negative bin id in '{}'", level.group)));
            }
            visit(b1 as u64, b2 as u64, count);
        }
        Ok(())
    }
}

/// Bins whose first base lies in `[start, end)`, plus the bin holding `start`
fn bin_span(level: &CoolerLevel, start: u64, end: u64) -> Range<u64> {
    let chromsizes = &level.chromsizes;
    let total = chromsizes.total_length();
    if start >= total || end <= start {
        return 0..0;
    }
    let lo = level.bins.abs_to_bin(chromsizes, start);
    let hi = level.bins.abs_to_bin(chromsizes, end.min(total) - 1) + 1;
    lo..hi.min(level.bins.n_bins())
}

fn weight_at(weights: &Option<Vec<f64>>, span: &Range<u64>, bin: u64) -> f64 {
    match weights {
        Some(w) => w.get((bin - span.start) as usize).copied().unwrap_or(f64::NAN),
        None => 1.0,
    }
}

fn apply_transform(count: f64, w1: f64, w2: f64, transform: Transform) -> f64 {
    if transform.is_divisive() {
        let denom = w1 * w2;
        if denom == 0.0 || denom.is_nan() {
            f64::NAN
        } else {
            count / denom
        }
    } else {
        count * w1 * w2
    }
}

fn detect_layout(container: &dyn Container) -> TileResult<(CoolerLayout, Vec<String>)> {
    if container.exists("resolutions") {
        let mut resolutions: Vec<u64> = container
            .members("resolutions")?
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        if resolutions.is_empty() {
            return Err(TileError::corrupt("multires cooler has no resolutions"));
        }
        // zoom 0 is the coarsest
        resolutions.sort_unstable_by(|a, b| b.cmp(a));
        let groups = resolutions.iter().map(|r| format!("resolutions/{}", r)).collect();
        return Ok((CoolerLayout::Multires, groups));
    }

    if let Some(max_zoom) = container.attr_int("", "max-zoom")? {
        if !(0..=32).contains(&max_zoom) {
            return Err(TileError::corrupt(format!("invalid max-zoom {}", max_zoom)));
        }
        let groups = (0..=max_zoom).map(|z| z.to_string()).collect();
        return Ok((CoolerLayout::Hierarchical, groups));
    }

    if container.exists("pixels") {
        return Ok((CoolerLayout::Single, vec![String::new()]));
    }

    Err(TileError::corrupt("not a cooler: no resolutions, max-zoom or pixels"))
}

fn read_level(container: &dyn Container, group: String) -> TileResult<CoolerLevel> {
    if !container.exists(&group) {
        return Err(TileError::corrupt(format!("missing cooler group '{}'", group)));
    }

    let names = container.read_all_strings(&join(&group, "chroms/name"))?;
    let lengths = container.read_all_ints(&join(&group, "chroms/length"))?;
    if names.len() != lengths.len() {
        return Err(TileError::corrupt(format!("chroms table at '{}' is ragged", group)));
    }
    let chromsizes = ChromSizes::new(names.into_iter().zip(lengths.into_iter().map(|l| l.max(0) as u64)));

    let bin_size = match container.attr_int(&group, "bin-size")? {
        Some(size) if size > 0 => size as u64,
        _ => {
            let starts = container.read_ints(&join(&group, "bins/start"), 0..1)?;
            let ends = container.read_ints(&join(&group, "bins/end"), 0..1)?;
            match (starts.first(), ends.first()) {
                (Some(&s), Some(&e)) if e > s => (e - s) as u64,
                _ => return Err(TileError::corrupt(format!("cannot determine bin size at '{}'", group))),
            }
        }
    };

    let offsets_path = join(&group, "indexes/chrom_offset");
    let bins = if container.exists(&offsets_path) {
        let offsets: Vec<u64> = container
            .read_all_ints(&offsets_path)?
            .into_iter()
            .map(|o| o.max(0) as u64)
            .collect();
        if offsets.len() != chromsizes.len() + 1 {
            return Err(TileError::corrupt(format!("chrom_offset at '{}' does not match chroms", group)));
        }
        BinIndex::from_offsets(bin_size, offsets)?
    } else {
        BinIndex::new(&chromsizes, bin_size)
    };

    let transforms = Transform::ALL
        .iter()
        .copied()
        .filter(|t| *t != Transform::Default)
        .filter(|t| container.exists(&join(&group, &format!("bins/{}", t.as_str()))))
        .collect();

    Ok(CoolerLevel { group, chromsizes, bins, transforms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainer;

    /// One chromosome of 4 bins at 10 bp with upper-triangle pixels
    fn single_cooler(weights: Option<Vec<f64>>) -> CoolerReader {
        let mut c = MemoryContainer::new();
        c.set_attr("", "bin-size", 10i64);
        c.add_strings("chroms/name", vec!["chr1"]);
        c.add_ints("chroms/length", vec![40]);
        c.add_ints("indexes/chrom_offset", vec![0, 4]);
        // pixels (0,0)=1 (0,1)=2 (1,3)=5 (2,2)=3
        c.add_ints("pixels/bin1_id", vec![0, 0, 1, 2]);
        c.add_ints("pixels/bin2_id", vec![0, 1, 3, 2]);
        c.add_floats("pixels/count", vec![1.0, 2.0, 5.0, 3.0]);
        c.add_ints("indexes/bin1_offset", vec![0, 2, 3, 4, 4]);
        if let Some(w) = weights {
            c.add_floats("bins/weight", w);
        }
        CoolerReader::open(Box::new(c)).unwrap()
    }

    #[test]
    fn test_single_layout_info() {
        let reader = single_cooler(Some(vec![1.0; 4]));
        assert_eq!(reader.layout(), CoolerLayout::Single);
        let info = reader.info();
        assert_eq!(info.max_zoom, 0);
        assert_eq!(info.max_pos, vec![40.0, 40.0]);
        assert_eq!(info.max_width, Some(10 * 256));
        let names: Vec<_> = info.transforms.unwrap().into_iter().map(|t| t.value).collect();
        assert_eq!(names, vec!["default", "weight"]);
    }

    #[test]
    fn test_fetch_rect_is_symmetric() {
        let reader = single_cooler(None);
        let block = reader.fetch_rect(0, TileRect::single(0, 0), Transform::Default).unwrap();
        assert_eq!((block.rows, block.cols), (256, 256));
        assert_eq!(block.get(0, 0), 1.0);
        assert_eq!(block.get(1, 0), 2.0);
        assert_eq!(block.get(0, 1), 2.0);
        assert_eq!(block.get(3, 1), 5.0);
        assert_eq!(block.get(1, 3), 5.0);
        assert_eq!(block.get(2, 2), 3.0);
        assert_eq!(block.data.iter().sum::<f32>(), 1.0 + 4.0 + 10.0 + 3.0);
    }

    #[test]
    fn test_weight_transform_scales_present_pixels() {
        let reader = single_cooler(Some(vec![2.0, 0.5, f64::NAN, 1.0]));
        let block = reader.fetch_rect(0, TileRect::single(0, 0), Transform::Weight).unwrap();
        assert_eq!(block.get(0, 0), 4.0);
        assert_eq!(block.get(1, 0), 2.0);
        assert!(block.get(2, 2).is_nan());
        // an empty cell next to a NaN-weight bin stays zero
        assert_eq!(block.get(2, 0), 0.0);
    }

    #[test]
    fn test_missing_transform_falls_back_to_raw() {
        let reader = single_cooler(None);
        let block = reader.fetch_rect(0, TileRect::single(0, 0), Transform::Kr).unwrap();
        assert_eq!(block.get(0, 0), 1.0);
    }

    #[test]
    fn test_fetch_region_zero_fills_outside() {
        let reader = single_cooler(None);
        let m = reader.fetch_region(0, -1..2, 0..3, false).unwrap();
        assert_eq!(&m[0..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&m[3..6], &[1.0, 2.0, 0.0]);
        assert_eq!(&m[6..9], &[2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fetch_region_balance_spreads_nan() {
        let reader = single_cooler(Some(vec![1.0, 1.0, f64::NAN, 1.0]));
        let m = reader.fetch_region(0, 0..4, 0..4, true).unwrap();
        assert!(m[2 * 4].is_nan());
        assert!(m[2].is_nan());
        assert_eq!(m[1], 2.0);
    }

    #[test]
    fn test_hierarchical_layout_and_zoomout() {
        let mut c = MemoryContainer::new();
        c.set_attr("", "max-zoom", 1i64);
        for (z, bin) in [(0, 20i64), (1, 10)] {
            let g = z.to_string();
            c.set_attr(&g, "bin-size", bin);
            c.add_strings(&format!("{}/chroms/name", g), vec!["chr1"]);
            c.add_ints(&format!("{}/chroms/length", g), vec![40]);
            c.add_ints(&format!("{}/pixels/bin1_id", g), vec![]);
            c.add_ints(&format!("{}/pixels/bin2_id", g), vec![]);
            c.add_floats(&format!("{}/pixels/count", g), vec![]);
            c.add_ints(&format!("{}/indexes/bin1_offset", g), vec![0; (40 / bin + 1) as usize]);
        }
        let reader = CoolerReader::open(Box::new(c)).unwrap();
        assert_eq!(reader.layout(), CoolerLayout::Hierarchical);
        assert_eq!(reader.level(0).unwrap().bin_size(), 20);
        assert_eq!(reader.level_for_zoomout(0), 1);
        assert_eq!(reader.level_for_zoomout(5), 0);
        assert_eq!(reader.info().max_width, Some(10 * 256 * 2));
        assert!(matches!(reader.level(2), Err(TileError::OutOfBounds { .. })));
    }

    #[test]
    fn test_not_a_cooler() {
        let c = MemoryContainer::new();
        assert!(matches!(CoolerReader::open(Box::new(c)), Err(TileError::Corrupt { .. })));
    }
}
