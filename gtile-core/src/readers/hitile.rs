//! Hitile (dense 1-D) and hibed (categorical 1-D) multi-resolution arrays
//!
//! Both keep their parameters on a `meta` group. Only every `zoom-step`-th
//! level is stored: `values_0` is the finest, `values_k` holds bins of
//! `2^k` base positions. Tiles at unstored levels aggregate the next finer
//! stored level on the fly.

use crate::container::Container;
use crate::error::{TileError, TileResult};
use crate::payload::DenseBlock;
use crate::types::{TileRect, TilesetInfo, ZoomLevel};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitileMeta {
    pub tile_size: usize,
    pub zoom_step: u32,
    pub max_zoom: ZoomLevel,
    pub max_length: u64,
    pub max_position: u64,
}

impl HitileMeta {
    pub fn max_width(&self) -> u64 {
        self.tile_size as u64 * (1u64 << self.max_zoom)
    }
}

/// Where a zoom level lives in the stored arrays
#[derive(Debug, Clone, PartialEq)]
struct LevelPlan {
    dataset: String,
    /// Stored entries folded into one output value
    num_to_agg: usize,
    /// Entries past this index hold no data
    max_position: usize,
}

pub struct HitileReader {
    container: Box<dyn Container>,
    meta: HitileMeta,
}

impl HitileReader {
    pub fn open(container: Box<dyn Container>) -> TileResult<Self> {
        if !container.exists("meta") {
            return Err(TileError::corrupt("hitile file has no meta group"));
        }
        let required = |name: &str| -> TileResult<i64> {
            container
                .attr_int("meta", name)?
                .ok_or_else(|| TileError::corrupt(format!("hitile meta lacks '{}'", name)))
        };

        let tile_size = required("tile-size")?;
        let max_zoom = required("max-zoom")?;
        let zoom_step = container.attr_int("meta", "zoom-step")?.unwrap_or(1);
        let max_length = required("max-length")?;
        if tile_size <= 0 || !(0..=40).contains(&max_zoom) || zoom_step <= 0 || max_length < 0 {
            return Err(TileError::corrupt("hitile meta attributes out of range"));
        }

        let max_width = tile_size as u64 * (1u64 << max_zoom);
        let max_position = container
            .attr_int("meta", "max-position")?
            .map(|p| p.max(0) as u64)
            .unwrap_or(max_width);

        let meta = HitileMeta {
            tile_size: tile_size as usize,
            zoom_step: zoom_step as u32,
            max_zoom: max_zoom as ZoomLevel,
            max_length: max_length as u64,
            max_position,
        };
        Ok(Self { container, meta })
    }

    pub fn meta(&self) -> &HitileMeta {
        &self.meta
    }

    pub fn info(&self) -> TilesetInfo {
        TilesetInfo {
            min_pos: vec![0.0],
            max_pos: vec![self.meta.max_length as f64],
            max_zoom: self.meta.max_zoom,
            max_width: Some(self.meta.max_width()),
            tile_size: self.meta.tile_size,
            ..Default::default()
        }
    }

    fn plan(&self, zoom: ZoomLevel) -> TileResult<LevelPlan> {
        if zoom > self.meta.max_zoom {
            return Err(TileError::out_of_bounds(format!(
                "zoom {} exceeds max zoom {}",
                zoom, self.meta.max_zoom
            )));
        }
        let rz = self.meta.max_zoom - zoom;
        let stored = self.meta.zoom_step * (rz / self.meta.zoom_step);
        Ok(LevelPlan {
            dataset: format!("values_{}", stored),
            num_to_agg: 1usize << (rz - stored),
            max_position: self.meta.max_position.div_ceil(1u64 << stored) as usize,
        })
    }

    /// Stored entries behind a rectangle of tiles at a level
    fn entry_range(&self, plan: &LevelPlan, rect: &TileRect) -> Range<usize> {
        let per_tile = plan.num_to_agg * self.meta.tile_size;
        rect.x_lo as usize * per_tile..(rect.x_hi as usize + 1) * per_tile
    }

    /// Values for a run of tiles, `tile_size` per tile, one column
    pub fn fetch_rect(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<DenseBlock> {
        let plan = self.plan(zoom)?;
        let range = self.entry_range(&plan, &rect);
        let rows = rect.width() as usize * self.meta.tile_size;

        let readable = range.start.min(plan.max_position)..range.end.min(plan.max_position);
        let raw = if readable.is_empty() {
            Vec::new()
        } else {
            self.container.read_floats(&plan.dataset, readable)?
        };

        let values = aggregate(&raw, plan.num_to_agg, rows);
        Ok(DenseBlock::from_rows(values, rows, 1))
    }

    /// Category labels per tile, keyed by x: exactly `tile_size` per tile,
    /// empty where no category is set
    pub fn fetch_labels(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<Vec<(u64, Vec<String>)>> {
        let plan = self.plan(zoom)?;
        let range = self.entry_range(&plan, &rect);
        let readable = range.start.min(plan.max_position)..range.end.min(plan.max_position);
        let raw = if readable.is_empty() {
            Vec::new()
        } else {
            self.container.read_strings(&plan.dataset, readable)?
        };

        let tile_size = self.meta.tile_size;
        let labels = fold_labels(raw, plan.num_to_agg, rect.width() as usize * tile_size);
        let mut chunks = labels.chunks(tile_size);
        Ok((rect.x_lo..=rect.x_hi)
            .map(|x| (x, chunks.next().map(|c| c.to_vec()).unwrap_or_default()))
            .collect())
    }
}

/// Fold runs of `n` labels into the first non-empty one; runs past the end
/// of `raw` are empty
fn fold_labels(raw: Vec<String>, n: usize, out_len: usize) -> Vec<String> {
    let n = n.max(1);
    let mut out: Vec<String> = raw
        .chunks(n)
        .take(out_len)
        .map(|run| run.iter().find(|l| !l.is_empty()).cloned().unwrap_or_default())
        .collect();
    out.resize(out_len, String::new());
    out
}

/// Fold runs of `n` entries into one value by NaN-ignoring sum.
///
/// A run of only NaN stays NaN. Runs past the end of `raw` are zero.
fn aggregate(raw: &[f64], n: usize, out_len: usize) -> Vec<f32> {
    let n = n.max(1);
    let mut out = Vec::with_capacity(out_len);
    for chunk in raw.chunks(n).take(out_len) {
        let mut sum = 0.0f64;
        let mut seen = false;
        for &v in chunk {
            if !v.is_nan() {
                sum += v;
                seen = true;
            }
        }
        out.push(if seen { sum as f32 } else { f32::NAN });
    }
    out.resize(out_len, 0.0);
    out
}
