//! Turning one tile group into per-tile payloads

use super::batch::{check_dimensions, partition, split_to_budget, TileGroup};
use crate::encoding::encode_dense;
use crate::error::{TileError, TileResult};
use crate::payload::{DenseBlock, TilePayload};
use crate::readers::Reader;
use crate::types::{TileId, TilesetInfo};
use rayon::prelude::*;

/// Work for one dataset: the groups to read and the ids already answered
#[derive(Debug, Default)]
pub struct RenderPlan {
    pub groups: Vec<TileGroup>,
    pub rejected: Vec<(String, TileError)>,
    /// Ids outside the dataset; omitted from the response
    pub dropped: Vec<String>,
}

/// Validate, bound-check and group a dataset's tile ids.
///
/// `budget_tiles` caps the tile count of any group's bounding box.
pub fn plan(reader: &Reader, info: &TilesetInfo, ids: Vec<TileId>, budget_tiles: u64) -> RenderPlan {
    let mut out = RenderPlan::default();
    let two_dimensional = reader.filetype().is_two_dimensional();

    let mut accepted = Vec::with_capacity(ids.len());
    for (id, check) in check_dimensions(&ids, two_dimensional) {
        if let Err(e) = check {
            out.rejected.push((id.raw, e));
        } else if !reader.contains_tile(info, id.zoom, id.x, id.y) {
            log::debug!("Tile {} lies outside the dataset, omitting", id.raw);
            out.dropped.push(id.raw);
        } else {
            accepted.push(id);
        }
    }

    out.groups = partition(accepted)
        .into_iter()
        .flat_map(|g| split_to_budget(g, budget_tiles))
        .collect();
    out
}

/// Read one group and cut it into the payloads of its members
pub fn render_group(reader: &Reader, info: &TilesetInfo, group: &TileGroup) -> TileResult<Vec<(String, TilePayload)>> {
    if reader.is_dense() {
        let block = reader.fetch_rect(group.zoom, group.rect, group.transform)?;
        Ok(slice_dense(reader, info, group, &block))
    } else {
        let tiles = reader.fetch_features(group.zoom, group.rect)?;
        Ok(group
            .members
            .iter()
            .map(|id| {
                let features = tiles.get(&(id.x, id.row())).cloned().unwrap_or_default();
                (id.raw.clone(), TilePayload::Features(features))
            })
            .collect())
    }
}

fn slice_dense(reader: &Reader, info: &TilesetInfo, group: &TileGroup, block: &DenseBlock) -> Vec<(String, TilePayload)> {
    let ts = info.tile_size;
    let rect = group.rect;
    let two_dimensional = reader.filetype().is_two_dimensional();
    let shape = match reader {
        Reader::Multivec(r) => Some(vec![ts, r.n_series()]),
        _ => None,
    };

    group
        .members
        .par_iter()
        .map(|id| {
            let values = if two_dimensional {
                let r0 = (id.row() - rect.y_lo) as usize * ts;
                let c0 = (id.x - rect.x_lo) as usize * ts;
                block.slice(r0..r0 + ts, c0..c0 + ts)
            } else {
                let r0 = (id.x - rect.x_lo) as usize * ts;
                block.slice(r0..r0 + ts, 0..block.cols)
            };
            (id.raw.clone(), TilePayload::Dense(encode_dense(&values, shape.clone())))
        })
        .collect()
}
