//! Grouping requested tiles into rectangles that one read can serve

use crate::error::{TileError, TileResult};
use crate::types::{TileId, TileRect, Transform, ZoomLevel};
use std::collections::BTreeMap;

/// Tiles of one dataset served by a single `fetch_rect`/`fetch_features` call
#[derive(Debug, Clone, PartialEq)]
pub struct TileGroup {
    pub zoom: ZoomLevel,
    pub transform: Transform,
    /// Bounding box of the members
    pub rect: TileRect,
    pub members: Vec<TileId>,
}

impl TileGroup {
    fn from_members(zoom: ZoomLevel, transform: Transform, members: Vec<TileId>) -> Self {
        let first = &members[0];
        let mut rect = TileRect::single(first.x, first.row());
        for id in &members[1..] {
            rect.expand(id.x, id.row());
        }
        Self { zoom, transform, rect, members }
    }

    fn touches(&self, id: &TileId) -> bool {
        self.members.iter().any(|m| chebyshev(m, id) <= 1)
    }
}

fn chebyshev(a: &TileId, b: &TileId) -> u64 {
    a.x.abs_diff(b.x).max(a.row().abs_diff(b.row()))
}

/// Parse raw ids, splitting them into per-dataset lists and parse failures.
///
/// Datasets come out in uid order; ids keep their request order within a dataset.
pub fn group_by_dataset<'a, I>(raw_ids: I) -> (BTreeMap<String, Vec<TileId>>, Vec<(String, TileError)>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut datasets: BTreeMap<String, Vec<TileId>> = BTreeMap::new();
    let mut failures = Vec::new();

    for raw in raw_ids {
        match TileId::parse(raw) {
            Ok(id) => datasets.entry(id.uid.clone()).or_default().push(id),
            Err(e) => failures.push((raw.to_string(), e)),
        }
    }
    (datasets, failures)
}

/// Check every id against the dataset's dimensionality
pub fn check_dimensions(ids: &[TileId], two_dimensional: bool) -> Vec<(TileId, TileResult<()>)> {
    ids.iter()
        .map(|id| {
            let ok = id.y.is_some() == two_dimensional;
            let result = if ok {
                Ok(())
            } else if two_dimensional {
                Err(TileError::malformed(format!("Tile id {} lacks a y index", id.raw)))
            } else {
                Err(TileError::malformed(format!("Tile id {} has a y index on a 1-D dataset", id.raw)))
            };
            (id.clone(), result)
        })
        .collect()
}

/// Bin ids by (zoom, transform), then partition each bin into adjacent groups.
///
/// Within a bin ids are visited in (x, y) order and each joins the first
/// existing group holding a tile within Chebyshev distance 1, so the
/// earliest group wins when several could claim it.
pub fn partition(ids: Vec<TileId>) -> Vec<TileGroup> {
    let mut bins: BTreeMap<(ZoomLevel, Transform), Vec<TileId>> = BTreeMap::new();
    for id in ids {
        bins.entry((id.zoom, id.transform)).or_default().push(id);
    }

    let mut groups = Vec::new();
    for ((zoom, transform), mut ids) in bins {
        ids.sort_by(|a, b| (a.x, a.row(), &a.raw).cmp(&(b.x, b.row(), &b.raw)));

        let mut bin_groups: Vec<TileGroup> = Vec::new();
        for id in ids {
            match bin_groups.iter_mut().find(|g| g.touches(&id)) {
                Some(group) => {
                    group.rect.expand(id.x, id.row());
                    group.members.push(id);
                }
                None => bin_groups.push(TileGroup::from_members(zoom, transform, vec![id])),
            }
        }
        groups.extend(bin_groups);
    }
    groups
}

/// Split a group until its bounding box covers at most `max_tiles` tiles.
///
/// The split is at the midpoint of the longer axis; each half shrinks to
/// the bounding box of its own members.
pub fn split_to_budget(group: TileGroup, max_tiles: u64) -> Vec<TileGroup> {
    let max_tiles = max_tiles.max(1);
    if group.rect.tile_count() <= max_tiles || group.members.len() < 2 {
        return vec![group];
    }

    let TileGroup { zoom, transform, rect, members } = group;
    let (low, high): (Vec<TileId>, Vec<TileId>) = if rect.width() >= rect.height() {
        let mid = rect.x_lo + rect.width() / 2;
        members.into_iter().partition(|id| id.x < mid)
    } else {
        let mid = rect.y_lo + rect.height() / 2;
        members.into_iter().partition(|id| id.row() < mid)
    };

    let mut out = Vec::new();
    for half in [low, high] {
        if !half.is_empty() {
            out.extend(split_to_budget(TileGroup::from_members(zoom, transform, half), max_tiles));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<TileId> {
        raw.iter().map(|r| TileId::parse(r).unwrap()).collect()
    }

    #[test]
    fn test_group_by_dataset_collects_failures() {
        let (datasets, failures) = group_by_dataset(["b.0.0", "a.1.0.0", "bad", "a.1.1.0"]);
        assert_eq!(datasets.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(datasets["a"].len(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");
    }

    #[test]
    fn test_adjacent_tiles_share_a_group() {
        let groups = partition(ids(&["a.2.0.0", "a.2.1.1", "a.2.3.3", "a.2.2.2"]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rect, TileRect { x_lo: 0, x_hi: 3, y_lo: 0, y_hi: 3 });
    }

    #[test]
    fn test_distant_tiles_split() {
        let groups = partition(ids(&["a.3.0.0", "a.3.5.5", "a.3.1.0"]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[1].rect, TileRect::single(5, 5));
    }

    #[test]
    fn test_zoom_and_transform_never_mix() {
        let groups = partition(ids(&["a.1.0.0", "a.1.0.1.KR", "a.2.0.0"]));
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_earliest_group_wins() {
        // (0,0) and (0,2) start separate groups; (1,1) touches both
        let groups = partition(ids(&["a.2.1.1", "a.2.0.2", "a.2.0.0"]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].rect, TileRect { x_lo: 0, x_hi: 1, y_lo: 0, y_hi: 1 });
        assert_eq!(groups[1].rect, TileRect::single(0, 2));

        let groups = partition(ids(&["a.3.0.0", "a.3.4.0", "a.3.2.0", "a.3.3.0"]));
        // (0,0) alone; (2,0) starts a group that (3,0) and (4,0) join
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].rect, TileRect { x_lo: 2, x_hi: 4, y_lo: 0, y_hi: 0 });
    }

    #[test]
    fn test_one_dimensional_ids_use_row_zero() {
        let groups = partition(ids(&["t.4.3", "t.4.4", "t.4.9"]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].rect, TileRect { x_lo: 3, x_hi: 4, y_lo: 0, y_hi: 0 });
    }

    #[test]
    fn test_budget_split_halves_longest_axis() {
        let raw: Vec<String> = (0..8).map(|x| format!("a.4.{}.0", x)).collect();
        let group = partition(raw.iter().map(|r| TileId::parse(r).unwrap()).collect()).remove(0);
        let pieces = split_to_budget(group, 3);
        assert!(pieces.iter().all(|g| g.rect.tile_count() <= 3));
        assert_eq!(pieces.iter().map(|g| g.members.len()).sum::<usize>(), 8);
        assert_eq!(pieces[0].rect.x_lo, 0);
    }

    #[test]
    fn test_dimension_check() {
        let checked = check_dimensions(&ids(&["a.1.0", "a.1.0.0"]), true);
        assert!(matches!(checked[0].1, Err(TileError::Malformed { .. })));
        assert!(checked[1].1.is_ok());
    }
}
