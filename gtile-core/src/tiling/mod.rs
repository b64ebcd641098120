//! Tile batching and per-group rendering

pub mod batch;
pub mod render;

pub use batch::{group_by_dataset, partition, split_to_budget, TileGroup};
pub use render::{plan, render_group, RenderPlan};
