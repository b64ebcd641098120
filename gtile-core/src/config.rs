//! Engine limits and defaults

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Requests served concurrently; further requests wait
    #[serde(default = "default_max_inflight_requests")]
    pub max_inflight_requests: usize,

    /// Open dataset handles kept before idle ones are evicted
    #[serde(default = "default_max_open_handles")]
    pub max_open_handles: usize,

    /// Deadline for one rectangle or fragment group read
    #[serde(default = "default_read_deadline_secs")]
    pub read_deadline_secs: u64,

    /// Largest group bounding box, in tiles (pixels = tiles * tile_size^2)
    #[serde(default = "default_pixel_budget_tiles")]
    pub pixel_budget_tiles: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_max_fragment_dims")]
    pub max_fragment_dims: usize,

    #[serde(default = "default_fragment_dims")]
    pub default_fragment_dims: usize,

    /// Smallest bin size at which cis fragments share one region read
    #[serde(default = "default_cis_bulk_min_bin_size")]
    pub cis_bulk_min_bin_size: u64,
}

fn default_max_inflight_requests() -> usize { 64 }
fn default_max_open_handles() -> usize { 128 }
fn default_read_deadline_secs() -> u64 { 30 }
fn default_pixel_budget_tiles() -> u64 { 16 }
fn default_cache_ttl_secs() -> u64 { 30 * 60 }
fn default_max_fragment_dims() -> usize { 1024 }
fn default_fragment_dims() -> usize { 22 }
fn default_cis_bulk_min_bin_size() -> u64 { 4000 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_inflight_requests: default_max_inflight_requests(),
            max_open_handles: default_max_open_handles(),
            read_deadline_secs: default_read_deadline_secs(),
            pixel_budget_tiles: default_pixel_budget_tiles(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_fragment_dims: default_max_fragment_dims(),
            default_fragment_dims: default_fragment_dims(),
            cis_bulk_min_bin_size: default_cis_bulk_min_bin_size(),
        }
    }
}

impl EngineConfig {
    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Cells a single bulk fragment read may cover
    pub fn bulk_max_cells(&self) -> u64 {
        self.pixel_budget_tiles * (crate::types::MATRIX_TILE_SIZE * crate::types::MATRIX_TILE_SIZE) as u64
    }
}
