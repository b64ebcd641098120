//! gtile core library
//!
//! Tile generation and fragment extraction for genomic contact matrices,
//! 1-D tracks, multivec profiles and interval databases.

pub mod cache;
pub mod config;
pub mod container;
pub mod coords;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod fragments;
pub mod handles;
pub mod payload;
pub mod readers;
pub mod registry;
pub mod tiling;
pub mod types;

// Re-export commonly used types and functions
pub use cache::{CacheFacade, CacheStore, MemoryCache};
pub use config::EngineConfig;
pub use coords::{BinIndex, ChromSizes};
pub use encoding::{decode_dense, encode_dense, DenseTile, Dtype};
pub use engine::{Engine, EngineBuilder, InfoResponse};
pub use error::{TileError, TileResult};
pub use fragments::{FragmentOptions, FragmentResult, FragmentsResponse};
pub use payload::{Feature, TilePayload, TileResponse};
pub use readers::{DatasetOpener, FileOpener, Reader};
pub use registry::{ChromsizesCatalog, Registry, StaticCatalog, StaticRegistry};
pub use types::{DatasetDescriptor, FileType, TileId, TilesetInfo, Transform};

/// Version information for the gtile core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
