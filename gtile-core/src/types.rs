use crate::error::{TileError, TileResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub type ZoomLevel = u32;
pub type TileIndex = u64;

/// Side length of a 2-D matrix tile
pub const MATRIX_TILE_SIZE: usize = 256;
/// Length of a 1-D track tile
pub const TRACK_TILE_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Cooler,
    Hitile,
    Bigwig,
    Multivec,
    Beddb,
    Bed2ddb,
    Hibed,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Cooler => "cooler",
            FileType::Hitile => "hitile",
            FileType::Bigwig => "bigwig",
            FileType::Multivec => "multivec",
            FileType::Beddb => "beddb",
            FileType::Bed2ddb => "bed2ddb",
            FileType::Hibed => "hibed",
        }
    }

    /// Whether tiles of this filetype are addressed by (x, y)
    pub fn is_two_dimensional(&self) -> bool {
        matches!(self, FileType::Cooler | FileType::Bed2ddb)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = TileError;

    fn from_str(s: &str) -> TileResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cooler" => Ok(FileType::Cooler),
            "hitile" => Ok(FileType::Hitile),
            "bigwig" => Ok(FileType::Bigwig),
            "multivec" => Ok(FileType::Multivec),
            "beddb" => Ok(FileType::Beddb),
            "bed2ddb" => Ok(FileType::Bed2ddb),
            "hibed" => Ok(FileType::Hibed),
            other => Err(TileError::unsupported(format!("Unknown filetype: {}", other))),
        }
    }
}

/// Registry entry for one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub uid: String,
    pub filetype: FileType,
    pub path: PathBuf,
    #[serde(default, alias = "coordSystem", skip_serializing_if = "Option::is_none")]
    pub coord_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DatasetDescriptor {
    pub fn new<U: Into<String>, P: Into<PathBuf>>(uid: U, filetype: FileType, path: P) -> Self {
        Self {
            uid: uid.into(),
            filetype,
            path: path.into(),
            coord_system: None,
            datatype: None,
            name: None,
        }
    }

    pub fn with_coord_system<S: Into<String>>(mut self, name: S) -> Self {
        self.coord_system = Some(name.into());
        self
    }
}

/// Normalization applied to matrix cells before extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Transform {
    #[default]
    Default,
    Weight,
    Kr,
    Vc,
    VcSqrt,
}

impl Transform {
    pub const ALL: [Transform; 5] = [
        Transform::Default,
        Transform::Weight,
        Transform::Kr,
        Transform::Vc,
        Transform::VcSqrt,
    ];

    /// Name used in tile ids and as the weight column name
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::Default => "default",
            Transform::Weight => "weight",
            Transform::Kr => "KR",
            Transform::Vc => "VC",
            Transform::VcSqrt => "VC_SQRT",
        }
    }

    /// Display name reported in tileset info
    pub fn label(&self) -> &'static str {
        match self {
            Transform::Default => "default",
            Transform::Weight => "ICE",
            Transform::Kr => "KR",
            Transform::Vc => "VC",
            Transform::VcSqrt => "VC_SQRT",
        }
    }

    /// Weights of divisive transforms divide the raw count instead of scaling it
    pub fn is_divisive(&self) -> bool {
        matches!(self, Transform::Kr | Transform::Vc | Transform::VcSqrt)
    }

    /// Unknown names fall back to `Default`
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "weight" => Transform::Weight,
            "KR" => Transform::Kr,
            "VC" => Transform::Vc,
            "VC_SQRT" => Transform::VcSqrt,
            "default" | "none" => Transform::Default,
            other => {
                log::debug!("Unknown transform '{}', using default", other);
                Transform::Default
            }
        }
    }
}

/// A parsed `uid.z.x[.y[.transform]]` tile identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileId {
    /// The id exactly as requested; responses are keyed by it
    pub raw: String,
    pub uid: String,
    pub zoom: ZoomLevel,
    pub x: TileIndex,
    pub y: Option<TileIndex>,
    pub transform: Transform,
}

impl TileId {
    pub fn parse(raw: &str) -> TileResult<Self> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() < 3 || parts.len() > 5 || parts[0].is_empty() {
            return Err(TileError::malformed(format!("Malformed tile id: {}", raw)));
        }

        let number = |s: &str| -> TileResult<u64> {
            s.parse::<u64>()
                .map_err(|_| TileError::malformed(format!("Malformed tile id: {}", raw)))
        };

        let zoom = number(parts[1])?;
        let zoom = ZoomLevel::try_from(zoom)
            .map_err(|_| TileError::malformed(format!("Malformed tile id: {}", raw)))?;
        let x = number(parts[2])?;
        let y = parts.get(3).map(|s| number(s)).transpose()?;
        let transform = parts
            .get(4)
            .map(|s| Transform::parse_lenient(s))
            .unwrap_or_default();

        Ok(Self {
            raw: raw.to_string(),
            uid: parts[0].to_string(),
            zoom,
            x,
            y,
            transform,
        })
    }

    /// y index, treating 1-D tiles as row 0
    pub fn row(&self) -> TileIndex {
        self.y.unwrap_or(0)
    }
}

/// Inclusive rectangle of tile indices at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub x_lo: TileIndex,
    pub x_hi: TileIndex,
    pub y_lo: TileIndex,
    pub y_hi: TileIndex,
}

impl TileRect {
    pub fn single(x: TileIndex, y: TileIndex) -> Self {
        Self { x_lo: x, x_hi: x, y_lo: y, y_hi: y }
    }

    pub fn width(&self) -> u64 {
        self.x_hi - self.x_lo + 1
    }

    pub fn height(&self) -> u64 {
        self.y_hi - self.y_lo + 1
    }

    pub fn tile_count(&self) -> u64 {
        self.width() * self.height()
    }

    pub fn contains(&self, x: TileIndex, y: TileIndex) -> bool {
        x >= self.x_lo && x <= self.x_hi && y >= self.y_lo && y <= self.y_hi
    }

    pub fn expand(&mut self, x: TileIndex, y: TileIndex) {
        self.x_lo = self.x_lo.min(x);
        self.x_hi = self.x_hi.max(x);
        self.y_lo = self.y_lo.min(y);
        self.y_hi = self.y_hi.max(y);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformInfo {
    pub name: String,
    pub value: String,
}

impl From<Transform> for TransformInfo {
    fn from(t: Transform) -> Self {
        Self { name: t.label().to_string(), value: t.as_str().to_string() }
    }
}

/// Dataset extent and zoom structure reported to clients
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TilesetInfo {
    pub min_pos: Vec<f64>,
    pub max_pos: Vec<f64>,
    pub max_zoom: ZoomLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u64>,
    pub tile_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins_per_dimension: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolutions: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<TransformInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromsizes: Option<Vec<(String, u64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_infos: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl TilesetInfo {
    /// Bin size at a zoom level, from explicit resolutions or from `max_width`
    pub fn resolution_at(&self, zoom: ZoomLevel) -> Option<u64> {
        if zoom > self.max_zoom {
            return None;
        }
        match (&self.resolutions, self.max_width) {
            (Some(resolutions), _) => {
                let mut ascending = resolutions.clone();
                ascending.sort_unstable();
                ascending.reverse();
                // zoom 0 is the largest bin size
                ascending.get(zoom as usize).copied()
            }
            (None, Some(max_width)) => {
                let tile_width = max_width >> zoom;
                Some((tile_width / self.tile_size.max(1) as u64).max(1))
            }
            (None, None) => None,
        }
    }

    /// Width covered by one tile at a zoom level, in dataset coordinates
    pub fn tile_width(&self, zoom: ZoomLevel) -> Option<f64> {
        if zoom > self.max_zoom {
            return None;
        }
        match (&self.resolutions, self.max_width) {
            (None, Some(max_width)) => Some(max_width as f64 / 2f64.powi(zoom as i32)),
            _ => self.resolution_at(zoom).map(|r| (r * self.tile_size as u64) as f64),
        }
    }

    /// Whether a tile lies inside the dataset's declared extent
    pub fn contains_tile(&self, zoom: ZoomLevel, x: TileIndex, y: Option<TileIndex>) -> bool {
        let Some(width) = self.tile_width(zoom) else { return false };
        let inside = |axis: usize, index: TileIndex| {
            let extent = match (self.max_pos.get(axis), self.min_pos.get(axis)) {
                (Some(max), Some(min)) => max - min,
                (Some(max), None) => *max,
                _ => return true,
            };
            (index as f64) * width < extent
        };
        inside(0, x) && y.map_or(true, |y| inside(1, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_dimensional_tile_id() {
        let id = TileId::parse("abc.3.1.2.KR").unwrap();
        assert_eq!(id.uid, "abc");
        assert_eq!(id.zoom, 3);
        assert_eq!(id.x, 1);
        assert_eq!(id.y, Some(2));
        assert_eq!(id.transform, Transform::Kr);
        assert_eq!(id.raw, "abc.3.1.2.KR");
    }

    #[test]
    fn test_parse_one_dimensional_tile_id() {
        let id = TileId::parse("track.0.0").unwrap();
        assert_eq!(id.y, None);
        assert_eq!(id.row(), 0);
        assert_eq!(id.transform, Transform::Default);
    }

    #[test]
    fn test_unknown_transform_falls_back() {
        let id = TileId::parse("abc.1.0.0.bogus").unwrap();
        assert_eq!(id.transform, Transform::Default);
    }

    #[test]
    fn test_malformed_tile_ids() {
        for raw in ["abc", "abc.1", ".1.0", "abc.x.0", "abc.1.-1", "abc.1.0.0.KR.extra"] {
            assert!(matches!(TileId::parse(raw), Err(TileError::Malformed { .. })), "{}", raw);
        }
    }

    #[test]
    fn test_resolution_from_max_width() {
        let info = TilesetInfo {
            max_zoom: 2,
            max_width: Some(256 * 1000 * 4),
            tile_size: 256,
            ..Default::default()
        };
        assert_eq!(info.resolution_at(0), Some(4000));
        assert_eq!(info.resolution_at(2), Some(1000));
        assert_eq!(info.resolution_at(3), None);
    }

    #[test]
    fn test_resolution_from_list() {
        let info = TilesetInfo {
            max_zoom: 2,
            tile_size: 256,
            resolutions: Some(vec![1000, 10000, 5000]),
            ..Default::default()
        };
        assert_eq!(info.resolution_at(0), Some(10000));
        assert_eq!(info.resolution_at(2), Some(1000));
        assert_eq!(info.tile_width(1), Some(5000.0 * 256.0));
    }

    #[test]
    fn test_contains_tile() {
        let info = TilesetInfo {
            min_pos: vec![0.0, 0.0],
            max_pos: vec![1000.0, 1000.0],
            max_zoom: 1,
            max_width: Some(2048),
            tile_size: 256,
            ..Default::default()
        };
        assert!(info.contains_tile(1, 0, Some(0)));
        assert!(!info.contains_tile(1, 1, Some(0)));
        assert!(!info.contains_tile(2, 0, Some(0)));
        assert!(info.contains_tile(0, 0, None));
    }

    #[test]
    fn test_filetype_parsing() {
        assert_eq!("Cooler".parse::<FileType>().unwrap(), FileType::Cooler);
        assert!(matches!("bam".parse::<FileType>(), Err(TileError::Unsupported { .. })));
    }
}
