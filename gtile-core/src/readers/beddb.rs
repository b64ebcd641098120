//! SQLite interval databases: 1-D `beddb` and 2-D `bed2ddb`
//!
//! Both files carry a one-row `tileset_info` table, an `intervals` table and
//! an R*-tree `position_index` joined on `id`. A record is returned for every
//! tile it overlaps, at every zoom level at or below its own `zoomLevel`.

use crate::error::{TileError, TileResult};
use crate::payload::{Feature, IntervalRecord, RectRecord};
use crate::types::{TileRect, TilesetInfo, ZoomLevel};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::Path;

/// Features per tile, keyed by `(x, y)`; 1-D tiles use `y = 0`
pub type FeatureTiles = BTreeMap<(u64, u64), Vec<Feature>>;

fn open_read_only(path: &Path) -> TileResult<Connection> {
    if !path.exists() {
        return Err(TileError::not_found(format!("No such file: {}", path.display())));
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
    Ok(conn)
}

/// Contents of the `tileset_info` row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbInfo {
    pub zoom_step: i64,
    pub max_length: i64,
    pub assembly: Option<String>,
    pub tile_size: i64,
    pub max_zoom: ZoomLevel,
    pub max_width: f64,
    pub header: Option<String>,
}

fn read_db_info(conn: &Connection) -> TileResult<DbInfo> {
    let columns = table_columns(conn, "tileset_info")?;
    if columns.is_empty() {
        return Err(TileError::corrupt("missing tileset_info table"));
    }
    let has = |name: &str| columns.iter().any(|c| c == name);

    let select: Vec<&str> = ["zoom_step", "max_length", "assembly", "tile_size", "max_zoom", "max_width", "header"]
        .into_iter()
        .map(|c| if has(c) { c } else { "NULL" })
        .collect();
    let sql = format!("SELECT {} FROM tileset_info LIMIT 1", select.join(", "));

    let info = conn
        .query_row(&sql, [], |row| {
            Ok(DbInfo {
                zoom_step: row.get::<_, Option<f64>>(0)?.unwrap_or(1.0) as i64,
                max_length: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0) as i64,
                assembly: row.get(2)?,
                tile_size: row.get::<_, Option<f64>>(3)?.unwrap_or(1024.0) as i64,
                max_zoom: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0).clamp(0.0, 64.0) as ZoomLevel,
                max_width: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                header: row.get(6)?,
            })
        })
        .optional()?
        .ok_or_else(|| TileError::corrupt("tileset_info table is empty"))?;
    Ok(info)
}

fn table_columns(conn: &Connection, table: &str) -> TileResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn tile_width(info: &DbInfo, zoom: ZoomLevel) -> f64 {
    info.max_width / 2f64.powi(zoom as i32)
}

fn split_fields(fields: Option<String>) -> Vec<String> {
    fields
        .map(|f| f.split('\t').map(str::to_string).collect())
        .unwrap_or_default()
}

/// SQLite `uid` columns may hold text or blobs
fn uid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Null => String::new(),
    })
}

pub struct BeddbReader {
    conn: Mutex<Connection>,
    info: DbInfo,
}

impl BeddbReader {
    pub fn open(path: &Path) -> TileResult<Self> {
        let conn = open_read_only(path)?;
        let info = read_db_info(&conn)?;
        Ok(Self { conn: Mutex::new(conn), info })
    }

    pub fn from_connection(conn: Connection) -> TileResult<Self> {
        let info = read_db_info(&conn)?;
        Ok(Self { conn: Mutex::new(conn), info })
    }

    pub fn info(&self) -> TilesetInfo {
        TilesetInfo {
            min_pos: vec![0.0],
            max_pos: vec![self.info.max_length as f64],
            max_zoom: self.info.max_zoom,
            max_width: Some(self.info.max_width.max(0.0) as u64),
            tile_size: self.info.tile_size.max(1) as usize,
            header: self.info.header.clone(),
            ..Default::default()
        }
    }

    pub fn fetch_features(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<FeatureTiles> {
        let width = tile_width(&self.info, zoom);
        let start = rect.x_lo as f64 * width;
        let end = (rect.x_hi + 1) as f64 * width;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT startPos, endPos, chrOffset, importance, fields, uid \
             FROM intervals, position_index \
             WHERE intervals.id = position_index.id \
             AND zoomLevel <= ?1 AND rEndPos >= ?2 AND rStartPos <= ?3",
        )?;
        let records = stmt
            .query_map(rusqlite::params![zoom as i64, start, end], |row| {
                Ok(IntervalRecord {
                    x_start: row.get(0)?,
                    x_end: row.get(1)?,
                    chr_offset: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    importance: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    fields: split_fields(row.get(4)?),
                    uid: uid_at(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tiles: FeatureTiles = (rect.x_lo..=rect.x_hi).map(|x| ((x, 0), Vec::new())).collect();
        for record in records {
            for x in rect.x_lo..=rect.x_hi {
                let tile_start = x as f64 * width;
                let tile_end = tile_start + width;
                if (record.x_start as f64) < tile_end && (record.x_end as f64) >= tile_start {
                    if let Some(list) = tiles.get_mut(&(x, 0)) {
                        list.push(Feature::Interval(record.clone()));
                    }
                }
            }
        }
        Ok(tiles)
    }
}

/// How a 2-D database indexes its records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectLayout {
    /// `rFromX, rToX, rFromY, rToY` in genome coordinates
    Genomic,
    /// `rMinLng, rMaxLng, rMinLat, rMaxLat` in degrees
    Geo,
}

pub struct Bed2ddbReader {
    conn: Mutex<Connection>,
    info: DbInfo,
    layout: RectLayout,
}

impl Bed2ddbReader {
    pub fn open(path: &Path) -> TileResult<Self> {
        Self::from_connection(open_read_only(path)?)
    }

    pub fn from_connection(conn: Connection) -> TileResult<Self> {
        let info = read_db_info(&conn)?;
        let columns = table_columns(&conn, "position_index")?;
        let layout = if columns.iter().any(|c| c == "rMinLng") {
            RectLayout::Geo
        } else if columns.iter().any(|c| c == "rFromX") {
            RectLayout::Genomic
        } else {
            return Err(TileError::corrupt("position_index has neither genomic nor lng/lat columns"));
        };
        log::debug!("bed2ddb index layout {:?}", layout);
        Ok(Self { conn: Mutex::new(conn), info, layout })
    }

    pub fn layout(&self) -> RectLayout {
        self.layout
    }

    pub fn info(&self) -> TilesetInfo {
        let (min_pos, max_pos, max_width) = match self.layout {
            RectLayout::Genomic => {
                let len = self.info.max_length as f64;
                (vec![0.0, 0.0], vec![len, len], self.info.max_width.max(0.0) as u64)
            }
            RectLayout::Geo => (vec![-180.0, -90.0], vec![180.0, 90.0], 360),
        };
        TilesetInfo {
            min_pos,
            max_pos,
            max_zoom: self.info.max_zoom,
            max_width: Some(max_width),
            tile_size: self.info.tile_size.max(1) as usize,
            header: self.info.header.clone(),
            ..Default::default()
        }
    }

    /// Whether a tile index is addressable at a zoom level
    pub fn contains_tile(&self, info: &TilesetInfo, zoom: ZoomLevel, x: u64, y: u64) -> bool {
        match self.layout {
            RectLayout::Genomic => info.contains_tile(zoom, x, Some(y)),
            RectLayout::Geo => {
                let side = 1u64.checked_shl(zoom).unwrap_or(u64::MAX);
                zoom <= info.max_zoom && x < side && y < side
            }
        }
    }

    pub fn fetch_features(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<FeatureTiles> {
        match self.layout {
            RectLayout::Genomic => self.fetch_genomic(zoom, rect),
            RectLayout::Geo => self.fetch_geo(zoom, rect),
        }
    }

    fn empty_tiles(rect: &TileRect) -> FeatureTiles {
        let mut tiles = FeatureTiles::new();
        for x in rect.x_lo..=rect.x_hi {
            for y in rect.y_lo..=rect.y_hi {
                tiles.insert((x, y), Vec::new());
            }
        }
        tiles
    }

    fn fetch_genomic(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<FeatureTiles> {
        let width = tile_width(&self.info, zoom);
        let (x0, x1) = (rect.x_lo as f64 * width, (rect.x_hi + 1) as f64 * width);
        let (y0, y1) = (rect.y_lo as f64 * width, (rect.y_hi + 1) as f64 * width);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT fromX, toX, fromY, toY, chrOffset, importance, fields, uid \
             FROM intervals, position_index \
             WHERE intervals.id = position_index.id \
             AND zoomLevel <= ?1 AND rToX >= ?2 AND rFromX <= ?3 AND rToY >= ?4 AND rFromY <= ?5",
        )?;
        let records = stmt
            .query_map(rusqlite::params![zoom as i64, x0, x1, y0, y1], |row| {
                Ok(RectRecord {
                    x_start: row.get(0)?,
                    x_end: row.get(1)?,
                    y_start: row.get(2)?,
                    y_end: row.get(3)?,
                    chr_offset: row.get(4)?,
                    importance: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                    fields: Some(split_fields(row.get(6)?)),
                    uid: uid_at(row, 7)?,
                    geometry: None,
                    properties: None,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tiles = Self::empty_tiles(&rect);
        for record in records {
            for ((x, y), list) in tiles.iter_mut() {
                let (tx0, ty0) = (*x as f64 * width, *y as f64 * width);
                let (tx1, ty1) = (tx0 + width, ty0 + width);
                if record.x_start < tx1 && record.x_end >= tx0 && record.y_start < ty1 && record.y_end >= ty0 {
                    list.push(Feature::Rect(record.clone()));
                }
            }
        }
        Ok(tiles)
    }

    fn fetch_geo(&self, zoom: ZoomLevel, rect: TileRect) -> TileResult<FeatureTiles> {
        let (lng_from, lat_from) = num2deg(rect.x_lo, rect.y_lo, zoom);
        let (lng_to, lat_to) = num2deg(rect.x_hi + 1, rect.y_hi + 1, zoom);

        let conn = self.conn.lock();
        // latitude shrinks as y grows, so the query's "from" latitude is the upper bound
        let mut stmt = conn.prepare_cached(
            "SELECT minLng, maxLng, maxLat, minLat, uid, importance, geometry, properties \
             FROM intervals, position_index \
             WHERE intervals.id = position_index.id \
             AND zoomLevel <= ?1 AND rMaxLng >= ?2 AND rMinLng <= ?3 AND rMinLat <= ?4 AND rMaxLat >= ?5",
        )?;
        let records = stmt
            .query_map(rusqlite::params![zoom as i64, lng_from, lng_to, lat_from, lat_to], |row| {
                let geometry: Option<String> = row.get(6)?;
                let properties: Option<String> = row.get(7)?;
                Ok((
                    RectRecord {
                        x_start: row.get(0)?,
                        x_end: row.get(1)?,
                        y_start: row.get(2)?,
                        y_end: row.get(3)?,
                        uid: uid_at(row, 4)?,
                        importance: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                        chr_offset: None,
                        fields: None,
                        geometry: None,
                        properties: None,
                    },
                    geometry,
                    properties,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tiles = Self::empty_tiles(&rect);
        for (mut record, geometry, properties) in records {
            record.geometry = geometry.map(|g| serde_json::from_str(&g)).transpose()?;
            record.properties = properties.map(|p| serde_json::from_str(&p)).transpose()?;
            // y_start is the max latitude, y_end the min
            let (min_lng, max_lng, max_lat, min_lat) = (record.x_start, record.x_end, record.y_start, record.y_end);
            for ((x, y), list) in tiles.iter_mut() {
                let (west, north) = num2deg(*x, *y, zoom);
                let (east, south) = num2deg(*x + 1, *y + 1, zoom);
                if max_lng >= west && min_lng <= east && min_lat <= north && max_lat >= south {
                    list.push(Feature::Rect(record.clone()));
                }
            }
        }
        Ok(tiles)
    }
}

/// Web-mercator tile corner to `(longitude, latitude)` in degrees
pub fn num2deg(x: u64, y: u64, zoom: ZoomLevel) -> (f64, f64) {
    let n = 2f64.powi(zoom as i32);
    let lng = x as f64 / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan().to_degrees();
    (lng, lat)
}
