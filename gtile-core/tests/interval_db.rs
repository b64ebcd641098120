use gtile_core::{
    DatasetDescriptor, Engine, Feature, FileType, InfoResponse, StaticRegistry, TilePayload, TileResponse,
};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_beddb(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tileset_info (zoom_step INT, max_length INT, assembly TEXT, chrom_names TEXT, \
             chrom_sizes TEXT, tile_size REAL, max_zoom INT, max_width REAL, header TEXT);
         INSERT INTO tileset_info VALUES (1, 4000, 'test', 'chr1', '4000', 1024, 2, 4096, 'chrom\tstart\tend\tname');
         CREATE TABLE intervals (id INT PRIMARY KEY, zoomLevel INT, importance REAL, startPos INT, endPos INT, \
             chrOffset INT, uid TEXT, fields TEXT);
         CREATE TABLE position_index (id INT, rStartPos INT, rEndPos INT);
         INSERT INTO intervals VALUES (1, 0, 9.0, 100, 300, 0, 'g1', 'chr1\t100\t300\tALPHA');
         INSERT INTO intervals VALUES (2, 2, 1.0, 1000, 1100, 0, 'g2', 'chr1\t1000\t1100\tBETA');
         INSERT INTO intervals VALUES (3, 1, 4.0, 2100, 3500, 0, 'g3', 'chr1\t2100\t3500\tGAMMA');
         INSERT INTO position_index VALUES (1, 100, 300);
         INSERT INTO position_index VALUES (2, 1000, 1100);
         INSERT INTO position_index VALUES (3, 2100, 3500);",
    )
    .unwrap();
}

fn write_bed2ddb(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tileset_info (zoom_step INT, max_length INT, assembly TEXT, chrom_names TEXT, \
             chrom_sizes TEXT, tile_size REAL, max_zoom INT, max_width REAL);
         INSERT INTO tileset_info VALUES (1, 2000, 'test', 'chr1', '2000', 256, 1, 2048);
         CREATE TABLE intervals (id INT PRIMARY KEY, zoomLevel INT, importance REAL, fromX INT, toX INT, \
             fromY INT, toY INT, chrOffset INT, uid TEXT, fields TEXT);
         CREATE TABLE position_index (id INT, rFromX INT, rToX INT, rFromY INT, rToY INT);
         INSERT INTO intervals VALUES (1, 0, 1.0, 100, 200, 1500, 1600, 0, 'loop', 'chr1\t100\t200');
         INSERT INTO position_index VALUES (1, 100, 200, 1500, 1600);",
    )
    .unwrap();
}

fn engine(dir: &TempDir) -> Engine {
    let genes = dir.path().join("genes.beddb");
    let loops = dir.path().join("loops.bed2ddb");
    write_beddb(&genes);
    write_bed2ddb(&loops);

    let registry = StaticRegistry::new([
        DatasetDescriptor::new("genes", FileType::Beddb, genes),
        DatasetDescriptor::new("loops", FileType::Bed2ddb, loops),
        DatasetDescriptor::new("gone", FileType::Beddb, dir.path().join("gone.beddb")),
    ]);
    Engine::builder(Arc::new(registry)).build()
}

fn features(response: &TileResponse) -> &[Feature] {
    match response {
        TileResponse::Tile(TilePayload::Features(features)) => features,
        other => panic!("expected features, got {:?}", other),
    }
}

fn interval_uids(response: &TileResponse) -> Vec<&str> {
    features(response)
        .iter()
        .map(|f| match f {
            Feature::Interval(rec) => rec.uid.as_str(),
            other => panic!("expected an interval, got {:?}", other),
        })
        .collect()
}

#[tokio::test]
async fn test_beddb_tiles_follow_zoom_levels() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);

    let tiles = engine.tiles(&["genes.0.0", "genes.1.0", "genes.1.1", "genes.2.0", "genes.2.3"]).await;
    assert_eq!(interval_uids(&tiles["genes.0.0"]), vec!["g1"]);
    assert_eq!(interval_uids(&tiles["genes.1.0"]), vec!["g1"]);
    assert_eq!(interval_uids(&tiles["genes.1.1"]), vec!["g3"]);

    // zoom 2 tiles are 1024 wide
    let mut first = interval_uids(&tiles["genes.2.0"]);
    first.sort();
    assert_eq!(first, vec!["g1", "g2"]);
    assert_eq!(interval_uids(&tiles["genes.2.3"]), vec!["g3"]);
}

#[tokio::test]
async fn test_beddb_info_and_missing_file() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);

    let info = engine.tileset_info(&["genes", "gone"]).await;
    let InfoResponse::Info(genes) = &info["genes"] else { panic!("beddb info expected") };
    assert_eq!(genes.max_zoom, 2);
    assert_eq!(genes.max_width, Some(4096));
    assert_eq!(genes.header.as_deref(), Some("chrom\tstart\tend\tname"));

    let InfoResponse::Error { error } = &info["gone"] else { panic!("missing file should fail") };
    assert!(error.starts_with("No such file"));

    let tiles = engine.tiles(&["gone.0.0"]).await;
    assert!(tiles["gone.0.0"].is_error());
}

#[tokio::test]
async fn test_bed2ddb_rect_tiles() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);

    // zoom 1 tiles are 1024 wide: the record sits in column 0, row 1
    let tiles = engine.tiles(&["loops.1.0.1", "loops.1.0.0", "loops.1.1.1", "loops.1.0"]).await;
    assert_eq!(features(&tiles["loops.1.0.1"]).len(), 1);
    assert!(features(&tiles["loops.1.0.0"]).is_empty());
    assert!(features(&tiles["loops.1.1.1"]).is_empty());
    // 1-D ids do not address a 2-D dataset
    assert!(tiles["loops.1.0"].is_error());

    match &features(&tiles["loops.1.0.1"])[0] {
        Feature::Rect(rec) => {
            assert_eq!(rec.uid, "loop");
            assert_eq!((rec.y_start, rec.y_end), (1500.0, 1600.0));
        }
        other => panic!("expected a rectangle, got {:?}", other),
    }
}
