//! Synthetic datasets shared by the integration tests

#![allow(dead_code)]

use gtile_core::container::MemoryContainer;
use gtile_core::readers::{reader_from_container, BigWigReader, DatasetOpener, MemorySignal, Reader};
use gtile_core::{ChromSizes, DatasetDescriptor, Engine, EngineConfig, FileType, StaticRegistry, TileError, TileResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Write one cooler resolution under `group` from upper-triangle pixels
pub fn add_cooler_level(
    c: &mut MemoryContainer,
    group: &str,
    chroms: &[(&str, u64)],
    bin_size: u64,
    pixels: &[(u64, u64, f64)],
    weights: Option<Vec<f64>>,
) {
    let path = |rel: &str| if group.is_empty() { rel.to_string() } else { format!("{}/{}", group, rel) };

    let mut offsets = vec![0i64];
    for (_, len) in chroms {
        let last = *offsets.last().unwrap();
        offsets.push(last + len.div_ceil(bin_size) as i64);
    }
    let n_bins = *offsets.last().unwrap() as usize;

    let mut sorted: Vec<(u64, u64, f64)> = pixels
        .iter()
        .map(|&(a, b, v)| (a.min(b), a.max(b), v))
        .collect();
    sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut bin1_offset = vec![0i64; n_bins + 1];
    for &(b1, _, _) in &sorted {
        bin1_offset[b1 as usize + 1] += 1;
    }
    for i in 1..bin1_offset.len() {
        bin1_offset[i] += bin1_offset[i - 1];
    }

    c.add_group(group);
    c.set_attr(group, "bin-size", bin_size as i64);
    c.add_strings(&path("chroms/name"), chroms.iter().map(|(n, _)| *n).collect());
    c.add_ints(&path("chroms/length"), chroms.iter().map(|(_, l)| *l as i64).collect());
    c.add_ints(&path("indexes/chrom_offset"), offsets);
    c.add_ints(&path("indexes/bin1_offset"), bin1_offset);
    c.add_ints(&path("pixels/bin1_id"), sorted.iter().map(|p| p.0 as i64).collect());
    c.add_ints(&path("pixels/bin2_id"), sorted.iter().map(|p| p.1 as i64).collect());
    c.add_floats(&path("pixels/count"), sorted.iter().map(|p| p.2).collect());
    if let Some(w) = weights {
        c.add_floats(&path("bins/weight"), w);
    }
}

/// Upper-triangle pixels of `f` over `n` bins, skipping zeros
pub fn dense_pixels<F: Fn(u64, u64) -> f64>(n: u64, f: F) -> Vec<(u64, u64, f64)> {
    let mut out = Vec::new();
    for i in 0..n {
        for j in i..n {
            let v = f(i, j);
            if v != 0.0 {
                out.push((i, j, v));
            }
        }
    }
    out
}

fn contact(i: u64, j: u64) -> f64 {
    1000.0 / (1.0 + (j - i) as f64) + ((i * 7 + j * 3) % 11) as f64
}

pub const FRAGMENT_CHROMS: [(&str, u64); 2] = [("chr1", 2_500_000_000), ("chr2", 1_000_000_000)];

/// Two-level hierarchical cooler: 100 Mb bins at zoom 0, 50 Mb at zoom 1,
/// dense contacts everywhere, balanced with finite weights
pub fn fragment_cooler() -> MemoryContainer {
    let mut c = MemoryContainer::new();
    c.set_attr("", "max-zoom", 1i64);
    for (zoom, bin_size) in [(0, 100_000_000u64), (1, 50_000_000u64)] {
        let n: u64 = FRAGMENT_CHROMS.iter().map(|(_, l)| l.div_ceil(bin_size)).sum();
        let weights = (0..n).map(|i| 0.5 + (i % 4) as f64 * 0.25).collect();
        add_cooler_level(&mut c, &zoom.to_string(), &FRAGMENT_CHROMS, bin_size, &dense_pixels(n, contact), Some(weights));
    }
    c
}

/// Hierarchical cooler small enough for tile tests: 1 bp bins at zoom 1,
/// 2 bp bins at zoom 0, a contact band three bins wide
pub fn tile_cooler() -> MemoryContainer {
    let chroms = [("chr1", 400u64), ("chr2", 200u64)];
    let mut c = MemoryContainer::new();
    c.set_attr("", "max-zoom", 1i64);
    for (zoom, bin_size) in [(0, 2u64), (1, 1u64)] {
        let n: u64 = chroms.iter().map(|(_, l)| l.div_ceil(bin_size)).sum();
        let pixels = dense_pixels(n, |i, j| if j - i < 3 { 1.0 + ((i + j) % 5) as f64 } else { 0.0 });
        add_cooler_level(&mut c, &zoom.to_string(), &chroms, bin_size, &pixels, None);
    }
    c
}

/// Hitile with tile size 1024 and a ramp signal of 3000 values
pub fn ramp_hitile() -> MemoryContainer {
    let mut c = MemoryContainer::new();
    c.set_attr("meta", "tile-size", 1024i64);
    c.set_attr("meta", "max-zoom", 2i64);
    c.set_attr("meta", "max-length", 3000i64);
    let mut level: Vec<f64> = (0..3000).map(|v| (v % 100) as f64).collect();
    for z in 0..=2 {
        c.add_floats(&format!("values_{}", z), level.clone());
        level = level.chunks(2).map(|p| p.iter().sum()).collect();
    }
    c
}

/// Multivec with three series over two chromosomes at 1 bp and 4 bp
pub fn three_series_multivec() -> MemoryContainer {
    let mut c = MemoryContainer::new();
    c.add_strings("chroms/name", vec!["chr1", "chr2"]);
    c.add_ints("chroms/length", vec![300, 100]);
    c.set_attr("info", "tile-size", 256i64);
    for (res, len1, len2) in [(1u64, 300usize, 100usize), (4, 75, 25)] {
        c.add_floats_2d(&format!("resolutions/{}/values/chr1", res), vec![1.0; len1 * 3], 3);
        c.add_floats_2d(&format!("resolutions/{}/values/chr2", res), vec![2.0; len2 * 3], 3);
    }
    c
}

/// In-memory datasets looked up by descriptor path
#[derive(Default, Clone)]
pub struct MemoryOpener {
    containers: HashMap<PathBuf, MemoryContainer>,
    signals: HashMap<PathBuf, MemorySignal>,
}

impl MemoryOpener {
    pub fn with_container(mut self, path: &str, container: MemoryContainer) -> Self {
        self.containers.insert(PathBuf::from(path), container);
        self
    }

    pub fn with_signal(mut self, path: &str, signal: MemorySignal) -> Self {
        self.signals.insert(PathBuf::from(path), signal);
        self
    }
}

impl DatasetOpener for MemoryOpener {
    fn open(&self, descriptor: &DatasetDescriptor, coords: Option<&ChromSizes>) -> TileResult<Reader> {
        if let Some(signal) = self.signals.get(&descriptor.path) {
            return Ok(Reader::BigWig(BigWigReader::open(Box::new(signal.clone()), coords)?));
        }
        let container = self
            .containers
            .get(&descriptor.path)
            .ok_or_else(|| TileError::not_found(format!("No such file: {}", descriptor.path.display())))?;
        reader_from_container(descriptor.filetype, Box::new(container.clone()))
    }
}

/// Engine over the standard fixtures:
/// `frag` (fragment cooler), `mat` (tile cooler), `track` (hitile),
/// `mv` (multivec), `sig` (bigwig-like)
pub fn fixture_engine(config: EngineConfig) -> Engine {
    fixture_builder().config(config).build()
}

pub fn fixture_builder() -> gtile_core::EngineBuilder {
    let registry = StaticRegistry::new([
        DatasetDescriptor::new("frag", FileType::Cooler, "/mem/frag.cool"),
        DatasetDescriptor::new("mat", FileType::Cooler, "/mem/mat.cool"),
        DatasetDescriptor::new("track", FileType::Hitile, "/mem/track.hitile"),
        DatasetDescriptor::new("mv", FileType::Multivec, "/mem/mv.mv5"),
        DatasetDescriptor::new("sig", FileType::Bigwig, "/mem/sig.bw"),
    ]);
    let opener = MemoryOpener::default()
        .with_container("/mem/frag.cool", fragment_cooler())
        .with_container("/mem/mat.cool", tile_cooler())
        .with_container("/mem/track.hitile", ramp_hitile())
        .with_container("/mem/mv.mv5", three_series_multivec())
        .with_signal("/mem/sig.bw", MemorySignal::new().with_chrom("chr1", (0..5000).map(|v| v as f32).collect()));

    Engine::builder(Arc::new(registry)).opener(Arc::new(opener))
}
