//! Coordinate model: absolute genome positions, chromosome offsets and bins
//!
//! A coordinate system is an ordered chromosome list. Absolute positions
//! concatenate the chromosomes in that order, so `C[i]` (the cumulative
//! length before chromosome `i`) maps chromosome-local offsets onto one axis.
//! Intervals are half-open: a position equal to `C[i+1]` belongs to
//! chromosome `i+1`.

use crate::error::{TileError, TileResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type GenomicPos = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromInfo {
    pub name: String,
    pub length: GenomicPos,
    /// Absolute position of the first base
    pub offset: GenomicPos,
}

/// Ordered chromosome list with its cumulative-length index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChromSizes {
    chroms: Vec<ChromInfo>,
    cumulative: Vec<GenomicPos>,
    index: HashMap<String, usize>,
}

impl ChromSizes {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, GenomicPos)>,
        S: Into<String>,
    {
        let mut chroms = Vec::new();
        let mut cumulative = vec![0];
        let mut index = HashMap::new();
        let mut total: GenomicPos = 0;

        for (name, length) in entries {
            let name = name.into();
            index.entry(name.clone()).or_insert(chroms.len());
            chroms.push(ChromInfo { name, length, offset: total });
            total = total.saturating_add(length);
            cumulative.push(total);
        }

        Self { chroms, cumulative, index }
    }

    /// Parse `chrom<TAB>length` lines (blank lines and `#` comments skipped)
    pub fn from_tsv(content: &str) -> TileResult<Self> {
        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(name), Some(length)) = (fields.next(), fields.next()) else {
                return Err(TileError::malformed(format!(
                    "chromsizes line {}: expected two columns",
                    lineno + 1
                )));
            };
            let length: GenomicPos = length.parse().map_err(|_| {
                TileError::malformed(format!("chromsizes line {}: invalid length '{}'", lineno + 1, length))
            })?;
            entries.push((name.to_string(), length));
        }
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.chroms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chroms.is_empty()
    }

    pub fn chroms(&self) -> &[ChromInfo] {
        &self.chroms
    }

    pub fn get(&self, idx: usize) -> Option<&ChromInfo> {
        self.chroms.get(idx)
    }

    /// The prefix-sum array `C[0..=n]`
    pub fn cumulative(&self) -> &[GenomicPos] {
        &self.cumulative
    }

    pub fn total_length(&self) -> GenomicPos {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// Exact name lookup
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Name lookup that retries with the `chr` prefix added or removed
    pub fn resolve(&self, name: &str) -> TileResult<usize> {
        if let Some(idx) = self.index_of(name) {
            return Ok(idx);
        }
        let alias = match name.strip_prefix("chr") {
            Some(bare) => bare.to_string(),
            None => format!("chr{}", name),
        };
        self.index_of(&alias)
            .ok_or_else(|| TileError::not_found(format!("Unknown chromosome: {}", name)))
    }

    /// Greatest chromosome index `i` with `C[i] <= pos`, or `None` past the genome end
    pub fn abs_to_chrom(&self, pos: GenomicPos) -> Option<usize> {
        if pos >= self.total_length() {
            return None;
        }
        let n = self.chroms.len();
        // partition over C[0..n]; C[0] = 0 <= pos so the count is at least one
        let count = self.cumulative[..n].partition_point(|&c| c <= pos);
        Some(count - 1)
    }

    /// Chromosome index and chromosome-local offset of an absolute position
    pub fn offset_in_chrom(&self, pos: GenomicPos) -> Option<(usize, GenomicPos)> {
        self.abs_to_chrom(pos)
            .map(|idx| (idx, pos - self.cumulative[idx]))
    }

    /// Absolute interval for a chromosome-local interval
    pub fn genomic_to_abs(&self, chrom: &str, start: GenomicPos, end: GenomicPos) -> TileResult<(GenomicPos, GenomicPos)> {
        let idx = self.resolve(chrom)?;
        let base = self.cumulative[idx];
        Ok((base + start, base + end))
    }

    /// Split an absolute interval at chromosome boundaries.
    ///
    /// Returns `(chrom index, local start, local end)` pieces in genome order.
    /// Anything past the genome end is dropped.
    pub fn abs_to_genomic(&self, start: GenomicPos, end: GenomicPos) -> Vec<(usize, GenomicPos, GenomicPos)> {
        let mut pieces = Vec::new();
        let end = end.min(self.total_length());
        let mut pos = start;

        while pos < end {
            let Some((idx, local)) = self.offset_in_chrom(pos) else { break };
            let chrom_end = self.cumulative[idx + 1];
            let piece_end = end.min(chrom_end);
            pieces.push((idx, local, piece_end - self.cumulative[idx]));
            pos = piece_end;
        }

        pieces
    }
}

/// Bin layout of a binned store: every chromosome starts on a fresh bin
#[derive(Debug, Clone, PartialEq)]
pub struct BinIndex {
    bin_size: u64,
    /// First bin of each chromosome, plus the total bin count at the end
    chrom_offsets: Vec<u64>,
}

impl BinIndex {
    /// Bin layout with `ceil(length / bin_size)` bins per chromosome
    pub fn new(chromsizes: &ChromSizes, bin_size: u64) -> Self {
        let bin_size = bin_size.max(1);
        let mut chrom_offsets = Vec::with_capacity(chromsizes.len() + 1);
        let mut total = 0u64;
        chrom_offsets.push(0);
        for chrom in chromsizes.chroms() {
            total += chrom.length.div_ceil(bin_size);
            chrom_offsets.push(total);
        }
        Self { bin_size, chrom_offsets }
    }

    /// Bin layout read from a store's own chromosome offset index
    pub fn from_offsets(bin_size: u64, chrom_offsets: Vec<u64>) -> TileResult<Self> {
        if chrom_offsets.is_empty() || chrom_offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(TileError::corrupt("chromosome bin offsets are not non-decreasing"));
        }
        Ok(Self { bin_size: bin_size.max(1), chrom_offsets })
    }

    pub fn bin_size(&self) -> u64 {
        self.bin_size
    }

    pub fn n_bins(&self) -> u64 {
        self.chrom_offsets.last().copied().unwrap_or(0)
    }

    pub fn chrom_offset(&self, chrom_idx: usize) -> u64 {
        self.chrom_offsets[chrom_idx.min(self.chrom_offsets.len() - 1)]
    }

    /// Bin holding an absolute position; positions past the end map to `n_bins`
    pub fn abs_to_bin(&self, chromsizes: &ChromSizes, pos: GenomicPos) -> u64 {
        match chromsizes.offset_in_chrom(pos) {
            Some((idx, local)) => self.chrom_offset(idx) + local / self.bin_size,
            None => self.n_bins(),
        }
    }

    /// Absolute position of the first base covered by a bin
    pub fn bin_to_abs(&self, chromsizes: &ChromSizes, bin: u64) -> GenomicPos {
        if bin >= self.n_bins() {
            return chromsizes.total_length();
        }
        let n = self.chrom_offsets.len() - 1;
        let idx = self.chrom_offsets[..n].partition_point(|&o| o <= bin) - 1;
        let local = (bin - self.chrom_offsets[idx]) * self.bin_size;
        chromsizes.cumulative()[idx] + local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn genome() -> ChromSizes {
        ChromSizes::new(vec![("chr1", 1000), ("chr2", 500), ("chr3", 250)])
    }

    #[test]
    fn test_cumulative_index() {
        let g = genome();
        assert_eq!(g.cumulative(), &[0, 1000, 1500, 1750]);
        assert_eq!(g.total_length(), 1750);
        assert_eq!(g.get(1).map(|c| c.offset), Some(1000));
    }

    #[test]
    fn test_abs_to_chrom_half_open() {
        let g = genome();
        assert_eq!(g.abs_to_chrom(0), Some(0));
        assert_eq!(g.abs_to_chrom(999), Some(0));
        assert_eq!(g.abs_to_chrom(1000), Some(1));
        assert_eq!(g.abs_to_chrom(1749), Some(2));
        assert_eq!(g.abs_to_chrom(1750), None);
        assert_eq!(g.offset_in_chrom(1200), Some((1, 200)));
    }

    #[test]
    fn test_zero_length_chromosome_is_skipped() {
        let g = ChromSizes::new(vec![("a", 10), ("empty", 0), ("b", 10)]);
        assert_eq!(g.abs_to_chrom(10), Some(2));
    }

    #[test]
    fn test_genomic_to_abs_with_alias() {
        let g = genome();
        assert_eq!(g.genomic_to_abs("chr2", 10, 20).unwrap(), (1010, 1020));
        assert_eq!(g.genomic_to_abs("2", 10, 20).unwrap(), (1010, 1020));
        assert!(matches!(g.genomic_to_abs("chrX", 0, 1), Err(TileError::NotFound { .. })));
    }

    #[test]
    fn test_abs_to_genomic_walks_boundaries() {
        let g = genome();
        let pieces = g.abs_to_genomic(900, 1600);
        assert_eq!(pieces, vec![(0, 900, 1000), (1, 0, 500), (2, 0, 100)]);
        assert!(g.abs_to_genomic(2000, 3000).is_empty());
    }

    #[test]
    fn test_bin_index() {
        let g = genome();
        let bins = BinIndex::new(&g, 300);
        // chr1: 4 bins, chr2: 2 bins, chr3: 1 bin
        assert_eq!(bins.n_bins(), 7);
        assert_eq!(bins.abs_to_bin(&g, 0), 0);
        assert_eq!(bins.abs_to_bin(&g, 999), 3);
        assert_eq!(bins.abs_to_bin(&g, 1000), 4);
        assert_eq!(bins.abs_to_bin(&g, 1750), 7);
        assert_eq!(bins.bin_to_abs(&g, 5), 1300);
        assert_eq!(bins.bin_to_abs(&g, 7), 1750);
    }

    #[test]
    fn test_from_tsv() {
        let g = ChromSizes::from_tsv("# comment\nchr1\t100\n\nchr2 50\n").unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(g.total_length(), 150);
        assert!(ChromSizes::from_tsv("chr1\tabc\n").is_err());
    }

    proptest! {
        #[test]
        fn prop_offset_roundtrip(lengths in proptest::collection::vec(1u64..10_000, 1..12), frac in 0.0f64..1.0) {
            let g = ChromSizes::new(lengths.iter().enumerate().map(|(i, &l)| (format!("c{}", i), l)));
            let pos = ((g.total_length() as f64) * frac) as u64;
            let pos = pos.min(g.total_length() - 1);
            let (idx, local) = g.offset_in_chrom(pos).unwrap();
            prop_assert!(local < g.get(idx).unwrap().length);
            prop_assert_eq!(g.cumulative()[idx] + local, pos);
        }
    }
}
