//! Fixed-size sub-matrices around pairs of genomic intervals
//!
//! Each locus `(chrom1, start1, end1, chrom2, start2, end2, uid, zoomout)`
//! becomes a `dims x dims` window of cooler bins: rows follow the first
//! interval, columns the second. The window is centered on the requested
//! bins, widened by percent padding, then padded or cropped to `dims`.
//! Bins outside the matrix read as zero.

use crate::error::{TileError, TileResult};
use crate::readers::CoolerReader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Range;

pub const DEFAULT_DIMS: usize = 22;

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentOptions {
    pub dims: usize,
    /// Percent of the half-width added on each side
    pub padding: u32,
    pub balance: bool,
    pub percentile: f64,
    pub ignore_diags: usize,
    pub normalize: bool,
    /// Decimals to round to; 0 leaves values unrounded
    pub precision: u32,
    pub no_cache: bool,
}

impl Default for FragmentOptions {
    fn default() -> Self {
        Self {
            dims: DEFAULT_DIMS,
            padding: 0,
            balance: true,
            percentile: 100.0,
            ignore_diags: 0,
            normalize: true,
            precision: 0,
            no_cache: false,
        }
    }
}

fn query_flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

fn query_number<T: std::str::FromStr>(name: &str, value: &str) -> TileResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TileError::malformed(format!("Option '{}' must be a non-negative number, got '{}'", name, value)))
}

impl FragmentOptions {
    /// Parse request query options. `dims` is required.
    pub fn from_query<'a, I>(pairs: I, max_dims: usize) -> TileResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut opts = Self::default();
        let mut dims = None;

        for (key, value) in pairs {
            match key {
                "dims" => dims = Some(query_number::<usize>(key, value)?),
                "precision" => opts.precision = query_number(key, value)?,
                "padding" => opts.padding = query_number(key, value)?,
                "percentile" => opts.percentile = query_number(key, value)?,
                "ignore-diags" => opts.ignore_diags = query_number(key, value)?,
                "no-balance" => opts.balance = !query_flag(value),
                "no-normalize" => opts.normalize = !query_flag(value),
                "no-cache" => opts.no_cache = query_flag(value),
                other => log::debug!("Ignoring unknown fragment option '{}'", other),
            }
        }

        opts.dims = dims.ok_or_else(|| TileError::malformed("Option 'dims' is required"))?;
        opts.validate(max_dims)?;
        Ok(opts)
    }

    pub fn validate(&self, max_dims: usize) -> TileResult<()> {
        if self.dims == 0 {
            return Err(TileError::malformed("Option 'dims' must be positive"));
        }
        if self.dims > max_dims {
            return Err(TileError::too_large(format!(
                "Fragment dims {} exceeds the maximum of {}",
                self.dims, max_dims
            )));
        }
        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(TileError::malformed(format!(
                "Option 'percentile' must lie in 0..=100, got {}",
                self.percentile
            )));
        }
        Ok(())
    }

    /// Options in a fixed textual form, appended to cache keys
    pub fn cache_suffix(&self) -> String {
        format!(
            "dims={}|padding={}|balance={}|percentile={}|ignore-diags={}|normalize={}|precision={}",
            self.dims, self.padding, self.balance, self.percentile, self.ignore_diags, self.normalize, self.precision
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Locus {
    pub chrom1: String,
    pub start1: i64,
    pub end1: i64,
    pub chrom2: String,
    pub start2: i64,
    pub end2: i64,
    pub uid: String,
    pub zoomout: u32,
}

impl Locus {
    pub fn is_cis(&self) -> bool {
        self.chrom1 == self.chrom2
    }

    fn from_value(value: &Value) -> TileResult<Self> {
        let items = value
            .as_array()
            .filter(|items| items.len() == 8)
            .ok_or_else(|| TileError::malformed(format!("Locus must be a list of 8 items: {}", value)))?;

        Ok(Self {
            chrom1: chrom_name(&items[0])?,
            start1: position(&items[1])?,
            end1: position(&items[2])?,
            chrom2: chrom_name(&items[3])?,
            start2: position(&items[4])?,
            end2: position(&items[5])?,
            uid: items[6]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| TileError::malformed("Locus dataset uid must be a string"))?,
            zoomout: match &items[7] {
                Value::Null => 0,
                v => v
                    .as_u64()
                    .and_then(|z| u32::try_from(z).ok())
                    .ok_or_else(|| TileError::malformed(format!("Invalid zoom-out level: {}", v)))?,
            },
        })
    }
}

fn chrom_name(value: &Value) -> TileResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(TileError::malformed(format!("Invalid chromosome: {}", other))),
    }
}

fn position(value: &Value) -> TileResult<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .ok_or_else(|| TileError::malformed(format!("Invalid position: {}", value)))
}

/// Accept either `[locus, ...]` or `{"loci": [locus, ...]}`.
///
/// Only a malformed envelope fails the whole call; a bad locus becomes its
/// own error entry.
pub fn parse_loci(body: &Value) -> TileResult<Vec<TileResult<Locus>>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("loci")
            .and_then(Value::as_array)
            .ok_or_else(|| TileError::malformed("Request body object must carry a 'loci' list"))?,
        _ => return Err(TileError::malformed("Request body must be a list of loci or {\"loci\": [...]}")),
    };
    Ok(items.iter().map(Locus::from_value).collect())
}

/// One entry of a fragments response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FragmentResult {
    Matrix(Vec<Vec<f64>>),
    Error { error: String },
}

impl From<TileResult<Vec<Vec<f64>>>> for FragmentResult {
    fn from(result: TileResult<Vec<Vec<f64>>>) -> Self {
        match result {
            Ok(matrix) => FragmentResult::Matrix(matrix),
            Err(e) => FragmentResult::Error { error: e.to_string() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FragmentsResponse {
    pub fragments: Vec<FragmentResult>,
}

/// Bin window of exactly `dims` bins (may extend past the matrix).
///
/// Positions come straight from requests, so the arithmetic saturates
/// instead of overflowing.
pub fn window(chrom_offset: i64, start: i64, end: i64, bin_size: u64, dims: usize, padding: u32) -> Range<i64> {
    let bs = bin_size.max(1) as f64;
    let mut lo = chrom_offset.saturating_add((start as f64 / bs).round() as i64);
    let mut hi = chrom_offset
        .saturating_add((end as f64 / bs).round() as i64)
        .saturating_add(1);
    if hi < lo {
        std::mem::swap(&mut lo, &mut hi);
    }

    if padding > 0 {
        let half = hi.abs_diff(lo) as f64 / 2.0;
        let pad = (half * padding as f64 / 100.0).round() as i64;
        lo = lo.saturating_sub(pad);
        hi = hi.saturating_add(pad);
    }

    let dims = i64::try_from(dims).unwrap_or(i64::MAX);
    let width = hi.saturating_sub(lo);
    if width < dims {
        lo = lo.saturating_sub((dims - width) / 2);
    } else {
        lo = lo.saturating_add((width - dims) / 2);
    }
    let lo = lo.min(i64::MAX - dims);
    lo..lo + dims
}

/// numpy-style linear percentile of unsorted values
pub fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(values[lo] + (values[hi] - values[lo]) * (rank - lo as f64))
}

/// Normalize, mark ignored diagonals and low-quality cells, round.
///
/// `rows`/`cols` are the absolute bin windows, so ignored diagonals follow
/// the genomic diagonal even in off-center windows.
pub fn finalize(mut matrix: Vec<f64>, rows: &Range<i64>, cols: &Range<i64>, opts: &FragmentOptions) -> Vec<Vec<f64>> {
    let ncols = (cols.end - cols.start) as usize;
    let k = opts.ignore_diags as u64;
    let ignored = |idx: usize| {
        let r = rows.start + (idx / ncols) as i64;
        let c = cols.start + (idx % ncols) as i64;
        k > 0 && r.abs_diff(c) < k
    };

    if opts.normalize {
        let mut counted: Vec<f64> = matrix
            .iter()
            .enumerate()
            .filter(|&(i, v)| !v.is_nan() && !ignored(i))
            .map(|(_, &v)| v)
            .collect();
        if let Some(p) = percentile(&mut counted, opts.percentile).filter(|p| *p > 0.0 && p.is_finite()) {
            for v in matrix.iter_mut().filter(|v| !v.is_nan()) {
                *v = (*v / p).clamp(0.0, 1.0);
            }
        }
    }

    let scale = 10f64.powi(opts.precision as i32);
    for (i, v) in matrix.iter_mut().enumerate() {
        if v.is_nan() {
            *v = -1.0;
        } else if ignored(i) {
            *v = 1.0;
        } else if opts.precision > 0 {
            *v = (*v * scale).round() / scale;
        }
    }

    matrix.chunks(ncols.max(1)).map(|row| row.to_vec()).collect()
}

/// Bin windows of a locus at one cooler level, with the chromosome of a cis locus
fn locus_windows(reader: &CoolerReader, level_idx: usize, locus: &Locus, opts: &FragmentOptions) -> TileResult<(Option<usize>, Range<i64>, Range<i64>)> {
    let level = &reader.levels()[level_idx];
    let cs = &level.chromsizes;
    let c1 = cs.resolve(&locus.chrom1)?;
    let c2 = cs.resolve(&locus.chrom2)?;
    let bs = level.bin_size();
    let rows = window(level.bins.chrom_offset(c1) as i64, locus.start1, locus.end1, bs, opts.dims, opts.padding);
    let cols = window(level.bins.chrom_offset(c2) as i64, locus.start2, locus.end2, bs, opts.dims, opts.padding);
    Ok(((c1 == c2).then_some(c1), rows, cols))
}

/// Limits for reading several cis windows through one region read
#[derive(Debug, Clone, Copy)]
pub struct BulkPolicy {
    /// Smallest bin size that uses bulk reads
    pub min_bin_size: u64,
    /// Largest region, in cells, one bulk read may cover
    pub max_cells: u64,
}

/// Extract fragments for loci sharing one dataset and zoom-out level.
///
/// Results keep the order of `loci`. Cis loci at coarse enough resolution
/// on the same chromosome are served by one read of the union of their
/// windows when that union fits `policy.max_cells`.
pub fn extract(reader: &CoolerReader, zoomout: u32, loci: &[Locus], opts: &FragmentOptions, policy: BulkPolicy) -> Vec<TileResult<Vec<Vec<f64>>>> {
    let level_idx = reader.level_for_zoomout(zoomout);
    let bin_size = reader.levels()[level_idx].bin_size();
    let bulk = bin_size >= policy.min_bin_size;

    let mut results: Vec<Option<TileResult<Vec<Vec<f64>>>>> = vec![None; loci.len()];
    let mut cis: BTreeMap<usize, Vec<(usize, Range<i64>, Range<i64>)>> = BTreeMap::new();

    for (i, locus) in loci.iter().enumerate() {
        match locus_windows(reader, level_idx, locus, opts) {
            Ok((Some(chrom), rows, cols)) if bulk => cis.entry(chrom).or_default().push((i, rows, cols)),
            Ok((_, rows, cols)) => results[i] = Some(single(reader, level_idx, &rows, &cols, opts)),
            Err(e) => results[i] = Some(Err(e)),
        }
    }

    for (chrom, windows) in cis {
        let union_rows = span(windows.iter().map(|w| &w.1));
        let union_cols = span(windows.iter().map(|w| &w.2));
        let cells = union_rows.end.abs_diff(union_rows.start).saturating_mul(union_cols.end.abs_diff(union_cols.start));

        if windows.len() < 2 || cells > policy.max_cells {
            for (i, rows, cols) in windows {
                results[i] = Some(single(reader, level_idx, &rows, &cols, opts));
            }
            continue;
        }

        log::debug!("Bulk read of {} cis fragments on chromosome {}", windows.len(), chrom);
        match reader.fetch_region(level_idx, union_rows.clone(), union_cols.clone(), opts.balance) {
            Ok(region) => {
                let width = (union_cols.end - union_cols.start) as usize;
                for (i, rows, cols) in windows {
                    let sub = cut(&region, width, &union_rows, &union_cols, &rows, &cols);
                    results[i] = Some(Ok(finalize(sub, &rows, &cols, opts)));
                }
            }
            Err(e) => {
                for (i, _, _) in windows {
                    results[i] = Some(Err(e.clone()));
                }
            }
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(TileError::corrupt("fragment was never extracted"))))
        .collect()
}

fn single(reader: &CoolerReader, level_idx: usize, rows: &Range<i64>, cols: &Range<i64>, opts: &FragmentOptions) -> TileResult<Vec<Vec<f64>>> {
    let matrix = reader.fetch_region(level_idx, rows.clone(), cols.clone(), opts.balance)?;
    Ok(finalize(matrix, rows, cols, opts))
}

fn span<'a, I: Iterator<Item = &'a Range<i64>>>(ranges: I) -> Range<i64> {
    ranges.fold(i64::MAX..i64::MIN, |acc, r| acc.start.min(r.start)..acc.end.max(r.end))
}

fn cut(region: &[f64], width: usize, union_rows: &Range<i64>, union_cols: &Range<i64>, rows: &Range<i64>, cols: &Range<i64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(((rows.end - rows.start) * (cols.end - cols.start)) as usize);
    for r in rows.clone() {
        let base = (r - union_rows.start) as usize * width;
        let c0 = (cols.start - union_cols.start) as usize;
        let c1 = (cols.end - union_cols.start) as usize;
        out.extend_from_slice(&region[base + c0..base + c1]);
    }
    out
}
