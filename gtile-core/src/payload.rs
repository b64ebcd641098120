//! Tile payloads: dense blocks fetched from readers and the records sent to clients

use crate::encoding::DenseTile;
use crate::error::TileError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Row-major block of 32-bit floats.
///
/// Matrices store y bins along rows and x bins along columns. Tracks store
/// genome bins along rows and series along columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseBlock {
    pub data: Vec<f32>,
    pub rows: usize,
    pub cols: usize,
}

impl DenseBlock {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { data: vec![0.0; rows * cols], rows, cols }
    }

    /// Wrap track values, zero-padding or truncating to exactly `rows` rows
    pub fn from_rows(mut data: Vec<f32>, rows: usize, cols: usize) -> Self {
        data.resize(rows * cols, 0.0);
        Self { data, rows, cols }
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn add(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] += value;
    }

    /// Copy out a sub-block; ranges must lie inside the block
    pub fn slice(&self, rows: Range<usize>, cols: Range<usize>) -> Vec<f32> {
        let mut out = Vec::with_capacity(rows.len() * cols.len());
        for r in rows {
            let base = r * self.cols;
            out.extend_from_slice(&self.data[base + cols.start..base + cols.end]);
        }
        out
    }
}

/// A 1-D interval record from a beddb file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRecord {
    pub x_start: i64,
    pub x_end: i64,
    pub chr_offset: i64,
    pub importance: f64,
    pub uid: String,
    pub fields: Vec<String>,
}

/// A 2-D rectangle record from a bed2ddb file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectRecord {
    pub x_start: f64,
    pub x_end: f64,
    pub y_start: f64,
    pub y_end: f64,
    pub importance: f64,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chr_offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// One entry of a discrete (non-numeric) tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feature {
    Interval(IntervalRecord),
    Rect(RectRecord),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TilePayload {
    Dense(DenseTile),
    Features(Vec<Feature>),
}

/// Per-tile response value: a payload or an error record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TileResponse {
    Tile(TilePayload),
    Error { error: String },
}

impl TileResponse {
    pub fn error<S: Into<String>>(reason: S) -> Self {
        TileResponse::Error { error: reason.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TileResponse::Error { .. })
    }
}

impl From<Result<TilePayload, TileError>> for TileResponse {
    fn from(result: Result<TilePayload, TileError>) -> Self {
        match result {
            Ok(payload) => TileResponse::Tile(payload),
            Err(e) => TileResponse::error(e.to_string()),
        }
    }
}
