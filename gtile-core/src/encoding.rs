//! Dense tile encoding: statistics, dtype selection and base64 framing

use crate::error::{TileError, TileResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use half::f16;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Float16,
    Float32,
}

impl Dtype {
    pub fn byte_width(&self) -> usize {
        match self {
            Dtype::Float16 => 2,
            Dtype::Float32 => 4,
        }
    }
}

/// Single-pass statistics of a dense block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStats {
    pub min: f32,
    pub max: f32,
    pub has_nan: bool,
}

/// min/max over the non-NaN values; an all-NaN or empty block reports 0/0
pub fn block_stats(values: &[f32]) -> BlockStats {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut has_nan = false;

    for &v in values {
        if v.is_nan() {
            has_nan = true;
            continue;
        }
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }

    if min > max {
        min = 0.0;
        max = 0.0;
    }

    BlockStats { min, max, has_nan }
}

/// float16 only when the block is NaN-free and strictly inside the finite f16 range
pub fn choose_dtype(stats: &BlockStats) -> Dtype {
    let f16_max = f16::MAX.to_f32();
    let f16_min = f16::MIN.to_f32();
    if !stats.has_nan && stats.max < f16_max && stats.min > f16_min {
        Dtype::Float16
    } else {
        Dtype::Float32
    }
}

/// Encoded numeric tile as sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseTile {
    pub dense: String,
    pub min_value: f32,
    pub max_value: f32,
    pub dtype: Dtype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
}

/// Encode a block as little-endian float16/float32, base64 framed
pub fn encode_dense(values: &[f32], shape: Option<Vec<usize>>) -> DenseTile {
    let stats = block_stats(values);
    let dtype = choose_dtype(&stats);

    let mut bytes = Vec::with_capacity(values.len() * dtype.byte_width());
    for &v in values {
        // Writes into a Vec cannot fail
        let _ = match dtype {
            Dtype::Float16 => bytes.write_u16::<LittleEndian>(f16::from_f32(v).to_bits()),
            Dtype::Float32 => bytes.write_f32::<LittleEndian>(v),
        };
    }

    DenseTile {
        dense: STANDARD.encode(&bytes),
        min_value: stats.min,
        max_value: stats.max,
        dtype,
        shape,
    }
}

/// Decode a tile produced by [`encode_dense`] back into 32-bit floats
pub fn decode_dense(tile: &DenseTile) -> TileResult<Vec<f32>> {
    let bytes = STANDARD
        .decode(&tile.dense)
        .map_err(|e| TileError::malformed(format!("invalid base64 tile payload: {}", e)))?;

    let width = tile.dtype.byte_width();
    if bytes.len() % width != 0 {
        return Err(TileError::malformed("tile payload length is not a multiple of the dtype width"));
    }

    let mut cursor = Cursor::new(bytes.as_slice());
    let mut values = Vec::with_capacity(bytes.len() / width);
    for _ in 0..bytes.len() / width {
        let v = match tile.dtype {
            Dtype::Float16 => f16::from_bits(cursor.read_u16::<LittleEndian>()?).to_f32(),
            Dtype::Float32 => cursor.read_f32::<LittleEndian>()?,
        };
        values.push(v);
    }
    Ok(values)
}
