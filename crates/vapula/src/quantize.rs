//! Blockwise quantization and dequantization.
//!
//! Converts a float buffer into packed low-bit codes plus one absmax scale
//! per block, and back. Each block is independent: its statistic and code
//! mapping depend only on its own values, so blocks are processed in
//! parallel and the packed output is byte-identical regardless of
//! execution width.
//!
//! ## Representation
//!
//! ```text
//! +-------------------------------+------------------------------+
//! | codes: packed low-bit indices | absmax: one f32 per block    |
//! | 8-bit: n bytes                | len = ceil(n / B)            |
//! | 4-bit: ceil(n/2) bytes        |                              |
//! +-------------------------------+------------------------------+
//! ```
//!
//! Dequantization recovers `codebook[code] * absmax[block]`. A block whose
//! absmax is zero stores the zero code for every element and reconstructs
//! exact zeros - never NaN.

use rayon::prelude::*;

use vapula_core::codebook::{codebook, Codebook, CodecKind};
use vapula_core::dtype::{widen_to_f32, DType};
use vapula_core::error::{Error, Result};
use vapula_core::stats::{block_absmax, num_blocks, validate_block_size};

use crate::pack::{nibble_at, packed_len, set_nibble};

/// A quantized tensor: packed codes plus per-block scale statistics.
///
/// Between optimizer steps this is the only stored form of state tensors;
/// metadata lives alongside the codes, never interleaved with them.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    kind: CodecKind,
    block_size: usize,
    len: usize,
    codes: Vec<u8>,
    absmax: Vec<f32>,
}

impl QuantizedTensor {
    /// Construct from raw parts, validating lengths against `len` and
    /// `block_size` before anything else can observe the buffers.
    pub fn from_parts(
        kind: CodecKind,
        block_size: usize,
        len: usize,
        codes: Vec<u8>,
        absmax: Vec<f32>,
    ) -> Result<Self> {
        validate_block_size(block_size)?;

        let expected_codes = packed_len(len, kind.bits());
        if codes.len() != expected_codes {
            return Err(Error::shape_mismatch("codes", expected_codes, codes.len()));
        }

        let expected_blocks = num_blocks(len, block_size);
        if absmax.len() != expected_blocks {
            return Err(Error::shape_mismatch(
                "absmax",
                expected_blocks,
                absmax.len(),
            ));
        }

        Ok(Self {
            kind,
            block_size,
            len,
            codes,
            absmax,
        })
    }

    /// A zero-valued quantized tensor: every code is the zero code and
    /// every block scale is 0. Byte-identical to quantizing a zero buffer.
    pub fn zeros(len: usize, block_size: usize, kind: CodecKind) -> Result<Self> {
        validate_block_size(block_size)?;

        let zero = codebook(kind).zero_code() as u8;
        let packed = packed_len(len, kind.bits());
        let mut codes = match kind.bits() {
            8 => vec![zero; packed],
            _ => vec![(zero << 4) | zero; packed],
        };
        // Trailing unused nibble stays zero, matching the encode path
        if kind.bits() == 4 && len % 2 == 1 {
            if let Some(last) = codes.last_mut() {
                *last = zero & 0x0F;
            }
        }

        Ok(Self {
            kind,
            block_size,
            len,
            codes,
            absmax: vec![0.0; num_blocks(len, block_size)],
        })
    }

    /// Codec kind.
    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Block size `B`.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Element count of the original tensor.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks (the last may be partial).
    pub fn num_blocks(&self) -> usize {
        num_blocks(self.len, self.block_size)
    }

    /// Packed code bytes.
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// Per-block absmax statistics.
    pub fn absmax(&self) -> &[f32] {
        &self.absmax
    }

    /// Total storage in bytes (codes + statistics).
    pub fn storage_bytes(&self) -> usize {
        self.codes.len() + self.absmax.len() * 4
    }

    /// Compression ratio versus f32 storage.
    pub fn compression_ratio(&self) -> f32 {
        let storage = self.storage_bytes();
        if storage == 0 {
            0.0
        } else {
            (self.len * 4) as f32 / storage as f32
        }
    }

    /// Packed bytes per full block for this kind.
    pub(crate) fn code_stride(&self) -> usize {
        self.block_size * self.kind.bits() / 8
    }

    /// Mutable access to the packed codes and statistics, plus the packed
    /// stride of one full block. For the fused updater's in-place pass.
    pub(crate) fn parts_mut(&mut self) -> (usize, &mut [u8], &mut [f32]) {
        let stride = self.code_stride();
        (stride, &mut self.codes, &mut self.absmax)
    }
}

/// Quantize a float buffer blockwise.
///
/// Validates configuration and scans for non-finite input before any
/// output is produced; a failed call allocates nothing observable.
pub fn quantize(data: &[f32], block_size: usize, kind: CodecKind) -> Result<QuantizedTensor> {
    validate_block_size(block_size)?;

    if let Some(pos) = data.par_iter().position_any(|x| !x.is_finite()) {
        return Err(Error::numeric_overflow("input value", pos / block_size));
    }

    let book = codebook(kind);
    let n = data.len();
    let mut codes = vec![0u8; packed_len(n, kind.bits())];
    let mut absmax = vec![0.0f32; num_blocks(n, block_size)];
    let stride = block_size * kind.bits() / 8;

    codes
        .par_chunks_mut(stride)
        .zip(data.par_chunks(block_size))
        .zip(absmax.par_iter_mut())
        .for_each(|((code_block, data_block), scale)| {
            *scale = block_absmax(data_block);
            encode_block(data_block, *scale, book, code_block);
        });

    Ok(QuantizedTensor {
        kind,
        block_size,
        len: n,
        codes,
        absmax,
    })
}

/// Quantize a raw little-endian buffer with an explicit dtype and element
/// count. Elements are widened to f32 working precision first.
pub fn quantize_raw(
    raw: &[u8],
    dtype: DType,
    count: usize,
    block_size: usize,
    kind: CodecKind,
) -> Result<QuantizedTensor> {
    let data = widen_to_f32(raw, dtype, count)?;
    quantize(&data, block_size, kind)
}

/// Dequantize into a freshly allocated buffer.
pub fn dequantize(qt: &QuantizedTensor) -> Result<Vec<f32>> {
    let mut out = vec![0.0f32; qt.len()];
    dequantize_into(qt, &mut out)?;
    Ok(out)
}

/// Dequantize into a caller-provided buffer of exactly `qt.len()` elements.
pub fn dequantize_into(qt: &QuantizedTensor, out: &mut [f32]) -> Result<()> {
    if out.len() != qt.len() {
        return Err(Error::shape_mismatch("output buffer", qt.len(), out.len()));
    }
    // Re-validate stored lengths so a hand-built value cannot read out of
    // bounds; inconsistent metadata must fail, never truncate.
    let expected_codes = packed_len(qt.len, qt.kind.bits());
    if qt.codes.len() != expected_codes {
        return Err(Error::shape_mismatch(
            "codes",
            expected_codes,
            qt.codes.len(),
        ));
    }
    let expected_blocks = num_blocks(qt.len, qt.block_size);
    if qt.absmax.len() != expected_blocks {
        return Err(Error::shape_mismatch(
            "absmax",
            expected_blocks,
            qt.absmax.len(),
        ));
    }

    let book = codebook(qt.kind);
    let stride = qt.code_stride();

    out.par_chunks_mut(qt.block_size)
        .zip(qt.codes.par_chunks(stride))
        .zip(qt.absmax.par_iter())
        .for_each(|((out_block, code_block), &scale)| {
            decode_block(code_block, scale, book, out_block);
        });

    Ok(())
}

/// Encode one block of values into packed codes.
///
/// `absmax == 0` maps every element through normalized zero, which every
/// codebook represents exactly; no division happens in that case.
pub(crate) fn encode_block(values: &[f32], absmax: f32, book: &Codebook, codes: &mut [u8]) {
    let inv = if absmax > 0.0 { 1.0 / absmax } else { 0.0 };

    match book.bits() {
        8 => {
            for (code, &x) in codes.iter_mut().zip(values) {
                *code = book.nearest_code(x * inv) as u8;
            }
        }
        _ => {
            for (i, &x) in values.iter().enumerate() {
                set_nibble(codes, i, book.nearest_code(x * inv) as u8);
            }
        }
    }
}

/// Decode one block of packed codes into values.
pub(crate) fn decode_block(codes: &[u8], absmax: f32, book: &Codebook, out: &mut [f32]) {
    match book.bits() {
        8 => {
            for (o, &code) in out.iter_mut().zip(codes) {
                *o = book.value(code as usize) * absmax;
            }
        }
        _ => {
            for (i, o) in out.iter_mut().enumerate() {
                *o = book.value(nibble_at(codes, i) as usize) * absmax;
            }
        }
    }
}

/// Mean squared error between two buffers; `f32::MAX` on length mismatch.
pub fn mse(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::MAX;
    }
    let sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    sum / a.len() as f32
}

/// Maximum elementwise absolute error; `f32::MAX` on length mismatch.
pub fn max_abs_error(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}
