//! Codec tables mapping discrete codes to normalized representative values.
//!
//! Every quantize/dequantize call maps block-normalized values through one
//! of four codebooks:
//!
//! - **Dynamic 8-bit (signed)**: 256 values spanning [-1, 1], allocated
//!   denser near zero. Seven magnitude decades, each holding the midpoints
//!   of a linear grid over [0.1, 1) scaled by a power of ten, mirrored for
//!   sign, plus the exact values 0 and 1.
//! - **Dynamic 8-bit (unsigned)**: same construction without the sign
//!   mirror and with doubled per-decade resolution, spanning [0, 1]. Used
//!   for non-negative state such as second-moment accumulators.
//! - **NF4**: 16 compiled-in quantiles of the standard normal distribution,
//!   tuned for weight tensors.
//! - **FP4**: 16 compiled-in values of a sign + 2-exponent + 1-mantissa
//!   minifloat grid.
//!
//! Tables are monotone non-decreasing, so value-to-code lookup is a binary
//! search refined by comparing the two straddling entries. Each table is
//! built once per process behind a `OnceLock` and is read-only thereafter.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of magnitude decades in the dynamic maps.
const DYNAMIC_DECADES: usize = 7;

/// NF4 quantile table (normal-float, 4-bit).
const NF4_VALUES: [f32; 16] = [
    -1.0,
    -0.696_192_8,
    -0.525_073_05,
    -0.394_917_5,
    -0.284_441_38,
    -0.184_773_43,
    -0.091_050_036,
    0.0,
    0.079_580_3,
    0.160_930_2,
    0.246_112_3,
    0.337_915_24,
    0.440_709_83,
    0.562_617,
    0.722_956_84,
    1.0,
];

/// FP4 minifloat table (sign, 2 exponent bits, 1 mantissa bit).
///
/// The grid carries both +0 and -0; the table stays non-decreasing and
/// `nearest_code` tie-breaks toward the lower index, so the duplicate is
/// harmless.
const FP4_VALUES: [f32; 16] = [
    -1.0,
    -0.666_666_7,
    -0.5,
    -0.333_333_34,
    -0.25,
    -0.166_666_67,
    -0.005_208_333_3,
    -0.0,
    0.0,
    0.005_208_333_3,
    0.166_666_67,
    0.25,
    0.333_333_34,
    0.5,
    0.666_666_7,
    1.0,
];

/// Quantization codec kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CodecKind {
    /// Dynamic 8-bit, signed, values in [-1, 1].
    Dynamic8 = 0,
    /// Dynamic 8-bit, unsigned, values in [0, 1].
    DynamicUnsigned8 = 1,
    /// Fixed 4-bit normal-float table.
    NormalFloat4 = 2,
    /// Fixed 4-bit minifloat table.
    FloatPoint4 = 3,
}

impl CodecKind {
    /// Bits per stored code.
    pub fn bits(&self) -> usize {
        match self {
            CodecKind::Dynamic8 | CodecKind::DynamicUnsigned8 => 8,
            CodecKind::NormalFloat4 | CodecKind::FloatPoint4 => 4,
        }
    }

    /// Number of entries in this kind's codebook.
    pub fn codebook_len(&self) -> usize {
        1 << self.bits()
    }

    /// Whether the codebook spans negative values.
    pub fn is_signed(&self) -> bool {
        !matches!(self, CodecKind::DynamicUnsigned8)
    }

    /// Codec name as string.
    pub fn name(&self) -> &'static str {
        match self {
            CodecKind::Dynamic8 => "dynamic8",
            CodecKind::DynamicUnsigned8 => "dynamic8u",
            CodecKind::NormalFloat4 => "nf4",
            CodecKind::FloatPoint4 => "fp4",
        }
    }
}

impl TryFrom<u8> for CodecKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CodecKind::Dynamic8),
            1 => Ok(CodecKind::DynamicUnsigned8),
            2 => Ok(CodecKind::NormalFloat4),
            3 => Ok(CodecKind::FloatPoint4),
            _ => Err(Error::configuration(format!(
                "unknown codec kind: {}",
                value
            ))),
        }
    }
}

/// An ordered table mapping codes to normalized representative values.
#[derive(Debug, Clone)]
pub struct Codebook {
    kind: CodecKind,
    values: Vec<f32>,
}

impl Codebook {
    /// Build the codebook for a codec kind.
    ///
    /// Pure, deterministic, and data-independent. Prefer [`codebook`] for
    /// the cached process-wide instance.
    pub fn build(kind: CodecKind) -> Self {
        let values = match kind {
            CodecKind::Dynamic8 => dynamic_map(true),
            CodecKind::DynamicUnsigned8 => dynamic_map(false),
            CodecKind::NormalFloat4 => NF4_VALUES.to_vec(),
            CodecKind::FloatPoint4 => FP4_VALUES.to_vec(),
        };
        debug_assert_eq!(values.len(), kind.codebook_len());

        Self { kind, values }
    }

    /// Codec kind this table belongs to.
    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Bits per code.
    pub fn bits(&self) -> usize {
        self.kind.bits()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Codebooks are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Table entries in code order.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Representative value for a code.
    ///
    /// # Panics
    /// Panics if `code >= self.len()`. Codes unpacked from k-bit storage
    /// are always in range.
    pub fn value(&self, code: usize) -> f32 {
        self.values[code]
    }

    /// The code whose value is exactly zero (lowest such index).
    pub fn zero_code(&self) -> usize {
        self.nearest_code(0.0)
    }

    /// Find the code minimizing `|values[code] - value|`.
    ///
    /// Ties break toward the lower index. Binary search over the sorted
    /// table, refined by comparing the two straddling entries.
    pub fn nearest_code(&self, value: f32) -> usize {
        let idx = self.values.partition_point(|&c| c < value);
        if idx == 0 {
            return 0;
        }
        if idx >= self.values.len() {
            return self.values.len() - 1;
        }

        let below = self.values[idx - 1];
        let above = self.values[idx];
        if value - below <= above - value {
            idx - 1
        } else {
            idx
        }
    }
}

/// Process-wide codebook for a codec kind, built on first use.
pub fn codebook(kind: CodecKind) -> &'static Codebook {
    static DYNAMIC8: OnceLock<Codebook> = OnceLock::new();
    static DYNAMIC8U: OnceLock<Codebook> = OnceLock::new();
    static NF4: OnceLock<Codebook> = OnceLock::new();
    static FP4: OnceLock<Codebook> = OnceLock::new();

    let cell = match kind {
        CodecKind::Dynamic8 => &DYNAMIC8,
        CodecKind::DynamicUnsigned8 => &DYNAMIC8U,
        CodecKind::NormalFloat4 => &NF4,
        CodecKind::FloatPoint4 => &FP4,
    };
    cell.get_or_init(|| Codebook::build(kind))
}

/// Build a dynamic map of 256 values.
///
/// Decade `i` (0..7) covers magnitudes around `10^(i-6)` with the midpoints
/// of a linear grid over [0.1, 1). Signed tables mirror every decade and
/// use 2^i cells; unsigned tables use 2^(i+1) cells. Adding the exact
/// values 0 and 1 brings both variants to exactly 256 entries.
fn dynamic_map(signed: bool) -> Vec<f32> {
    let mut values = Vec::with_capacity(256);

    for i in 0..DYNAMIC_DECADES {
        let cells = if signed { 1usize << i } else { 2usize << i };
        let scale = 10f64.powi(i as i32 - (DYNAMIC_DECADES as i32 - 1));

        for c in 0..cells {
            let lo = 0.1 + 0.9 * c as f64 / cells as f64;
            let hi = 0.1 + 0.9 * (c + 1) as f64 / cells as f64;
            let mid = (scale * 0.5 * (lo + hi)) as f32;

            values.push(mid);
            if signed {
                values.push(-mid);
            }
        }
    }

    values.push(0.0);
    values.push(1.0);
    values.sort_by(f32::total_cmp);

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codebook_lengths() {
        for kind in [
            CodecKind::Dynamic8,
            CodecKind::DynamicUnsigned8,
            CodecKind::NormalFloat4,
            CodecKind::FloatPoint4,
        ] {
            let book = Codebook::build(kind);
            assert_eq!(book.len(), kind.codebook_len(), "{}", kind.name());
        }
    }

    #[test]
    fn test_codebook_monotone() {
        for kind in [
            CodecKind::Dynamic8,
            CodecKind::DynamicUnsigned8,
            CodecKind::NormalFloat4,
            CodecKind::FloatPoint4,
        ] {
            let book = Codebook::build(kind);
            for w in book.values().windows(2) {
                assert!(
                    w[0] <= w[1],
                    "{} not monotone: {} > {}",
                    kind.name(),
                    w[0],
                    w[1]
                );
            }
        }
    }

    #[test]
    fn test_codebook_range_and_zero() {
        for kind in [
            CodecKind::Dynamic8,
            CodecKind::DynamicUnsigned8,
            CodecKind::NormalFloat4,
            CodecKind::FloatPoint4,
        ] {
            let book = Codebook::build(kind);
            let lo = if kind.is_signed() { -1.0 } else { 0.0 };
            assert_eq!(book.values()[0], lo, "{} lower bound", kind.name());
            assert_eq!(*book.values().last().unwrap(), 1.0);

            // Exact zero must be representable so that zero blocks
            // round-trip to zero.
            assert_eq!(book.value(book.zero_code()), 0.0);
        }
    }

    #[test]
    fn test_build_idempotent() {
        let a = Codebook::build(CodecKind::Dynamic8);
        let b = Codebook::build(CodecKind::Dynamic8);
        assert_eq!(a.values(), b.values());

        // Cached instance matches a fresh build
        assert_eq!(codebook(CodecKind::Dynamic8).values(), a.values());
    }

    #[test]
    fn test_dynamic_density_near_zero() {
        // The dynamic map allocates more codes to small magnitudes: more
        // entries in [0, 0.1) than in [0.9, 1.0].
        let book = Codebook::build(CodecKind::Dynamic8);
        let small = book.values().iter().filter(|v| v.abs() < 0.1).count();
        let large = book.values().iter().filter(|v| v.abs() > 0.9).count();
        assert!(
            small > large,
            "expected denser allocation near zero: {} vs {}",
            small,
            large
        );
    }

    #[test]
    fn test_nearest_code_exact_entries() {
        let book = Codebook::build(CodecKind::NormalFloat4);
        for (code, &v) in book.values().iter().enumerate() {
            let found = book.nearest_code(v);
            // Duplicate entries resolve to the lowest matching index
            assert_eq!(book.value(found), v, "code {} value {}", code, v);
        }
    }

    #[test]
    fn test_nearest_code_midpoints_tie_low() {
        let book = Codebook::build(CodecKind::Dynamic8);
        let z = book.zero_code();
        let smallest_pos = book.value(z + 1);
        // The midpoint between 0 and the smallest positive entry is exact
        // in f32, so both neighbors are equidistant; ties go low.
        assert_eq!(book.nearest_code(smallest_pos / 2.0), z);
    }

    #[test]
    fn test_nearest_code_clamps() {
        let book = Codebook::build(CodecKind::Dynamic8);
        assert_eq!(book.nearest_code(-5.0), 0);
        assert_eq!(book.nearest_code(5.0), book.len() - 1);
    }

    #[test]
    fn test_nearest_code_is_nearest() {
        // Exhaustive check against linear scan on a sweep of inputs.
        for kind in [CodecKind::Dynamic8, CodecKind::DynamicUnsigned8] {
            let book = Codebook::build(kind);
            for i in -1000..=1000 {
                let v = i as f32 / 1000.0;
                let fast = book.nearest_code(v);
                let slow = book
                    .values()
                    .iter()
                    .enumerate()
                    .min_by(|a, b| {
                        (a.1 - v)
                            .abs()
                            .total_cmp(&(b.1 - v).abs())
                            .then(a.0.cmp(&b.0))
                    })
                    .map(|(i, _)| i)
                    .unwrap();
                assert_eq!(
                    (book.value(fast) - v).abs(),
                    (book.value(slow) - v).abs(),
                    "{} at {}",
                    kind.name(),
                    v
                );
            }
        }
    }

    #[test]
    fn test_unsigned_map_non_negative() {
        let book = Codebook::build(CodecKind::DynamicUnsigned8);
        assert!(book.values().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_unknown_kind_byte() {
        let err = CodecKind::try_from(42).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
