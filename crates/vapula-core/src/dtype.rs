//! Data type identifiers and widening to the f32 working precision.
//!
//! The codec operates on f32 internally. Host runtimes hand us raw
//! little-endian byte buffers with an explicit element count and dtype;
//! f16/bf16 elements are widened to f32 before any block statistic is
//! computed so that the scan behaves identically across source dtypes.

use half::{bf16, f16};

use crate::error::{Error, Result};

/// Source data type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DType {
    F32 = 0,
    F16 = 1,
    BF16 = 2,
}

impl DType {
    /// Returns the size in bits.
    pub fn bits(&self) -> usize {
        match self {
            DType::F32 => 32,
            DType::F16 | DType::BF16 => 16,
        }
    }

    /// Returns the size in bytes.
    pub fn bytes(&self) -> usize {
        self.bits() / 8
    }
}

impl TryFrom<u8> for DType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DType::F32),
            1 => Ok(DType::F16),
            2 => Ok(DType::BF16),
            _ => Err(Error::corrupted(format!("unknown dtype: {}", value))),
        }
    }
}

/// Widen a raw little-endian buffer of `count` elements to f32.
///
/// The buffer length must equal `count * dtype.bytes()`.
pub fn widen_to_f32(raw: &[u8], dtype: DType, count: usize) -> Result<Vec<f32>> {
    let expected = count * dtype.bytes();
    if raw.len() != expected {
        return Err(Error::shape_mismatch("raw buffer", expected, raw.len()));
    }

    let out = match dtype {
        DType::F32 => raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        DType::F16 => raw
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        DType::BF16 => raw
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
    };

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(DType::F32.bytes(), 4);
        assert_eq!(DType::F16.bytes(), 2);
        assert_eq!(DType::BF16.bytes(), 2);
    }

    #[test]
    fn test_dtype_roundtrip_codes() {
        for dtype in [DType::F32, DType::F16, DType::BF16] {
            assert_eq!(DType::try_from(dtype as u8).unwrap(), dtype);
        }
        assert!(DType::try_from(7).is_err());
    }

    #[test]
    fn test_widen_f32() {
        let values = [1.0f32, -0.5, 0.25];
        let mut raw = Vec::new();
        for v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }

        let widened = widen_to_f32(&raw, DType::F32, 3).unwrap();
        assert_eq!(widened, values);
    }

    #[test]
    fn test_widen_f16() {
        let values = [1.0f32, -0.5, 0.25];
        let mut raw = Vec::new();
        for v in values {
            raw.extend_from_slice(&f16::from_f32(v).to_le_bytes());
        }

        let widened = widen_to_f32(&raw, DType::F16, 3).unwrap();
        // All three values are exactly representable in f16
        assert_eq!(widened, values);
    }

    #[test]
    fn test_widen_bf16() {
        let raw = bf16::from_f32(-2.0).to_le_bytes();
        let widened = widen_to_f32(&raw, DType::BF16, 1).unwrap();
        assert_eq!(widened, vec![-2.0]);
    }

    #[test]
    fn test_widen_length_mismatch() {
        let raw = [0u8; 6];
        let err = widen_to_f32(&raw, DType::F32, 3).unwrap_err();
        assert_eq!(err.category(), "shape_mismatch");
    }
}
