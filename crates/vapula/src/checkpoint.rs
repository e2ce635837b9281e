//! Persisted layout for quantized state.
//!
//! ## Format
//!
//! ```text
//! +--------------------------------------------------------+
//! | Header (9 bytes, little-endian)                        |
//! |  - Element count: i32                                  |
//! |  - Block size: i32                                     |
//! |  - Codec kind: i8                                      |
//! +--------------------------------------------------------+
//! | Packed codes (packed_len(n, bits) bytes)               |
//! +--------------------------------------------------------+
//! | Per-block absmax (ceil(n / B) x f32, little-endian)    |
//! +--------------------------------------------------------+
//! ```
//!
//! Parsing validates everything before constructing state, so a corrupted
//! stream never yields a partially built tensor.

use std::io::{Read, Write};

use tracing::debug;

use vapula_core::codebook::CodecKind;
use vapula_core::error::{Error, Result};
use vapula_core::stats::num_blocks;

use crate::pack::packed_len;
use crate::quantize::QuantizedTensor;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 9;

/// Write quantized state in the checkpoint layout.
pub fn write_state<W: Write>(writer: &mut W, state: &QuantizedTensor) -> Result<()> {
    if state.len() > i32::MAX as usize {
        return Err(Error::configuration(format!(
            "element count {} exceeds checkpoint limit",
            state.len()
        )));
    }

    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&(state.len() as i32).to_le_bytes());
    header[4..8].copy_from_slice(&(state.block_size() as i32).to_le_bytes());
    header[8] = state.kind() as u8;

    writer.write_all(&header)?;
    writer.write_all(state.codes())?;

    let mut stats = Vec::with_capacity(state.absmax().len() * 4);
    for &scale in state.absmax() {
        stats.extend_from_slice(&scale.to_le_bytes());
    }
    writer.write_all(&stats)?;

    debug!(
        elements = state.len(),
        blocks = state.num_blocks(),
        kind = state.kind().name(),
        "wrote quantized state"
    );
    Ok(())
}

/// Read quantized state from the checkpoint layout.
pub fn read_state<R: Read>(reader: &mut R) -> Result<QuantizedTensor> {
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|_| Error::corrupted("truncated header"))?;

    let raw_len = i32::from_le_bytes(header[0..4].try_into().unwrap());
    let raw_block = i32::from_le_bytes(header[4..8].try_into().unwrap());
    if raw_len < 0 {
        return Err(Error::corrupted(format!("negative element count {}", raw_len)));
    }
    if raw_block <= 0 {
        return Err(Error::corrupted(format!("invalid block size {}", raw_block)));
    }
    let len = raw_len as usize;
    let block_size = raw_block as usize;
    let kind = CodecKind::try_from(header[8])?;

    let mut codes = vec![0u8; packed_len(len, kind.bits())];
    reader
        .read_exact(&mut codes)
        .map_err(|_| Error::corrupted("truncated code section"))?;

    let blocks = num_blocks(len, block_size);
    let mut stat_bytes = vec![0u8; blocks * 4];
    reader
        .read_exact(&mut stat_bytes)
        .map_err(|_| Error::corrupted("truncated statistics section"))?;
    let absmax: Vec<f32> = stat_bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let state = QuantizedTensor::from_parts(kind, block_size, len, codes, absmax)?;
    debug!(
        elements = state.len(),
        blocks = state.num_blocks(),
        kind = state.kind().name(),
        "loaded quantized state"
    );
    Ok(state)
}

/// Serialize to an owned byte vector.
pub fn to_bytes(state: &QuantizedTensor) -> Result<Vec<u8>> {
    let mut out =
        Vec::with_capacity(HEADER_SIZE + state.codes().len() + state.absmax().len() * 4);
    write_state(&mut out, state)?;
    Ok(out)
}

/// Deserialize from a byte slice; trailing bytes are rejected.
pub fn from_bytes(bytes: &[u8]) -> Result<QuantizedTensor> {
    let mut cursor = bytes;
    let state = read_state(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(Error::corrupted(format!(
            "{} trailing bytes after state",
            cursor.len()
        )));
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::{dequantize, quantize};

    fn sample(kind: CodecKind, n: usize) -> QuantizedTensor {
        let data: Vec<f32> = (0..n).map(|i| ((i as f32) * 0.21).cos() * 0.6).collect();
        quantize(&data, 64, kind).unwrap()
    }

    #[test]
    fn test_roundtrip_all_kinds() {
        for kind in [
            CodecKind::Dynamic8,
            CodecKind::DynamicUnsigned8,
            CodecKind::NormalFloat4,
            CodecKind::FloatPoint4,
        ] {
            let state = sample(kind, 150);
            let bytes = to_bytes(&state).unwrap();
            let loaded = from_bytes(&bytes).unwrap();

            assert_eq!(loaded, state, "{}", kind.name());
            assert_eq!(dequantize(&loaded).unwrap(), dequantize(&state).unwrap());
        }
    }

    #[test]
    fn test_layout_is_exact() {
        let state = sample(CodecKind::NormalFloat4, 100);
        let bytes = to_bytes(&state).unwrap();

        // 9-byte header + ceil(100/2) codes + 2 block stats
        assert_eq!(bytes.len(), 9 + 50 + 8);
        assert_eq!(&bytes[0..4], &100i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &64i32.to_le_bytes());
        assert_eq!(bytes[8], CodecKind::NormalFloat4 as u8);
        assert_eq!(&bytes[9..59], state.codes());
        assert_eq!(&bytes[59..63], &state.absmax()[0].to_le_bytes());
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = to_bytes(&sample(CodecKind::Dynamic8, 150)).unwrap();

        for cut in [0, 4, HEADER_SIZE + 10, bytes.len() - 1] {
            let err = from_bytes(&bytes[..cut]).unwrap_err();
            assert_eq!(err.category(), "corrupted", "cut at {}", cut);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut bytes = to_bytes(&sample(CodecKind::Dynamic8, 64)).unwrap();
        bytes[8] = 0xFF;
        let err = from_bytes(&bytes).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_bad_block_size_rejected() {
        let mut bytes = to_bytes(&sample(CodecKind::Dynamic8, 64)).unwrap();
        bytes[4..8].copy_from_slice(&100i32.to_le_bytes());
        assert!(from_bytes(&bytes).is_err());

        bytes[4..8].copy_from_slice(&(-8i32).to_le_bytes());
        let err = from_bytes(&bytes).unwrap_err();
        assert_eq!(err.category(), "corrupted");
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = to_bytes(&sample(CodecKind::Dynamic8, 64)).unwrap();
        bytes.push(0);
        let err = from_bytes(&bytes).unwrap_err();
        assert_eq!(err.category(), "corrupted");
    }

    #[test]
    fn test_empty_state_roundtrip() {
        let state = QuantizedTensor::zeros(0, 64, CodecKind::Dynamic8).unwrap();
        let bytes = to_bytes(&state).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(from_bytes(&bytes).unwrap(), state);
    }
}
