//! Per-block statistics.
//!
//! A block is a contiguous run of `B` elements sharing one scale
//! statistic. Statistics are computed fresh on every quantize call and
//! never cached across calls.

use crate::error::{Error, Result};

/// Maximum accepted block size (2^24 elements).
pub const MAX_BLOCK_SIZE: usize = 1 << 24;

/// Maximum absolute value in a block; 0.0 for an empty block.
pub fn block_absmax(block: &[f32]) -> f32 {
    block.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
}

/// Like [`block_absmax`], but surfaces non-finite inputs instead of letting
/// them poison the scale.
pub fn checked_block_absmax(block: &[f32], block_idx: usize) -> Result<f32> {
    for &x in block {
        if !x.is_finite() {
            return Err(Error::numeric_overflow("input value", block_idx));
        }
    }
    Ok(block_absmax(block))
}

/// Number of blocks covering `n` elements; the last block may be partial.
pub fn num_blocks(n: usize, block_size: usize) -> usize {
    n.div_ceil(block_size)
}

/// Validate a block size parameter: power of two, at least 2, bounded.
pub fn validate_block_size(block_size: usize) -> Result<()> {
    if !block_size.is_power_of_two() || block_size < 2 {
        return Err(Error::configuration(format!(
            "block size must be a power of two >= 2, got {}",
            block_size
        )));
    }
    if block_size > MAX_BLOCK_SIZE {
        return Err(Error::configuration(format!(
            "block size {} exceeds maximum {}",
            block_size, MAX_BLOCK_SIZE
        )));
    }
    Ok(())
}
