//! # Vapula Core
//!
//! Codec tables, block statistics, dtypes, and error types for the Vapula
//! low-bit quantization library.
//!
//! Vapula is named after the 60th demon of the Ars Goetia, a teacher of
//! handicrafts and sciences - fitting for a library that teaches tensors
//! to live in fewer bits.
//!
//! ## Design Philosophy
//!
//! - **Blockwise**: every statistic is local to one block, so all work is
//!   embarrassingly parallel and bit-deterministic
//! - **Build once, read forever**: codebooks are immutable process-wide
//!   tables behind a compute-once cell
//! - **Validate then execute**: every failure is raised before any output
//!   buffer is touched
//!
//! ## Core Pieces
//!
//! - [`Codebook`] - ordered code-to-value tables ([`CodecKind`] selects
//!   dynamic 8-bit signed/unsigned, NF4, or FP4)
//! - [`block_absmax`] - the per-block scale statistic
//! - [`Error`] / [`Result`] - the shared error taxonomy

pub mod codebook;
pub mod dtype;
pub mod error;
pub mod stats;

pub use codebook::{codebook, Codebook, CodecKind};
pub use dtype::{widen_to_f32, DType};
pub use error::{Error, Result};
pub use stats::{block_absmax, checked_block_absmax, num_blocks, validate_block_size};
