// Allow explicit indexing in numerical kernels where it's clearer
#![allow(clippy::needless_range_loop)]

//! # Vapula
//!
//! Blockwise low-bit tensor quantization for ML training and inference,
//! with fused optimizer steps that read and write only compressed state.
//!
//! ## Quick Start
//!
//! ```ignore
//! use vapula::{quantize, dequantize, CodecKind};
//!
//! let weights: Vec<f32> = load_weights();
//! let qt = quantize(&weights, 256, CodecKind::Dynamic8)?;
//! let approx = dequantize(&qt)?;
//! ```
//!
//! ## Fused optimizer steps
//!
//! Optimizer state lives quantized between steps. One call per training
//! step dequantizes, updates, and requantizes each block exactly once:
//!
//! ```ignore
//! use vapula::{adam_step, AdamParams, AdamState};
//!
//! let mut state = AdamState::new(params.len(), 256)?;
//! for step in 1..=num_steps {
//!     let config = AdamParams { step, ..AdamParams::new(1e-3) };
//!     adam_step(&mut params, &grads, &mut state, &config)?;
//! }
//! ```
//!
//! ## Codec kinds
//!
//! | Kind | Bits | Table | Best For |
//! |------|------|-------|----------|
//! | `Dynamic8` | 8 | data-driven, log-ish | first moments, general state |
//! | `DynamicUnsigned8` | 8 | unsigned variant | second moments |
//! | `NormalFloat4` | 4 | normal quantiles | weight tensors |
//! | `FloatPoint4` | 4 | minifloat grid | weight tensors |

pub mod checkpoint;
pub mod optim;
pub mod pack;
pub mod quantize;

pub use vapula_core::{
    block_absmax, codebook, widen_to_f32, Codebook, CodecKind, DType, Error, Result,
};

pub use checkpoint::{from_bytes, read_state, to_bytes, write_state};
pub use optim::{adam_step, momentum_step, AdamParams, AdamState, MomentumState};
pub use quantize::{
    dequantize, dequantize_into, max_abs_error, mse, quantize, quantize_raw, QuantizedTensor,
};
