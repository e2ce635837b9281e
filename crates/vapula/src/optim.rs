//! Fused optimizer steps over quantized state.
//!
//! One update call touches each state element exactly once: per block it
//! dequantizes the stored moments, applies the update rule in f32, writes
//! the parameter in place, then recomputes the block's absmax over the
//! *new* moment values and requantizes. Requantization always uses the
//! freshly computed statistic, so quantization error stays bounded per
//! step instead of compounding across steps.
//!
//! Blocks carry no dependencies on each other; the whole step is a
//! parallel map over blocks, and each block's read-modify-write sequence
//! holds exclusive access to its own codes and scale.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vapula_core::codebook::{codebook, CodecKind};
use vapula_core::error::{Error, Result};
use vapula_core::stats::block_absmax;

use crate::quantize::{decode_block, encode_block, QuantizedTensor};

/// Scalar hyperparameters for one optimizer step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamParams {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// Decoupled weight decay; 0 disables it.
    pub weight_decay: f32,
    /// 1-based step count for bias correction.
    pub step: u32,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            step: 1,
        }
    }
}

impl AdamParams {
    /// Create params with a learning rate and the usual defaults.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            ..Self::default()
        }
    }

    /// Set decoupled weight decay.
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Validate hyperparameter domains. Called before any work begins.
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(Error::configuration(format!(
                "learning rate must be finite and >= 0, got {}",
                self.learning_rate
            )));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Error::configuration(format!(
                    "{} must be in [0, 1), got {}",
                    name, beta
                )));
            }
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(Error::configuration(format!(
                "epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(Error::configuration(format!(
                "weight decay must be finite and >= 0, got {}",
                self.weight_decay
            )));
        }
        if self.step == 0 {
            return Err(Error::configuration("step count must be >= 1"));
        }
        Ok(())
    }
}

/// Quantized Adam state: first moment (signed) and second moment
/// (unsigned, values are non-negative by construction).
#[derive(Debug, Clone)]
pub struct AdamState {
    pub first_moment: QuantizedTensor,
    pub second_moment: QuantizedTensor,
}

impl AdamState {
    /// Zero-initialized state for a parameter tensor of `len` elements.
    pub fn new(len: usize, block_size: usize) -> Result<Self> {
        let state = Self {
            first_moment: QuantizedTensor::zeros(len, block_size, CodecKind::Dynamic8)?,
            second_moment: QuantizedTensor::zeros(len, block_size, CodecKind::DynamicUnsigned8)?,
        };
        debug!(
            elements = len,
            block_size, "initialized quantized adam state"
        );
        Ok(state)
    }

    /// Combined storage of both moments in bytes.
    pub fn storage_bytes(&self) -> usize {
        self.first_moment.storage_bytes() + self.second_moment.storage_bytes()
    }
}

/// Quantized momentum state for SGD with momentum.
#[derive(Debug, Clone)]
pub struct MomentumState {
    pub momentum: QuantizedTensor,
}

impl MomentumState {
    /// Zero-initialized state for a parameter tensor of `len` elements.
    pub fn new(len: usize, block_size: usize) -> Result<Self> {
        let state = Self {
            momentum: QuantizedTensor::zeros(len, block_size, CodecKind::Dynamic8)?,
        };
        debug!(
            elements = len,
            block_size, "initialized quantized momentum state"
        );
        Ok(state)
    }
}

/// One fused Adam step: updates `params` in place and both quantized
/// moments in place. All validation happens before any buffer is mutated.
pub fn adam_step(
    params: &mut [f32],
    grads: &[f32],
    state: &mut AdamState,
    config: &AdamParams,
) -> Result<()> {
    config.validate()?;

    let n = params.len();
    if grads.len() != n {
        return Err(Error::shape_mismatch("gradient", n, grads.len()));
    }
    validate_state("first moment", &state.first_moment, n)?;
    validate_state("second moment", &state.second_moment, n)?;
    if state.second_moment.block_size() != state.first_moment.block_size() {
        return Err(Error::configuration(
            "moment tensors must share one block size",
        ));
    }
    check_finite(grads, state.first_moment.block_size())?;

    let block_size = state.first_moment.block_size();
    let m_book = codebook(state.first_moment.kind());
    let v_book = codebook(state.second_moment.kind());

    let beta1 = config.beta1;
    let beta2 = config.beta2;
    let lr = config.learning_rate;
    let eps = config.epsilon;
    let decay = 1.0 - lr * config.weight_decay;
    let bias1 = 1.0 - beta1.powi(config.step as i32);
    let bias2 = 1.0 - beta2.powi(config.step as i32);

    let (m_stride, m_codes_all, m_absmax_all) = state.first_moment.parts_mut();
    let (v_stride, v_codes_all, v_absmax_all) = state.second_moment.parts_mut();

    params
        .par_chunks_mut(block_size)
        .zip(grads.par_chunks(block_size))
        .zip(m_codes_all.par_chunks_mut(m_stride))
        .zip(m_absmax_all.par_iter_mut())
        .zip(v_codes_all.par_chunks_mut(v_stride))
        .zip(v_absmax_all.par_iter_mut())
        .for_each(|(((((p_block, g_block), m_codes), m_scale), v_codes), v_scale)| {
            let nb = p_block.len();
            let mut m = vec![0.0f32; nb];
            let mut v = vec![0.0f32; nb];
            decode_block(m_codes, *m_scale, m_book, &mut m);
            decode_block(v_codes, *v_scale, v_book, &mut v);

            for i in 0..nb {
                let g = g_block[i];
                m[i] = beta1 * m[i] + (1.0 - beta1) * g;
                v[i] = beta2 * v[i] + (1.0 - beta2) * g * g;

                if config.weight_decay > 0.0 {
                    p_block[i] *= decay;
                }
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                p_block[i] -= lr * m_hat / (v_hat.sqrt() + eps);
            }

            // Requantize against the statistic of the *new* moments
            *m_scale = block_absmax(&m);
            encode_block(&m, *m_scale, m_book, m_codes);
            *v_scale = block_absmax(&v);
            encode_block(&v, *v_scale, v_book, v_codes);
        });

    Ok(())
}

/// One fused SGD-with-momentum step over a single quantized state tensor.
///
/// `m = beta1 * m + g`, `p -= lr * m`; `beta2`, `epsilon`, and `step` are
/// unused but still validated.
pub fn momentum_step(
    params: &mut [f32],
    grads: &[f32],
    state: &mut MomentumState,
    config: &AdamParams,
) -> Result<()> {
    config.validate()?;

    let n = params.len();
    if grads.len() != n {
        return Err(Error::shape_mismatch("gradient", n, grads.len()));
    }
    validate_state("momentum", &state.momentum, n)?;
    check_finite(grads, state.momentum.block_size())?;

    let block_size = state.momentum.block_size();
    let book = codebook(state.momentum.kind());
    let beta1 = config.beta1;
    let lr = config.learning_rate;
    let decay = 1.0 - lr * config.weight_decay;

    let (stride, codes_all, absmax_all) = state.momentum.parts_mut();

    params
        .par_chunks_mut(block_size)
        .zip(grads.par_chunks(block_size))
        .zip(codes_all.par_chunks_mut(stride))
        .zip(absmax_all.par_iter_mut())
        .for_each(|(((p_block, g_block), codes), scale)| {
            let nb = p_block.len();
            let mut m = vec![0.0f32; nb];
            decode_block(codes, *scale, book, &mut m);

            for i in 0..nb {
                m[i] = beta1 * m[i] + g_block[i];
                if config.weight_decay > 0.0 {
                    p_block[i] *= decay;
                }
                p_block[i] -= lr * m[i];
            }

            *scale = block_absmax(&m);
            encode_block(&m, *scale, book, codes);
        });

    Ok(())
}

fn validate_state(name: &'static str, qt: &QuantizedTensor, expected: usize) -> Result<()> {
    if qt.len() != expected {
        return Err(Error::shape_mismatch(name, expected, qt.len()));
    }
    Ok(())
}

/// Reject non-finite gradients up front so no output mutates on failure.
fn check_finite(grads: &[f32], block_size: usize) -> Result<()> {
    if let Some(pos) = grads.par_iter().position_any(|g| !g.is_finite()) {
        return Err(Error::numeric_overflow("gradient", pos / block_size));
    }
    Ok(())
}
