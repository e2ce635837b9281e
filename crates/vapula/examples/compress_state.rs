//! Quantize a synthetic weight tensor, inspect the error, and run a few
//! fused optimizer steps over compressed state.
//!
//! Run with: cargo run --example compress_state --release

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use vapula::{
    adam_step, dequantize, max_abs_error, mse, quantize, AdamParams, AdamState, CodecKind,
};

fn main() -> vapula::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(0.0, 0.1).unwrap();
    let weights: Vec<f32> = (0..1 << 20).map(|_| normal.sample(&mut rng)).collect();

    println!("tensor: {} elements ({} KiB as f32)", weights.len(), weights.len() * 4 / 1024);

    for kind in [
        CodecKind::Dynamic8,
        CodecKind::NormalFloat4,
        CodecKind::FloatPoint4,
    ] {
        let qt = quantize(&weights, 256, kind)?;
        let recon = dequantize(&qt)?;
        println!(
            "{:>9}: {:5.2}x compression, mse {:.3e}, max err {:.3e}",
            kind.name(),
            qt.compression_ratio(),
            mse(&weights, &recon),
            max_abs_error(&weights, &recon),
        );
    }

    // A short training loop over quantized Adam state
    let mut params = weights[..4096].to_vec();
    let mut state = AdamState::new(params.len(), 256)?;
    for step in 1..=10 {
        let grads: Vec<f32> = params.iter().map(|p| 2.0 * p).collect();
        let config = AdamParams {
            step,
            ..AdamParams::new(1e-2)
        };
        adam_step(&mut params, &grads, &mut state, &config)?;
    }

    let norm: f32 = params.iter().map(|p| p * p).sum::<f32>().sqrt();
    println!(
        "after 10 quantized adam steps: |p| = {:.4}, state storage = {} KiB",
        norm,
        state.storage_bytes() / 1024
    );

    Ok(())
}
