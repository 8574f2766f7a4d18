//! Sinusoidal timestep embedding
//!
//! Maps integer diffusion steps to fixed-size vectors, the same way
//! transformer positional encodings map token positions.

use burn::prelude::*;

/// Longest period of the lowest frequency component
const MAX_PERIOD: f64 = 10000.0;

/// Precompute the frequency tensor for a timestep embedding of size `dim`
///
/// Frequencies are geometrically spaced from 1 towards `1 / MAX_PERIOD`:
/// `f_i = exp(-(i / half_dim) * ln(MAX_PERIOD))`.
///
/// `dim` must be even and at least 4.
pub fn timestep_freqs<B: Backend>(dim: usize, device: &B::Device) -> Tensor<B, 1> {
    let half_dim = dim / 2;

    let freqs: Vec<f32> = (0..half_dim)
        .map(|i| (-((i as f64) / half_dim as f64) * MAX_PERIOD.ln()).exp() as f32)
        .collect();

    Tensor::<B, 1>::from_data(TensorData::new(freqs, [half_dim]), device)
}

/// Timestep embedding using precomputed frequencies
///
/// # Arguments
///
/// * `timesteps` - Diffusion step per sample, shape `[batch]`
/// * `freqs` - Output of [`timestep_freqs`], shape `[dim / 2]`
///
/// # Returns
///
/// `[sin(t * f) | cos(t * f)]`, shape `[batch, dim]`
pub fn timestep_embedding_with_freqs<B: Backend>(
    timesteps: Tensor<B, 1, Int>,
    freqs: Tensor<B, 1>,
) -> Tensor<B, 2> {
    let [batch] = timesteps.dims();
    let [half_dim] = freqs.dims();
    let args = timesteps.float().reshape([batch, 1]) * freqs.reshape([1, half_dim]);

    let sin = args.clone().sin();
    let cos = args.cos();

    Tensor::cat(vec![sin, cos], 1)
}

/// Timestep embedding using sinusoidal positional encoding
///
/// Deterministic and parameter-free. Values outside the schedule range are
/// not rejected; they extrapolate smoothly.
pub fn timestep_embedding<B: Backend>(
    timesteps: Tensor<B, 1, Int>,
    dim: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let freqs = timestep_freqs(dim, device);
    timestep_embedding_with_freqs(timesteps, freqs)
}
