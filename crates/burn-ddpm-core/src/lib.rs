//! Core Building Blocks for the DDPM Denoiser
//!
//! Shared components used by the UNet noise predictor.
//!
//! # Modules
//!
//! - [`embedding`] - Sinusoidal timestep embedding
//! - [`groupnorm`] - Group normalization with learnable scale/shift
//! - [`skip_stack`] - Bounded LIFO stack for UNet skip connections
//!
//! # Example
//!
//! ```ignore
//! use burn_ddpm_core::embedding::timestep_embedding;
//!
//! let timesteps = Tensor::<B, 1, Int>::from_ints([0, 500], &device);
//! let emb = timestep_embedding(timesteps, 32, &device); // [2, 32]
//! ```

pub mod embedding;
pub mod groupnorm;
pub mod skip_stack;

pub use embedding::{timestep_embedding, timestep_embedding_with_freqs, timestep_freqs};
pub use groupnorm::GroupNorm;
pub use skip_stack::{SkipStack, SkipStackError};
