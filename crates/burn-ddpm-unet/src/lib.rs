//! DDPM UNet Noise Predictor
//!
//! Given a noised image and its diffusion step, predicts the noise that
//! was added so a sampler can reverse the noising process.
//!
//! # Building Blocks
//!
//! - [`TimeProjection`] - Sinusoidal embedding + `Linear -> ReLU`
//! - [`ConvBlock`] - Two convolutions with time conditioning in between
//! - [`EncoderBlock`], [`DecoderBlock`] - The two [`Block`] directions
//! - [`Downsample`], [`Upsample`] - Resolution scaling
//!
//! # Example
//!
//! ```ignore
//! use burn_ddpm_unet::UNetConfig;
//!
//! let unet = UNetConfig::new(1).init::<Backend>(&device)?;
//!
//! // [2, 1, 96, 96] noised images, one timestep per image
//! let noise_pred = unet.forward(x_t, timesteps)?;
//! ```

pub mod blocks;
pub mod error;
pub mod unet;

pub use blocks::{
    Block, ConvBlock, DecoderBlock, Direction, Downsample, EncoderBlock, TimeProjection, Upsample,
};
pub use error::UNetError;
pub use unet::{UNet, UNetConfig};
