//! DDPM UNet
//!
//! Time-conditioned encoder/decoder that predicts the noise added to an
//! image at a given diffusion step.
//!
//! ```text
//! image ─ conv_in ─ enc[0] ─ enc[1] ─ … ─ enc[n-1] ─┐
//!                     │        │            │       │
//!                     ▼        ▼            ▼       ▼
//!                  (skip stack, popped in reverse order)
//!                     │        │            │       │
//! noise ─ conv_out ─ dec[n-1] ─ … ─ dec[1] ─ dec[0] ┘
//! ```

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    PaddingConfig2d,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use burn_ddpm_core::SkipStack;

use crate::blocks::{Block, DecoderBlock, EncoderBlock, TimeProjection};
use crate::error::UNetError;

fn default_channels() -> Vec<usize> {
    vec![64, 128, 256, 512, 1024]
}

fn default_time_emb_size() -> usize {
    32
}

fn default_norm_groups() -> usize {
    32
}

/// UNet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UNetConfig {
    /// Channels of the input image and of the predicted noise
    pub image_channels: usize,
    /// Channel width per depth; one encoder/decoder stage per adjacent pair
    #[serde(default = "default_channels")]
    pub channels: Vec<usize>,
    /// Size of the sinusoidal time embedding (even, at least 4)
    #[serde(default = "default_time_emb_size")]
    pub time_emb_size: usize,
    /// Group count of every normalization layer
    #[serde(default = "default_norm_groups")]
    pub norm_groups: usize,
}

impl UNetConfig {
    /// Default schedule `[64, 128, 256, 512, 1024]` with a 32-wide time embedding
    pub fn new(image_channels: usize) -> Self {
        Self {
            image_channels,
            channels: default_channels(),
            time_emb_size: default_time_emb_size(),
            norm_groups: default_norm_groups(),
        }
    }

    /// Small model for testing
    pub fn tiny(image_channels: usize) -> Self {
        Self {
            image_channels,
            channels: vec![8, 16, 32],
            time_emb_size: 16,
            norm_groups: 4,
        }
    }

    pub fn with_channels(mut self, channels: Vec<usize>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_time_emb_size(mut self, time_emb_size: usize) -> Self {
        self.time_emb_size = time_emb_size;
        self
    }

    pub fn with_norm_groups(mut self, norm_groups: usize) -> Self {
        self.norm_groups = norm_groups;
        self
    }

    /// Number of encoder (and decoder) stages
    pub fn stages(&self) -> usize {
        self.channels.len().saturating_sub(1)
    }

    /// Height and width must be multiples of this for encode/decode shapes to agree
    pub fn resolution_multiple(&self) -> usize {
        1 << self.stages()
    }

    /// Checks every construction parameter
    pub fn validate(&self) -> Result<(), UNetError> {
        let fail = |msg: String| -> Result<(), UNetError> {
            debug!(%msg, "rejected UNet config");
            Err(UNetError::InvalidConfig(msg))
        };

        if self.image_channels == 0 {
            return fail("image_channels must be positive".into());
        }
        if self.channels.len() < 2 {
            return fail(format!(
                "channel schedule needs at least 2 entries, got {:?}",
                self.channels
            ));
        }
        if self.time_emb_size < 4 || self.time_emb_size % 2 != 0 {
            return fail(format!(
                "time_emb_size must be even and at least 4, got {}",
                self.time_emb_size
            ));
        }
        if self.norm_groups == 0 {
            return fail("norm_groups must be positive".into());
        }
        if let Some(&c) = self
            .channels
            .iter()
            .find(|&&c| c == 0 || c % self.norm_groups != 0)
        {
            return fail(format!(
                "channel width {c} is not a positive multiple of norm_groups {}",
                self.norm_groups
            ));
        }
        Ok(())
    }

    /// Learnable parameter count of the model this config builds
    pub fn num_params(&self) -> Result<usize, UNetError> {
        self.validate()?;

        let conv = |i: usize, o: usize, k: usize| i * o * k * k + o;
        let linear = |i: usize, o: usize| i * o + o;
        let norm = |c: usize| 2 * c;
        let emb = self.time_emb_size;
        let conv_block = |i: usize, o: usize| {
            conv(i, o, 3) + norm(o) + linear(emb, o) + conv(o, o, 3) + norm(o)
        };

        let c0 = self.channels[0];
        let encoders: usize = self
            .channels
            .windows(2)
            .map(|w| conv_block(w[0], w[1]) + conv(w[1], w[1], 4))
            .sum();
        let decoders: usize = self
            .channels
            .windows(2)
            .map(|w| conv_block(w[1] * 2, w[0]) + conv(w[0], w[0], 3))
            .sum();

        Ok(conv(self.image_channels, c0, 3)
            + linear(emb, emb)
            + encoders
            + decoders
            + conv(c0, self.image_channels, 1))
    }

    /// Initialize the model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<UNet<B>, UNetError> {
        self.validate()?;
        Ok(UNet::new(self, device))
    }
}

/// DDPM noise-prediction UNet
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    /// Input projection, image channels -> channels[0]
    pub conv_in: Conv2d<B>,
    /// Timestep -> conditioning vector
    pub time_embed: TimeProjection<B>,
    /// Encoder path, channels[i] -> channels[i + 1]
    pub encoders: Vec<EncoderBlock<B>>,
    /// Decoder path, deepest first
    pub decoders: Vec<DecoderBlock<B>>,
    /// Output projection, channels[0] -> image channels
    pub conv_out: Conv2d<B>,
    pub image_channels: usize,
}

impl<B: Backend> UNet<B> {
    /// Creates a new UNet; `config` must already be validated
    fn new(config: &UNetConfig, device: &B::Device) -> Self {
        let ch = &config.channels;
        let emb = config.time_emb_size;
        let groups = config.norm_groups;
        let stages = config.stages();

        let conv_in = Conv2dConfig::new([config.image_channels, ch[0]], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let encoders = (0..stages)
            .map(|i| EncoderBlock::new(ch[i], ch[i + 1], emb, groups, device))
            .collect();

        // Each decoder sees its input concatenated with the mirrored encoder output
        let decoders = (0..stages)
            .map(|i| {
                let hi = ch[stages - i];
                let lo = ch[stages - i - 1];
                DecoderBlock::new(hi * 2, lo, emb, groups, device)
            })
            .collect();

        let conv_out = Conv2dConfig::new([ch[0], config.image_channels], [1, 1]).init(device);

        Self {
            conv_in,
            time_embed: TimeProjection::new(emb, device),
            encoders,
            decoders,
            conv_out,
            image_channels: config.image_channels,
        }
    }

    /// Number of encoder (and decoder) stages
    pub fn stages(&self) -> usize {
        self.encoders.len()
    }

    /// Reconstructs the config this model was built from
    pub fn config(&self) -> UNetConfig {
        let mut channels: Vec<usize> = self.encoders.iter().map(|e| e.in_channels()).collect();
        if let Some(last) = self.encoders.last() {
            channels.push(last.out_channels());
        }

        UNetConfig {
            image_channels: self.image_channels,
            channels,
            time_emb_size: self.time_embed.emb_size,
            norm_groups: self
                .encoders
                .first()
                .map(|e| e.conv.norm1.num_groups)
                .unwrap_or_else(default_norm_groups),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Noised image `[batch, image_channels, h, w]`
    /// * `timesteps` - Diffusion step for each sample `[batch]`
    ///
    /// # Returns
    /// Predicted noise, same shape as `x`
    ///
    /// Timesteps are not range-checked here.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        timesteps: Tensor<B, 1, Int>,
    ) -> Result<Tensor<B, 4>, UNetError> {
        let [batch, channels, height, width] = x.dims();
        let _span = tracing::debug_span!("unet_forward", batch, height, width).entered();

        if channels != self.image_channels {
            return Err(UNetError::ChannelMismatch {
                expected: self.image_channels,
                actual: channels,
            });
        }
        let [t_batch] = timesteps.dims();
        if t_batch != batch {
            return Err(UNetError::BatchMismatch {
                batch,
                timesteps: t_batch,
            });
        }

        let mut h = self.conv_in.forward(x);
        let entry = h.dims();
        let t_emb = self.time_embed.forward(timesteps);

        let mut skips = SkipStack::with_capacity(self.stages());
        for (stage, block) in self.encoders.iter().enumerate() {
            h = block.apply(h, t_emb.clone());
            trace!(stage, shape = ?h.dims(), "encoder stage");
            skips.push(h.clone())?;
        }

        for (stage, block) in self.decoders.iter().enumerate() {
            let skip = skips.pop()?;
            h = self.concat_skip(skip, h, stage)?;
            h = block.apply(h, t_emb.clone());
            trace!(stage, shape = ?h.dims(), "decoder stage");
        }
        skips.finish()?;

        // A row floored away by the first downsample is invisible to every
        // concat; only the input projection still has it
        self.check_spatial(entry, h.dims(), self.stages())?;

        Ok(self.conv_out.forward(h))
    }

    /// `[skip, x]` along channels, after checking batch and spatial dims agree
    fn concat_skip(
        &self,
        skip: Tensor<B, 4>,
        x: Tensor<B, 4>,
        stage: usize,
    ) -> Result<Tensor<B, 4>, UNetError> {
        self.check_spatial(skip.dims(), x.dims(), stage)?;
        Ok(Tensor::cat(vec![skip, x], 1))
    }

    fn check_spatial(
        &self,
        skip: [usize; 4],
        input: [usize; 4],
        stage: usize,
    ) -> Result<(), UNetError> {
        let [sb, _, sh, sw] = skip;
        let [xb, _, xh, xw] = input;
        if (sb, sh, sw) != (xb, xh, xw) {
            let err = UNetError::ShapeMismatch {
                stage,
                skip,
                input,
                multiple: 1 << self.stages(),
            };
            debug!(%err, "decoder shape check failed");
            return Err(err);
        }
        Ok(())
    }
}
