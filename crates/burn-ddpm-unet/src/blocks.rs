//! UNet building blocks: time projection, conv blocks, down/up sampling

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;

use burn_ddpm_core::embedding::timestep_embedding;
use burn_ddpm_core::groupnorm::GroupNorm;

/// Which way a block moves through the resolution pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Halves height and width
    Down,
    /// Doubles height and width
    Up,
}

/// A time-conditioned transform unit of the UNet
///
/// Both encoder and decoder blocks map a feature map and the shared
/// conditioning vector to a new feature map; they differ only in
/// [`Direction`].
pub trait Block<B: Backend> {
    /// Transforms `x` `[batch, in_channels, h, w]` under the conditioning
    /// vector `cond` `[batch, time_emb_size]`
    fn apply(&self, x: Tensor<B, 4>, cond: Tensor<B, 2>) -> Tensor<B, 4>;

    fn direction(&self) -> Direction;

    fn in_channels(&self) -> usize;

    fn out_channels(&self) -> usize;
}

/// Sinusoidal embedding followed by `Linear -> ReLU`
#[derive(Module, Debug)]
pub struct TimeProjection<B: Backend> {
    /// Reprojection of the raw embedding
    pub linear: Linear<B>,
    /// Size of both the raw embedding and the projection
    pub emb_size: usize,
}

impl<B: Backend> TimeProjection<B> {
    pub fn new(emb_size: usize, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(emb_size, emb_size).init(device),
            emb_size,
        }
    }

    /// Embeds a timestep batch `[batch]` into the conditioning vector
    /// `[batch, emb_size]`
    pub fn forward(&self, timesteps: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let device = timesteps.device();
        let emb = timestep_embedding(timesteps, self.emb_size, &device);
        relu(self.linear.forward(emb))
    }
}

/// Two 3x3 conv layers with the conditioning vector added in between
///
/// Keeps resolution, maps `in_channels` to `out_channels`.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub norm1: GroupNorm<B>,
    /// Per-block reprojection of the conditioning vector into `out_channels`
    pub time_emb_proj: Linear<B>,
    pub conv2: Conv2d<B>,
    pub norm2: GroupNorm<B>,
}

impl<B: Backend> ConvBlock<B> {
    /// Creates a new conv block
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Number of input channels
    /// * `out_channels` - Number of output channels
    /// * `time_emb_dim` - Dimension of the conditioning vector
    /// * `norm_groups` - Group count for both normalization layers
    /// * `device` - Device to create tensors on
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        time_emb_dim: usize,
        norm_groups: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv1: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            norm1: GroupNorm::new(norm_groups, out_channels, device),
            time_emb_proj: LinearConfig::new(time_emb_dim, out_channels).init(device),
            conv2: Conv2dConfig::new([out_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            norm2: GroupNorm::new(norm_groups, out_channels, device),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape `[batch, in_channels, height, width]`
    /// * `cond` - Conditioning vector of shape `[batch, time_emb_dim]`
    ///
    /// # Returns
    ///
    /// Output tensor of shape `[batch, out_channels, height, width]`
    pub fn forward(&self, x: Tensor<B, 4>, cond: Tensor<B, 2>) -> Tensor<B, 4> {
        let hidden = relu(self.norm1.forward(self.conv1.forward(x)));

        // Broadcast the conditioning vector over every spatial position
        let cond = relu(self.time_emb_proj.forward(cond));
        let [b, c] = cond.dims();
        let hidden = hidden + cond.reshape([b, c, 1, 1]);

        relu(self.norm2.forward(self.conv2.forward(hidden)))
    }
}

/// Downsample block (strided conv)
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    /// 4x4 stride-2 convolution
    pub conv: Conv2d<B>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([channels, channels], [4, 4])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        Self { conv }
    }

    /// `[b, c, h, w]` -> `[b, c, h / 2, w / 2]` (floor division)
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }
}

/// Upsample block using nearest neighbor interpolation followed by convolution
#[derive(Module, Debug)]
pub struct Upsample<B: Backend> {
    /// Convolution after nearest-neighbor upsample
    pub conv: Conv2d<B>,
}

impl<B: Backend> Upsample<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([channels, channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        Self { conv }
    }

    /// `[b, c, h, w]` -> `[b, c, h * 2, w * 2]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = x.dims();

        // Nearest neighbor 2x upsample
        let x = x.reshape([b, c, h, 1, w, 1]);
        let x = x.repeat_dim(3, 2).repeat_dim(5, 2);
        let x = x.reshape([b, c, h * 2, w * 2]);

        self.conv.forward(x)
    }
}

/// Encoder stage: `ConvBlock` then `Downsample`
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub conv: ConvBlock<B>,
    pub downsample: Downsample<B>,
    pub in_channels: usize,
    pub out_channels: usize,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        time_emb_dim: usize,
        norm_groups: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: ConvBlock::new(in_channels, out_channels, time_emb_dim, norm_groups, device),
            downsample: Downsample::new(out_channels, device),
            in_channels,
            out_channels,
        }
    }
}

impl<B: Backend> Block<B> for EncoderBlock<B> {
    fn apply(&self, x: Tensor<B, 4>, cond: Tensor<B, 2>) -> Tensor<B, 4> {
        self.downsample.forward(self.conv.forward(x, cond))
    }

    fn direction(&self) -> Direction {
        Direction::Down
    }

    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }
}

/// Decoder stage: `ConvBlock` then `Upsample`
///
/// `in_channels` already counts the concatenated skip connection.
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub conv: ConvBlock<B>,
    pub upsample: Upsample<B>,
    pub in_channels: usize,
    pub out_channels: usize,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        time_emb_dim: usize,
        norm_groups: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: ConvBlock::new(in_channels, out_channels, time_emb_dim, norm_groups, device),
            upsample: Upsample::new(out_channels, device),
            in_channels,
            out_channels,
        }
    }
}

impl<B: Backend> Block<B> for DecoderBlock<B> {
    fn apply(&self, x: Tensor<B, 4>, cond: Tensor<B, 2>) -> Tensor<B, 4> {
        self.upsample.forward(self.conv.forward(x, cond))
    }

    fn direction(&self) -> Direction {
        Direction::Up
    }

    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }
}
