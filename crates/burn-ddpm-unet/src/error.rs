use burn_ddpm_core::SkipStackError;
use thiserror::Error;

/// Errors from building or running the UNet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UNetError {
    #[error("invalid UNet config: {0}")]
    InvalidConfig(String),

    #[error("expected {expected} image channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("timestep batch has {timesteps} entries but image batch has {batch}")]
    BatchMismatch { batch: usize, timesteps: usize },

    /// Skip tensor and decoder input disagree in batch or spatial size
    ///
    /// `stage == stages` compares the decoded output with the input
    /// projection, which keeps any row the first downsample floored away.
    #[error(
        "shape mismatch at decoder stage {stage}: skip {skip:?} vs input {input:?} \
         (height and width must be divisible by {multiple})"
    )]
    ShapeMismatch {
        stage: usize,
        skip: [usize; 4],
        input: [usize; 4],
        multiple: usize,
    },

    #[error(transparent)]
    SkipStack(#[from] SkipStackError),
}
