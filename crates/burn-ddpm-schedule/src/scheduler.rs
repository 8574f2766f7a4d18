//! Linear beta noise schedule and the forward (noising) process
//!
//! `q(x_t | x_0) = N(sqrt(ᾱ_t) x_0, (1 - ᾱ_t) I)` where `ᾱ_t` is the
//! cumulative product of `1 - β` up to step `t`.

use burn::prelude::*;
use burn::tensor::Distribution;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from building or applying a noise schedule
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("invalid schedule config: {0}")]
    InvalidConfig(String),

    #[error("timestep {value} outside [0, {num_steps})")]
    TimestepOutOfRange { value: i64, num_steps: usize },

    #[error("timestep batch has {timesteps} entries but image batch has {batch}")]
    BatchMismatch { batch: usize, timesteps: usize },
}

fn default_num_train_steps() -> usize {
    1000
}

fn default_beta_start() -> f64 {
    1e-4
}

fn default_beta_end() -> f64 {
    0.02
}

/// Noise schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Number of diffusion steps `T`
    #[serde(default = "default_num_train_steps")]
    pub num_train_steps: usize,
    /// β at step 0
    #[serde(default = "default_beta_start")]
    pub beta_start: f64,
    /// β at step T - 1
    #[serde(default = "default_beta_end")]
    pub beta_end: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            num_train_steps: default_num_train_steps(),
            beta_start: default_beta_start(),
            beta_end: default_beta_end(),
        }
    }
}

impl ScheduleConfig {
    pub fn with_num_train_steps(mut self, num_train_steps: usize) -> Self {
        self.num_train_steps = num_train_steps;
        self
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.num_train_steps < 2 {
            return Err(ScheduleError::InvalidConfig(format!(
                "num_train_steps must be at least 2, got {}",
                self.num_train_steps
            )));
        }
        let in_range = |b: f64| b > 0.0 && b < 1.0;
        if !in_range(self.beta_start)
            || !in_range(self.beta_end)
            || self.beta_start > self.beta_end
        {
            return Err(ScheduleError::InvalidConfig(format!(
                "need 0 < beta_start <= beta_end < 1, got {} and {}",
                self.beta_start, self.beta_end
            )));
        }
        Ok(())
    }
}

/// Precomputed noise schedule values
#[derive(Debug, Clone)]
pub struct NoiseSchedule<B: Backend> {
    /// β_t
    pub betas: Tensor<B, 1>,
    /// α_t = 1 - β_t
    pub alphas: Tensor<B, 1>,
    /// Cumulative product of alphas: ᾱ_t
    pub alphas_cumprod: Tensor<B, 1>,
    /// Number of training steps
    pub num_train_steps: usize,
}

impl<B: Backend> NoiseSchedule<B> {
    /// Create a linear beta schedule
    pub fn linear(config: &ScheduleConfig, device: &B::Device) -> Result<Self, ScheduleError> {
        config.validate()?;
        Ok(Self::build(config, device))
    }

    /// Default schedule: 1000 steps, β from 1e-4 to 0.02
    pub fn ddpm(device: &B::Device) -> Self {
        Self::build(&ScheduleConfig::default(), device)
    }

    fn build(config: &ScheduleConfig, device: &B::Device) -> Self {
        let n = config.num_train_steps;

        let betas: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                (config.beta_start + t * (config.beta_end - config.beta_start)) as f32
            })
            .collect();

        let alphas: Vec<f32> = betas.iter().map(|b| 1.0 - b).collect();

        // Cumulative product
        let alphas_cumprod: Vec<f32> = alphas
            .iter()
            .scan(1.0f32, |acc, &a| {
                *acc *= a;
                Some(*acc)
            })
            .collect();

        debug!(
            num_steps = n,
            final_alpha_cumprod = alphas_cumprod[n - 1],
            "built linear noise schedule"
        );

        Self {
            betas: Tensor::from_data(TensorData::new(betas, [n]), device),
            alphas: Tensor::from_data(TensorData::new(alphas, [n]), device),
            alphas_cumprod: Tensor::from_data(TensorData::new(alphas_cumprod, [n]), device),
            num_train_steps: n,
        }
    }

    /// Get alpha_cumprod at a specific timestep
    pub fn alpha_cumprod_at(&self, t: usize) -> Tensor<B, 1> {
        self.alphas_cumprod.clone().slice(t..t + 1)
    }

    /// Checks that every timestep lies in `[0, T)`
    pub fn check_timesteps(&self, timesteps: &Tensor<B, 1, Int>) -> Result<(), ScheduleError> {
        let data = timesteps.to_data();
        let found = data
            .iter::<i64>()
            .find(|&v| v < 0 || v as usize >= self.num_train_steps);
        match found {
            Some(value) => Err(ScheduleError::TimestepOutOfRange {
                value,
                num_steps: self.num_train_steps,
            }),
            None => Ok(()),
        }
    }

    /// Uniform random timesteps in `[0, T)`, one per sample
    pub fn random_timesteps(&self, batch: usize, device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::random(
            [batch],
            Distribution::Uniform(0.0, self.num_train_steps as f64),
            device,
        )
        .clamp(0, self.num_train_steps as i64 - 1)
    }

    /// Noises `x0` with the given `noise`: `sqrt(ᾱ_t)·x0 + sqrt(1 - ᾱ_t)·noise`
    ///
    /// # Arguments
    /// * `x0` - Clean images `[batch, c, h, w]`, in `[-1, 1]`
    /// * `timesteps` - Step per sample `[batch]`
    /// * `noise` - Noise of the same shape as `x0`
    pub fn add_noise(
        &self,
        x0: Tensor<B, 4>,
        timesteps: Tensor<B, 1, Int>,
        noise: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, ScheduleError> {
        let [batch, _, _, _] = x0.dims();
        let [t_batch] = timesteps.dims();
        if t_batch != batch {
            return Err(ScheduleError::BatchMismatch {
                batch,
                timesteps: t_batch,
            });
        }
        self.check_timesteps(&timesteps)?;

        let alpha_cumprod = self
            .alphas_cumprod
            .clone()
            .select(0, timesteps)
            .reshape([batch, 1, 1, 1]);
        let signal = alpha_cumprod.clone().sqrt();
        let noise_scale = (alpha_cumprod.neg() + 1.0).sqrt();

        Ok(x0 * signal + noise * noise_scale)
    }

    /// Forward diffusion: returns `(x_t, noise)` with freshly drawn standard normal noise
    pub fn forward_diffusion(
        &self,
        x0: Tensor<B, 4>,
        timesteps: Tensor<B, 1, Int>,
    ) -> Result<(Tensor<B, 4>, Tensor<B, 4>), ScheduleError> {
        let noise = x0.random_like(Distribution::Normal(0.0, 1.0));
        let x_t = self.add_noise(x0, timesteps, noise.clone())?;
        Ok((x_t, noise))
    }
}

/// Maps pixel values from `[0, 1]` into `[-1, 1]`, the range of the noise
pub fn pixels_to_signed<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn schedule() -> NoiseSchedule<TestBackend> {
        NoiseSchedule::ddpm(&Default::default())
    }

    #[test]
    fn test_alphas_cumprod_monotone() {
        let values = schedule()
            .alphas_cumprod
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(values.len(), 1000);
        assert!((values[0] - (1.0 - 1e-4)).abs() < 1e-6);
        assert!(values.windows(2).all(|w| w[1] < w[0]));
        assert!(values.iter().all(|&v| v > 0.0 && v < 1.0));
        // Almost pure noise at the last step
        assert!(values[999] < 1e-3);
    }

    #[test]
    fn test_alpha_cumprod_at() {
        let schedule = schedule();
        let a: f32 = schedule.alpha_cumprod_at(0).into_scalar().elem();
        assert!((a - 0.9999).abs() < 1e-6);
    }

    #[test]
    fn test_config_validation() {
        assert!(ScheduleConfig::default().validate().is_ok());
        assert!(ScheduleConfig::default().with_num_train_steps(1).validate().is_err());

        let inverted = ScheduleConfig {
            beta_start: 0.02,
            beta_end: 1e-4,
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ScheduleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_timestep_range_check() {
        let device = Default::default();
        let schedule = schedule();

        let ok = Tensor::<TestBackend, 1, Int>::from_ints([0, 999], &device);
        assert!(schedule.check_timesteps(&ok).is_ok());

        let too_big = Tensor::<TestBackend, 1, Int>::from_ints([5, 1000], &device);
        assert_eq!(
            schedule.check_timesteps(&too_big),
            Err(ScheduleError::TimestepOutOfRange {
                value: 1000,
                num_steps: 1000
            })
        );

        let negative = Tensor::<TestBackend, 1, Int>::from_ints([-1], &device);
        assert!(schedule.check_timesteps(&negative).is_err());
    }

    #[test]
    fn test_random_timesteps_in_range() {
        let device = Default::default();
        let schedule = NoiseSchedule::<TestBackend>::linear(
            &ScheduleConfig::default().with_num_train_steps(10),
            &device,
        )
        .unwrap();

        let t = schedule.random_timesteps(64, &device);
        assert_eq!(t.dims(), [64]);
        assert!(schedule.check_timesteps(&t).is_ok());
    }

    #[test]
    fn test_pixels_to_signed() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([0.0, 0.5, 1.0], &device);
        let y = pixels_to_signed(x).into_data().to_vec::<f32>().unwrap();
        assert_eq!(y, vec![-1.0, 0.0, 1.0]);
    }
}
