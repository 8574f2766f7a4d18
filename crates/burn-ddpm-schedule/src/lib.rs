//! DDPM Noise Schedule
//!
//! The forward (noising) side of the diffusion process: the linear β
//! schedule and `q(x_t | x_0)`, which produce the `(x_t, t)` pairs a noise
//! predictor is trained and checked on.
//!
//! # Example
//!
//! ```ignore
//! use burn_ddpm_schedule::{NoiseSchedule, pixels_to_signed};
//!
//! let schedule = NoiseSchedule::<Backend>::ddpm(&device);
//! let x0 = pixels_to_signed(images);
//! let t = schedule.random_timesteps(batch, &device);
//! let (x_t, noise) = schedule.forward_diffusion(x0, t)?;
//! ```

pub mod scheduler;

pub use scheduler::{pixels_to_signed, NoiseSchedule, ScheduleConfig, ScheduleError};
