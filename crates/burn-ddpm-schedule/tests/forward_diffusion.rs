//! Forward diffusion against the closed form `sqrt(ᾱ)·x0 + sqrt(1-ᾱ)·ε`
//!
//! Run with: `cargo test -p burn-ddpm-schedule --test forward_diffusion`

use burn::prelude::*;
use burn::tensor::{Distribution, ElementConversion};
use burn_ddpm_schedule::{NoiseSchedule, ScheduleError};
use burn_ndarray::NdArray;

type TestBackend = NdArray<f32>;

/// Tolerance for floating point comparisons
const EPSILON: f32 = 1e-5;

fn max_abs_diff(a: Tensor<TestBackend, 4>, b: Tensor<TestBackend, 4>) -> f32 {
    (a - b).abs().max().into_scalar().elem()
}

#[test]
fn test_add_noise_matches_closed_form() {
    let device = Default::default();
    let schedule = NoiseSchedule::<TestBackend>::ddpm(&device);

    let x0 = Tensor::<TestBackend, 4>::random(
        [2, 1, 4, 4],
        Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let noise = Tensor::<TestBackend, 4>::random(
        [2, 1, 4, 4],
        Distribution::Normal(0.0, 1.0),
        &device,
    );
    let t = Tensor::<TestBackend, 1, Int>::from_ints([10, 900], &device);

    let x_t = schedule.add_noise(x0.clone(), t, noise.clone()).unwrap();

    let alphas = schedule.alphas_cumprod.clone().into_data().to_vec::<f32>().unwrap();
    for (i, step) in [10usize, 900].into_iter().enumerate() {
        let a = alphas[step];
        let expected = x0.clone().narrow(0, i, 1) * a.sqrt()
            + noise.clone().narrow(0, i, 1) * (1.0 - a).sqrt();
        let actual = x_t.clone().narrow(0, i, 1);
        let diff = max_abs_diff(expected, actual);
        assert!(diff < EPSILON, "sample {i}: diff {diff}");
    }
}

#[test]
fn test_step_zero_keeps_signal() {
    let device = Default::default();
    let schedule = NoiseSchedule::<TestBackend>::ddpm(&device);

    let x0 = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
    let noise = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
    let t = Tensor::<TestBackend, 1, Int>::from_ints([0], &device);

    let x_t = schedule.add_noise(x0.clone(), t, noise).unwrap();
    assert!(max_abs_diff(x0, x_t) < 1e-4);
}

#[test]
fn test_forward_diffusion_shapes() {
    let device = Default::default();
    let schedule = NoiseSchedule::<TestBackend>::ddpm(&device);

    let x0 = Tensor::<TestBackend, 4>::zeros([2, 1, 96, 96], &device);
    let t = schedule.random_timesteps(2, &device);
    let (x_t, noise) = schedule.forward_diffusion(x0, t).unwrap();

    assert_eq!(x_t.dims(), [2, 1, 96, 96]);
    assert_eq!(noise.dims(), [2, 1, 96, 96]);
}

#[test]
fn test_forward_diffusion_rejects_bad_timesteps() {
    let device = Default::default();
    let schedule = NoiseSchedule::<TestBackend>::ddpm(&device);
    let x0 = Tensor::<TestBackend, 4>::zeros([2, 1, 8, 8], &device);

    let out_of_range = Tensor::<TestBackend, 1, Int>::from_ints([3, 1000], &device);
    assert!(matches!(
        schedule.forward_diffusion(x0.clone(), out_of_range),
        Err(ScheduleError::TimestepOutOfRange { value: 1000, .. })
    ));

    let wrong_batch = Tensor::<TestBackend, 1, Int>::from_ints([3], &device);
    assert!(matches!(
        schedule.forward_diffusion(x0, wrong_batch),
        Err(ScheduleError::BatchMismatch { batch: 2, timesteps: 1 })
    ));
}
