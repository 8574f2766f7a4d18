//! burn-ddpm CLI
//!
//! Driver harness for the DDPM noise predictor: builds a batch, noises it
//! with the forward diffusion process, runs the UNet, and checks shapes.

use anyhow::{Context, Result};
use burn::prelude::*;
use burn::tensor::Distribution;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use burn_ddpm_schedule::{pixels_to_signed, NoiseSchedule};

mod config;

use config::{HarnessConfig, ModelArgs};

/// Compute device for the forward pass
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum Device {
    /// Auto-detect best available (WGPU > CPU)
    #[default]
    Auto,
    /// WebGPU (Vulkan/Metal/DX12)
    #[cfg(feature = "wgpu")]
    Wgpu,
    /// CPU (ndarray backend)
    #[cfg(feature = "ndarray")]
    Cpu,
}

#[derive(Parser)]
#[command(name = "burn-ddpm")]
#[command(about = "DDPM UNet noise predictor in pure Rust")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Noise a synthetic batch and check the predicted noise shape
    Check {
        #[command(flatten)]
        model: ModelArgs,

        /// Batch size
        #[arg(long, default_value = "2")]
        batch: usize,

        /// Image height
        #[arg(long, default_value = "96")]
        height: usize,

        /// Image width
        #[arg(long, default_value = "96")]
        width: usize,

        /// Device to run on
        #[arg(long, value_enum, default_value = "auto")]
        device: Device,
    },

    /// Print the learnable parameter count of a configuration
    Params {
        #[command(flatten)]
        model: ModelArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            model,
            batch,
            height,
            width,
            device,
        } => {
            let config = HarnessConfig::resolve(&model)?;
            let request = CheckRequest {
                batch,
                height,
                width,
            };
            run_check(&config, &request, resolve_device(device))
        }
        Commands::Params { model } => {
            let config = HarnessConfig::resolve(&model)?;
            println!("{}", config.unet.num_params()?);
            Ok(())
        }
    }
}

/// Batch geometry for a `check` run
#[derive(Debug, Clone, Copy)]
struct CheckRequest {
    batch: usize,
    height: usize,
    width: usize,
}

/// Try to initialize WGPU and return true if successful
#[cfg(feature = "wgpu")]
fn wgpu_available() -> bool {
    use std::panic;
    // WgpuDevice::default() may panic if no GPU is available
    panic::catch_unwind(|| {
        let _ = burn_wgpu::WgpuDevice::default();
    })
    .is_ok()
}

/// Resolve Auto device to a concrete device
fn resolve_device(requested: Device) -> Device {
    match requested {
        Device::Auto => {
            #[cfg(feature = "wgpu")]
            if wgpu_available() {
                info!("Auto-detected WGPU");
                return Device::Wgpu;
            }
            fallback_device()
        }
        other => other,
    }
}

#[cfg(feature = "ndarray")]
fn fallback_device() -> Device {
    info!("Falling back to CPU");
    Device::Cpu
}

#[cfg(not(feature = "ndarray"))]
fn fallback_device() -> Device {
    Device::Auto
}

/// Dispatch a check run to the backend for `device`
fn run_check(config: &HarnessConfig, request: &CheckRequest, device: Device) -> Result<()> {
    match device {
        #[cfg(feature = "wgpu")]
        Device::Wgpu => {
            use burn_wgpu::{Wgpu, WgpuDevice};
            run_check_with_backend::<Wgpu<f32>>(config, request, &WgpuDevice::default())
        }
        #[cfg(feature = "ndarray")]
        Device::Cpu => {
            use burn_ndarray::{NdArray, NdArrayDevice};
            run_check_with_backend::<NdArray<f32>>(config, request, &NdArrayDevice::default())
        }
        Device::Auto => {
            anyhow::bail!("No backend enabled. Enable 'wgpu' or 'ndarray' feature.")
        }
    }
}

/// Build a batch, noise it, predict the noise, and compare shapes
fn run_check_with_backend<B: Backend>(
    config: &HarnessConfig,
    request: &CheckRequest,
    device: &B::Device,
) -> Result<()> {
    let CheckRequest {
        batch,
        height,
        width,
    } = *request;
    let channels = config.unet.image_channels;
    let multiple = config.unet.resolution_multiple();
    if height % multiple != 0 || width % multiple != 0 {
        tracing::warn!(
            height,
            width,
            multiple,
            "resolution is not divisible by 2^stages; expect a shape mismatch"
        );
    }

    let start = Instant::now();
    let unet = config
        .unet
        .init::<B>(device)
        .context("Failed to build UNet")?;
    let schedule = NoiseSchedule::<B>::linear(&config.schedule, device)
        .context("Failed to build noise schedule")?;
    info!(
        params = unet.num_params(),
        stages = unet.stages(),
        elapsed = ?start.elapsed(),
        "model ready"
    );

    // Synthetic [0, 1] images stand in for a dataset
    let images = Tensor::<B, 4>::random(
        [batch, channels, height, width],
        Distribution::Uniform(0.0, 1.0),
        device,
    );
    let x0 = pixels_to_signed(images);
    let timesteps = schedule.random_timesteps(batch, device);

    let (x_t, noise) = schedule
        .forward_diffusion(x0, timesteps.clone())
        .context("Forward diffusion failed")?;
    info!(x_t = ?x_t.dims(), noise = ?noise.dims(), "forward diffusion");

    let start = Instant::now();
    let predicted = unet.forward(x_t, timesteps).context("UNet forward failed")?;
    info!(predicted = ?predicted.dims(), elapsed = ?start.elapsed(), "forward pass");

    let expected = [batch, channels, height, width];
    if predicted.dims() != expected {
        anyhow::bail!(
            "predicted noise shape {:?} does not match input shape {:?}",
            predicted.dims(),
            expected
        );
    }

    println!("ok: predicted noise {:?}", predicted.dims());
    Ok(())
}
