//! Harness configuration: model and schedule, optionally from a JSON file

use anyhow::{Context, Result};
use burn_ddpm_schedule::ScheduleConfig;
use burn_ddpm_unet::UNetConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model construction flags shared by every subcommand
#[derive(Debug, Clone, clap::Args)]
pub struct ModelArgs {
    /// JSON file with `unet` and optional `schedule` sections
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Image channel count (overrides the config file)
    #[arg(long)]
    pub image_channels: Option<usize>,

    /// Channel schedule, comma separated (e.g. 64,128,256,512,1024)
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<usize>>,

    /// Sinusoidal time embedding size (even)
    #[arg(long)]
    pub time_emb_size: Option<usize>,

    /// Group count of the normalization layers
    #[arg(long)]
    pub norm_groups: Option<usize>,

    /// Number of diffusion steps T
    #[arg(long)]
    pub steps: Option<usize>,
}

/// Everything the harness needs to build a model and a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub unet: UNetConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            unet: UNetConfig::new(1),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Config file (or defaults) with command-line overrides applied
    pub fn resolve(args: &ModelArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(image_channels) = args.image_channels {
            config.unet.image_channels = image_channels;
        }
        if let Some(channels) = &args.channels {
            config.unet.channels = channels.clone();
        }
        if let Some(time_emb_size) = args.time_emb_size {
            config.unet.time_emb_size = time_emb_size;
        }
        if let Some(norm_groups) = args.norm_groups {
            config.unet.norm_groups = norm_groups;
        }
        if let Some(steps) = args.steps {
            config.schedule.num_train_steps = steps;
        }

        config.unet.validate().context("Invalid model configuration")?;
        config
            .schedule
            .validate()
            .context("Invalid schedule configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_overrides() -> ModelArgs {
        ModelArgs {
            config: None,
            image_channels: None,
            channels: None,
            time_emb_size: None,
            norm_groups: None,
            steps: None,
        }
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::resolve(&no_overrides()).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.schedule.num_train_steps, 1000);
    }

    #[test]
    fn test_overrides() {
        let args = ModelArgs {
            image_channels: Some(3),
            channels: Some(vec![8, 16]),
            norm_groups: Some(4),
            steps: Some(50),
            ..no_overrides()
        };
        let config = HarnessConfig::resolve(&args).unwrap();
        assert_eq!(config.unet.image_channels, 3);
        assert_eq!(config.unet.channels, vec![8, 16]);
        assert_eq!(config.schedule.num_train_steps, 50);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = ModelArgs {
            time_emb_size: Some(7),
            ..no_overrides()
        };
        assert!(HarnessConfig::resolve(&args).is_err());
    }

    #[test]
    fn test_json_sections() {
        let config: HarnessConfig = serde_json::from_str(
            r#"{ "unet": { "image_channels": 3, "channels": [32, 64] } }"#,
        )
        .unwrap();
        assert_eq!(config.unet.channels, vec![32, 64]);
        assert_eq!(config.unet.time_emb_size, 32);
        assert_eq!(config.schedule, ScheduleConfig::default());
    }
}
