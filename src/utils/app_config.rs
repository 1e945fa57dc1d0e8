/// Application configuration
/// Optional defaults read from ~/.config/procpulse/config.toml; never written

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cli::MonitorArgs;
use crate::core::history::{ZoomConfig, DEFAULT_CAPACITY};
use crate::core::probes::NetKind;

pub const DEFAULT_INTERVAL_MS: u64 = 500;
pub const DEFAULT_EXIT_AFTER: u32 = 5;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sampling interval must be at least 1 ms")]
    ZeroInterval,

    #[error("history capacity must be at least 1")]
    ZeroHistory,

    #[error("probe timeout must be at least 1 ms")]
    ZeroProbeTimeout,

    #[error("zoom factor for {metric} must be a positive number, got {value}")]
    InvalidZoom { metric: &'static str, value: f64 },
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZoomSection {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub network: Option<f64>,
    pub files: Option<f64>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub interval_ms: Option<u64>,
    pub history: Option<usize>,
    pub exit_after: Option<u32>,
    pub probe_timeout_ms: Option<u64>,
    pub net_kind: Option<NetKind>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub zoom: ZoomSection,
}

impl AppConfig {
    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("procpulse").join("config.toml"))
    }

    /// Load an explicit config file, or the default one if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }
}

/// Effective settings for one monitor run
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub history: usize,
    pub zoom: [ZoomConfig; 4],
    pub net_kind: NetKind,
    pub exit_after: u32,
    pub probe_timeout: Duration,
}

impl MonitorSettings {
    /// Command-line flags win over the config file, which wins over defaults
    pub fn from_sources(args: &MonitorArgs, config: &AppConfig) -> Result<Self, ConfigError> {
        let interval_ms = args.interval.or(config.interval_ms).unwrap_or(DEFAULT_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        let history = args.history.or(config.history).unwrap_or(DEFAULT_CAPACITY);
        if history == 0 {
            return Err(ConfigError::ZeroHistory);
        }

        let probe_timeout_ms = args
            .probe_timeout
            .or(config.probe_timeout_ms)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS);
        if probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroProbeTimeout);
        }

        let zoom = [
            zoom_factor("cpu", args.zoom_cpu.or(config.zoom.cpu))?,
            zoom_factor("memory", args.zoom_mem.or(config.zoom.memory))?,
            zoom_factor("network", args.zoom_net.or(config.zoom.network))?,
            zoom_factor("files", args.zoom_files.or(config.zoom.files))?,
        ];

        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            history,
            zoom,
            net_kind: args.net_kind.or(config.net_kind).unwrap_or_default(),
            exit_after: args.exit_after.or(config.exit_after).unwrap_or(DEFAULT_EXIT_AFTER),
            probe_timeout: Duration::from_millis(probe_timeout_ms),
        })
    }
}

fn zoom_factor(metric: &'static str, value: Option<f64>) -> Result<ZoomConfig, ConfigError> {
    match value {
        None => Ok(ZoomConfig::default()),
        Some(value) => ZoomConfig::new(value).ok_or(ConfigError::InvalidZoom { metric, value }),
    }
}
