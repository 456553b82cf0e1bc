// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Process configuration.
//!
//! Runtime tunables are environment-driven; an optional TOML file may
//! additionally list cameras to pre-register at startup, in a static
//! `[[cameras]]` list, but every other knob here comes from the environment
//! so the service can run as a plain container with no mounted file at all.

use std::path::Path;

use serde::Deserialize;

use crate::error::{IngestError, Result};

/// Top-level configuration: environment-derived tunables plus an optional
/// bootstrap camera list loaded from a TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub default_buffer_size: usize,
    pub motion_threshold: u8,
    pub motion_area_min_fraction: f64,
    pub motion_cooldown_secs: f64,
    pub publish_queue_size: usize,
    pub http_bind_addr: String,
    pub log_level: String,
    /// Cameras to register automatically on startup (optional TOML file).
    pub bootstrap_cameras: Vec<BootstrapCamera>,
}

/// One entry in an optional bootstrap TOML file's `[[cameras]]` list.
#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapCamera {
    pub id: String,
    pub source_type: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub buffer_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct BootstrapFile {
    #[serde(default)]
    cameras: Vec<BootstrapCamera>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| IngestError::Config(format!("{key}='{raw}' is not valid"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Build configuration from the process environment, optionally layering
    /// a bootstrap camera list read from `config_path` if one is given.
    pub fn from_env(config_path: Option<&Path>) -> Result<Self> {
        let bootstrap_cameras = match config_path {
            Some(path) => Self::load_bootstrap_file(path)?,
            None => Vec::new(),
        };

        let cfg = Config {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            default_buffer_size: env_parse("DEFAULT_BUFFER_SIZE", 100usize)?,
            motion_threshold: env_parse("MOTION_THRESHOLD", 25u8)?,
            motion_area_min_fraction: env_parse("MOTION_AREA_MIN", 0.005f64)?,
            motion_cooldown_secs: env_parse("MOTION_COOLDOWN_SECONDS", 2.0f64)?,
            publish_queue_size: env_parse("PUBLISH_QUEUE_SIZE", 64usize)?,
            http_bind_addr: env_or("HTTP_BIND_ADDR", "0.0.0.0:8080"),
            log_level: env_or("LOG_LEVEL", "info"),
            bootstrap_cameras,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn load_bootstrap_file(path: &Path) -> Result<Vec<BootstrapCamera>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("cannot read config file: {e}")))?;
        let parsed: BootstrapFile = toml::from_str(&content)
            .map_err(|e| IngestError::Config(format!("invalid TOML in {path:?}: {e}")))?;
        Ok(parsed.cameras)
    }

    fn validate(&self) -> Result<()> {
        if self.default_buffer_size == 0 || self.default_buffer_size > 10_000 {
            return Err(IngestError::Config(
                "DEFAULT_BUFFER_SIZE must be in 1..=10000".into(),
            ));
        }
        if self.publish_queue_size == 0 {
            return Err(IngestError::Config("PUBLISH_QUEUE_SIZE must be > 0".into()));
        }
        if self.motion_cooldown_secs < 0.0 {
            return Err(IngestError::Config("MOTION_COOLDOWN_SECONDS must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.motion_area_min_fraction) {
            return Err(IngestError::Config("MOTION_AREA_MIN must be in 0.0..=1.0".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_buffer_size: 100,
            motion_threshold: 25,
            motion_area_min_fraction: 0.005,
            motion_cooldown_secs: 2.0,
            publish_queue_size: 64,
            http_bind_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            bootstrap_cameras: Vec::new(),
        }
    }
}

/// Accepted valid range for a per-camera ring buffer size, shared by the
/// Registry's validation and this module's own default-range check.
pub const BUFFER_SIZE_RANGE: std::ops::RangeInclusive<usize> = 1..=10_000;
