//! TOML configuration
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::util::normalize;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "DISKTREND_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "disktrend.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scanner: ScannerConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self { path: base.join("disktrend").join("disktrend.db") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub mount_points: Vec<PathBuf>,
    pub skip_paths: Vec<PathBuf>,
    /// 0 = unlimited
    pub max_depth: u32,
    pub track_files: bool,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub progress_interval_ms: u64,
    pub append_retries: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let skip = ["/proc", "/sys", "/dev", "/run", "/snap", "/var/snap", "/tmp", "/var/tmp"];
        Self {
            mount_points: vec![PathBuf::from("/")],
            skip_paths: skip.iter().map(PathBuf::from).collect(),
            max_depth: 0,
            track_files: false,
            batch_size: 1000,
            flush_interval_ms: 2000,
            progress_interval_ms: 1000,
            append_retries: 3,
        }
    }
}

impl ScannerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// 0 = keep forever
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 365 }
    }
}

impl Config {
    /// Resolve and load the config file.
    ///
    /// Lookup order: `explicit`, then `$DISKTREND_CONFIG`, then
    /// `./disktrend.toml`. A missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        if !path.exists() {
            if explicit.is_some() {
                bail!("config file not found: {}", path.display());
            }
            warn!(path = %path.display(), "config file not found, using defaults");
            return Self::default().validated();
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validated()
    }

    /// Check absolute paths and normalize them
    fn validated(mut self) -> Result<Self> {
        if self.scanner.mount_points.is_empty() {
            bail!("scanner.mount_points must not be empty");
        }
        for path in self.scanner.mount_points.iter().chain(&self.scanner.skip_paths) {
            if !path.is_absolute() {
                bail!("path must be absolute: {}", path.display());
            }
        }
        if self.scanner.batch_size == 0 {
            bail!("scanner.batch_size must be positive");
        }
        self.scanner.mount_points = self.scanner.mount_points.iter().map(|p| normalize(p)).collect();
        self.scanner.skip_paths = self.scanner.skip_paths.iter().map(|p| normalize(p)).collect();
        Ok(self)
    }
}
