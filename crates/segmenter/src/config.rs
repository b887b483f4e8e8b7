use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use crate::settings::SegmentLength;

/// Largest accepted download ceiling, 1 TiB
pub const MAX_DOWNLOAD_MB_LIMIT: u64 = 1024 * 1024;

/// Process-wide configuration for the segmenter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Root under which per-requester working directories are created
    pub data_dir: PathBuf,
    /// Segment length new requesters start with (60, 120, 180 or 300)
    pub default_segment_secs: u32,
    /// Byte ceiling for direct-link downloads, in MiB
    pub max_download_mb: u64,
    /// Path to ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// TCP connect timeout for downloads
    pub connect_timeout_secs: u64,
    /// Maximum idle time between two body reads during a download
    pub read_timeout_secs: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl SegmenterConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/asmr-segmenter"),
            default_segment_secs: 180,
            max_download_mb: 400,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            connect_timeout_secs: 30,
            read_timeout_secs: 300,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Apply environment overrides on top of file/default values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("SEGMENT_SECONDS") {
            self.default_segment_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("SEGMENT_SECONDS is not a number: {}", secs))?;
        }
        if let Some(mb) = lookup("MAX_DOWNLOAD_MB") {
            self.max_download_mb = mb
                .trim()
                .parse()
                .with_context(|| format!("MAX_DOWNLOAD_MB is not a number: {}", mb))?;
        }
        if let Some(bin) = lookup("FFMPEG_BIN") {
            self.ffmpeg_bin = PathBuf::from(bin);
        }
        if let Some(bin) = lookup("FFPROBE_BIN") {
            self.ffprobe_bin = PathBuf::from(bin);
        }
        Ok(())
    }

    /// Reject values that would otherwise only fail once a job runs
    pub fn validate(&self) -> Result<()> {
        if SegmentLength::from_secs(self.default_segment_secs).is_none() {
            bail!(
                "default segment length {}s is not one of {:?}",
                self.default_segment_secs,
                SegmentLength::ALL.iter().map(|s| s.secs()).collect::<Vec<_>>()
            );
        }
        if self.max_download_mb == 0 {
            bail!("max_download_mb must be greater than zero");
        }
        if self.max_download_mb > MAX_DOWNLOAD_MB_LIMIT {
            bail!(
                "max_download_mb {} exceeds the {} MiB limit",
                self.max_download_mb,
                MAX_DOWNLOAD_MB_LIMIT
            );
        }
        Ok(())
    }

    /// Segment length new requesters start with
    pub fn default_segment_length(&self) -> SegmentLength {
        SegmentLength::from_secs(self.default_segment_secs).unwrap_or_default()
    }

    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_mb.saturating_mul(1024 * 1024)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
