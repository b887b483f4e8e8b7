use std::path::{Path, PathBuf};
use async_trait::async_trait;
use crate::config::SegmenterConfig;
use crate::error::Result;
use crate::ffmpeg;
use crate::ffprobe::{self, MediaAsset};

/// External media tools a job drives
///
/// Every call is a long-running child process; implementations must not
/// block the async runtime while waiting for it.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Duration and audio presence of a media file
    async fn probe(&self, path: &Path) -> Result<MediaAsset>;

    /// Duration only, for verifying produced artifacts
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Run one encode/decode invocation; arguments exclude the binary itself
    async fn transcode(&self, args: &[String]) -> Result<()>;
}

/// ffmpeg/ffprobe found at the configured paths
#[derive(Debug, Clone)]
pub struct FFmpegTools {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl FFmpegTools {
    pub fn new(config: &SegmenterConfig) -> Self {
        FFmpegTools {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
        }
    }
}

#[async_trait]
impl MediaTools for FFmpegTools {
    async fn probe(&self, path: &Path) -> Result<MediaAsset> {
        ffprobe::probe_file(&self.ffprobe_bin, path).await
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        ffprobe::probe_duration(&self.ffprobe_bin, path).await
    }

    async fn transcode(&self, args: &[String]) -> Result<()> {
        ffmpeg::execute_ffmpeg(&self.ffmpeg_bin, args).await.map(|_| ())
    }
}
