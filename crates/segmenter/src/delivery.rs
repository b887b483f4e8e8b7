use std::path::Path;
use async_trait::async_trait;
use log::warn;
use crate::error::{Result, SegmenterError};
use crate::settings::fmt_time;

/// Hands finished clips to the requester
#[async_trait]
pub trait ClipDelivery: Send + Sync {
    /// Deliver as a playable video
    async fn send_video(&self, path: &Path, caption: &str) -> anyhow::Result<()>;

    /// Deliver as a generic file attachment
    async fn send_document(&self, path: &Path, caption: &str) -> anyhow::Result<()>;
}

/// `Clip i/n | m:ss`
pub fn clip_caption(index: usize, total: usize, length: f64) -> String {
    format!("✅ Clip {}/{} | {}", index, total, fmt_time(length as u64))
}

/// Send as video, retrying once as a file attachment if that is rejected
pub async fn deliver_clip(delivery: &dyn ClipDelivery, path: &Path, caption: &str) -> Result<()> {
    let video_err = match delivery.send_video(path, caption).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    warn!("Video delivery of {} rejected, sending as file: {}", path.display(), video_err);

    delivery
        .send_document(path, caption)
        .await
        .map_err(|e| SegmenterError::Delivery {
            path: path.to_path_buf(),
            reason: format!("as video: {}; as file: {}", video_err, e),
        })
}
