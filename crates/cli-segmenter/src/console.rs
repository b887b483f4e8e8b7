use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use segmenter::{ClipDelivery, ProgressSink, SurfaceId};

/// Status surfaces rendered as numbered console blocks
#[derive(Debug, Default)]
pub struct ConsoleSink {
    issued: AtomicU64,
}

#[async_trait]
impl ProgressSink for ConsoleSink {
    async fn update_in_place(&self, surface: SurfaceId, text: &str) -> Result<()> {
        if surface.0 == 0 || surface.0 > self.issued.load(Ordering::SeqCst) {
            bail!("no status message #{}", surface.0);
        }
        println!("[#{}] {}", surface.0, text);
        Ok(())
    }

    async fn send_new(&self, text: &str) -> Result<SurfaceId> {
        let id = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[#{}] {}", id, text);
        Ok(SurfaceId(id))
    }
}

/// Announces clips and optionally copies them out of the work dir
#[derive(Debug, Clone)]
pub struct ConsoleDelivery {
    deliver_dir: Option<PathBuf>,
}

impl ConsoleDelivery {
    pub fn new(deliver_dir: Option<PathBuf>) -> Self {
        ConsoleDelivery { deliver_dir }
    }

    async fn keep(&self, path: &Path) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.deliver_dir else {
            return Ok(None);
        };
        let name = path
            .file_name()
            .with_context(|| format!("clip path has no file name: {}", path.display()))?;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create deliver dir: {}", dir.display()))?;
        let target = dir.join(name);
        tokio::fs::copy(path, &target)
            .await
            .with_context(|| format!("Failed to copy {} to {}", path.display(), target.display()))?;
        Ok(Some(target))
    }
}

#[async_trait]
impl ClipDelivery for ConsoleDelivery {
    async fn send_video(&self, path: &Path, caption: &str) -> Result<()> {
        let kept = self.keep(path).await?;
        println!("🎬 {} -> {}", caption, kept.as_deref().unwrap_or(path).display());
        Ok(())
    }

    async fn send_document(&self, path: &Path, caption: &str) -> Result<()> {
        let kept = self.keep(path).await?;
        println!("📎 {} -> {}", caption, kept.as_deref().unwrap_or(path).display());
        Ok(())
    }
}
