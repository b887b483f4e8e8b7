use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::error::Result;
use crate::segment::OUTPUT_DIR;

/// Per-requester job directory holding inputs, intermediate audio and clips
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Create `<data_dir>/user_<id>/job_<8 hex>`
    pub fn create(data_dir: &Path, requester: u64) -> Result<Self> {
        let job_id = uuid::Uuid::new_v4().simple().to_string();
        let root = user_dir(data_dir, requester).join(format!("job_{}", &job_id[..8]));
        std::fs::create_dir_all(&root)?;
        debug!("Created work dir {}", root.display());
        Ok(WorkDir { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Output subdirectory for produced clips, created on demand
    pub fn output_dir(&self) -> Result<PathBuf> {
        let out = self.root.join(OUTPUT_DIR);
        std::fs::create_dir_all(&out)?;
        Ok(out)
    }

    /// Recursively delete the directory; failures are logged and swallowed
    pub async fn destroy(self) {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!("Removed work dir {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove work dir {}: {}", self.root.display(), e),
        }
    }
}

pub fn user_dir(data_dir: &Path, requester: u64) -> PathBuf {
    data_dir.join(format!("user_{}", requester))
}

/// Lowercased extension of `name`, or `default` when it has none
pub fn safe_suffix(name: Option<&str>, default: &str) -> String {
    name.and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_else(|| default.to_string())
}

/// Remove `job_*` directories left behind by a previous process
///
/// Runs before any requester exists, so nothing found here can be in use.
pub async fn sweep_stale(data_dir: &Path) -> Result<usize> {
    if !data_dir.exists() {
        return Ok(0);
    }

    let stale = tokio::task::spawn_blocking({
        let data_dir = data_dir.to_path_buf();
        move || {
            WalkDir::new(&data_dir)
                .min_depth(2)
                .max_depth(2)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_dir())
                .filter(|e| e.file_name().to_str().is_some_and(|n| n.starts_with("job_")))
                .map(|e| e.path().to_path_buf())
                .collect::<Vec<_>>()
        }
    })
    .await
    .map_err(|e| std::io::Error::other(format!("stale dir scan failed: {}", e)))?;

    let mut removed = 0;
    for dir in stale {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                removed += 1;
                debug!("Removed stale work dir {}", dir.display());
            }
            Err(e) => warn!("Failed to remove stale work dir {}: {}", dir.display(), e),
        }
    }

    if removed > 0 {
        info!("🧹 Removed {} stale work dir(s) under {}", removed, data_dir.display());
    }
    Ok(removed)
}
