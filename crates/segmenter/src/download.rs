use std::path::{Path, PathBuf};
use std::time::Duration;
use futures_util::StreamExt;
use humansize::{format_size, BINARY};
use log::{debug, info, warn};
use reqwest::{redirect, Client, Url};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::timeout;
use crate::config::SegmenterConfig;
use crate::error::{Result, SegmenterError};

/// Write buffer size; the body is flushed to disk roughly once per MiB
pub const CHUNK_SIZE: usize = 1024 * 1024;

const MAX_REDIRECTS: usize = 10;

/// Hosts that serve watch pages rather than media files
const NON_DIRECT_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

/// Streams direct-link media to disk under a byte ceiling
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    max_bytes: u64,
    read_timeout: Duration,
}

impl Downloader {
    pub fn new(config: &SegmenterConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| SegmenterError::DownloadFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Downloader {
            client,
            max_bytes: config.max_download_bytes(),
            read_timeout: config.read_timeout(),
        })
    }

    /// Override the byte ceiling
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Download `url` to `dest`, returning the number of bytes written
    ///
    /// The body is streamed into `<dest>.part` and only renamed onto `dest`
    /// once complete, so a rejected download never leaves a usable file.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let url = validate_direct_link(url)?;
        info!("⬇️  Downloading {} -> {}", url, dest.display());

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SegmenterError::DownloadFailed(describe(&e)))?;

        let response = response
            .error_for_status()
            .map_err(|e| SegmenterError::DownloadFailed(describe(&e)))?;

        if let Some(total) = response.content_length() {
            debug!("Server advertised {} bytes for {}", total, url);
            if total > self.max_bytes {
                return Err(SegmenterError::DownloadTooLarge {
                    size: format_size(total, BINARY),
                    limit: format_size(self.max_bytes, BINARY),
                });
            }
        }

        let part = part_path(dest);
        match self.stream_to_file(response, &part).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest).await.map_err(|e| {
                    SegmenterError::DownloadFailed(format!("failed to move download into place: {}", e))
                })?;
                info!("✅ Downloaded {} ({})", dest.display(), format_size(written, BINARY));
                Ok(written)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {}: {}", part.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, response: reqwest::Response, part: &Path) -> Result<u64> {
        let file = tokio::fs::File::create(part).await.map_err(|e| {
            SegmenterError::DownloadFailed(format!("failed to create {}: {}", part.display(), e))
        })?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            let next = timeout(self.read_timeout, stream.next()).await.map_err(|_| {
                SegmenterError::DownloadFailed(format!(
                    "no data received for {} seconds",
                    self.read_timeout.as_secs()
                ))
            })?;

            let chunk = match next {
                Some(chunk) => chunk.map_err(|e| SegmenterError::DownloadFailed(describe(&e)))?,
                None => break,
            };

            downloaded += chunk.len() as u64;
            if downloaded > self.max_bytes {
                return Err(SegmenterError::DownloadTooLarge {
                    size: format!("more than {}", format_size(self.max_bytes, BINARY)),
                    limit: format_size(self.max_bytes, BINARY),
                });
            }

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| SegmenterError::DownloadFailed(format!("write failed: {}", e)))?;
        }

        writer
            .flush()
            .await
            .map_err(|e| SegmenterError::DownloadFailed(format!("write failed: {}", e)))?;

        Ok(downloaded)
    }
}

/// Accept only http(s) links that point at a downloadable file
pub fn validate_direct_link(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|_| SegmenterError::InvalidUrl(trimmed.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SegmenterError::InvalidUrl(format!(
            "{} (link must start with http or https)",
            trimmed
        )));
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    if NON_DIRECT_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    {
        return Err(SegmenterError::InvalidUrl(format!(
            "{} is not a direct download link",
            trimmed
        )));
    }

    Ok(url)
}

/// File extension of the link's last path segment, if any
pub fn url_suffix(url: &Url) -> Option<String> {
    let name = url.path_segments()?.last()?;
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if let Some(status) = err.status() {
        format!("server returned {}", status)
    } else {
        err.to_string()
    }
}
