use std::path::PathBuf;
use thiserror::Error;

/// Longest probe diagnostic kept in a `Probe` error
pub const PROBE_DIAGNOSTIC_CHARS: usize = 1500;
/// Longest encoder diagnostic kept in a `Transcode` error
pub const TRANSCODE_DIAGNOSTIC_CHARS: usize = 1800;
/// Longest failure report shown to a requester
pub const REPORT_CHARS: usize = 3500;

pub type Result<T> = std::result::Result<T, SegmenterError>;

/// Every failure the segmenter can surface
#[derive(Debug, Error)]
pub enum SegmenterError {
    /// Duration could not be determined for a media file
    #[error("ffprobe failed for {path}:\n{diagnostic}")]
    Probe { path: PathBuf, diagnostic: String },

    /// External encode/decode exited non-zero
    #[error("FFmpeg failed (exit code {exit_code}).\nCommand:\n{command}\n\nError:\n{diagnostic}")]
    Transcode {
        command: String,
        exit_code: i32,
        diagnostic: String,
    },

    /// Remote resource is larger than the download ceiling
    #[error("file is too large: {size} exceeds the {limit} limit")]
    DownloadTooLarge { size: String, limit: String },

    /// Transport failure, non-2xx status, or local write failure while downloading
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Link is not something the downloader accepts
    #[error("invalid link: {0}")]
    InvalidUrl(String),

    #[error("a job is already running for this requester")]
    AlreadyRunning,

    #[error("both a video and an audio input must be selected first")]
    MissingInputs,

    #[error("invalid value {value:?} for {key}")]
    InvalidConfigValue { key: String, value: String },

    /// Clip was rejected both as a video and as a file attachment
    #[error("could not deliver {path}: {reason}")]
    Delivery { path: PathBuf, reason: String },

    /// Input file no longer belongs to the requester's work dir
    #[error("{} is not in the current work dir", .0.display())]
    StaleInput(PathBuf),

    #[error("unknown requester {0}")]
    UnknownRequester(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SegmenterError {
    pub fn probe(path: impl Into<PathBuf>, diagnostic: &str) -> Self {
        Self::Probe {
            path: path.into(),
            diagnostic: truncate_chars(diagnostic, PROBE_DIAGNOSTIC_CHARS),
        }
    }

    pub fn transcode(command: String, exit_code: i32, diagnostic: &str) -> Self {
        Self::Transcode {
            command,
            exit_code,
            diagnostic: truncate_chars(diagnostic, TRANSCODE_DIAGNOSTIC_CHARS),
        }
    }

    pub fn invalid_value(key: &str, value: &str) -> Self {
        Self::InvalidConfigValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Message shown to the requester when a job fails
    pub fn report(&self) -> String {
        truncate_chars(&self.to_string(), REPORT_CHARS)
    }
}

/// Keep at most `max` characters, never splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
