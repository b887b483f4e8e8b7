use std::path::{Path, PathBuf};
use log::{debug, warn};
use serde::Deserialize;
use tokio::process::Command;
use crate::error::{Result, SegmenterError};

/// A probed input file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub path: PathBuf,
    /// Container duration in seconds, always > 0
    pub duration: f64,
    pub has_audio: bool,
}

/// `ffprobe -show_entries format=duration -of json` output
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeDuration {
    pub format: FFProbeFormat,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub duration: Option<String>,
}

/// `ffprobe -select_streams a -show_entries stream=index -of json` output
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStreams {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub index: i32,
    #[serde(rename = "codec_type")]
    pub codec_type: Option<String>,
}

pub fn duration_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "json".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

pub fn audio_stream_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "a".to_string(),
        "-show_entries".to_string(),
        "stream=index,codec_type".to_string(),
        "-of".to_string(),
        "json".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

/// Extract a positive duration from ffprobe JSON; `None` if absent, "N/A" or not positive
pub fn parse_duration(json: &str) -> Option<f64> {
    let data: FFProbeDuration = serde_json::from_str(json).ok()?;
    data.format
        .duration?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// True when ffprobe listed at least one audio stream
pub fn parse_has_audio(json: &str) -> bool {
    serde_json::from_str::<FFProbeStreams>(json)
        .map(|data| !data.streams.is_empty())
        .unwrap_or(false)
}

/// Read a media file's duration in seconds
pub async fn probe_duration(ffprobe_bin: &Path, path: &Path) -> Result<f64> {
    let args = duration_args(path);
    debug!("ffprobe command: {} {}", ffprobe_bin.display(), args.join(" "));

    let output = Command::new(ffprobe_bin)
        .args(&args)
        .output()
        .await
        .map_err(|e| SegmenterError::probe(path, &format!("failed to execute {}: {}", ffprobe_bin.display(), e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(SegmenterError::probe(path, &stderr));
    }

    parse_duration(&stdout).ok_or_else(|| {
        let diagnostic = if stderr.trim().is_empty() {
            format!("no duration in ffprobe output: {}", stdout.trim())
        } else {
            stderr.to_string()
        };
        SegmenterError::probe(path, &diagnostic)
    })
}

/// Whether a media file has an audio stream; tool failures count as "no audio"
pub async fn probe_has_audio(ffprobe_bin: &Path, path: &Path) -> bool {
    let output = match Command::new(ffprobe_bin).args(audio_stream_args(path)).output().await {
        Ok(o) => o,
        Err(e) => {
            warn!("Audio stream probe could not run for {}: {}", path.display(), e);
            return false;
        }
    };

    if !output.status.success() {
        warn!(
            "Audio stream probe failed for {} (exit code {}), assuming no audio",
            path.display(),
            output.status.code().unwrap_or(-1)
        );
        return false;
    }

    parse_has_audio(&String::from_utf8_lossy(&output.stdout))
}

/// Probe duration and audio presence of one file
pub async fn probe_file(ffprobe_bin: &Path, path: &Path) -> Result<MediaAsset> {
    let duration = probe_duration(ffprobe_bin, path).await?;
    let has_audio = probe_has_audio(ffprobe_bin, path).await;
    debug!("Probed {}: duration={:.3}s has_audio={}", path.display(), duration, has_audio);

    Ok(MediaAsset {
        path: path.to_path_buf(),
        duration,
        has_audio,
    })
}
