use std::path::{Path, PathBuf};
use log::{info, warn};
use crate::error::Result;
use crate::ffmpeg::base_args;
use crate::settings::AsmrLevel;
use crate::tools::MediaTools;

pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "192k";
pub const AUDIO_SAMPLE_RATE: &str = "44100";
pub const AUDIO_CHANNELS: &str = "2";

pub const MUFFLED_FILE: &str = "audio_muffled.m4a";
pub const CONTINUOUS_FILE: &str = "audio_full.m4a";

/// Largest accepted gap between the continuous track and the video
pub const CONTINUOUS_TOLERANCE_SECS: f64 = 0.1;

/// Fixed AAC encoding shared by every produced audio stream
pub fn audio_encode_args() -> Vec<String> {
    vec![
        "-c:a".to_string(),
        AUDIO_CODEC.to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        "-ar".to_string(),
        AUDIO_SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        AUDIO_CHANNELS.to_string(),
    ]
}

/// Arguments applying the ASMR filter graph to the raw audio
pub fn build_muffle_command(input: &Path, output: &Path, level: AsmrLevel) -> Vec<String> {
    let mut args = base_args();
    args.push("-i".to_string());
    args.push(input.to_string_lossy().to_string());
    args.push("-af".to_string());
    args.push(level.filter_graph().to_string());
    args.extend(audio_encode_args());
    args.push(output.to_string_lossy().to_string());
    args
}

/// Arguments looping the muffled track and cutting it to `duration` seconds
pub fn build_continuous_command(muffled: &Path, output: &Path, duration: f64) -> Vec<String> {
    let mut args = base_args();
    args.push("-stream_loop".to_string());
    args.push("-1".to_string());
    args.push("-i".to_string());
    args.push(muffled.to_string_lossy().to_string());
    args.push("-t".to_string());
    args.push(format!("{:.3}", duration));
    args.extend(audio_encode_args());
    args.push(output.to_string_lossy().to_string());
    args
}

/// Produce `audio_muffled.m4a` in `work_dir`
pub async fn muffle(
    tools: &dyn MediaTools,
    raw_audio: &Path,
    work_dir: &Path,
    level: AsmrLevel,
) -> Result<PathBuf> {
    let output = work_dir.join(MUFFLED_FILE);
    info!("🎧 Applying {} filter to {}", level, raw_audio.display());
    tools
        .transcode(&build_muffle_command(raw_audio, &output, level))
        .await?;
    Ok(output)
}

/// Produce `audio_full.m4a`, the muffled track looped to the video's duration
pub async fn build_continuous_track(
    tools: &dyn MediaTools,
    muffled: &Path,
    work_dir: &Path,
    video_duration: f64,
) -> Result<PathBuf> {
    let output = work_dir.join(CONTINUOUS_FILE);
    info!("🎚 Building continuous track of {:.3}s", video_duration);
    tools
        .transcode(&build_continuous_command(muffled, &output, video_duration))
        .await?;

    // A mismatch is logged only; segments cap their own length anyway
    match tools.probe_duration(&output).await {
        Ok(actual) if (actual - video_duration).abs() > CONTINUOUS_TOLERANCE_SECS => {
            warn!(
                "Continuous track is {:.3}s but video is {:.3}s",
                actual, video_duration
            );
        }
        Ok(_) => {}
        Err(e) => warn!("Could not verify continuous track duration: {}", e),
    }

    Ok(output)
}
