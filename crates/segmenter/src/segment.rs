use std::path::{Path, PathBuf};
use crate::audio::audio_encode_args;
use crate::ffmpeg::base_args;
use crate::settings::{AudioMode, EncodingParams};

pub const OUTPUT_DIR: &str = "out";

/// Equal-weight blend of the video's audio and the prepared track,
/// ending with whichever input runs out first
pub const MIX_FILTER: &str = "[0:a]volume=1.0[a0];[1:a]volume=1.0[a1];[a0][a1]amix=inputs=2:duration=shortest:dropout_transition=2[aout]";

/// One output clip
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// 1-based position, used in file names and captions
    pub index: usize,
    pub start: f64,
    pub length: f64,
    pub output: PathBuf,
}

/// Where a clip's audio comes from
#[derive(Debug, Clone, Copy)]
pub enum AudioSource<'a> {
    /// Slice `[start, start+length)` of the full-length continuous track
    Continuous(&'a Path),
    /// Loop the muffled track from its beginning
    Restart(&'a Path),
}

/// Number of clips for a video, `ceil(duration / segment_len)`
pub fn segment_count(duration: f64, segment_len: f64) -> usize {
    if duration <= 0.0 || segment_len <= 0.0 {
        return 0;
    }
    (duration / segment_len).ceil() as usize
}

pub fn clip_file_name(index: usize) -> String {
    format!("clip_{:03}.mp4", index)
}

/// Segment boundaries for the whole video
///
/// Every clip but the last is exactly `segment_len` long; the last takes
/// whatever remains.
pub fn plan_segments(duration: f64, segment_len: f64, out_dir: &Path) -> Vec<Segment> {
    let n = segment_count(duration, segment_len);
    let mut segments = Vec::with_capacity(n);

    for i in 0..n {
        let start = i as f64 * segment_len;
        let length = segment_len.min(duration - start);
        if length <= 0.0 {
            break;
        }
        segments.push(Segment {
            index: i + 1,
            start,
            length,
            output: out_dir.join(clip_file_name(i + 1)),
        });
    }

    segments
}

/// Build the single ffmpeg invocation producing one clip
///
/// Mix mode only blends when the video actually has audio; otherwise the
/// clip is built exactly as in replace mode.
pub fn build_segment_command(
    video: &Path,
    video_has_audio: bool,
    audio: AudioSource<'_>,
    segment: &Segment,
    audio_mode: AudioMode,
    encoding: EncodingParams,
) -> Vec<String> {
    let start = format!("{:.3}", segment.start);
    let length = format!("{:.3}", segment.length);
    let mut args = base_args();

    // Input 0: the video trim
    args.extend([
        "-ss".to_string(),
        start.clone(),
        "-t".to_string(),
        length.clone(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
    ]);

    // Input 1: the prepared audio
    match audio {
        AudioSource::Continuous(track) => args.extend([
            "-ss".to_string(),
            start,
            "-t".to_string(),
            length.clone(),
            "-i".to_string(),
            track.to_string_lossy().to_string(),
        ]),
        AudioSource::Restart(muffled) => args.extend([
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            muffled.to_string_lossy().to_string(),
        ]),
    }

    args.push("-t".to_string());
    args.push(length);

    if audio_mode == AudioMode::Mix && video_has_audio {
        args.push("-filter_complex".to_string());
        args.push(MIX_FILTER.to_string());
        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        args.extend(["-map".to_string(), "[aout]".to_string()]);
    } else {
        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        args.extend(["-map".to_string(), "1:a:0".to_string()]);
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        encoding.preset.to_string(),
        "-crf".to_string(),
        encoding.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]);
    args.extend(audio_encode_args());
    args.push("-shortest".to_string());
    args.push(segment.output.to_string_lossy().to_string());

    args
}
