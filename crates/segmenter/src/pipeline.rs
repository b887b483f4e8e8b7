use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use crate::audio;
use crate::delivery::{clip_caption, deliver_clip, ClipDelivery};
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::segment::{build_segment_command, plan_segments, AudioSource};
use crate::settings::{fmt_time, AudioMode, JobConfig, SyncMode};
use crate::tools::MediaTools;
use crate::workdir::WorkDir;

/// Everything a run reads from disk
#[derive(Debug, Clone)]
pub struct JobInputs {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub work_dir: WorkDir,
}

/// Collaborators a run talks to
#[derive(Clone)]
pub struct JobContext {
    pub tools: Arc<dyn MediaTools>,
    pub delivery: Arc<dyn ClipDelivery>,
    pub cancel: CancellationToken,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    /// Bounded diagnostic shown to the requester
    Failed(String),
}

/// Summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub outcome: JobOutcome,
    /// Clips produced and delivered
    pub produced: usize,
    /// Clips the video splits into; 0 if the run failed before probing finished
    pub planned: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Report for a run that ended without producing its own report
    pub fn failed(started_at: DateTime<Utc>, message: String, counters: &RunCounters) -> Self {
        JobReport {
            outcome: JobOutcome::Failed(message),
            produced: counters.produced(),
            planned: counters.planned(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> String {
        let elapsed = (self.finished_at - self.started_at).num_seconds().max(0) as u64;
        let state = match &self.outcome {
            JobOutcome::Completed => "completed",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Failed(_) => "failed",
        };
        format!(
            "{} ({}/{} clips, {})",
            state,
            self.produced,
            self.planned,
            fmt_time(elapsed)
        )
    }
}

/// Clip counts of a run, readable even after the run's task is gone
#[derive(Debug, Default)]
pub struct RunCounters {
    produced: AtomicUsize,
    planned: AtomicUsize,
}

impl RunCounters {
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn planned(&self) -> usize {
        self.planned.load(Ordering::SeqCst)
    }
}

/// Run one job to completion, cancellation, or failure
///
/// Errors never escape: a failure is reported to the requester and
/// recorded in the returned report.
pub async fn run_job(
    ctx: &JobContext,
    inputs: &JobInputs,
    config: JobConfig,
    reporter: &mut ProgressReporter,
    counters: &RunCounters,
) -> JobReport {
    let started_at = Utc::now();

    let outcome = match execute(ctx, inputs, config, reporter, counters).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("❌ Job in {} failed: {}", inputs.work_dir.path().display(), e);
            let message = e.report();
            reporter.notify(&format!("❌ Error:\n{}", message)).await;
            JobOutcome::Failed(message)
        }
    };

    JobReport {
        outcome,
        produced: counters.produced(),
        planned: counters.planned(),
        started_at,
        finished_at: Utc::now(),
    }
}

async fn execute(
    ctx: &JobContext,
    inputs: &JobInputs,
    config: JobConfig,
    reporter: &mut ProgressReporter,
    counters: &RunCounters,
) -> Result<JobOutcome> {
    let tools = ctx.tools.as_ref();
    let work_dir = inputs.work_dir.path();

    reporter.report("🔎 Reading video duration…").await;
    let video = tools.probe(&inputs.video).await?;
    info!(
        "Video {}: {:.3}s, audio stream: {}",
        video.path.display(),
        video.duration,
        video.has_audio
    );

    let segment_len = config.segment_length.secs() as f64;
    let segments = plan_segments(video.duration, segment_len, &inputs.work_dir.output_dir()?);
    counters.planned.store(segments.len(), Ordering::SeqCst);

    if config.audio_mode == AudioMode::Mix && !video.has_audio {
        info!("Video has no audio stream, mixing falls back to replace");
    }

    reporter.report(&format!("🎧 Applying {} filter…", config.asmr_level)).await;
    let muffled = audio::muffle(tools, &inputs.audio, work_dir, config.asmr_level).await?;

    let continuous = match config.sync_mode {
        SyncMode::Continuous => {
            reporter.report("🎚 Preparing continuous audio for the whole video…").await;
            Some(audio::build_continuous_track(tools, &muffled, work_dir, video.duration).await?)
        }
        SyncMode::Restart => None,
    };

    let total = segments.len();
    let encoding = config.quality.encoding_params();

    for segment in &segments {
        if ctx.cancel.is_cancelled() {
            info!("🛑 Job cancelled before clip {}/{}", segment.index, total);
            reporter.notify("🛑 Cancelled ✅").await;
            return Ok(JobOutcome::Cancelled);
        }

        reporter
            .report(&format!(
                "🎬 Clip {}/{}\n⏱ {} | 🎧 {}",
                segment.index,
                total,
                fmt_time(segment.length as u64),
                config.asmr_level
            ))
            .await;

        let source = match &continuous {
            Some(track) => AudioSource::Continuous(track),
            None => AudioSource::Restart(&muffled),
        };
        let args = build_segment_command(
            &video.path,
            video.has_audio,
            source,
            segment,
            config.audio_mode,
            encoding,
        );
        tools.transcode(&args).await?;

        let caption = clip_caption(segment.index, total, segment.length);
        deliver_clip(ctx.delivery.as_ref(), &segment.output, &caption).await?;
        counters.produced.fetch_add(1, Ordering::SeqCst);
        info!("🎬 Delivered clip {}/{}", segment.index, total);
    }

    reporter.report("✅ Processing complete!\nUse reset to start a new project ✨").await;
    Ok(JobOutcome::Completed)
}
