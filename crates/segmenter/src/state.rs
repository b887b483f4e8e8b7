use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::error::{Result, SegmenterError};
use crate::pipeline::{JobInputs, JobReport};
use crate::progress::SurfaceId;
use crate::settings::{ConfigKey, JobConfig};
use crate::workdir::WorkDir;

/// Which of the two inputs a file is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Video,
    Audio,
}

impl InputKind {
    /// File name inside the work dir, keeping the source's extension
    pub fn file_name(&self, suffix: &str) -> String {
        match self {
            InputKind::Video => format!("input_video{}", suffix),
            InputKind::Audio => format!("input_audio{}", suffix),
        }
    }

    pub fn default_suffix(&self) -> &'static str {
        match self {
            InputKind::Video => ".mp4",
            InputKind::Audio => ".mp3",
        }
    }
}

/// Where a requester is in the job lifecycle
///
/// `Completed`, `Cancelled` and `Failed` are not resting states; they are
/// recorded in [`JobReport::outcome`] and the requester drops back to one
/// of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// No inputs selected
    Idle,
    /// One of the two inputs is still missing
    Configuring,
    /// Both inputs present
    Ready,
    Running,
}

/// The background run a requester owns
#[derive(Debug)]
pub struct RunningJob {
    pub cancel: CancellationToken,
    pub started_at: DateTime<Utc>,
    /// Taken by whoever joins the run
    pub handle: Option<JoinHandle<JobReport>>,
    cleanup: bool,
}

/// Per-requester settings, inputs and run
#[derive(Debug)]
pub struct RequesterState {
    config: JobConfig,
    work_dir: Option<WorkDir>,
    video: Option<PathBuf>,
    audio: Option<PathBuf>,
    running: Option<RunningJob>,
    surface: Option<SurfaceId>,
    last_report: Option<JobReport>,
}

impl RequesterState {
    pub fn new(config: JobConfig) -> Self {
        RequesterState {
            config,
            work_dir: None,
            video: None,
            audio: None,
            running: None,
            surface: None,
            last_report: None,
        }
    }

    pub fn phase(&self) -> JobPhase {
        if self.running.is_some() {
            return JobPhase::Running;
        }
        match (&self.video, &self.audio) {
            (None, None) => JobPhase::Idle,
            (Some(_), Some(_)) => JobPhase::Ready,
            _ => JobPhase::Configuring,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn input(&self, kind: InputKind) -> Option<&Path> {
        match kind {
            InputKind::Video => self.video.as_deref(),
            InputKind::Audio => self.audio.as_deref(),
        }
    }

    pub fn work_dir(&self) -> Option<&WorkDir> {
        self.work_dir.as_ref()
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn set_surface(&mut self, surface: Option<SurfaceId>) {
        self.surface = surface;
    }

    pub fn last_report(&self) -> Option<&JobReport> {
        self.last_report.as_ref()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.running.is_some() {
            return Err(SegmenterError::AlreadyRunning);
        }
        Ok(())
    }

    /// Change one setting; rejected while a job runs
    pub fn set_option(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        self.ensure_idle()?;
        self.config.apply(key, value)
    }

    pub fn toggle_cleanup(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        self.config.cleanup = !self.config.cleanup;
        Ok(self.config.cleanup)
    }

    /// Work dir for incoming inputs, creating it on first use
    pub fn ensure_work_dir(&mut self, data_dir: &Path, requester: u64) -> Result<WorkDir> {
        self.ensure_idle()?;
        if let Some(dir) = &self.work_dir {
            return Ok(dir.clone());
        }
        let dir = WorkDir::create(data_dir, requester)?;
        self.work_dir = Some(dir.clone());
        Ok(dir)
    }

    /// Adopt a materialized input file
    ///
    /// The file must live in the current work dir; a reset between
    /// download start and adoption makes the download stale.
    pub fn set_input(&mut self, kind: InputKind, path: PathBuf) -> Result<()> {
        self.ensure_idle()?;
        let in_work_dir = self
            .work_dir
            .as_ref()
            .is_some_and(|dir| path.starts_with(dir.path()));
        if !in_work_dir {
            return Err(SegmenterError::StaleInput(path));
        }
        match kind {
            InputKind::Video => self.video = Some(path),
            InputKind::Audio => self.audio = Some(path),
        }
        Ok(())
    }

    /// Drop inputs and hand back the work dir for deletion
    pub fn reset(&mut self) -> Result<Option<WorkDir>> {
        self.ensure_idle()?;
        Ok(self.clear_inputs())
    }

    fn clear_inputs(&mut self) -> Option<WorkDir> {
        self.video = None;
        self.audio = None;
        self.work_dir.take()
    }

    /// `Ready -> Running`: snapshot inputs and settings for a new run
    pub fn begin(&mut self, cancel: CancellationToken) -> Result<(JobInputs, JobConfig)> {
        self.ensure_idle()?;
        let (video, audio, work_dir) = match (&self.video, &self.audio, &self.work_dir) {
            (Some(v), Some(a), Some(d)) => (v.clone(), a.clone(), d.clone()),
            _ => return Err(SegmenterError::MissingInputs),
        };

        self.running = Some(RunningJob {
            cancel,
            started_at: Utc::now(),
            handle: None,
            cleanup: self.config.cleanup,
        });

        Ok((JobInputs { video, audio, work_dir }, self.config))
    }

    pub fn attach_handle(&mut self, handle: JoinHandle<JobReport>) {
        if let Some(run) = self.running.as_mut() {
            run.handle = Some(handle);
        }
    }

    /// Ask the running job to stop at the next clip boundary
    pub fn request_cancel(&self) -> bool {
        match &self.running {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn take_handle(&mut self) -> Option<JoinHandle<JobReport>> {
        self.running.as_mut().and_then(|run| run.handle.take())
    }

    /// `Running -> Idle/Ready`: record the report and apply cleanup
    ///
    /// Returns the work dir to delete when the run had cleanup enabled.
    pub fn finish(&mut self, report: JobReport, surface: Option<SurfaceId>) -> Option<WorkDir> {
        let cleanup = self.running.take().map(|run| run.cleanup).unwrap_or(false);
        if surface.is_some() {
            self.surface = surface;
        }
        self.last_report = Some(report);
        if cleanup {
            self.clear_inputs()
        } else {
            None
        }
    }
}
