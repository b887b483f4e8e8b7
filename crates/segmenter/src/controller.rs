use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use crate::config::SegmenterConfig;
use crate::delivery::ClipDelivery;
use crate::download::{url_suffix, validate_direct_link, Downloader};
use crate::error::{Result, SegmenterError};
use crate::pipeline::{run_job, JobContext, JobInputs, JobReport, RunCounters};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::settings::{ConfigKey, JobConfig};
use crate::state::{InputKind, JobPhase, RequesterState};
use crate::tools::{FFmpegTools, MediaTools};
use crate::workdir::{safe_suffix, WorkDir};

type States = Arc<Mutex<HashMap<u64, RequesterState>>>;

/// Owns every requester's state and the background runs
///
/// All state transitions happen under one lock, so a requester can never
/// have two runs in flight.
pub struct JobController {
    config: SegmenterConfig,
    tools: Arc<dyn MediaTools>,
    downloader: Downloader,
    states: States,
}

impl JobController {
    pub fn new(config: SegmenterConfig, tools: Arc<dyn MediaTools>) -> Result<Self> {
        let downloader = Downloader::new(&config)?;
        Ok(JobController {
            config,
            tools,
            downloader,
            states: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Controller driving the configured ffmpeg/ffprobe binaries
    pub fn with_ffmpeg(config: SegmenterConfig) -> Result<Self> {
        let tools = Arc::new(FFmpegTools::new(&config));
        Self::new(config, tools)
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    fn fresh_state(&self) -> RequesterState {
        RequesterState::new(JobConfig::with_segment_length(
            self.config.default_segment_length(),
        ))
    }

    pub async fn set_option(&self, requester: u64, key: ConfigKey, value: &str) -> Result<()> {
        let mut states = self.states.lock().await;
        let state = states.entry(requester).or_insert_with(|| self.fresh_state());
        state.set_option(key, value)?;
        debug!("Requester {} set {:?} = {}", requester, key, value);
        Ok(())
    }

    /// Flip the cleanup flag, returning its new value
    pub async fn toggle_cleanup(&self, requester: u64) -> Result<bool> {
        let mut states = self.states.lock().await;
        let state = states.entry(requester).or_insert_with(|| self.fresh_state());
        state.toggle_cleanup()
    }

    /// Copy a local file into the requester's work dir as the given input
    pub async fn select_file(&self, requester: u64, kind: InputKind, source: &Path) -> Result<PathBuf> {
        let source_name = source.file_name().and_then(|n| n.to_str());
        let name = kind.file_name(&safe_suffix(source_name, kind.default_suffix()));
        let work_dir = self.prepare_input(requester).await?;
        let staged = staging_path(&work_dir, &name);

        if let Err(e) = tokio::fs::copy(source, &staged).await {
            discard(&staged).await;
            return Err(e.into());
        }
        self.adopt(requester, kind, &work_dir, staged, &name).await
    }

    /// Download a direct http(s) link into the requester's work dir
    pub async fn ingest_url(&self, requester: u64, kind: InputKind, url: &str) -> Result<PathBuf> {
        let parsed = validate_direct_link(url)?;
        let suffix = url_suffix(&parsed).unwrap_or_else(|| kind.default_suffix().to_string());
        let name = kind.file_name(&suffix);
        let work_dir = self.prepare_input(requester).await?;
        let staged = staging_path(&work_dir, &name);

        // the downloader removes its own partial file on failure
        self.downloader.download(parsed.as_str(), &staged).await?;
        self.adopt(requester, kind, &work_dir, staged, &name).await
    }

    async fn prepare_input(&self, requester: u64) -> Result<WorkDir> {
        let mut states = self.states.lock().await;
        let state = states.entry(requester).or_insert_with(|| self.fresh_state());
        state.ensure_work_dir(&self.config.data_dir, requester)
    }

    /// Move a fully materialized file into place and record it
    async fn adopt(
        &self,
        requester: u64,
        kind: InputKind,
        work_dir: &WorkDir,
        staged: PathBuf,
        name: &str,
    ) -> Result<PathBuf> {
        let mut states = self.states.lock().await;
        let result = match states.get_mut(&requester) {
            None => Err(SegmenterError::UnknownRequester(requester)),
            Some(state) if state.is_running() => Err(SegmenterError::AlreadyRunning),
            Some(state) if state.work_dir() != Some(work_dir) => {
                Err(SegmenterError::StaleInput(staged.clone()))
            }
            Some(state) => {
                let target = work_dir.path().join(name);
                let previous = state
                    .input(kind)
                    .filter(|p| *p != target.as_path())
                    .map(Path::to_path_buf);
                match tokio::fs::rename(&staged, &target).await {
                    Ok(()) => state
                        .set_input(kind, target.clone())
                        .map(|()| (target, previous)),
                    Err(e) => Err(e.into()),
                }
            }
        };
        drop(states);

        match result {
            Ok((path, previous)) => {
                // the work dir holds one file per input kind
                if let Some(old) = previous {
                    discard(&old).await;
                }
                info!("📥 Requester {} {:?} input ready: {}", requester, kind, path.display());
                Ok(path)
            }
            Err(e) => {
                discard(&staged).await;
                Err(e)
            }
        }
    }

    /// `Ready -> Running`: launch the job in the background
    ///
    /// The surface the previous run ended on is reused for progress.
    pub async fn start(
        &self,
        requester: u64,
        sink: Arc<dyn ProgressSink>,
        delivery: Arc<dyn ClipDelivery>,
    ) -> Result<()> {
        let mut states = self.states.lock().await;
        let state = states.entry(requester).or_insert_with(|| self.fresh_state());

        let cancel = CancellationToken::new();
        let (inputs, config) = state.begin(cancel.clone())?;
        info!(
            "🎬 Starting job for requester {}: {} segments, {}, {}, {}, {}",
            requester,
            config.segment_length,
            config.audio_mode,
            config.sync_mode,
            config.quality,
            config.asmr_level
        );

        let ctx = JobContext {
            tools: Arc::clone(&self.tools),
            delivery,
            cancel,
        };
        let reporter = ProgressReporter::new(sink, state.surface());
        let handle = tokio::spawn(supervise(
            Arc::clone(&self.states),
            requester,
            ctx,
            inputs,
            config,
            reporter,
        ));
        state.attach_handle(handle);
        Ok(())
    }

    /// Request cooperative cancellation; false if nothing is running
    pub async fn cancel(&self, requester: u64) -> bool {
        let states = self.states.lock().await;
        let requested = states
            .get(&requester)
            .is_some_and(|state| state.request_cancel());
        if requested {
            info!("🛑 Cancel requested for requester {}", requester);
        }
        requested
    }

    /// Drop the requester's inputs and delete their work dir
    pub async fn reset(&self, requester: u64) -> Result<()> {
        let stale = {
            let mut states = self.states.lock().await;
            match states.get_mut(&requester) {
                Some(state) => state.reset()?,
                None => None,
            }
        };
        if let Some(dir) = stale {
            dir.destroy().await;
        }
        Ok(())
    }

    pub async fn phase(&self, requester: u64) -> JobPhase {
        let states = self.states.lock().await;
        states
            .get(&requester)
            .map(|state| state.phase())
            .unwrap_or(JobPhase::Idle)
    }

    /// Dashboard: inputs, settings, run state and the last report
    pub async fn status_text(&self, requester: u64) -> String {
        let states = self.states.lock().await;
        let fresh;
        let state = match states.get(&requester) {
            Some(state) => state,
            None => {
                fresh = self.fresh_state();
                &fresh
            }
        };
        render_status(state)
    }

    /// Join the requester's current run, or return the last report
    pub async fn wait(&self, requester: u64) -> Result<Option<JobReport>> {
        let handle = {
            let mut states = self.states.lock().await;
            let state = states
                .get_mut(&requester)
                .ok_or(SegmenterError::UnknownRequester(requester))?;
            match state.take_handle() {
                Some(handle) => handle,
                None => return Ok(state.last_report().cloned()),
            }
        };

        match handle.await {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                warn!("Supervisor for requester {} did not finish: {}", requester, e);
                let states = self.states.lock().await;
                Ok(states.get(&requester).and_then(|s| s.last_report().cloned()))
            }
        }
    }

    /// Cancel every run and wait for all of them to finish
    pub async fn shutdown(&self) -> Vec<JobReport> {
        let handles: Vec<_> = {
            let mut states = self.states.lock().await;
            states
                .values_mut()
                .filter_map(|state| {
                    state.request_cancel();
                    state.take_handle()
                })
                .collect()
        };

        if !handles.is_empty() {
            info!("🛑 Shutting down, waiting for {} job(s)", handles.len());
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Job supervisor failed during shutdown: {}", e),
            }
        }
        reports
    }
}

/// Run the job on its own task and finalize whatever happens to it
///
/// A panic inside the job is turned into a failed report; the running
/// flag is always cleared here and cleanup always applied.
async fn supervise(
    states: States,
    requester: u64,
    ctx: JobContext,
    inputs: JobInputs,
    config: JobConfig,
    mut reporter: ProgressReporter,
) -> JobReport {
    let started_at = Utc::now();
    let fallback = ProgressReporter::new(reporter.sink(), None);
    let counters = Arc::new(RunCounters::default());

    let run = tokio::spawn({
        let counters = Arc::clone(&counters);
        async move {
            let report = run_job(&ctx, &inputs, config, &mut reporter, &counters).await;
            (report, reporter.surface())
        }
    });

    let (report, surface) = match run.await {
        Ok(done) => done,
        Err(e) => {
            error!("❌ Job for requester {} crashed: {}", requester, e);
            let message = format!("job crashed: {}", e);
            fallback.notify(&format!("❌ Error:\n{}", message)).await;
            (JobReport::failed(started_at, message, &counters), None)
        }
    };
    info!("✅ Job for requester {} finished: {}", requester, report.summary());

    let stale = {
        let mut states = states.lock().await;
        states
            .get_mut(&requester)
            .and_then(|state| state.finish(report.clone(), surface))
    };
    if let Some(dir) = stale {
        dir.destroy().await;
    }

    report
}

/// Private file an input is materialized into before adoption
///
/// Unique per call, so overlapping ingests of the same input never share
/// a file.
fn staging_path(work_dir: &WorkDir, name: &str) -> PathBuf {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    work_dir.path().join(format!("{}.{}.incoming", name, &tag[..8]))
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn input_label(path: Option<&Path>) -> String {
    match path.and_then(|p| p.file_name()) {
        Some(name) => format!("✅ {}", name.to_string_lossy()),
        None => "❌ not set".to_string(),
    }
}

fn render_status(state: &RequesterState) -> String {
    let config = state.config();
    let run = match state.phase() {
        JobPhase::Running => "⏳ running".to_string(),
        phase => format!("{:?}", phase).to_lowercase(),
    };

    let mut text = format!(
        "🎬 ASMR Segmenter\n\n\
         📹 Video: {}\n\
         🎧 Audio: {}\n\n\
         ⏱ Segment: {}\n\
         🔊 Audio: {}\n\
         🔁 Sync: {}\n\
         ⚙️ Quality: {}\n\
         🎚 ASMR: {}\n\
         🧹 Cleanup: {}\n\n\
         Status: {}",
        input_label(state.input(InputKind::Video)),
        input_label(state.input(InputKind::Audio)),
        config.segment_length,
        config.audio_mode,
        config.sync_mode,
        config.quality,
        config.asmr_level,
        if config.cleanup { "on" } else { "off" },
        run,
    );
    if let Some(report) = state.last_report() {
        text.push_str(&format!("\nLast job: {}", report.summary()));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use async_trait::async_trait;
    use tokio::sync::Notify;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use crate::delivery::tests::RecordingDelivery;
    use crate::ffprobe::MediaAsset;
    use crate::pipeline::JobOutcome;
    use crate::progress::tests::RecordingSink;

    const REQUESTER: u64 = 7;

    /// Scripted stand-in for ffmpeg/ffprobe
    ///
    /// Every transcode records its arguments and writes its output file.
    /// `hold_on` parks the transcode producing that file name until `gate`
    /// is notified, signalling `reached` first.
    #[derive(Default)]
    struct FakeTools {
        duration: f64,
        has_audio: bool,
        calls: StdMutex<Vec<Vec<String>>>,
        fail_on: Option<String>,
        panic_on: Option<String>,
        panic_on_probe: bool,
        hold_on: Option<String>,
        reached: Notify,
        gate: Notify,
    }

    impl FakeTools {
        fn new(duration: f64, has_audio: bool) -> Self {
            FakeTools {
                duration,
                has_audio,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_writing(&self, file_name: &str) -> Vec<Vec<String>> {
            self.calls()
                .into_iter()
                .filter(|args| args.last().is_some_and(|out| out.ends_with(file_name)))
                .collect()
        }
    }

    #[async_trait]
    impl MediaTools for FakeTools {
        async fn probe(&self, path: &Path) -> Result<MediaAsset> {
            if self.panic_on_probe {
                panic!("prober blew up");
            }
            Ok(MediaAsset {
                path: path.to_path_buf(),
                duration: self.duration,
                has_audio: self.has_audio,
            })
        }

        async fn probe_duration(&self, _path: &Path) -> Result<f64> {
            Ok(self.duration)
        }

        async fn transcode(&self, args: &[String]) -> Result<()> {
            self.calls.lock().unwrap().push(args.to_vec());
            let output = PathBuf::from(args.last().unwrap());
            let name = output.file_name().unwrap().to_string_lossy().to_string();

            if self.hold_on.as_deref() == Some(name.as_str()) {
                self.reached.notify_one();
                self.gate.notified().await;
            }
            if self.panic_on.as_deref() == Some(name.as_str()) {
                panic!("encoder crashed on {}", name);
            }
            if self.fail_on.as_deref() == Some(name.as_str()) {
                return Err(SegmenterError::transcode(args.join(" "), 1, "Invalid data found"));
            }
            std::fs::write(&output, b"media")?;
            Ok(())
        }
    }

    fn staged_leftovers(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".incoming"))
            .collect()
    }

    /// Chunked 200 response written slowly, `chunks` x `chunk_len` bytes of `fill`
    async fn serve_slow_chunked(chunks: usize, chunk_len: usize, fill: u8) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
                if socket.write_all(head).await.is_err() {
                    return;
                }
                for _ in 0..chunks {
                    let mut chunk = format!("{:x}\r\n", chunk_len).into_bytes();
                    chunk.extend(std::iter::repeat(fill).take(chunk_len));
                    chunk.extend_from_slice(b"\r\n");
                    if socket.write_all(&chunk).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                }
                let _ = socket.write_all(b"0\r\n\r\n").await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/slow.mp4", addr)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.windows(2)
            .filter(|w| w[0] == flag)
            .map(|w| w[1].as_str())
            .collect()
    }

    struct Harness {
        _data: tempfile::TempDir,
        sources: tempfile::TempDir,
        tools: Arc<FakeTools>,
        sink: Arc<RecordingSink>,
        delivery: Arc<RecordingDelivery>,
        controller: JobController,
    }

    impl Harness {
        fn new(tools: FakeTools) -> Self {
            let data = tempfile::tempdir().unwrap();
            let sources = tempfile::tempdir().unwrap();
            let mut config = SegmenterConfig::default_config();
            config.data_dir = data.path().to_path_buf();

            let tools = Arc::new(tools);
            let controller = JobController::new(config, tools.clone()).unwrap();
            Harness {
                _data: data,
                sources,
                tools,
                sink: Arc::new(RecordingSink::default()),
                delivery: Arc::new(RecordingDelivery::default()),
                controller,
            }
        }

        async fn select_inputs(&self) {
            let video = self.sources.path().join("holiday.MP4");
            let audio = self.sources.path().join("rain.wav");
            std::fs::write(&video, b"video").unwrap();
            std::fs::write(&audio, b"audio").unwrap();
            self.controller.select_file(REQUESTER, InputKind::Video, &video).await.unwrap();
            self.controller.select_file(REQUESTER, InputKind::Audio, &audio).await.unwrap();
        }

        async fn start(&self) -> Result<()> {
            self.controller
                .start(REQUESTER, self.sink.clone(), self.delivery.clone())
                .await
        }

        async fn run(&self) -> JobReport {
            self.start().await.unwrap();
            self.controller.wait(REQUESTER).await.unwrap().unwrap()
        }

        async fn work_dir(&self) -> Option<PathBuf> {
            let states = self.controller.states.lock().await;
            states
                .get(&REQUESTER)
                .and_then(|s| s.work_dir().map(|d| d.path().to_path_buf()))
        }

        fn delivered(&self) -> usize {
            self.delivery.delivered.lock().unwrap().len()
        }

        fn sent(&self) -> Vec<String> {
            self.sink.sent.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_select_file_names_inputs_by_kind() {
        let h = Harness::new(FakeTools::new(400.0, true));
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Idle);
        h.select_inputs().await;

        let dir = h.work_dir().await.unwrap();
        assert!(dir.join("input_video.mp4").exists());
        assert!(dir.join("input_audio.wav").exists());
        assert!(staged_leftovers(&dir).is_empty());
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Ready);
    }

    #[tokio::test]
    async fn test_full_run_delivers_every_clip() {
        let h = Harness::new(FakeTools::new(400.0, true));
        h.select_inputs().await;
        let dir = h.work_dir().await.unwrap();

        let report = h.run().await;
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!((report.produced, report.planned), (3, 3));
        assert_eq!(h.delivered(), 3);

        // muffle, continuous track, three clips
        assert_eq!(h.tools.calls().len(), 5);
        let full = h.tools.calls_writing("audio_full.m4a");
        assert_eq!(value_after(&full[0], "-t"), vec!["400.000"]);

        // cleanup is on by default
        assert!(!dir.exists());
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Idle);
        assert!(h.controller.status_text(REQUESTER).await.contains("Last job: completed (3/3 clips"));
    }

    #[tokio::test]
    async fn test_cancel_stops_at_next_clip_boundary() {
        let tools = FakeTools {
            hold_on: Some("clip_002.mp4".to_string()),
            ..FakeTools::new(900.0, true)
        };
        let h = Harness::new(tools);
        h.select_inputs().await;
        h.start().await.unwrap();

        h.tools.reached.notified().await;
        assert!(h.controller.cancel(REQUESTER).await);
        h.tools.gate.notify_one();

        let report = h.controller.wait(REQUESTER).await.unwrap().unwrap();
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        // the clip in flight finishes, the third is never started
        assert_eq!((report.produced, report.planned), (2, 5));
        assert_eq!(h.delivered(), 2);
        assert!(h.tools.calls_writing("clip_003.mp4").is_empty());
        assert!(h.sent().iter().any(|m| m.contains("🛑 Cancelled")));
        assert!(!h.controller.cancel(REQUESTER).await);
    }

    #[tokio::test]
    async fn test_second_start_is_refused_while_running() {
        let tools = FakeTools {
            hold_on: Some("clip_001.mp4".to_string()),
            ..FakeTools::new(200.0, true)
        };
        let h = Harness::new(tools);
        h.select_inputs().await;
        h.start().await.unwrap();
        h.tools.reached.notified().await;

        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Running);
        assert!(matches!(h.start().await, Err(SegmenterError::AlreadyRunning)));
        assert!(matches!(
            h.controller.set_option(REQUESTER, ConfigKey::Quality, "high").await,
            Err(SegmenterError::AlreadyRunning)
        ));
        assert!(matches!(h.controller.toggle_cleanup(REQUESTER).await, Err(SegmenterError::AlreadyRunning)));
        assert!(matches!(h.controller.reset(REQUESTER).await, Err(SegmenterError::AlreadyRunning)));
        let other = h.sources.path().join("other.mp4");
        std::fs::write(&other, b"v").unwrap();
        assert!(matches!(
            h.controller.select_file(REQUESTER, InputKind::Video, &other).await,
            Err(SegmenterError::AlreadyRunning)
        ));
        assert!(h.controller.status_text(REQUESTER).await.contains("running"));

        h.tools.gate.notify_one();
        let report = h.controller.wait(REQUESTER).await.unwrap().unwrap();
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.produced, 2);
        // the first run's settings were untouched by the refused edit
        let clips = h.tools.calls_writing("clip_002.mp4");
        assert_eq!(value_after(&clips[0], "-preset"), vec!["veryfast"]);
    }

    #[tokio::test]
    async fn test_start_without_both_inputs() {
        let h = Harness::new(FakeTools::new(200.0, true));
        assert!(matches!(h.start().await, Err(SegmenterError::MissingInputs)));

        let video = h.sources.path().join("v.mp4");
        std::fs::write(&video, b"v").unwrap();
        h.controller.select_file(REQUESTER, InputKind::Video, &video).await.unwrap();
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Configuring);
        assert!(matches!(h.start().await, Err(SegmenterError::MissingInputs)));
        assert!(h.tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transcode_failure_reports_and_cleans_up() {
        let tools = FakeTools {
            fail_on: Some("clip_002.mp4".to_string()),
            ..FakeTools::new(400.0, true)
        };
        let h = Harness::new(tools);
        h.select_inputs().await;
        let dir = h.work_dir().await.unwrap();

        let report = h.run().await;
        match &report.outcome {
            JobOutcome::Failed(message) => assert!(message.contains("Invalid data found")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.produced, 1);
        assert!(h.sent().iter().any(|m| m.starts_with("❌ Error:")));
        assert!(!dir.exists());
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Idle);
    }

    #[tokio::test]
    async fn test_panicking_job_is_reported_failed() {
        let tools = FakeTools {
            panic_on_probe: true,
            ..FakeTools::new(400.0, true)
        };
        let h = Harness::new(tools);
        h.select_inputs().await;

        let report = h.run().await;
        assert!(matches!(report.outcome, JobOutcome::Failed(_)));
        assert!(!h.controller.cancel(REQUESTER).await);
        assert_ne!(h.controller.phase(REQUESTER).await, JobPhase::Running);
    }

    #[tokio::test]
    async fn test_mix_with_silent_video_builds_replace_commands() {
        let h = Harness::new(FakeTools::new(100.0, false));
        h.controller.set_option(REQUESTER, ConfigKey::AudioMode, "mix").await.unwrap();
        h.select_inputs().await;

        let report = h.run().await;
        assert_eq!(report.outcome, JobOutcome::Completed);
        let clip = &h.tools.calls_writing("clip_001.mp4")[0];
        assert!(!clip.contains(&"-filter_complex".to_string()));
        assert_eq!(value_after(clip, "-map"), vec!["0:v:0", "1:a:0"]);
    }

    #[tokio::test]
    async fn test_continuous_track_matches_video_duration() {
        for duration in [42.5, 3600.0] {
            let h = Harness::new(FakeTools::new(duration, true));
            h.select_inputs().await;
            h.run().await;

            let full = h.tools.calls_writing("audio_full.m4a");
            assert_eq!(full.len(), 1);
            assert_eq!(value_after(&full[0], "-t"), vec![format!("{:.3}", duration)]);
            assert_eq!(value_after(&full[0], "-stream_loop"), vec!["-1"]);
        }
    }

    #[tokio::test]
    async fn test_restart_mode_skips_continuous_track() {
        let h = Harness::new(FakeTools::new(400.0, true));
        h.controller.set_option(REQUESTER, ConfigKey::SyncMode, "restart").await.unwrap();
        h.select_inputs().await;
        h.run().await;

        assert!(h.tools.calls_writing("audio_full.m4a").is_empty());
        let clip = &h.tools.calls_writing("clip_003.mp4")[0];
        assert!(clip.iter().any(|a| a.ends_with("audio_muffled.m4a")));
    }

    #[tokio::test]
    async fn test_cleanup_off_keeps_inputs_for_another_run() {
        let h = Harness::new(FakeTools::new(100.0, true));
        assert!(!h.controller.toggle_cleanup(REQUESTER).await.unwrap());
        h.select_inputs().await;
        let dir = h.work_dir().await.unwrap();

        h.run().await;
        assert!(dir.join("out").join("clip_001.mp4").exists());
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Ready);

        let report = h.run().await;
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(h.delivered(), 2);
    }

    #[tokio::test]
    async fn test_progress_reuses_surface_across_runs() {
        let h = Harness::new(FakeTools::new(100.0, true));
        h.controller.toggle_cleanup(REQUESTER).await.unwrap();
        h.select_inputs().await;

        h.run().await;
        let sent_after_first = h.sent().len();
        h.run().await;
        // the second run edits the surface the first one adopted
        assert_eq!(h.sent().len(), sent_after_first);
        assert!(!h.sink.edits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_deletes_work_dir() {
        let h = Harness::new(FakeTools::new(100.0, true));
        h.select_inputs().await;
        let dir = h.work_dir().await.unwrap();

        h.controller.reset(REQUESTER).await.unwrap();
        assert!(!dir.exists());
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Idle);
        assert!(h.controller.status_text(REQUESTER).await.contains("❌ not set"));
    }

    #[tokio::test]
    async fn test_ingest_url_downloads_into_work_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/Track.MP3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 4096]))
            .mount(&server)
            .await;

        let h = Harness::new(FakeTools::new(100.0, true));
        let url = format!("{}/media/Track.MP3", server.uri());
        let saved = h.controller.ingest_url(REQUESTER, InputKind::Audio, &url).await.unwrap();

        assert_eq!(saved.file_name().unwrap(), "input_audio.mp3");
        assert_eq!(std::fs::metadata(&saved).unwrap().len(), 4096);
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Configuring);
    }

    #[tokio::test]
    async fn test_ingest_url_rejects_page_links() {
        let h = Harness::new(FakeTools::new(100.0, true));
        let err = h
            .controller
            .ingest_url(REQUESTER, InputKind::Video, "https://www.youtube.com/watch?v=abc")
            .await
            .unwrap_err();
        assert!(matches!(err, SegmenterError::InvalidUrl(_)));
        assert!(h.work_dir().await.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_unknown_requester() {
        let h = Harness::new(FakeTools::new(100.0, true));
        assert!(matches!(
            h.controller.wait(99).await,
            Err(SegmenterError::UnknownRequester(99))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_jobs() {
        let tools = FakeTools {
            hold_on: Some("clip_001.mp4".to_string()),
            ..FakeTools::new(600.0, true)
        };
        let h = Harness::new(tools);
        h.select_inputs().await;
        h.start().await.unwrap();
        h.tools.reached.notified().await;

        h.controller.cancel(REQUESTER).await;
        h.tools.gate.notify_one();
        let reports = h.controller.shutdown().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, JobOutcome::Cancelled);
        assert_eq!(reports[0].produced, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_audio_preparation_produces_no_clips() {
        let tools = FakeTools {
            hold_on: Some("audio_muffled.m4a".to_string()),
            ..FakeTools::new(400.0, true)
        };
        let h = Harness::new(tools);
        h.select_inputs().await;
        h.start().await.unwrap();

        h.tools.reached.notified().await;
        assert!(h.controller.cancel(REQUESTER).await);
        h.tools.gate.notify_one();

        let report = h.controller.wait(REQUESTER).await.unwrap().unwrap();
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!((report.produced, report.planned), (0, 3));
        assert_eq!(h.delivered(), 0);
        assert!(h.tools.calls_writing("clip_001.mp4").is_empty());
        assert!(h.sent().iter().any(|m| m.contains("🛑 Cancelled")));
        assert!(!h.sent().iter().any(|m| m.contains("❌ Error")));
    }

    #[tokio::test]
    async fn test_panic_mid_run_keeps_clip_counts() {
        let tools = FakeTools {
            panic_on: Some("clip_002.mp4".to_string()),
            ..FakeTools::new(400.0, true)
        };
        let h = Harness::new(tools);
        h.select_inputs().await;

        let report = h.run().await;
        assert!(matches!(report.outcome, JobOutcome::Failed(_)));
        assert_eq!((report.produced, report.planned), (1, 3));
        assert_eq!(h.delivered(), 1);
        assert!(h.sent().iter().any(|m| m.starts_with("❌ Error:")));
    }

    #[tokio::test]
    async fn test_reselecting_input_replaces_previous_file() {
        let h = Harness::new(FakeTools::new(100.0, true));
        let first = h.sources.path().join("take1.mp4");
        let second = h.sources.path().join("take2.MOV");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&second, b"two").unwrap();

        let old = h.controller.select_file(REQUESTER, InputKind::Video, &first).await.unwrap();
        let new = h.controller.select_file(REQUESTER, InputKind::Video, &second).await.unwrap();

        assert!(!old.exists());
        assert_eq!(new.file_name().unwrap(), "input_video.mov");
        assert_eq!(std::fs::read(&new).unwrap(), b"two");

        // same name again is overwritten in place, not deleted
        let again = h.controller.select_file(REQUESTER, InputKind::Video, &second).await.unwrap();
        assert_eq!(again, new);
        assert!(again.exists());
    }

    #[tokio::test]
    async fn test_overlapping_ingests_never_adopt_a_rejected_download() {
        let fast_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fast.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![b'b'; 1000])
                    .set_delay(std::time::Duration::from_millis(60)),
            )
            .mount(&fast_server)
            .await;
        let slow_url = serve_slow_chunked(10, 1000, b'a').await;
        let fast_url = format!("{}/fast.mp4", fast_server.uri());

        let mut h = Harness::new(FakeTools::new(100.0, true));
        h.controller.downloader = h.controller.downloader.clone().with_max_bytes(5000);
        let controller = &h.controller;

        let (slow, fast) = tokio::join!(
            controller.ingest_url(REQUESTER, InputKind::Video, &slow_url),
            controller.ingest_url(REQUESTER, InputKind::Video, &fast_url),
        );

        assert!(matches!(slow, Err(SegmenterError::DownloadTooLarge { .. })));
        let adopted = fast.unwrap();
        assert_eq!(std::fs::read(&adopted).unwrap(), vec![b'b'; 1000]);

        let dir = h.work_dir().await.unwrap();
        assert!(staged_leftovers(&dir).is_empty());
        assert_eq!(h.controller.phase(REQUESTER).await, JobPhase::Configuring);
    }
}
