mod command;
mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use segmenter::workdir::sweep_stale;
use segmenter::{ClipDelivery, InputKind, JobController, ProgressSink, SegmenterConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use command::{parse_command, Command, Source, HELP};
use console::{ConsoleDelivery, ConsoleSink};

/// Split a long video into ASMR clips with a muffled soundtrack
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Requester identity the console acts as
    #[arg(short, long, default_value_t = 1)]
    requester: u64,

    /// Copy every delivered clip into this directory
    #[arg(short, long)]
    deliver_dir: Option<PathBuf>,
}

struct Session {
    requester: u64,
    controller: Arc<JobController>,
    sink: Arc<dyn ProgressSink>,
    delivery: Arc<dyn ClipDelivery>,
    downloads: Vec<JoinHandle<()>>,
}

impl Session {
    /// Handle one command; returns false when the loop should stop
    async fn dispatch(&mut self, command: Command) -> bool {
        let id = self.requester;
        match command {
            Command::Input(kind, Source::Path(path)) => {
                match self.controller.select_file(id, kind, Path::new(&path)).await {
                    Ok(saved) => println!("✅ {:?} saved as {}", kind, saved.display()),
                    Err(e) => println!("❌ {}", e),
                }
            }
            Command::Input(kind, Source::Url(url)) => self.spawn_download(kind, url),
            Command::Set(key, value) => match self.controller.set_option(id, key, &value).await {
                Ok(()) => println!("✅ {:?} = {}", key, value),
                Err(e) => println!("❌ {}", e),
            },
            Command::ToggleCleanup => match self.controller.toggle_cleanup(id).await {
                Ok(on) => println!("🧹 Cleanup: {}", if on { "on" } else { "off" }),
                Err(e) => println!("❌ {}", e),
            },
            Command::Go => {
                let started = self
                    .controller
                    .start(id, Arc::clone(&self.sink), Arc::clone(&self.delivery))
                    .await;
                if let Err(e) = started {
                    println!("❌ {}", e);
                }
            }
            Command::Cancel => {
                if self.controller.cancel(id).await {
                    println!("🛑 Cancelling after the current clip…");
                } else {
                    println!("Nothing is running");
                }
            }
            Command::Reset => match self.controller.reset(id).await {
                Ok(()) => println!("♻️ Reset done"),
                Err(e) => println!("❌ {}", e),
            },
            Command::Status => println!("{}", self.controller.status_text(id).await),
            Command::Wait => match self.controller.wait(id).await {
                Ok(Some(report)) => println!("Job {}", report.summary()),
                Ok(None) => println!("No job has run yet"),
                Err(e) => println!("❌ {}", e),
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => return false,
        }
        true
    }

    fn spawn_download(&mut self, kind: InputKind, url: String) {
        self.downloads.retain(|handle| !handle.is_finished());

        let controller = Arc::clone(&self.controller);
        let id = self.requester;
        println!("⬇️ Downloading {:?} from {}", kind, url);
        self.downloads.push(tokio::spawn(async move {
            match controller.ingest_url(id, kind, &url).await {
                Ok(saved) => println!("✅ {:?} downloaded to {}", kind, saved.display()),
                Err(e) => println!("❌ {}", e),
            }
        }));
    }

    /// Abort downloads, cancel the running job and wait for it
    async fn close(self) {
        for handle in &self.downloads {
            handle.abort();
        }
        for report in self.controller.shutdown().await {
            info!("Job {} at shutdown", report.summary());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut cfg = SegmenterConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    cfg.apply_env_overrides()
        .context("Failed to apply environment overrides")?;
    cfg.validate().context("Invalid configuration")?;

    info!("ASMR segmenter starting");
    info!("  Data dir: {}", cfg.data_dir.display());
    info!("  Default segment: {}s", cfg.default_segment_secs);
    info!("  Max download: {} MB", cfg.max_download_mb);
    debug!("  ffmpeg: {}, ffprobe: {}", cfg.ffmpeg_bin.display(), cfg.ffprobe_bin.display());

    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("Failed to create data directory: {}", cfg.data_dir.display()))?;
    sweep_stale(&cfg.data_dir)
        .await
        .context("Failed to remove stale work dirs on startup")?;

    let controller = JobController::with_ffmpeg(cfg).context("Failed to create job controller")?;
    let mut session = Session {
        requester: args.requester,
        controller: Arc::new(controller),
        sink: Arc::new(ConsoleSink::default()),
        delivery: Arc::new(ConsoleDelivery::new(args.deliver_dir)),
        downloads: Vec::new(),
    };

    println!("{}", session.controller.status_text(session.requester).await);
    println!("Type help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("❌ {}", e);
                continue;
            }
        };
        if !session.dispatch(command).await {
            break;
        }
    }

    session.close().await;
    info!("✅ ASMR segmenter stopped");
    Ok(())
}
