pub mod audio;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod download;
pub mod error;
pub mod ffmpeg;
pub mod ffprobe;
pub mod pipeline;
pub mod progress;
pub mod segment;
pub mod settings;
pub mod state;
pub mod tools;
pub mod workdir;

pub use config::SegmenterConfig;
pub use controller::JobController;
pub use delivery::ClipDelivery;
pub use error::{Result, SegmenterError};
pub use ffprobe::MediaAsset;
pub use pipeline::{JobOutcome, JobReport};
pub use progress::{ProgressSink, SurfaceId};
pub use settings::{AsmrLevel, AudioMode, ConfigKey, JobConfig, QualityPreset, SegmentLength, SyncMode};
pub use state::{InputKind, JobPhase};
pub use tools::{FFmpegTools, MediaTools};
