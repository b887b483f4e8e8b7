use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::{Result, SegmenterError};

/// Allowed clip lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentLength {
    Secs60,
    Secs120,
    #[default]
    Secs180,
    Secs300,
}

impl SegmentLength {
    pub const ALL: [SegmentLength; 4] = [
        SegmentLength::Secs60,
        SegmentLength::Secs120,
        SegmentLength::Secs180,
        SegmentLength::Secs300,
    ];

    pub fn secs(&self) -> u32 {
        match self {
            SegmentLength::Secs60 => 60,
            SegmentLength::Secs120 => 120,
            SegmentLength::Secs180 => 180,
            SegmentLength::Secs300 => 300,
        }
    }

    pub fn from_secs(secs: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.secs() == secs)
    }
}

impl FromStr for SegmentLength {
    type Err = SegmenterError;

    /// Accepts plain seconds ("180") or minutes ("3m")
    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().to_lowercase();
        let secs = match raw.strip_suffix('m') {
            Some(mins) => mins.parse::<u32>().ok().and_then(|m| m.checked_mul(60)),
            None => raw.trim_end_matches('s').parse::<u32>().ok(),
        };
        secs.and_then(Self::from_secs)
            .ok_or_else(|| SegmenterError::invalid_value("segment", s))
    }
}

impl fmt::Display for SegmentLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fmt_time(self.secs() as u64))
    }
}

/// What happens to the video's own audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioMode {
    /// Discard the video's audio and use only the muffled track
    #[default]
    Replace,
    /// Blend the video's audio with the muffled track
    Mix,
}

impl FromStr for AudioMode {
    type Err = SegmenterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(AudioMode::Replace),
            "mix" => Ok(AudioMode::Mix),
            _ => Err(SegmenterError::invalid_value("audio", s)),
        }
    }
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AudioMode::Replace => "replace video audio",
            AudioMode::Mix => "mix with video audio",
        })
    }
}

/// How the muffled track lines up with successive clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Every clip starts from the beginning of the audio
    Restart,
    /// One looped track spans the whole video
    #[default]
    Continuous,
}

impl FromStr for SyncMode {
    type Err = SegmenterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "restart" => Ok(SyncMode::Restart),
            "cont" | "continuous" => Ok(SyncMode::Continuous),
            _ => Err(SegmenterError::invalid_value("sync", s)),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Restart => "restart audio every clip",
            SyncMode::Continuous => "continuous audio across clips",
        })
    }
}

/// x264 parameters for one quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingParams {
    pub preset: &'static str,
    pub crf: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityPreset {
    Fast,
    #[default]
    Balanced,
    High,
}

impl QualityPreset {
    pub fn encoding_params(&self) -> EncodingParams {
        match self {
            QualityPreset::Fast => EncodingParams { preset: "ultrafast", crf: 28 },
            QualityPreset::Balanced => EncodingParams { preset: "veryfast", crf: 23 },
            QualityPreset::High => EncodingParams { preset: "medium", crf: 20 },
        }
    }
}

impl FromStr for QualityPreset {
    type Err = SegmenterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(QualityPreset::Fast),
            "bal" | "balanced" => Ok(QualityPreset::Balanced),
            "high" => Ok(QualityPreset::High),
            _ => Err(SegmenterError::invalid_value("quality", s)),
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QualityPreset::Fast => "fast",
            QualityPreset::Balanced => "balanced",
            QualityPreset::High => "high",
        })
    }
}

/// Strength of the muffling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AsmrLevel {
    Light,
    Medium,
    #[default]
    Full,
}

impl AsmrLevel {
    /// ffmpeg `-af` graph for this level
    pub fn filter_graph(&self) -> &'static str {
        match self {
            AsmrLevel::Light => "highpass=f=35,lowpass=f=1200,acompressor=threshold=-22dB:ratio=3:attack=10:release=200,volume=1.25,alimiter=limit=0.95",
            AsmrLevel::Medium => "highpass=f=35,lowpass=f=850,equalizer=f=120:t=q:w=1:g=3,acompressor=threshold=-24dB:ratio=4:attack=10:release=220,volume=1.45,alimiter=limit=0.95",
            // 500 Hz low-pass gives the fully muffled sound
            AsmrLevel::Full => "highpass=f=35,lowpass=f=500,equalizer=f=120:t=q:w=1:g=4,acompressor=threshold=-26dB:ratio=4:attack=10:release=260,volume=1.65,alimiter=limit=0.95",
        }
    }
}

impl FromStr for AsmrLevel {
    type Err = SegmenterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(AsmrLevel::Light),
            "med" | "medium" => Ok(AsmrLevel::Medium),
            "full" => Ok(AsmrLevel::Full),
            _ => Err(SegmenterError::invalid_value("asmr", s)),
        }
    }
}

impl fmt::Display for AsmrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AsmrLevel::Light => "muffled ASMR (light)",
            AsmrLevel::Medium => "muffled ASMR (medium)",
            AsmrLevel::Full => "muffled ASMR (full)",
        })
    }
}

/// Settings a requester can change between jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    SegmentLength,
    AudioMode,
    SyncMode,
    Quality,
    AsmrLevel,
    Cleanup,
}

impl FromStr for ConfigKey {
    type Err = SegmenterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "seg" | "segment" => Ok(ConfigKey::SegmentLength),
            "audio" | "mode" => Ok(ConfigKey::AudioMode),
            "sync" => Ok(ConfigKey::SyncMode),
            "q" | "quality" => Ok(ConfigKey::Quality),
            "asmr" => Ok(ConfigKey::AsmrLevel),
            "cleanup" => Ok(ConfigKey::Cleanup),
            _ => Err(SegmenterError::invalid_value("setting", s)),
        }
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(SegmenterError::invalid_value("cleanup", value)),
    }
}

/// Snapshot of the settings a job runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub segment_length: SegmentLength,
    pub audio_mode: AudioMode,
    pub sync_mode: SyncMode,
    pub quality: QualityPreset,
    pub asmr_level: AsmrLevel,
    pub cleanup: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::with_segment_length(SegmentLength::default())
    }
}

impl JobConfig {
    pub fn with_segment_length(segment_length: SegmentLength) -> Self {
        JobConfig {
            segment_length,
            audio_mode: AudioMode::default(),
            sync_mode: SyncMode::default(),
            quality: QualityPreset::default(),
            asmr_level: AsmrLevel::default(),
            cleanup: true,
        }
    }

    /// Write one setting; unknown values leave the config unchanged
    pub fn apply(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::SegmentLength => self.segment_length = value.parse()?,
            ConfigKey::AudioMode => self.audio_mode = value.parse()?,
            ConfigKey::SyncMode => self.sync_mode = value.parse()?,
            ConfigKey::Quality => self.quality = value.parse()?,
            ConfigKey::AsmrLevel => self.asmr_level = value.parse()?,
            ConfigKey::Cleanup => self.cleanup = parse_flag(value)?,
        }
        Ok(())
    }
}

/// Render whole seconds as `m:ss`
pub fn fmt_time(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
