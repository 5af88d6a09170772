use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Maximum length of a recorded clip in seconds
pub const CAP_SECONDS: f64 = 30.0;

/// Logical canvas width (9:16 portrait)
pub const CANVAS_WIDTH: u32 = 540;

/// Logical canvas height (9:16 portrait)
pub const CANVAS_HEIGHT: u32 = 960;

/// Frame rate the encoder samples the canvas at, independent of draw cadence
pub const ENCODER_FPS: u32 = 30;

/// How often recording elapsed time is checked against the cap
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Display refresh pacing used by the live loop
pub const REFRESH_INTERVAL: Duration = Duration::from_micros(16_667);

/// Main configuration for spectrum-reel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Analysis and playback settings
    pub audio: AudioConfig,

    /// Rendering resources
    pub render: RenderSettings,

    /// Capture and encoding settings
    pub capture: CaptureConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.capture.validate()?;
        Ok(())
    }
}

/// Spectrum analyser and speaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Transform size; the analysis frame holds half as many buckets
    pub fft_size: usize,

    /// Blend factor between the previous and current magnitude (0.0-1.0)
    pub smoothing: f32,

    /// Magnitude mapped to byte 0
    pub min_decibels: f32,

    /// Magnitude mapped to byte 255
    pub max_decibels: f32,

    /// Speaker volume (0.0-1.0); never affects the capture path
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            volume: 1.0,
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(ConfigError::InvalidValue {
                key: "audio.fft_size".to_string(),
                value: self.fft_size.to_string()
            }.into());
        }

        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConfigError::InvalidValue {
                key: "audio.smoothing".to_string(),
                value: self.smoothing.to_string()
            }.into());
        }

        if self.min_decibels >= self.max_decibels {
            return Err(ConfigError::InvalidValue {
                key: "audio.decibel_range".to_string(),
                value: format!("{}..{}", self.min_decibels, self.max_decibels)
            }.into());
        }

        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ConfigError::InvalidValue {
                key: "audio.volume".to_string(),
                value: self.volume.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Font resources for title and caption text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Regular face used for captions; system fonts are searched when unset
    pub font_path: Option<PathBuf>,

    /// Bold face used for the title; falls back to `font_path`
    pub bold_font_path: Option<PathBuf>,
}

/// Capture and encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory finished clips are written to
    pub output_dir: PathBuf,

    /// FFmpeg executable
    pub ffmpeg_binary: PathBuf,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,

    /// Optional override of the format preference order, by format label
    pub preferred_formats: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reels"),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            quality: 80,
            preferred_formats: Vec::new(),
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "capture.quality".to_string(),
                value: self.quality.to_string()
            }.into());
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "capture.output_dir".to_string(),
                value: String::new()
            }.into());
        }

        Ok(())
    }

    /// Map the 0-100 quality scale to an encoder CRF value
    pub fn crf(&self) -> u8 {
        (51 - ((self.quality as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
    }
}
