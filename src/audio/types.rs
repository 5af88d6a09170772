use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw audio data with metadata
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration in seconds
    pub duration: f64,

    /// Original file path
    pub file_path: PathBuf,

    /// Audio format information
    pub format: AudioFormat,
}

impl AudioData {
    /// Number of sample frames (one sample per channel each)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Frame index for a time in seconds, clamped to the data
    pub fn frame_at(&self, seconds: f64) -> usize {
        let frame = (seconds.max(0.0) * self.sample_rate as f64) as usize;
        frame.min(self.frame_count())
    }

    /// Interleaved samples between two frame indices
    pub fn interleaved_range(&self, start_frame: usize, end_frame: usize) -> &[f32] {
        let channels = self.channels.max(1) as usize;
        let end = end_frame.min(self.frame_count()) * channels;
        let start = (start_frame * channels).min(end);
        &self.samples[start..end]
    }

    /// Mono mix of the `len` frames ending at `end_frame`, zero-padded at the front
    pub fn mono_window(&self, end_frame: usize, len: usize) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        let end_frame = end_frame.min(self.frame_count());
        let start_frame = end_frame.saturating_sub(len);
        let mut window = vec![0.0; len - (end_frame - start_frame)];

        for chunk in self.interleaved_range(start_frame, end_frame).chunks(channels) {
            let sum: f32 = chunk.iter().sum();
            window.push(sum / channels as f32);
        }

        window
    }

    /// Track title derived from the file name
    pub fn title(&self) -> String {
        self.file_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("untitled")
            .to_string()
    }
}

/// Audio file format information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    /// File extension (wav, mp3, flac, etc.)
    pub extension: String,

    /// Bit depth (16, 24, 32, etc.)
    pub bit_depth: Option<u16>,

    /// Compression type (if any)
    pub compression: Option<String>,
}

/// One spectrum snapshot: a byte magnitude (0-255) per frequency bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisFrame {
    buckets: Vec<u8>,
}

impl AnalysisFrame {
    pub fn new(buckets: Vec<u8>) -> Self {
        Self { buckets }
    }

    /// Frame of `bucket_count` zero magnitudes
    pub fn silent(bucket_count: usize) -> Self {
        Self { buckets: vec![0; bucket_count] }
    }

    pub fn buckets(&self) -> &[u8] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.buckets.iter().all(|&b| b == 0)
    }
}

/// Playback state of the audio session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Lifecycle of the underlying audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Open,
    Suspended,
    Closed,
}

/// Notifications raised while the graph advances
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    /// Cursor moved while playing
    TimeUpdate(f64),

    /// The track played through to its end
    Ended,
}
