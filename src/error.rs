use thiserror::Error;

/// Main error type for the spectrum-reel library
#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Initialization error: {0}")]
    Initialization(#[from] InitializationError),

    #[error("Encoding error: {0}")]
    EncodingUnsupported(#[from] EncodingUnsupportedError),

    #[error("Capture error: {0}")]
    Capture(#[from] RuntimeCaptureError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rejected: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The platform lacks a required audio or capture capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    #[error("No audio context could be created: {reason}")]
    AudioContextUnavailable { reason: String },

    #[error("Audio graph is not open; an unlock gesture is required first")]
    GraphNotOpen,

    #[error("Audio graph is running in silent mode; capture is unavailable")]
    SilentMode,

    #[error("No track is loaded")]
    NoTrack,
}

/// No acceptable output format was found during negotiation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("No supported encoding format (tried: {})", tried.join(", "))]
pub struct EncodingUnsupportedError {
    /// Labels of every candidate that was probed, in preference order
    pub tried: Vec<String>,
}

/// Encoder or stream failure while recording or finalizing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeCaptureError {
    #[error("Failed to start encoder: {reason}")]
    EncoderStart { reason: String },

    #[error("Encoder failed: {reason}")]
    Encoder { reason: String },

    #[error("Stream write failed: {reason}")]
    StreamWrite { reason: String },

    #[error("Encoder event channel closed before the recording was flushed")]
    ChannelClosed,

    #[error("Finalizing the recording failed: {reason}")]
    Finalize { reason: String },
}

/// The audio source failed to load, decode or play
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to decode audio: {reason}")]
    DecodeFailed { reason: String },

    #[error("Audio output failed: {reason}")]
    OutputFailed { reason: String },
}

/// Rendering resource failures (fonts, background assets)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Failed to load font: {path} - {reason}")]
    FontLoadFailed { path: String, reason: String },

    #[error("Failed to load background image: {path}")]
    AssetLoadFailed { path: String },

    #[error("Failed to write frame: {reason}")]
    WriteFailed { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// An operation was rejected because of the current state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("cannot {operation} while capture is {state}")]
    Capture { operation: &'static str, state: String },

    #[error("the trim window is locked while recording")]
    TrimLocked,

    #[error("the editor session has been torn down")]
    TornDown,
}

/// Convenience type alias for Results using ReelError
pub type Result<T> = std::result::Result<T, ReelError>;

impl ReelError {
    /// Check if this error is recoverable (the attempt can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Capture(_) => true,
            Self::Playback(PlaybackError::LoadFailed { .. }) => true,
            Self::Playback(PlaybackError::OutputFailed { .. }) => true,
            Self::Initialization(InitializationError::GraphNotOpen) => true,
            Self::State(StateError::Capture { .. }) | Self::State(StateError::TrimLocked) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Initialization(InitializationError::GraphNotOpen) => {
                "Audio is locked. Press play once to enable audio before recording.".to_string()
            }
            Self::Initialization(InitializationError::SilentMode)
            | Self::Initialization(InitializationError::AudioContextUnavailable { .. }) => {
                "Audio processing is not available here, so recording is disabled. The preview still works.".to_string()
            }
            Self::EncodingUnsupported(_) => {
                "No supported video format was found. Install FFmpeg with H.264, VP9, VP8 or MPEG-4 encoders.".to_string()
            }
            Self::Capture(err) => {
                format!("Recording failed ({}). No file was produced; you can try again.", err)
            }
            Self::Playback(PlaybackError::LoadFailed { path }) => {
                format!("Could not load audio file '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
