//! # Capture Module
//!
//! Records the rendered canvas and the audio capture sink into one clip.
//!
//! The [`CaptureController`] owns the recording state machine
//! (`idle → recording → finalizing → ready`, with `failed` reachable from
//! any active state). Encoding goes through an [`EncoderBackend`]; the
//! default [`FfmpegBackend`] drives the `ffmpeg` CLI, streaming raw frames in
//! and encoded chunks out, then muxes the captured audio on finalize.

pub mod clip;
pub mod controller;
pub mod ffmpeg;
pub mod format;
pub mod recorder;

pub use clip::ClipHandle;
pub use controller::{CaptureController, CaptureFailure, CaptureState};
pub use ffmpeg::FfmpegBackend;
pub use format::{negotiate, OutputFormat, FORMAT_PREFERENCES};
pub use recorder::{EncoderBackend, Recorder, RecorderEvent, RecorderSpec};
