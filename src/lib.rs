//! # Spectrum-Reel
//!
//! Turn an audio track into a short vertical (9:16) audio-reactive video clip.
//!
//! A track is decoded and played through an audio graph that exposes a live
//! spectrum tap. Every display refresh the spectrum, a title, a caption and a
//! progress bar are drawn onto a 540x960 canvas. Recording captures that
//! canvas and the audio together for at most 30 seconds, starting at a
//! user-chosen offset, and produces a downloadable clip.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spectrum_reel::{
//!     audio::{AudioGraph, AudioLoader, RodioBackend},
//!     capture::{CaptureController, FfmpegBackend},
//!     clock::SystemClock,
//!     config::Config,
//!     editor::{EditorCommand, EditorSession},
//!     render::{FrameRenderer, RenderConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let clock = SystemClock::shared();
//!
//! let mut graph = AudioGraph::new(config.audio.clone(), Box::new(RodioBackend::new(1.0)), clock.clone());
//! graph.load(AudioLoader::load("song.mp3").await?);
//!
//! let backend = Arc::new(FfmpegBackend::detect(&config.capture).await);
//! let capture = CaptureController::new(config.capture.clone(), backend, clock);
//! let renderer = FrameRenderer::new(&config.render)?;
//!
//! let mut session = EditorSession::new(graph, renderer, RenderConfig::new("Song", "Caption"), capture);
//! let (commands, receiver) = tokio::sync::mpsc::unbounded_channel();
//! commands.send(EditorCommand::SetStart(45.0))?;
//! commands.send(EditorCommand::Record)?;
//! session.run(receiver).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`audio`] - Decoding, playback cursor, spectrum analysis and capture sink
//! - [`render`] - Frame composition and the bars/radial visualizers
//! - [`scheduler`] - Decides when a display refresh should draw
//! - [`trim`] - The 30-second recording window
//! - [`capture`] - Recording state machine, format negotiation and encoding
//! - [`editor`] - The live session tying everything together
//! - [`config`] - Configuration management

pub mod audio;
pub mod capture;
pub mod clock;
pub mod config;
pub mod editor;
pub mod error;
pub mod render;
pub mod scheduler;
pub mod trim;

// Re-export commonly used types for convenience
pub use crate::{
    capture::{CaptureController, CaptureState, ClipHandle},
    config::Config,
    editor::{EditorCommand, EditorSession, SessionEvent},
    error::{ReelError, Result},
    render::{FrameRenderer, Visualizer, VisualizerMode},
};
