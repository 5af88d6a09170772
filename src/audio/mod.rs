//! # Audio Module
//!
//! Decodes the source track, keeps the playback cursor and exposes the two
//! taps the rest of the pipeline reads from:
//!
//! - **Analysis tap**: a fresh [`AnalysisFrame`] of byte magnitudes every tick
//! - **Capture sink**: PCM for the recorder, independent of the speaker path
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spectrum_reel::audio::{AudioGraph, AudioLoader, HeadlessBackend, UserGesture};
//! use spectrum_reel::clock::SystemClock;
//! use spectrum_reel::config::AudioConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let data = AudioLoader::load("song.mp3").await?;
//!
//! let mut graph = AudioGraph::new(AudioConfig::default(), Box::new(HeadlessBackend), SystemClock::shared());
//! graph.load(data);
//! graph.open(UserGesture::observed())?;
//! graph.play()?;
//!
//! let frame = graph.current_analysis_frame();
//! println!("{} buckets", frame.len());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod backend;
pub mod graph;
pub mod loader;
pub mod types;

pub use analyzer::SpectrumAnalyser;
pub use backend::{AudioBackend, AudioContext, HeadlessBackend, RodioBackend, UnavailableBackend};
pub use graph::{AudioGraph, CaptureSink, OpenOutcome, UnlockGate, UserGesture};
pub use loader::AudioLoader;
pub use types::{AnalysisFrame, AudioData, AudioFormat, ContextState, PlaybackEvent, PlaybackState};
