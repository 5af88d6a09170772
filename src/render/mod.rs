//! # Render Module
//!
//! Draws the 9:16 frame every scheduler tick. Each call composes, in order:
//!
//! 1. Background image (cover-cropped) or gradient, plus a dark overlay
//! 2. Title, bold and centred above the middle
//! 3. Caption, word-wrapped below the title
//! 4. The spectrum visualization (bars or radial)
//! 5. Progress bar along the bottom edge
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spectrum_reel::audio::AnalysisFrame;
//! use spectrum_reel::config::RenderSettings;
//! use spectrum_reel::render::{FrameRenderer, RenderConfig, VisualizerMode};
//!
//! # fn main() -> spectrum_reel::Result<()> {
//! let renderer = FrameRenderer::new(&RenderSettings::default())?;
//! let config = RenderConfig::new("Night Drive", "Windows down, bass up").with_mode(VisualizerMode::Radial);
//!
//! let frame = renderer.render(&config, &AnalysisFrame::silent(128), 0.4);
//! frame.save_png("preview.png").ok();
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod frame;
pub mod renderer;
pub mod text;
pub mod types;
pub mod visualizers;

pub use frame::{Frame, Rgba};
pub use renderer::FrameRenderer;
pub use text::{FontSet, TextMeasure};
pub use types::{BackgroundAsset, RenderConfig, VisualizerMode};
pub use visualizers::Visualizer;
