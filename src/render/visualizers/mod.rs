//! Spectrum visualizations drawn in step 4 of every frame.
//!
//! Each visualization is a stateless [`Visualizer`]; [`VisualizerMode::visualizer`]
//! maps the user-facing mode onto its implementation.

pub mod bars;
pub mod radial;

pub use bars::BarsVisualizer;
pub use radial::RadialVisualizer;

use crate::audio::types::AnalysisFrame;
use crate::render::frame::Frame;
use crate::render::types::VisualizerMode;

/// A spectrum visualization
pub trait Visualizer: Send + Sync {
    /// Returns the unique name of this visualization
    fn name(&self) -> &str;

    /// Returns a human-readable description
    fn description(&self) -> &str;

    /// Draw the analysis data over whatever the frame already holds
    fn draw(&self, frame: &mut Frame, analysis: &AnalysisFrame);
}

static BARS: BarsVisualizer = BarsVisualizer;
static RADIAL: RadialVisualizer = RadialVisualizer;

impl VisualizerMode {
    pub fn visualizer(self) -> &'static dyn Visualizer {
        match self {
            Self::Bars => &BARS,
            Self::Radial => &RADIAL,
        }
    }

    /// Every mode, in menu order
    pub fn all() -> [VisualizerMode; 2] {
        [Self::Bars, Self::Radial]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes_map_to_named_visualizers() {
        for mode in VisualizerMode::all() {
            assert_eq!(mode.visualizer().name(), mode.to_string());
            assert!(!mode.visualizer().description().is_empty());
        }
    }
}
