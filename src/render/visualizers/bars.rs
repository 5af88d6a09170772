use crate::audio::types::AnalysisFrame;
use crate::render::frame::{Frame, Rgba};
use crate::render::visualizers::Visualizer;

/// Bar width as a multiple of an even split of the canvas across all buckets
pub const BAR_WIDTH_FACTOR: f32 = 2.5;

/// Horizontal gap after every bar
pub const BAR_GAP: f32 = 1.0;

/// Pixels of bar height per unit of magnitude
pub const HEIGHT_SCALE: f32 = 1.5;

/// Distance of the bar baseline above the bottom edge
pub const BASELINE_OFFSET: f32 = 80.0;

pub const BAR_ALPHA: f32 = 0.9;

/// One bar's geometry, in canvas units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Bar width and gap for `count` buckets on a canvas `canvas_width` wide
pub fn bar_layout(canvas_width: u32, count: usize) -> (f32, f32) {
    if count == 0 {
        return (0.0, BAR_GAP);
    }
    (canvas_width as f32 / count as f32 * BAR_WIDTH_FACTOR, BAR_GAP)
}

/// Geometry of every bar; x positions depend only on the canvas width and bucket count
pub fn bar_rects(canvas_width: u32, canvas_height: u32, buckets: &[u8]) -> Vec<BarRect> {
    let (width, gap) = bar_layout(canvas_width, buckets.len());
    let baseline = canvas_height as f32 - BASELINE_OFFSET;

    let mut x = 0.0;
    buckets
        .iter()
        .map(|&magnitude| {
            let height = magnitude as f32 * HEIGHT_SCALE;
            let rect = BarRect { x, y: baseline - height, width, height };
            x += width + gap;
            rect
        })
        .collect()
}

/// Color of bar `index` out of `count` with the given drawn height
pub fn bar_color(index: usize, count: usize, height: f32) -> Rgba {
    let position = index as f32 / count.max(1) as f32;
    let r = (height + 25.0 * position).min(255.0) as u8;
    let g = (250.0 * position) as u8;
    Rgba::new(r, g, 50, BAR_ALPHA)
}

/// Classic spectrum bars rising from a baseline near the bottom
pub struct BarsVisualizer;

impl Visualizer for BarsVisualizer {
    fn name(&self) -> &str {
        "bars"
    }

    fn description(&self) -> &str {
        "Vertical bars per frequency bucket, warming from red to yellow across the spectrum"
    }

    fn draw(&self, frame: &mut Frame, analysis: &AnalysisFrame) {
        let count = analysis.len();
        for (i, rect) in bar_rects(frame.width(), frame.height(), analysis.buckets()).into_iter().enumerate() {
            if rect.x >= frame.width() as f32 {
                break;
            }
            frame.fill_rect(rect.x, rect.y, rect.width, rect.height, bar_color(i, count, rect.height));
        }
    }
}
