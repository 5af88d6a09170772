use std::f32::consts::TAU;

use crate::audio::types::AnalysisFrame;
use crate::render::frame::{Frame, Rgba};
use crate::render::visualizers::Visualizer;

pub const SEGMENT_COUNT: usize = 120;
pub const RING_RADIUS: f32 = 100.0;
/// Tick length per unit of magnitude
pub const TICK_SCALE: f32 = 0.8;
pub const TICK_WIDTH: f32 = 3.0;
/// Ring centre sits this far below the canvas centre, clear of the caption
pub const CENTER_DROP: f32 = 140.0;

const RING_COLOR: Rgba = Rgba::new(255, 255, 255, 0.5);
const RING_WIDTH: f32 = 2.0;

/// Bucket index sampled by `segment`; only the lower half of the spectrum is used
pub fn segment_bucket(segment: usize, bucket_count: usize, segment_count: usize) -> usize {
    segment * (bucket_count / 2) / segment_count.max(1)
}

/// Ticks radiating from a ring, hue sweeping once around the circle
pub struct RadialVisualizer;

impl Visualizer for RadialVisualizer {
    fn name(&self) -> &str {
        "radial"
    }

    fn description(&self) -> &str {
        "Circular burst of bass and mid frequencies around a static ring"
    }

    fn draw(&self, frame: &mut Frame, analysis: &AnalysisFrame) {
        let buckets = analysis.buckets();
        let center = (frame.width() as f32 / 2.0, frame.height() as f32 / 2.0 + CENTER_DROP);

        if !buckets.is_empty() {
            for segment in 0..SEGMENT_COUNT {
                let magnitude = buckets[segment_bucket(segment, buckets.len(), SEGMENT_COUNT)];
                if magnitude == 0 {
                    continue;
                }

                let angle = segment as f32 * TAU / SEGMENT_COUNT as f32;
                let (sin, cos) = angle.sin_cos();
                let outer = RING_RADIUS + magnitude as f32 * TICK_SCALE;
                let hue = segment as f32 * 360.0 / SEGMENT_COUNT as f32;

                frame.draw_line(
                    (center.0 + cos * RING_RADIUS, center.1 + sin * RING_RADIUS),
                    (center.0 + cos * outer, center.1 + sin * outer),
                    TICK_WIDTH,
                    Rgba::from_hsl(hue, 1.0, 0.6, 1.0),
                );
            }
        }

        frame.stroke_circle(center, RING_RADIUS, RING_WIDTH, RING_COLOR);
    }
}
