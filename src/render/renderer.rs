use tracing::debug;

use crate::audio::types::AnalysisFrame;
use crate::config::RenderSettings;
use crate::error::Result;
use crate::render::background::draw_background;
use crate::render::frame::{Frame, Rgba};
use crate::render::text::{draw_text_centered, wrap_words, Face, FontSet, Shadow};
use crate::render::types::RenderConfig;

pub const TITLE_PX: f32 = 42.0;
/// Title baseline distance above the vertical centre
pub const TITLE_OFFSET: f32 = 220.0;

pub const CAPTION_PX: f32 = 24.0;
pub const CAPTION_LINE_HEIGHT: f32 = 32.0;
/// Horizontal padding on each side of the caption block
pub const CAPTION_MARGIN: f32 = 40.0;
/// First caption baseline distance above the vertical centre
pub const CAPTION_OFFSET: f32 = 160.0;

pub const PROGRESS_HEIGHT: f32 = 6.0;
pub const PROGRESS_TRACK: Rgba = Rgba::new(255, 255, 255, 0.2);
pub const PROGRESS_FILL: Rgba = Rgba::opaque(236, 72, 153);

const TEXT_COLOR: Rgba = Rgba::opaque(255, 255, 255);
const CAPTION_COLOR: Rgba = Rgba::new(255, 255, 255, 0.9);
const TEXT_SHADOW: Shadow = Shadow {
    offset: (2.0, 3.0),
    color: Rgba::new(0, 0, 0, 0.6),
};

/// Draws one complete frame from the render config, the analysis data and
/// the playback fraction.
///
/// Holds only immutable resources (fonts), so every call is independent of
/// the previous one.
pub struct FrameRenderer {
    fonts: Option<FontSet>,
}

impl FrameRenderer {
    /// Create a renderer, loading fonts per `settings`
    pub fn new(settings: &RenderSettings) -> Result<Self> {
        Ok(FontSet::load(settings)?.map_or_else(Self::without_text, Self::with_fonts))
    }

    /// Renderer with the given fonts
    pub fn with_fonts(fonts: FontSet) -> Self {
        Self { fonts: Some(fonts) }
    }

    /// Renderer that skips title and caption
    pub fn without_text() -> Self {
        Self { fonts: None }
    }

    pub fn has_text(&self) -> bool {
        self.fonts.is_some()
    }

    /// Render into a freshly allocated frame
    pub fn render(&self, config: &RenderConfig, analysis: &AnalysisFrame, fraction: f64) -> Frame {
        let mut frame = Frame::new_black(config.width, config.height);
        self.render_into(&mut frame, config, analysis, fraction);
        frame
    }

    /// Render over `frame`, which must match the config's canvas size
    pub fn render_into(&self, frame: &mut Frame, config: &RenderConfig, analysis: &AnalysisFrame, fraction: f64) {
        if frame.width() != config.width || frame.height() != config.height {
            debug!(
                "Resizing surface {}x{} -> {}x{}",
                frame.width(),
                frame.height(),
                config.width,
                config.height
            );
            *frame = Frame::new_black(config.width, config.height);
        }

        draw_background(frame, config.background.ready_image());

        if let Some(fonts) = &self.fonts {
            self.draw_title(frame, fonts, &config.title);
            self.draw_caption(frame, fonts, &config.caption);
        }

        config.mode.visualizer().draw(frame, analysis);

        draw_progress(frame, fraction);
    }

    fn draw_title(&self, frame: &mut Frame, fonts: &FontSet, title: &str) {
        if title.trim().is_empty() {
            return;
        }
        let face = Face { font: &fonts.bold, px: TITLE_PX };
        let center_x = frame.width() as f32 / 2.0;
        let baseline = frame.height() as f32 / 2.0 - TITLE_OFFSET;
        draw_text_centered(frame, face, title.trim(), center_x, baseline, TEXT_COLOR, Some(TEXT_SHADOW));
    }

    fn draw_caption(&self, frame: &mut Frame, fonts: &FontSet, caption: &str) {
        let face = Face { font: &fonts.regular, px: CAPTION_PX };
        let max_width = frame.width() as f32 - 2.0 * CAPTION_MARGIN;
        let center_x = frame.width() as f32 / 2.0;
        let mut baseline = frame.height() as f32 / 2.0 - CAPTION_OFFSET;

        for line in wrap_words(caption, max_width, &face) {
            draw_text_centered(frame, face, &line, center_x, baseline, CAPTION_COLOR, Some(TEXT_SHADOW));
            baseline += CAPTION_LINE_HEIGHT;
        }
    }
}

/// Thin bar along the bottom edge; filled width is proportional to `fraction`
pub fn draw_progress(frame: &mut Frame, fraction: f64) {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    let width = frame.width() as f32;
    let top = frame.height() as f32 - PROGRESS_HEIGHT;

    frame.fill_rect(0.0, top, width, PROGRESS_HEIGHT, PROGRESS_TRACK);
    frame.fill_rect(0.0, top, width * fraction as f32, PROGRESS_HEIGHT, PROGRESS_FILL);
}
