use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use tracing::{debug, warn};

use crate::config::RenderSettings;
use crate::error::{RenderError, Result};
use crate::render::frame::{Frame, Rgba};

const REGULAR_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BOLD_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Width of a run of text at a fixed size
pub trait TextMeasure {
    fn measure(&self, text: &str) -> f32;
}

/// Regular and bold faces used for caption and title
pub struct FontSet {
    pub regular: Font,
    pub bold: Font,
}

impl FontSet {
    /// Load fonts from the configured paths, falling back to well-known system locations.
    ///
    /// Returns `Ok(None)` when no font can be found at all; text is then skipped.
    pub fn load(settings: &RenderSettings) -> Result<Option<Self>> {
        let regular_path = match settings.font_path.clone().or_else(|| Self::find(REGULAR_CANDIDATES)) {
            Some(path) => path,
            None => {
                warn!("No font found; title and caption will not be drawn");
                return Ok(None);
            }
        };
        let bold_path = settings
            .bold_font_path
            .clone()
            .or_else(|| Self::find(BOLD_CANDIDATES))
            .unwrap_or_else(|| regular_path.clone());

        let regular = Self::read(&regular_path)?;
        let bold = if bold_path == regular_path { regular.clone() } else { Self::read(&bold_path)? };
        let fonts = Self::from_bytes(&regular, &bold).map_err(|e| {
            warn!("Unusable fonts at {:?} / {:?}", regular_path, bold_path);
            e
        })?;

        debug!("Fonts loaded: {:?} / {:?}", regular_path, bold_path);
        Ok(Some(fonts))
    }

    /// Build from in-memory font data
    pub fn from_bytes(regular: &[u8], bold: &[u8]) -> Result<Self> {
        let parse = |bytes: &[u8], face: &str| {
            Font::from_bytes(bytes, FontSettings::default()).map_err(|e| RenderError::FontLoadFailed {
                path: format!("<{} face>", face),
                reason: e.to_string(),
            })
        };
        Ok(Self { regular: parse(regular, "regular")?, bold: parse(bold, "bold")? })
    }

    fn find(candidates: &[&str]) -> Option<PathBuf> {
        candidates.iter().map(PathBuf::from).find(|p| p.is_file())
    }

    fn read(path: &Path) -> Result<Vec<u8>> {
        let bytes = std::fs::read(path).map_err(|e| RenderError::FontLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(bytes)
    }
}

/// A font at a fixed pixel size
#[derive(Clone, Copy)]
pub struct Face<'a> {
    pub font: &'a Font,
    pub px: f32,
}

impl TextMeasure for Face<'_> {
    fn measure(&self, text: &str) -> f32 {
        let mut width = 0.0;
        let mut previous = None;
        for ch in text.chars() {
            if let Some(prev) = previous {
                width += self.font.horizontal_kern(prev, ch, self.px).unwrap_or(0.0);
            }
            width += self.font.metrics(ch, self.px).advance_width;
            previous = Some(ch);
        }
        width
    }
}

/// Drop shadow drawn under text
#[derive(Debug, Clone, Copy)]
pub struct Shadow {
    pub offset: (f32, f32),
    pub color: Rgba,
}

/// Greedy word wrap.
///
/// Words are added to the current line while the line stays within
/// `max_width`; the word that would overflow starts the next line. Words are
/// never split, so a single word wider than `max_width` gets a line of its own.
pub fn wrap_words(text: &str, max_width: f32, measure: &impl TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
            continue;
        }

        let candidate = format!("{} {}", line, word);
        if measure.measure(&candidate) > max_width {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        } else {
            line = candidate;
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Draw `text` horizontally centred on `center_x` with its baseline at `baseline_y`
pub fn draw_text_centered(
    frame: &mut Frame,
    face: Face<'_>,
    text: &str,
    center_x: f32,
    baseline_y: f32,
    color: Rgba,
    shadow: Option<Shadow>,
) {
    let left = center_x - face.measure(text) / 2.0;

    if let Some(shadow) = shadow {
        draw_run(frame, face, text, left + shadow.offset.0, baseline_y + shadow.offset.1, shadow.color);
    }
    draw_run(frame, face, text, left, baseline_y, color);
}

fn draw_run(frame: &mut Frame, face: Face<'_>, text: &str, left: f32, baseline_y: f32, color: Rgba) {
    let mut pen_x = left;
    let mut previous = None;

    for ch in text.chars() {
        if let Some(prev) = previous {
            pen_x += face.font.horizontal_kern(prev, ch, face.px).unwrap_or(0.0);
        }
        let (metrics, bitmap) = face.font.rasterize(ch, face.px);
        let x = (pen_x + metrics.xmin as f32).round() as i64;
        let y = (baseline_y - (metrics.height as i32 + metrics.ymin) as f32).round() as i64;
        frame.blend_mask(x, y, metrics.width, &bitmap, color);

        pen_x += metrics.advance_width;
        previous = Some(ch);
    }
}
