use image::{ImageBuffer, RgbImage};

/// An RGB color with straight alpha, as used by the drawing primitives
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub rgb: [u8; 3],
    pub alpha: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, alpha: f32) -> Self {
        Self { rgb: [r, g, b], alpha }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Color from hue (degrees), saturation and lightness (0.0-1.0)
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32, alpha: f32) -> Self {
        let h = hue.rem_euclid(360.0);
        let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = lightness - c / 2.0;

        let (r, g, b) = if h < 60.0 {
            (c, x, 0.0)
        } else if h < 120.0 {
            (x, c, 0.0)
        } else if h < 180.0 {
            (0.0, c, x)
        } else if h < 240.0 {
            (0.0, x, c)
        } else if h < 300.0 {
            (x, 0.0, c)
        } else {
            (c, 0.0, x)
        };

        let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::new(to_byte(r), to_byte(g), to_byte(b), alpha)
    }
}

/// The render surface: a fixed-size RGB pixel buffer.
///
/// Drawing operations clip to the frame and blend with straight alpha.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self { buffer: ImageBuffer::new(width, height) }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Blend `color` over the pixel at (x, y); out-of-bounds writes are ignored
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return;
        }
        let alpha = color.alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let pixel = self.buffer.get_pixel_mut(x as u32, y as u32);
        for channel in 0..3 {
            let under = pixel[channel] as f32;
            let over = color.rgb[channel] as f32;
            pixel[channel] = (over * alpha + under * (1.0 - alpha)).round() as u8;
        }
    }

    /// Fill an axis-aligned rectangle given in fractional canvas units
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let x0 = x.round().max(0.0) as i64;
        let y0 = y.round().max(0.0) as i64;
        let x1 = ((x + width).round() as i64).min(self.width() as i64);
        let y1 = ((y + height).round() as i64).min(self.height() as i64);

        for py in y0..y1 {
            for px in x0..x1 {
                self.blend_pixel(px, py, color);
            }
        }
    }

    /// Stroke a line segment with square-ish caps
    pub fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba) {
        let half = (width / 2.0).max(0.5);
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let len_sq = dx * dx + dy * dy;

        let min_x = (from.0.min(to.0) - half).floor() as i64;
        let max_x = (from.0.max(to.0) + half).ceil() as i64;
        let min_y = (from.1.min(to.1) - half).floor() as i64;
        let max_y = (from.1.max(to.1) + half).ceil() as i64;

        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
                let t = if len_sq > 0.0 {
                    (((cx - from.0) * dx + (cy - from.1) * dy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (nx, ny) = (from.0 + t * dx - cx, from.1 + t * dy - cy);
                if nx * nx + ny * ny <= half * half {
                    self.blend_pixel(px, py, color);
                }
            }
        }
    }

    /// Stroke a circle outline centred on (cx, cy)
    pub fn stroke_circle(&mut self, center: (f32, f32), radius: f32, width: f32, color: Rgba) {
        let half = (width / 2.0).max(0.5);
        let outer = radius + half;
        let (cx, cy) = center;

        for py in (cy - outer).floor() as i64..=(cy + outer).ceil() as i64 {
            for px in (cx - outer).floor() as i64..=(cx + outer).ceil() as i64 {
                let (dx, dy) = (px as f32 + 0.5 - cx, py as f32 + 0.5 - cy);
                let distance = (dx * dx + dy * dy).sqrt();
                if (distance - radius).abs() <= half {
                    self.blend_pixel(px, py, color);
                }
            }
        }
    }

    /// Blend an 8-bit coverage mask (e.g. a glyph bitmap) with its top-left at (x, y)
    pub fn blend_mask(&mut self, x: i64, y: i64, mask_width: usize, mask: &[u8], color: Rgba) {
        if mask_width == 0 {
            return;
        }
        for (row, line) in mask.chunks(mask_width).enumerate() {
            for (col, &coverage) in line.iter().enumerate() {
                if coverage == 0 {
                    continue;
                }
                let alpha = color.alpha * coverage as f32 / 255.0;
                self.blend_pixel(x + col as i64, y + row as i64, Rgba { alpha, ..color });
            }
        }
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Get a mutable reference to the underlying image buffer
    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    /// Raw RGB24 bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_respects_alpha() {
        let mut frame = Frame::new_black(4, 4);
        frame.blend_pixel(1, 1, Rgba::new(200, 100, 50, 0.5));
        assert_eq!(frame.get_pixel(1, 1), [100, 50, 25]);

        frame.blend_pixel(2, 2, Rgba::opaque(9, 8, 7));
        assert_eq!(frame.get_pixel(2, 2), [9, 8, 7]);
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut frame = Frame::new_black(4, 4);
        frame.blend_pixel(-1, 0, Rgba::opaque(255, 255, 255));
        frame.blend_pixel(4, 4, Rgba::opaque(255, 255, 255));
        frame.fill_rect(-10.0, -10.0, 100.0, 2.0, Rgba::opaque(255, 0, 0));

        assert_eq!(frame.get_pixel(0, 0), [255, 0, 0]);
        assert_eq!(frame.get_pixel(3, 3), [0, 0, 0]);
    }

    #[test]
    fn test_fill_rect_covers_expected_area() {
        let mut frame = Frame::new_black(10, 10);
        frame.fill_rect(2.0, 3.0, 4.0, 2.0, Rgba::opaque(255, 255, 255));

        let lit = frame.as_image().pixels().filter(|p| p.0 == [255, 255, 255]).count();
        assert_eq!(lit, 8);
        assert_eq!(frame.get_pixel(2, 3), [255, 255, 255]);
        assert_eq!(frame.get_pixel(6, 3), [0, 0, 0]);
    }

    #[test]
    fn test_line_and_circle_draw_pixels() {
        let mut frame = Frame::new_black(50, 50);
        frame.draw_line((5.0, 25.0), (45.0, 25.0), 3.0, Rgba::opaque(0, 255, 0));
        assert_eq!(frame.get_pixel(25, 25), [0, 255, 0]);
        assert_eq!(frame.get_pixel(25, 10), [0, 0, 0]);

        let mut ring = Frame::new_black(50, 50);
        ring.stroke_circle((25.0, 25.0), 10.0, 2.0, Rgba::opaque(255, 255, 255));
        assert_eq!(ring.get_pixel(25, 25), [0, 0, 0]);
        assert_eq!(ring.get_pixel(35, 25), [255, 255, 255]);
    }

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(Rgba::from_hsl(0.0, 1.0, 0.5, 1.0).rgb, [255, 0, 0]);
        assert_eq!(Rgba::from_hsl(120.0, 1.0, 0.5, 1.0).rgb, [0, 255, 0]);
        assert_eq!(Rgba::from_hsl(240.0, 1.0, 0.5, 1.0).rgb, [0, 0, 255]);
        assert_eq!(Rgba::from_hsl(360.0, 1.0, 0.5, 1.0).rgb, [255, 0, 0]);
    }
}
