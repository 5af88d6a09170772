use image::imageops::{self, FilterType};
use image::RgbImage;
use rayon::prelude::*;

use crate::render::frame::{Frame, Rgba};

/// Gradient tone at the top edge when no image is set
pub const GRADIENT_TOP: [u8; 3] = [49, 46, 129];

/// Gradient tone at the bottom edge
pub const GRADIENT_BOTTOM: [u8; 3] = [15, 23, 42];

/// Darkening layer drawn over every background for text legibility
pub const LEGIBILITY_OVERLAY: Rgba = Rgba::new(0, 0, 0, 0.3);

/// Scale `image` to cover `width`×`height`, preserving aspect ratio, and crop
/// the overflow equally from both sides
pub fn cover_crop(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (iw, ih) = image.dimensions();
    if iw == 0 || ih == 0 {
        return RgbImage::new(width, height);
    }

    let scale = (width as f64 / iw as f64).max(height as f64 / ih as f64);
    let scaled_w = ((iw as f64 * scale).ceil() as u32).max(width);
    let scaled_h = ((ih as f64 * scale).ceil() as u32).max(height);

    let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

/// Fill the frame with the vertical two-tone gradient
pub fn draw_gradient(frame: &mut Frame) {
    let width = frame.width() as usize;
    let height = frame.height();
    let span = height.saturating_sub(1).max(1) as f32;

    frame
        .as_image_mut()
        .par_chunks_mut(width * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let t = y as f32 / span;
            let color: [u8; 3] = std::array::from_fn(|c| {
                let top = GRADIENT_TOP[c] as f32;
                let bottom = GRADIENT_BOTTOM[c] as f32;
                (top + (bottom - top) * t).round() as u8
            });
            for pixel in row.chunks_exact_mut(3) {
                pixel.copy_from_slice(&color);
            }
        });
}

/// Step 1 of every frame: image (or gradient) plus the legibility overlay
pub fn draw_background(frame: &mut Frame, image: Option<&RgbImage>) {
    match image {
        Some(image) if image.dimensions() == (frame.width(), frame.height()) => {
            frame.as_image_mut().copy_from_slice(image.as_raw());
        }
        Some(image) => {
            let cropped = cover_crop(image, frame.width(), frame.height());
            frame.as_image_mut().copy_from_slice(cropped.as_raw());
        }
        None => draw_gradient(frame),
    }

    darken(frame, LEGIBILITY_OVERLAY.alpha);
}

fn darken(frame: &mut Frame, alpha: f32) {
    let keep = 1.0 - alpha;
    frame
        .as_image_mut()
        .par_chunks_mut(4096)
        .for_each(|chunk| {
            for value in chunk.iter_mut() {
                *value = (*value as f32 * keep).round() as u8;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_cover_crop_wide_image_keeps_center() {
        // Left third red, middle green, right third blue
        let source = RgbImage::from_fn(300, 100, |x, _| {
            if x < 100 {
                Rgb([255, 0, 0])
            } else if x < 200 {
                Rgb([0, 255, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });

        let cropped = cover_crop(&source, 54, 96);
        assert_eq!(cropped.dimensions(), (54, 96));
        assert_eq!(cropped.get_pixel(27, 48).0, [0, 255, 0]);
    }

    #[test]
    fn test_cover_crop_upscales_small_image() {
        let source = RgbImage::from_pixel(10, 10, Rgb([9, 9, 9]));
        let cropped = cover_crop(&source, 54, 96);
        assert_eq!(cropped.dimensions(), (54, 96));
        assert_eq!(cropped.get_pixel(0, 0).0, [9, 9, 9]);
    }

    #[test]
    fn test_gradient_runs_top_to_bottom() {
        let mut frame = Frame::new_black(8, 100);
        draw_gradient(&mut frame);
        assert_eq!(frame.get_pixel(3, 0), GRADIENT_TOP);
        assert_eq!(frame.get_pixel(3, 99), GRADIENT_BOTTOM);
    }

    #[test]
    fn test_overlay_darkens_background() {
        let image = RgbImage::from_pixel(8, 8, Rgb([200, 100, 0]));
        let mut frame = Frame::new_black(8, 8);
        draw_background(&mut frame, Some(&image));
        assert_eq!(frame.get_pixel(4, 4), [140, 70, 0]);
    }
}
