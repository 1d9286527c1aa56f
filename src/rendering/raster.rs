/// Rasterizer for the report display list

use super::layout::{CHAR_WIDTH, LINE_HEIGHT};
use super::paint::{PaintCommand, Rgba};
use crate::{Error, Result};
use image::RgbaImage;

/// Largest side length of a raster, matching common browser canvas limits.
pub const MAX_DIMENSION: u32 = 32_767;
/// Largest pixel count of a raster.
pub const MAX_AREA: u64 = 268_435_456;

/// Device pixel size for a CSS size at `pixel_ratio`.
pub fn device_size(css_width: u32, css_height: u32, pixel_ratio: f32) -> (u32, u32) {
    let scale = |v: u32| (v as f64 * pixel_ratio as f64).ceil() as u32;
    (scale(css_width), scale(css_height))
}

/// Paint `commands` onto an opaque canvas of `css_width` x `css_height` CSS pixels.
///
/// Coordinates are CSS pixels and are scaled by `pixel_ratio`. The canvas is
/// filled with `background` (alpha forced to opaque) and every command is
/// composited source-over, so the result contains no transparent pixels.
pub fn rasterize(
    commands: &[PaintCommand],
    css_width: u32,
    css_height: u32,
    pixel_ratio: f32,
    background: Rgba,
) -> Result<RgbaImage> {
    if !(pixel_ratio.is_finite() && pixel_ratio > 0.0) {
        return Err(Error::CaptureFailed(format!("invalid pixel ratio {}", pixel_ratio)));
    }
    let (w, h) = device_size(css_width, css_height, pixel_ratio);
    if w == 0 || h == 0 {
        return Err(Error::CaptureFailed(format!("target has zero size ({}x{})", css_width, css_height)));
    }
    if w > MAX_DIMENSION || h > MAX_DIMENSION || w as u64 * h as u64 > MAX_AREA {
        return Err(Error::CaptureFailed(format!(
            "raster of {}x{} pixels exceeds canvas limits",
            w, h
        )));
    }

    let bg = background.opaque();
    let mut canvas = Canvas {
        img: RgbaImage::from_pixel(w, h, image::Rgba([bg.0, bg.1, bg.2, 255])),
        ratio: pixel_ratio as f64,
    };

    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => {
                canvas.fill_css_rect(*x as f64, *y as f64, *width as f64, *height as f64, *rgba);
            }
            PaintCommand::Text { x, y, text, scale, rgba } => {
                canvas.draw_text(*x, *y, text, *scale, *rgba);
            }
        }
    }
    Ok(canvas.img)
}

struct Canvas {
    img: RgbaImage,
    ratio: f64,
}

impl Canvas {
    fn fill_css_rect(&mut self, x: f64, y: f64, width: f64, height: f64, rgba: Rgba) {
        if rgba.3 == 0 {
            return;
        }
        let (iw, ih) = (self.img.width() as i64, self.img.height() as i64);
        let x0 = ((x * self.ratio).round() as i64).clamp(0, iw);
        let y0 = ((y * self.ratio).round() as i64).clamp(0, ih);
        let x1 = (((x + width) * self.ratio).round() as i64).clamp(0, iw);
        let y1 = (((y + height) * self.ratio).round() as i64).clamp(0, ih);
        for py in y0..y1 {
            for px in x0..x1 {
                let p = self.img.get_pixel_mut(px as u32, py as u32);
                let [r, g, b] = rgba.over([p.0[0], p.0[1], p.0[2]]);
                *p = image::Rgba([r, g, b, 255]);
            }
        }
    }

    /// Greeked text: each visible glyph is drawn as a solid block inside its cell.
    fn draw_text(&mut self, x: i32, y: i32, text: &str, scale: u32, rgba: Rgba) {
        let scale = scale.max(1) as f64;
        let cell_w = CHAR_WIDTH as f64 * scale;
        let line_h = LINE_HEIGHT as f64 * scale;
        for (row, line) in text.lines().enumerate() {
            let top = y as f64 + row as f64 * line_h;
            for (col, ch) in line.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let left = x as f64 + col as f64 * cell_w;
                self.fill_css_rect(left + scale, top + scale, cell_w - 2.0 * scale, line_h - 3.0 * scale, rgba);
            }
        }
    }
}
