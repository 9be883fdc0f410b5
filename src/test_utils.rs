//! Synthetic frames for tests and benchmarks.
//!
//! Every generator is deterministic so benchmark runs and test expectations
//! are reproducible without fixture files.

#![cfg(any(test, feature = "benchmark"))]

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

/// Smooth diagonal gradient; `phase` shifts the red channel so successive
/// frames differ everywhere.
pub fn gradient_frame(width: u32, height: u32, phase: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = ((x * 255 / width.max(1)) + phase) % 256;
        let g = y * 255 / height.max(1);
        let b = ((x + y) * 255 / (width + height).max(1)) % 256;
        Rgba([r as u8, g as u8, b as u8, 255])
    })
}

/// Copy of `base` with the pixel rows `y..y + rows` inverted.
///
/// Models a page where only a small region changed, such as a blinking caret
/// or a ticking clock.
pub fn with_changed_rows(base: &RgbaImage, y: u32, rows: u32) -> RgbaImage {
    let mut frame = base.clone();
    let end = (y + rows).min(frame.height());
    for row in y..end {
        for x in 0..frame.width() {
            let p = frame.get_pixel_mut(x, row);
            *p = Rgba([255 - p[0], 255 - p[1], 255 - p[2], p[3]]);
        }
    }
    frame
}

/// Two-colour checkerboard with `square`-pixel squares.
pub fn checkerboard(width: u32, height: u32, square: u32, a: [u8; 3], b: [u8; 3]) -> RgbaImage {
    let square = square.max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, bl] = if (x / square + y / square) % 2 == 0 { a } else { b };
        Rgba([r, g, bl, 255])
    })
}

/// PNG-encode a raster the way the service delivers screenshots.
pub fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    bytes.into_inner()
}

/// JPEG-encode a raster (alpha dropped).
pub fn encode_jpeg(image: &RgbaImage) -> Vec<u8> {
    let rgb = image::DynamicImage::ImageRgba8(image.clone()).into_rgb8();
    let mut bytes = Cursor::new(Vec::new());
    rgb.write_to(&mut bytes, ImageFormat::Jpeg)
        .expect("encoding an in-memory JPEG cannot fail");
    bytes.into_inner()
}
