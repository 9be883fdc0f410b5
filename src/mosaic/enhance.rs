//! Colour enhancement applied before glyph selection.

use image::RgbaImage;

const CONTRAST: f64 = 1.5;
const SATURATION: f64 = 1.5;

/// Linear contrast stretch around mid grey, clamped to the channel range.
pub fn enhance_channel(value: u8) -> u8 {
    let x = (value as f64 / 255.0 - 0.5) * CONTRAST + 0.5;
    (x.clamp(0.0, 1.0) * 255.0) as u8
}

/// RGB to (hue in degrees, saturation, value), all components in 0..=1 except hue.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * (2.0 + (b - r) / delta)
    } else {
        60.0 * (4.0 + (r - g) / delta)
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let sector = (hue / 60.0).floor();
    let f = hue / 60.0 - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - f * saturation);
    let t = value * (1.0 - (1.0 - f) * saturation);

    let (r, g, b) = match (sector as i64).rem_euclid(6) {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };
    ((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

/// Boost contrast per channel, then saturation in HSV space.
pub fn enhance_pixel(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(enhance_channel);
    let (hue, saturation, value) = rgb_to_hsv(r, g, b);
    let (r, g, b) = hsv_to_rgb(hue, (saturation * SATURATION).min(1.0), value);
    [r, g, b]
}

/// Apply [`enhance_pixel`] to every pixel, keeping alpha.
pub fn enhance_image(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let [r, g, b] = enhance_pixel([r, g, b]);
        pixel.0 = [r, g, b, a];
    }
}

/// Sobel gradient magnitude of the luma channel, one value per pixel.
///
/// Edge pixels replicate their nearest neighbour.
pub fn gradient_magnitude(image: &RgbaImage) -> Vec<f32> {
    const GX: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    const GY: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    let (width, height) = image.dimensions();
    let luma: Vec<i32> = image
        .pixels()
        .map(|p| super::glyph::intensity([p[0], p[1], p[2]]) as i32)
        .collect();
    let at = |x: i64, y: i64| {
        let x = x.clamp(0, width as i64 - 1) as usize;
        let y = y.clamp(0, height as i64 - 1) as usize;
        luma[y * width as usize + x]
    };

    let mut magnitudes = Vec::with_capacity(luma.len());
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let (mut gx, mut gy) = (0i32, 0i32);
            for (ky, (row_x, row_y)) in GX.iter().zip(GY.iter()).enumerate() {
                for kx in 0..3 {
                    let value = at(x + kx as i64 - 1, y + ky as i64 - 1);
                    gx += row_x[kx] * value;
                    gy += row_y[kx] * value;
                }
            }
            magnitudes.push(((gx * gx + gy * gy) as f32).sqrt());
        }
    }
    magnitudes
}

/// Stretch contrast around mid grey in proportion to local edge strength.
///
/// Each pixel gets a gain of `1 + m / m_max`, so flat regions are untouched
/// and the strongest edge doubles its contrast.
pub fn edge_enhance(image: &mut RgbaImage) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    let magnitudes = gradient_magnitude(image);
    let peak = magnitudes.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return;
    }

    for (pixel, magnitude) in image.pixels_mut().zip(magnitudes) {
        let gain = 1.0 + magnitude / peak;
        for channel in &mut pixel.0[..3] {
            let stretched = 128.0 + (*channel as f32 - 128.0) * gain;
            *channel = stretched.clamp(0.0, 255.0) as u8;
        }
    }
}
