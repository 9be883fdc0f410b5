//! Glyph selection for one terminal cell.
//!
//! A cell covers a 2x2 block of sub-pixels. The luma of each sub-pixel decides
//! which split (vertical, horizontal, single quadrant) best explains the block;
//! blocks with no dominant split fall back to a shade glyph keyed on average
//! luma. Foreground is the brightest sub-pixel with boosted contrast and
//! background is the block average, so the same four colours always produce
//! the same cell.

use super::enhance::enhance_channel;

pub const FULL_BLOCK: char = '█';
pub const UPPER_HALF_BLOCK: char = '▀';
pub const LOWER_HALF_BLOCK: char = '▄';
pub const LEFT_HALF_BLOCK: char = '▌';
pub const RIGHT_HALF_BLOCK: char = '▐';
pub const LIGHT_SHADE: char = '░';
pub const MEDIUM_SHADE: char = '▒';
pub const DARK_SHADE: char = '▓';
pub const QUADRANT_UPPER_LEFT: char = '▘';
pub const QUADRANT_UPPER_RIGHT: char = '▝';
pub const QUADRANT_LOWER_LEFT: char = '▖';
pub const QUADRANT_LOWER_RIGHT: char = '▗';

/// Default luma difference a split must exceed to be drawn as one
pub const DEFAULT_THRESHOLD: f32 = 30.0;

pub type Rgb = [u8; 3];

/// A styled character ready to be placed in the cell grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicCell {
    pub glyph: char,
    pub fg: Rgb,
    pub bg: Rgb,
}

/// Perceived brightness, `0.299 R + 0.587 G + 0.114 B`, truncated.
pub fn intensity(rgb: Rgb) -> u8 {
    (rgb[0] as f64 * 0.299 + rgb[1] as f64 * 0.587 + rgb[2] as f64 * 0.114) as u8
}

/// Brightest colour of the block with contrast boosted; ties keep the first.
fn dominant(colors: &[Rgb; 4]) -> Rgb {
    let mut best = [0u8; 3];
    let mut best_intensity = 0u8;
    for &color in colors {
        let value = intensity(color);
        if value > best_intensity {
            best_intensity = value;
            best = color;
        }
    }
    best.map(enhance_channel)
}

fn average(colors: &[Rgb; 4]) -> Rgb {
    let mut rgb = [0u8; 3];
    for (channel, out) in rgb.iter_mut().enumerate() {
        let sum: u32 = colors.iter().map(|c| c[channel] as u32).sum();
        *out = (sum / 4) as u8;
    }
    rgb
}

/// Choose the glyph and colours for a 2x2 block.
pub fn choose_glyph(tl: Rgb, tr: Rgb, bl: Rgb, br: Rgb, threshold: f32) -> MosaicCell {
    let colors = [tl, tr, bl, br];
    let [a, b, c, d] = colors.map(|color| intensity(color) as i32);

    let vert = (a + b - c - d).abs();
    let horiz = (a + c - b - d).abs();
    let diag1 = (a + d - b - c).abs();
    let diag2 = (b + c - a - d).abs();

    let fg = dominant(&colors);
    let bg = average(&colors);
    let cell = |glyph| MosaicCell { glyph, fg, bg };
    let exceeds = |diff: i32| diff as f32 > threshold;

    if exceeds(vert) && vert > horiz && vert > diag1 && vert > diag2 {
        return cell(if a + b > c + d { UPPER_HALF_BLOCK } else { LOWER_HALF_BLOCK });
    }

    if exceeds(horiz) && horiz > vert && horiz > diag1 && horiz > diag2 {
        return cell(if a + c > b + d { LEFT_HALF_BLOCK } else { RIGHT_HALF_BLOCK });
    }

    if exceeds(diag1) || exceeds(diag2) {
        if a > b && a > c && a > d {
            return cell(QUADRANT_UPPER_LEFT);
        }
        if b > a && b > c && b > d {
            return cell(QUADRANT_UPPER_RIGHT);
        }
        if c > a && c > b && c > d {
            return cell(QUADRANT_LOWER_LEFT);
        }
        if d > a && d > b && d > c {
            return cell(QUADRANT_LOWER_RIGHT);
        }
    }

    let average_intensity = (a + b + c + d) / 4;
    let shade = if average_intensity < 85 {
        DARK_SHADE
    } else if average_intensity < 170 {
        MEDIUM_SHADE
    } else if average_intensity < 255 {
        LIGHT_SHADE
    } else {
        FULL_BLOCK
    };
    cell(shade)
}

/// Half-block mode: the upper half shows `top`, the lower half `bottom`.
pub fn half_block(top: Rgb, bottom: Rgb) -> MosaicCell {
    MosaicCell { glyph: UPPER_HALF_BLOCK, fg: top, bg: bottom }
}
