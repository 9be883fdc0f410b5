use image::RgbaImage;
use tracing::debug;

use super::compose::{
    COLOR_INTRODUCER, GRAPHICS_CARRIAGE_RETURN, GRAPHICS_NEW_LINE, REPEAT_INTRODUCER, TERMINATOR,
    push_decimal, write_header, write_palette,
};
use super::palette::{ColorMatcher, MAX_COLORS, Palette, PaletteKind};
use crate::bands::BAND_HEIGHT;
use crate::error::{Result, TermiumError};

/// Runs at least this long are written as `!count` repeats
const MIN_REPEAT: usize = 4;
/// Offset of the sixel data characters; `?` paints nothing
const SIXEL_BASE: u8 = 0x3f;

/// Palette-indexed run-length sixel encoder.
///
/// Constructed once and reused for every frame. The colour cache and the
/// per-band scratch planes persist between calls; only the image dimensions
/// change.
#[derive(Debug)]
pub struct SixelEncoder {
    kind: PaletteKind,
    palette: Palette,
    matcher: ColorMatcher,
    /// One row of sixel bit patterns per palette entry, `width` bytes each
    planes: Vec<u8>,
    used: Vec<bool>,
}

impl SixelEncoder {
    pub fn new(kind: PaletteKind) -> Self {
        let palette = Palette::fixed(kind).unwrap_or_else(|| Palette::from_colors(vec![[0, 0, 0]]));
        Self {
            kind,
            palette,
            matcher: ColorMatcher::new(),
            planes: Vec::new(),
            used: Vec::new(),
        }
    }

    pub fn kind(&self) -> PaletteKind {
        self.kind
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn matcher(&self) -> &ColorMatcher {
        &self.matcher
    }

    /// Recompute the adaptive palette for `image`.
    ///
    /// Returns true when the palette changed, meaning every previously encoded
    /// fragment refers to stale colour registers. Fixed palettes never change.
    pub fn update_palette(&mut self, image: &RgbaImage) -> bool {
        if !self.kind.is_adaptive() {
            return false;
        }
        let palette = Palette::adaptive(image, MAX_COLORS);
        if palette == self.palette {
            return false;
        }
        debug!(colors = palette.len(), "Adaptive palette changed");
        self.palette = palette;
        self.matcher.reset();
        true
    }

    /// Encode the whole image as one framed sixel stream.
    pub fn encode(&mut self, image: &RgbaImage) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TermiumError::encode_failed(format!(
                "cannot encode an empty {width}x{height} image"
            )));
        }

        let pixels = (width * height) as usize;
        let mut out = Vec::with_capacity(64 + self.palette.len() * 18 + pixels / 2);
        write_header(&mut out, width, height);
        write_palette(&mut out, &self.palette);

        let mut y = 0;
        while y < height {
            if y > 0 {
                out.push(GRAPHICS_NEW_LINE);
            }
            let band_height = BAND_HEIGHT.min(height - y);
            self.write_band(image, y, band_height, &mut out);
            y += band_height;
        }

        out.extend_from_slice(TERMINATOR);
        Ok(out)
    }

    /// Encode rows `y .. y + height` as an unframed payload.
    ///
    /// The result is byte-identical to stripping the framing from a full
    /// [`encode`](Self::encode) of an image holding only those rows.
    pub fn encode_band(&mut self, image: &RgbaImage, y: u32, height: u32) -> Result<Vec<u8>> {
        let (width, image_height) = image.dimensions();
        let outside = y.saturating_add(height) > image_height;
        if width == 0 || height == 0 || height > BAND_HEIGHT || outside {
            return Err(TermiumError::encode_failed(format!(
                "band {y}+{height} outside a {width}x{image_height} image"
            )));
        }

        let mut out = Vec::with_capacity(width as usize * 2);
        self.write_band(image, y, height, &mut out);
        Ok(out)
    }

    /// Write one band: for every colour present, a selection followed by the
    /// run-length coded columns, colours separated by a carriage return.
    fn write_band(&mut self, image: &RgbaImage, y: u32, height: u32, out: &mut Vec<u8>) {
        let width = image.width() as usize;
        let colors = self.palette.len();

        self.planes.clear();
        self.planes.resize(width * colors, 0);
        self.used.clear();
        self.used.resize(colors, false);

        for row in 0..height {
            let bit = 1u8 << row;
            for x in 0..width {
                let [r, g, b, a] = image.get_pixel(x as u32, y + row).0;
                if a == 0 {
                    continue;
                }
                let index = self.matcher.lookup(&self.palette, [r, g, b]) as usize;
                self.used[index] = true;
                self.planes[index * width + x] |= bit;
            }
        }

        let mut first = true;
        for color in 0..colors {
            if !self.used[color] {
                continue;
            }
            if !first {
                out.push(GRAPHICS_CARRIAGE_RETURN);
            }
            first = false;

            out.push(COLOR_INTRODUCER);
            push_decimal(out, color as u32);

            let plane = &self.planes[color * width..(color + 1) * width];
            let end = plane.iter().rposition(|&bits| bits != 0).map_or(0, |i| i + 1);
            write_runs(&plane[..end], out);
        }
    }
}

/// Run-length code a row of sixel bit patterns.
fn write_runs(plane: &[u8], out: &mut Vec<u8>) {
    let mut x = 0;
    while x < plane.len() {
        let bits = plane[x];
        let run = plane[x..].iter().take_while(|&&b| b == bits).count();
        let ch = SIXEL_BASE + bits;
        if run >= MIN_REPEAT {
            out.push(REPEAT_INTRODUCER);
            push_decimal(out, run as u32);
            out.push(ch);
        } else {
            out.extend(std::iter::repeat_n(ch, run));
        }
        x += run;
    }
}
