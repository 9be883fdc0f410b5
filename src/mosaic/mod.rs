//! Block-character mosaic renderer for terminals without sixel support.
//!
//! The source raster is scaled so that each terminal cell maps to a small
//! block of sub-pixels (2x2 in quadrant mode, 1x2 in half-block mode), then
//! every block is turned into one styled glyph.

mod enhance;
mod glyph;

pub use enhance::{edge_enhance, enhance_channel, enhance_image, gradient_magnitude};
pub use glyph::{DEFAULT_THRESHOLD, MosaicCell, Rgb, choose_glyph, half_block, intensity};

use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{CellSize, Rect};

/// Destination for rendered cells.
///
/// Implemented by the screen surface; tests use a plain grid.
pub trait CellSurface {
    fn set_cell(&mut self, col: u16, row: u16, cell: MosaicCell);
}

/// Sub-pixel layout of one terminal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlyphMode {
    /// 2x2 sub-pixels, glyph chosen from intensity splits
    #[default]
    Quadrant,
    /// 1x2 sub-pixels, always the upper half block
    HalfBlock,
}

impl GlyphMode {
    /// Sub-pixels per cell as (columns, rows).
    pub fn subpixels(self) -> (u32, u32) {
        match self {
            GlyphMode::Quadrant => (2, 2),
            GlyphMode::HalfBlock => (1, 2),
        }
    }
}

/// Mosaic rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicOptions {
    pub glyphs: GlyphMode,
    /// Contrast and saturation boost before glyph selection
    pub enhance: bool,
    /// Sobel edge sharpening before glyph selection
    pub edge_enhance: bool,
    pub threshold: f32,
}

impl Default for MosaicOptions {
    fn default() -> Self {
        Self {
            glyphs: GlyphMode::Quadrant,
            enhance: true,
            edge_enhance: false,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Where a frame landed in the cell grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MosaicReport {
    /// Cells written, centred inside the target area
    pub placed: Rect,
    /// Size of the scaled sub-pixel raster
    pub scaled: (u32, u32),
}

/// Size of the sub-pixel raster for `source` inside `area`.
///
/// Works in physical pixels: the source is shrunk to fit the area's pixel
/// extent (never enlarged), then resampled to the sub-pixel grid, whose
/// horizontal and vertical pitch differ with the cell aspect ratio.
pub fn fit_subpixels(
    source: (u32, u32),
    area: (u16, u16),
    cell: CellSize,
    mode: GlyphMode,
) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (cols, rows) = area;
    if src_w == 0 || src_h == 0 || cols == 0 || rows == 0 || cell.width == 0 || cell.height == 0 {
        return (0, 0);
    }
    let (sub_x, sub_y) = mode.subpixels();

    let avail_w = cols as f64 * cell.width as f64;
    let avail_h = rows as f64 * cell.height as f64;
    let scale = (avail_w / src_w as f64).min(avail_h / src_h as f64).min(1.0);

    let physical_w = src_w as f64 * scale;
    let physical_h = src_h as f64 * scale;
    // Nudge up so exact fits do not lose a sub-pixel to rounding
    let grid_w = (physical_w * sub_x as f64 / cell.width as f64 + 1e-9).floor() as u32;
    let grid_h = (physical_h * sub_y as f64 / cell.height as f64 + 1e-9).floor() as u32;

    // Whole cells only
    let grid_w = (grid_w / sub_x * sub_x).min(cols as u32 * sub_x);
    let grid_h = (grid_h / sub_y * sub_y).min(rows as u32 * sub_y);
    (grid_w, grid_h)
}

/// Renders rasters into a cell surface; reused across frames.
#[derive(Debug)]
pub struct MosaicRenderer {
    options: MosaicOptions,
}

impl MosaicRenderer {
    pub fn new(options: MosaicOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MosaicOptions {
        &self.options
    }

    /// Draw `image` centred in `area`.
    pub fn render<S: CellSurface + ?Sized>(
        &mut self,
        image: &RgbaImage,
        area: Rect,
        cell: CellSize,
        surface: &mut S,
    ) -> MosaicReport {
        let mode = self.options.glyphs;
        let (grid_w, grid_h) =
            fit_subpixels(image.dimensions(), (area.width, area.height), cell, mode);
        if grid_w == 0 || grid_h == 0 {
            return MosaicReport::default();
        }

        let mut scaled = imageops::resize(image, grid_w, grid_h, FilterType::Triangle);
        if self.options.enhance {
            enhance_image(&mut scaled);
        }
        if self.options.edge_enhance {
            edge_enhance(&mut scaled);
        }

        let (sub_x, sub_y) = mode.subpixels();
        let cols = (grid_w / sub_x) as u16;
        let rows = (grid_h / sub_y) as u16;
        let placed = Rect {
            x: area.x + (area.width - cols) / 2,
            y: area.y + (area.height - rows) / 2,
            width: cols,
            height: rows,
        };
        trace!(?placed, grid_w, grid_h, "Mosaic layout");

        let rgb = |x: u32, y: u32| {
            let p = scaled.get_pixel(x, y);
            [p[0], p[1], p[2]]
        };
        for row in 0..rows {
            let y = row as u32 * sub_y;
            for col in 0..cols {
                let x = col as u32 * sub_x;
                let cell = match mode {
                    GlyphMode::Quadrant => choose_glyph(
                        rgb(x, y),
                        rgb(x + 1, y),
                        rgb(x, y + 1),
                        rgb(x + 1, y + 1),
                        self.options.threshold,
                    ),
                    GlyphMode::HalfBlock => half_block(rgb(x, y), rgb(x, y + 1)),
                };
                surface.set_cell(placed.x + col, placed.y + row, cell);
            }
        }

        MosaicReport { placed, scaled: (grid_w, grid_h) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Grid {
        cells: HashMap<(u16, u16), MosaicCell>,
    }

    impl CellSurface for Grid {
        fn set_cell(&mut self, col: u16, row: u16, cell: MosaicCell) {
            self.cells.insert((col, row), cell);
        }
    }

    const CELL: CellSize = CellSize { width: 8, height: 16 };

    #[test]
    fn small_sources_are_never_enlarged() {
        // 16x16 px is two cells wide and one cell tall at 8x16
        let grid = fit_subpixels((16, 16), (80, 24), CELL, GlyphMode::Quadrant);
        assert_eq!(grid, (4, 2));
    }

    #[test]
    fn large_sources_shrink_to_the_limiting_axis() {
        // 1280x960 into 80x24 cells (640x384 px): height limits, scale 0.4
        let grid = fit_subpixels((1280, 960), (80, 24), CELL, GlyphMode::Quadrant);
        assert_eq!(grid, (128, 48));
        let half = fit_subpixels((1280, 960), (80, 24), CELL, GlyphMode::HalfBlock);
        assert_eq!(half, (64, 48));
    }

    #[test]
    fn degenerate_inputs_produce_nothing() {
        assert_eq!(fit_subpixels((0, 10), (80, 24), CELL, GlyphMode::Quadrant), (0, 0));
        assert_eq!(fit_subpixels((10, 10), (0, 24), CELL, GlyphMode::Quadrant), (0, 0));
        let mut grid = Grid::default();
        let mut renderer = MosaicRenderer::new(MosaicOptions::default());
        let empty = RgbaImage::new(0, 0);
        let report = renderer.render(&empty, Rect::new(1, 1, 10, 10), CELL, &mut grid);
        assert_eq!(report, MosaicReport::default());
        assert!(grid.cells.is_empty());
    }

    #[test]
    fn image_is_centred_in_the_area() {
        let image = RgbaImage::from_pixel(80, 64, Rgba([255, 255, 255, 255]));
        let mut grid = Grid::default();
        let mut renderer = MosaicRenderer::new(MosaicOptions::default());
        let report = renderer.render(&image, Rect::new(1, 1, 40, 20), CELL, &mut grid);

        assert_eq!(report.placed, Rect::new(16, 9, 10, 4));
        assert_eq!(grid.cells.len(), 40);
        assert!(grid.cells.values().all(|c| c.glyph == glyph::FULL_BLOCK));
    }

    #[test]
    fn half_block_mode_uses_top_and_bottom_pixels() {
        let red = Rgba([255, 0, 0, 255]);
        let blue = Rgba([0, 0, 255, 255]);
        let image = RgbaImage::from_fn(1, 4, |_, y| if y % 2 == 0 { red } else { blue });
        let options = MosaicOptions {
            glyphs: GlyphMode::HalfBlock,
            enhance: false,
            ..Default::default()
        };
        let mut grid = Grid::default();
        let tiny = CellSize::new(1, 2);
        let mut renderer = MosaicRenderer::new(options);
        let report = renderer.render(&image, Rect::new(0, 0, 1, 2), tiny, &mut grid);

        assert_eq!(report.placed, Rect::new(0, 0, 1, 2));
        for row in 0..2 {
            let cell = grid.cells[&(0, row)];
            assert_eq!(cell.glyph, glyph::UPPER_HALF_BLOCK);
            assert_eq!(cell.fg, [255, 0, 0]);
            assert_eq!(cell.bg, [0, 0, 255]);
        }
    }
}
