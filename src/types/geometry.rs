//! Cell, pixel and screen-layout geometry.

use serde::{Deserialize, Serialize};

/// Rows reserved for the log panel, including its divider and bottom border
pub const LOG_PANEL_HEIGHT: u16 = 5;

/// Width in cells of every border line
pub const BORDER: u16 = 1;

/// Pixel size of one terminal character cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSize {
    pub width: u32,
    pub height: u32,
}

impl CellSize {
    /// Fallback used whenever calibration is impossible
    pub const DEFAULT: CellSize = CellSize { width: 8, height: 16 };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Height over width; greater than one for every common font
    pub fn aspect(&self) -> f64 {
        self.height as f64 / self.width.max(1) as f64
    }
}

impl Default for CellSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Rectangle in cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u16 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// Panel geometry of the client screen.
///
/// ```text
/// ┌──────────────┐  row 0
/// │  view area   │
/// ├──────────────┤  log_panel_top
/// │  log lines   │
/// └──────────────┘  height - 1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenLayout {
    /// Total width in cells
    pub width: u16,
    /// Total height in cells
    pub height: u16,
    /// Row of the divider between the view and the log panel
    pub log_panel_top: u16,
    /// Cells inside the view borders where the remote image is drawn
    pub view: Rect,
    /// Cells inside the log panel borders
    pub log: Rect,
}

impl ScreenLayout {
    pub fn new(width: u16, height: u16) -> Self {
        let log_panel_top = height.saturating_sub(LOG_PANEL_HEIGHT);
        let inner_width = width.saturating_sub(2 * BORDER);
        let view = Rect::new(BORDER, BORDER, inner_width, log_panel_top.saturating_sub(BORDER));
        let log = Rect::new(
            BORDER,
            log_panel_top + 1,
            inner_width,
            height.saturating_sub(log_panel_top + 1 + BORDER),
        );
        Self { width, height, log_panel_top, view, log }
    }

    /// Pixel size of the view area, which is what the remote viewport should match
    pub fn viewport_pixels(&self, cell: CellSize) -> (u32, u32) {
        (self.view.width as u32 * cell.width, self.view.height as u32 * cell.height)
    }

    /// Map a cell position to pixel coordinates relative to the view origin
    pub fn cell_to_viewport_pixels(&self, col: u16, row: u16, cell: CellSize) -> (i32, i32) {
        let x = (col as i32 - self.view.x as i32) * cell.width as i32;
        let y = (row as i32 - self.view.y as i32) * cell.height as i32;
        (x, y)
    }
}
