//! Double-buffered cell surface for the client screen.
//!
//! Drawing calls only touch the back buffer. [`Screen::flush`] compares it
//! with what the terminal is known to show and emits escape sequences for the
//! changed cells only. Graphics payloads bypass the cell grid and are written
//! raw at a cell position after the cell diff, so text never paints over a
//! freshly emitted image.

use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveTo, RestorePosition, SavePosition, Show};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{execute, queue};
use tracing::{debug, warn};

use crate::error::{Result, TermiumError};
use crate::mosaic::{CellSurface, MosaicCell, Rgb};
use crate::types::{BORDER, ScreenLayout};

pub const BORDER_COLOR: Color = Color::DarkCyan;
pub const PANEL_BACKGROUND: Color = Color::DarkBlue;
pub const LOG_FOREGROUND: Color = Color::White;
pub const INFO_FOREGROUND: Color = Color::Yellow;

/// Column offset of the mouse info text on the bottom border
const INFO_INDENT: u16 = 3;

/// One character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self { ch: ' ', fg: Color::Reset, bg: Color::Reset }
    }
}

impl Cell {
    pub const fn new(ch: char, fg: Color, bg: Color) -> Self {
        Self { ch, fg, bg }
    }

    /// Marker that never matches a real cell, forcing a repaint.
    const STALE: Cell = Cell { ch: '\0', fg: Color::Reset, bg: Color::Reset };
}

pub fn rgb(color: Rgb) -> Color {
    Color::Rgb { r: color[0], g: color[1], b: color[2] }
}

/// Pointer position as shown on the bottom border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseInfo {
    pub pixel: (i32, i32),
    pub cell: (u16, u16),
}

impl MouseInfo {
    pub fn text(&self) -> String {
        format!(
            "Mouse Pixel: ({:4}, {:4}), Mouse Char: ({:4}, {:4})",
            self.pixel.0, self.pixel.1, self.cell.0, self.cell.1
        )
    }
}

/// Fit a log line into `width` cells, marking cut lines with `...`.
pub fn truncate_line(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    let keep = width.saturating_sub(3);
    let mut out: String = line.chars().take(keep).collect();
    out.push_str(&"..."[..width.min(3)]);
    out
}

pub struct Screen<W: Write> {
    out: W,
    layout: ScreenLayout,
    /// What the terminal currently shows
    front: Vec<Cell>,
    /// What the next flush should show
    back: Vec<Cell>,
    overlay: Option<(u16, u16, Cell)>,
    needs_clear: bool,
}

impl<W: Write> Screen<W> {
    pub fn new(out: W, width: u16, height: u16) -> Self {
        let cells = width as usize * height as usize;
        Self {
            out,
            layout: ScreenLayout::new(width, height),
            front: vec![Cell::STALE; cells],
            back: vec![Cell::default(); cells],
            overlay: None,
            needs_clear: true,
        }
    }

    pub fn layout(&self) -> &ScreenLayout {
        &self.layout
    }

    pub fn size(&self) -> (u16, u16) {
        (self.layout.width, self.layout.height)
    }

    /// Reallocate for a new terminal size; the next flush repaints everything.
    pub fn resize(&mut self, width: u16, height: u16) {
        let cells = width as usize * height as usize;
        self.layout = ScreenLayout::new(width, height);
        self.front = vec![Cell::STALE; cells];
        self.back = vec![Cell::default(); cells];
        self.overlay = None;
        self.needs_clear = true;
        debug!(width, height, "Screen resized");
    }

    /// Forget what the terminal shows and repaint on the next flush.
    pub fn invalidate(&mut self) {
        self.front.fill(Cell::STALE);
        self.needs_clear = true;
    }

    fn index(&self, col: u16, row: u16) -> Option<usize> {
        (col < self.layout.width && row < self.layout.height)
            .then(|| row as usize * self.layout.width as usize + col as usize)
    }

    pub fn set(&mut self, col: u16, row: u16, cell: Cell) {
        if let Some(idx) = self.index(col, row) {
            self.back[idx] = cell;
        }
    }

    pub fn get(&self, col: u16, row: u16) -> Option<Cell> {
        self.index(col, row).map(|idx| self.back[idx])
    }

    /// Write `text` left to right, clipped at `limit` (exclusive column).
    fn put_str(&mut self, col: u16, row: u16, limit: u16, text: &str, fg: Color, bg: Color) {
        let mut x = col;
        for ch in text.chars().filter(|c| !c.is_control()) {
            if x >= limit {
                break;
            }
            self.set(x, row, Cell::new(ch, fg, bg));
            x += 1;
        }
    }

    fn fill_row(&mut self, row: u16, from: u16, to: u16, cell: Cell) {
        for col in from..to {
            self.set(col, row, cell);
        }
    }

    /// Blank the view area.
    pub fn clear_view(&mut self) {
        let view = self.layout.view;
        for row in view.y..view.bottom() {
            self.fill_row(row, view.x, view.right(), Cell::default());
        }
    }

    /// Outer frame, the divider above the log panel, and the panel background.
    pub fn draw_borders(&mut self) {
        let ScreenLayout { width, height, log_panel_top, .. } = self.layout;
        if width < 2 || height < 2 {
            return;
        }
        let line = |ch| Cell::new(ch, BORDER_COLOR, Color::Reset);
        let right = width - 1;
        let bottom = height - 1;

        for row in [0, log_panel_top, bottom] {
            self.fill_row(row, 0, width, line('─'));
        }
        for row in BORDER..log_panel_top {
            self.set(0, row, line('│'));
            self.set(right, row, line('│'));
        }
        for row in log_panel_top + 1..bottom {
            self.set(0, row, line('│'));
            self.set(right, row, line('│'));
            self.fill_row(row, 1, right, Cell::new(' ', LOG_FOREGROUND, PANEL_BACKGROUND));
        }

        self.set(0, 0, line('┌'));
        self.set(right, 0, line('┐'));
        self.set(0, log_panel_top, line('├'));
        self.set(right, log_panel_top, line('┤'));
        self.set(0, bottom, line('└'));
        self.set(right, bottom, line('┘'));
    }

    /// Show the newest lines that fit the log panel.
    pub fn draw_log<S: AsRef<str>>(&mut self, lines: &[S]) {
        let log = self.layout.log;
        let blank = Cell::new(' ', LOG_FOREGROUND, PANEL_BACKGROUND);
        for row in log.y..log.bottom() {
            self.fill_row(row, log.x, log.right(), blank);
        }

        let skip = lines.len().saturating_sub(log.height as usize);
        for (i, line) in lines.iter().skip(skip).enumerate() {
            let text = truncate_line(line.as_ref(), log.width as usize);
            let row = log.y + i as u16;
            self.put_str(log.x, row, log.right(), &text, LOG_FOREGROUND, PANEL_BACKGROUND);
        }
    }

    /// Pointer coordinates on the bottom border.
    pub fn draw_mouse_info(&mut self, info: &MouseInfo) {
        let ScreenLayout { width, height, .. } = self.layout;
        if height == 0 {
            return;
        }
        let limit = width.saturating_sub(BORDER);
        self.put_str(
            BORDER + INFO_INDENT,
            height - 1,
            limit,
            &info.text(),
            INFO_FOREGROUND,
            PANEL_BACKGROUND,
        );
    }

    /// Cell drawn on top of everything else at the next flush, or none.
    pub fn set_overlay(&mut self, overlay: Option<(u16, u16, Cell)>) {
        if let Some((col, row, _)) = self.overlay {
            let moved = overlay.is_none_or(|(c, r, _)| (c, r) != (col, row));
            // Uncover what was under the old position
            if let Some(idx) = self.index(col, row).filter(|_| moved) {
                self.front[idx] = Cell::STALE;
            }
        }
        self.overlay = overlay;
    }

    fn effective(&self, col: u16, row: u16, idx: usize) -> Cell {
        match self.overlay {
            Some((c, r, cell)) if c == col && r == row => cell,
            _ => self.back[idx],
        }
    }

    fn queue_cell(out: &mut W, cell: Cell, colors: &mut Option<(Color, Color)>) -> io::Result<()> {
        if *colors != Some((cell.fg, cell.bg)) {
            queue!(out, SetForegroundColor(cell.fg), SetBackgroundColor(cell.bg))?;
            *colors = Some((cell.fg, cell.bg));
        }
        queue!(out, Print(cell.ch))
    }

    fn write_diff(&mut self) -> io::Result<usize> {
        if self.needs_clear {
            queue!(self.out, ResetColor, Clear(ClearType::All))?;
            self.needs_clear = false;
        }

        let width = self.layout.width;
        let mut colors = None;
        let mut cursor: Option<(u16, u16)> = None;
        let mut written = 0;
        for row in 0..self.layout.height {
            for col in 0..width {
                let idx = row as usize * width as usize + col as usize;
                let cell = self.effective(col, row, idx);
                if self.front[idx] == cell {
                    continue;
                }
                if cursor != Some((col, row)) {
                    queue!(self.out, MoveTo(col, row))?;
                }
                Self::queue_cell(&mut self.out, cell, &mut colors)?;
                self.front[idx] = cell;
                cursor = Some((col + 1, row));
                written += 1;
            }
        }
        if colors.is_some() {
            queue!(self.out, ResetColor)?;
        }
        Ok(written)
    }

    /// Emit changed cells. Returns how many were written.
    pub fn flush(&mut self) -> Result<usize> {
        let written = self.write_diff().map_err(|e| TermiumError::terminal("draw cells", e))?;
        self.out.flush().map_err(|e| TermiumError::terminal("flush screen", e))?;
        Ok(written)
    }

    /// Emit changed cells, then `payload` raw at cell (`col`, `row`).
    ///
    /// The overlay cell, if any, is redrawn on top of the payload.
    pub fn flush_with_graphics(&mut self, col: u16, row: u16, payload: &[u8]) -> Result<usize> {
        let written = self.write_diff().map_err(|e| TermiumError::terminal("draw cells", e))?;
        self.write_graphics(col, row, payload)
            .map_err(|e| TermiumError::terminal("write graphics", e))?;
        self.out.flush().map_err(|e| TermiumError::terminal("flush screen", e))?;
        Ok(written)
    }

    fn write_graphics(&mut self, col: u16, row: u16, payload: &[u8]) -> io::Result<()> {
        queue!(self.out, SavePosition, MoveTo(col, row))?;
        self.out.write_all(payload)?;
        queue!(self.out, RestorePosition)?;
        if let Some((c, r, cell)) = self.overlay {
            queue!(self.out, MoveTo(c, r))?;
            Self::queue_cell(&mut self.out, cell, &mut None)?;
            queue!(self.out, ResetColor)?;
        }
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.out
    }
}

impl<W: Write> CellSurface for Screen<W> {
    fn set_cell(&mut self, col: u16, row: u16, cell: MosaicCell) {
        self.set(col, row, Cell::new(cell.glyph, rgb(cell.fg), rgb(cell.bg)));
    }
}

/// Puts stdout into the client's terminal mode and restores it on drop.
///
/// Raw input, alternate screen, mouse capture and a hidden cursor are all
/// undone on every exit path, including unwinding.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        enable_raw_mode().map_err(|e| TermiumError::terminal("enable raw mode", e))?;
        let guard = TerminalGuard { _private: () };
        execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture, Hide)
            .map_err(|e| TermiumError::terminal("enter alternate screen", e))?;
        Ok(guard)
    }

    /// Current terminal size in cells.
    pub fn size() -> Result<(u16, u16)> {
        terminal::size().map_err(|e| TermiumError::terminal("query terminal size", e))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = execute!(io::stdout(), Show, DisableMouseCapture, LeaveAlternateScreen) {
            warn!("Failed to leave alternate screen: {}", e);
        }
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}
