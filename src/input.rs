//! Terminal input events mapped to client actions.
//!
//! The handler only updates local UI state (cursor overlay, pointer info) and
//! says what should happen next; the render loop performs the action, so
//! every screen write stays on one task.

use std::time::{Duration, Instant};

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::style::Color;
use tracing::debug;

use crate::dispatch::{NamedKey, Request};
use crate::screen::{Cell, MouseInfo};
use crate::types::{CellSize, ScreenLayout};

/// Period of one cursor blink phase
pub const BLINK_INTERVAL: Duration = Duration::from_millis(500);

/// What the render loop should do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    /// Send to the browser service without waiting
    Forward(Request),
    CursorMoved,
    MouseMoved,
    Resize { width: u16, height: u16 },
}

/// Blinking cursor drawn over the view area.
#[derive(Debug, Clone, Copy)]
pub struct CursorState {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
    pub blink_on: bool,
    last_blink: Instant,
}

impl CursorState {
    /// Start in the middle of the screen, visible.
    pub fn centered(layout: &ScreenLayout) -> Self {
        let mut cursor = Self {
            col: layout.width / 2,
            row: layout.height / 2,
            visible: true,
            blink_on: true,
            last_blink: Instant::now(),
        };
        cursor.clamp_to(layout);
        cursor
    }

    /// Keep the cursor inside the view area.
    pub fn clamp_to(&mut self, layout: &ScreenLayout) {
        let view = layout.view;
        if view.is_empty() {
            return;
        }
        self.col = self.col.clamp(view.x, view.right() - 1);
        self.row = self.row.clamp(view.y, view.bottom() - 1);
    }

    /// Flip the blink phase once `BLINK_INTERVAL` has passed. Returns whether it flipped.
    pub fn tick(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_blink) < BLINK_INTERVAL {
            return false;
        }
        self.blink_on = !self.blink_on;
        self.last_blink = now;
        true
    }

    /// The overlay cell to draw, if the cursor is currently shown.
    pub fn overlay(&self) -> Option<(u16, u16, Cell)> {
        (self.visible && self.blink_on)
            .then_some((self.col, self.row, Cell::new(' ', Color::Reset, Color::White)))
    }
}

pub struct InputHandler {
    cell: CellSize,
    cursor: CursorState,
    mouse: MouseInfo,
}

impl InputHandler {
    pub fn new(layout: &ScreenLayout, cell: CellSize) -> Self {
        Self { cell, cursor: CursorState::centered(layout), mouse: MouseInfo::default() }
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut CursorState {
        &mut self.cursor
    }

    pub fn mouse(&self) -> &MouseInfo {
        &self.mouse
    }

    pub fn cell_size(&self) -> CellSize {
        self.cell
    }

    pub fn handle(&mut self, event: &Event, layout: &ScreenLayout) -> Option<Action> {
        match event {
            Event::Key(key) => self.handle_key(key, layout),
            Event::Mouse(mouse) => self.handle_mouse(mouse, layout),
            Event::Resize(width, height) => {
                Some(Action::Resize { width: *width, height: *height })
            }
            _ => None,
        }
    }

    fn handle_key(&mut self, key: &KeyEvent, layout: &ScreenLayout) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('C') => Some(Action::Quit),
                code => {
                    debug!("Ignoring Ctrl+{:?}", code);
                    None
                }
            };
        }

        let view = layout.view;
        let before = (self.cursor.col, self.cursor.row);
        match key.code {
            KeyCode::Esc => return Some(Action::Quit),
            KeyCode::Up if self.cursor.row > view.y => self.cursor.row -= 1,
            KeyCode::Down if self.cursor.row + 1 < view.bottom() => self.cursor.row += 1,
            KeyCode::Left if self.cursor.col > view.x => self.cursor.col -= 1,
            KeyCode::Right if self.cursor.col + 1 < view.right() => self.cursor.col += 1,
            KeyCode::Up | KeyCode::Down | KeyCode::Left | KeyCode::Right => {}
            KeyCode::Enter => return Some(Action::Forward(Request::Key(NamedKey::Enter))),
            KeyCode::Tab => return Some(Action::Forward(Request::Key(NamedKey::Tab))),
            KeyCode::Backspace => {
                return Some(Action::Forward(Request::Key(NamedKey::Backspace)));
            }
            KeyCode::Char(c) => return Some(Action::Forward(Request::Keyboard(c.to_string()))),
            _ => return None,
        }
        ((self.cursor.col, self.cursor.row) != before).then_some(Action::CursorMoved)
    }

    fn handle_mouse(&mut self, mouse: &MouseEvent, layout: &ScreenLayout) -> Option<Action> {
        let pixel = layout.cell_to_viewport_pixels(mouse.column, mouse.row, self.cell);
        self.mouse = MouseInfo { pixel, cell: (mouse.column, mouse.row) };

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                debug!("Sending mouse click at ({}, {})", pixel.0, pixel.1);
                Some(Action::Forward(Request::Click { x: pixel.0, y: pixel.1 }))
            }
            _ => Some(Action::MouseMoved),
        }
    }
}
