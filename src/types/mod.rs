//! Core value types shared across the pipeline.
//!
//! - [`Frame`] is the unit handed from the network task to the render loop
//! - [`FrameRate`] bounds how often frames are offered to the display
//! - [`CellSize`], [`Rect`] and [`ScreenLayout`] describe terminal geometry

mod frame;
mod frame_rate;
mod geometry;

pub use frame::Frame;
pub use frame_rate::FrameRate;
pub use geometry::{BORDER, CellSize, LOG_PANEL_HEIGHT, Rect, ScreenLayout};
