//! Terminal client for a remote browser that streams screenshots.
//!
//! Termium shows a remote page inside a terminal. Screenshots arrive on a
//! network task, pass through a lock-free triple buffer, and are drawn by a
//! single render loop either as sixel graphics (re-encoding only the
//! six-pixel bands that changed) or as a coloured block mosaic for terminals
//! without sixel support. Keyboard and mouse input is forwarded back to the
//! service through a bounded worker pool.
//!
//! # Pipeline
//!
//! ```text
//! BrowserService ──► FrameReceiver ──► triple buffer ──► RenderLoop ──► terminal
//!        ▲                                                    │
//!        └──────────── RequestDispatcher ◄── input events ◄───┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use termium::{BrowserService, Config, Session};
//!
//! async fn start(service: Arc<dyn BrowserService>) -> termium::Result<()> {
//!     let config = Config::from_file("termium.yaml")?;
//!     let summary = Session::new(config, service).run().await?;
//!     println!("displayed {} frames", summary.render.frames_displayed);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod config;
pub mod log_buffer;
pub mod logging;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Frame transport
pub mod receiver;
pub mod service;
pub mod stream;
pub mod triple_buffer;

// Rendering
pub mod bands;
pub mod decode;
pub mod mosaic;
pub mod sixel;

// Terminal surface and control
pub mod calibrate;
pub mod dispatch;
pub mod input;
pub mod render_loop;
pub mod screen;
pub mod session;

pub use error::*;
pub use types::*;

pub use config::{Config, RenderMode};
pub use service::{BrowserService, ScreenshotStream};
pub use session::{Session, SessionSummary};
