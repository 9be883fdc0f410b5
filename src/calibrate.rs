//! Terminal cell-size calibration.
//!
//! xterm-compatible terminals answer two window reports: `CSI 18 t` gives the
//! text area in characters, `CSI 14 t` gives it in pixels. Dividing one by the
//! other yields the pixel size of a single cell, which every pixel-space
//! coordinate in the client depends on (viewport size, mouse clicks, sixel
//! placement). Anything unusual falls back to [`CellSize::DEFAULT`].

use std::io::{self, Write};
use std::time::Duration;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use tracing::{debug, info, warn};

use crate::error::{Result, TermiumError};
use crate::types::CellSize;

/// Text area size in characters
pub const CHAR_SIZE_QUERY: &str = "\x1b[18t";
/// Text area size in pixels
pub const PIXEL_SIZE_QUERY: &str = "\x1b[14t";
/// How long to wait for each reply
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(500);

/// Sends a control sequence to the terminal and returns its reply.
pub trait TerminalQuery {
    fn query(&mut self, request: &str, timeout: Duration) -> Result<String>;
}

/// Puts the terminal into raw mode for its lifetime and restores the previous
/// mode on drop, including unwinding and early returns.
#[derive(Debug)]
pub struct RawModeGuard {
    was_raw: bool,
}

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        let was_raw = is_raw_mode_enabled()?;
        if !was_raw {
            enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if !self.was_raw {
            if let Err(err) = disable_raw_mode() {
                warn!(%err, "Failed to restore terminal mode after calibration");
            }
        }
    }
}

/// Queries the controlling terminal over stdout/stdin.
///
/// Must run before anything else starts reading terminal input.
#[derive(Debug, Default)]
pub struct TtyQuery;

impl TerminalQuery for TtyQuery {
    fn query(&mut self, request: &str, timeout: Duration) -> Result<String> {
        let _raw =
            RawModeGuard::enter().map_err(|e| TermiumError::terminal("enter raw mode", e))?;

        let mut stdout = io::stdout();
        stdout
            .write_all(request.as_bytes())
            .and_then(|_| stdout.flush())
            .map_err(|e| TermiumError::terminal("write terminal query", e))?;

        let reply = read_reply(timeout).map_err(|e| {
            TermiumError::calibration_failed(format!("no reply to {request:?}: {e}"))
        })?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }
}

#[cfg(unix)]
fn read_reply(timeout: Duration) -> io::Result<Vec<u8>> {
    use std::os::fd::AsFd;
    read_report(io::stdin().as_fd(), timeout)
}

/// Read `fd` until a report terminator arrives or `timeout` passes.
#[cfg(unix)]
fn read_report(fd: std::os::fd::BorrowedFd<'_>, timeout: Duration) -> io::Result<Vec<u8>> {
    use nix::errno::Errno;
    use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
    use std::time::Instant;

    let deadline = Instant::now() + timeout;
    let mut reply = Vec::with_capacity(32);
    let mut chunk = [0u8; 64];

    while !reply.contains(&b't') {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "terminal did not answer"));
        }

        let millis = remaining.as_millis().clamp(1, u16::MAX as u128) as u16;
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(Errno::EINTR) => continue,
            Ok(_) => {}
            Err(errno) => return Err(errno.into()),
        }

        match nix::unistd::read(fd, &mut chunk) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed")),
            Ok(n) => reply.extend_from_slice(&chunk[..n]),
            Err(Errno::EINTR) => {}
            Err(errno) => return Err(errno.into()),
        }
    }
    Ok(reply)
}

#[cfg(not(unix))]
fn read_reply(_timeout: Duration) -> io::Result<Vec<u8>> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "terminal reports need a unix tty"))
}

/// Whether `term` names a terminal family known to answer window reports.
pub fn is_capable_terminal(term: &str) -> bool {
    term.starts_with("xterm") || term.contains("256color")
}

/// Parse `CSI <code> ; a ; b t` anywhere in `reply`.
fn parse_report(reply: &str, code: &str) -> Option<(i64, i64)> {
    let prefix = format!("\x1b[{code};");
    let start = reply.find(&prefix)? + prefix.len();
    let body = &reply[start..];
    let end = body.find('t')?;
    let (first, second) = body[..end].split_once(';')?;
    Some((first.parse().ok()?, second.parse().ok()?))
}

/// `CSI 8 ; rows ; cols t` as (rows, cols).
pub fn parse_char_report(reply: &str) -> Option<(i64, i64)> {
    parse_report(reply, "8")
}

/// `CSI 4 ; height ; width t` as (height, width) in pixels.
pub fn parse_pixel_report(reply: &str) -> Option<(i64, i64)> {
    parse_report(reply, "4")
}

/// Derive the cell size from the two report strings.
pub fn cell_size_from_reports(char_reply: &str, pixel_reply: &str) -> Result<CellSize> {
    let (rows, cols) = parse_char_report(char_reply).ok_or_else(|| {
        TermiumError::calibration_failed(format!("unparseable character report {char_reply:?}"))
    })?;
    let (pixel_height, pixel_width) = parse_pixel_report(pixel_reply).ok_or_else(|| {
        TermiumError::calibration_failed(format!("unparseable pixel report {pixel_reply:?}"))
    })?;

    if rows <= 0 || cols <= 0 {
        return Err(TermiumError::calibration_failed(format!(
            "terminal reported {rows} rows and {cols} columns"
        )));
    }

    let width = pixel_width / cols;
    let height = pixel_height / rows;
    if width < 1 || height < 1 {
        return Err(TermiumError::calibration_failed(format!(
            "unreasonable cell size {width}x{height}"
        )));
    }

    let overflow = |_| TermiumError::calibration_failed("cell size overflow");
    Ok(CellSize::new(
        u32::try_from(width).map_err(overflow)?,
        u32::try_from(height).map_err(overflow)?,
    ))
}

/// Determines the cell size once at startup.
pub struct Calibrator<Q> {
    query: Q,
    term: Option<String>,
    timeout: Duration,
    fallback: CellSize,
}

impl Calibrator<TtyQuery> {
    /// Calibrator for the controlling terminal, typed by `$TERM`.
    pub fn from_env(fallback: CellSize) -> Self {
        Self::new(TtyQuery, std::env::var("TERM").ok(), fallback)
    }
}

impl<Q: TerminalQuery> Calibrator<Q> {
    pub fn new(query: Q, term: Option<String>, fallback: CellSize) -> Self {
        Self { query, term, timeout: DEFAULT_QUERY_TIMEOUT, fallback }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query the terminal, or explain why the cell size cannot be determined.
    pub fn try_calibrate(&mut self) -> Result<CellSize> {
        let term = self.term.as_deref().unwrap_or_default();
        debug!(term, "Detecting terminal type");
        if !is_capable_terminal(term) {
            return Err(TermiumError::calibration_failed(format!(
                "terminal type {term:?} does not support window reports"
            )));
        }

        let char_reply = self.query.query(CHAR_SIZE_QUERY, self.timeout)?;
        debug!(reply = ?char_reply, "Character size report");
        let pixel_reply = self.query.query(PIXEL_SIZE_QUERY, self.timeout)?;
        debug!(reply = ?pixel_reply, "Pixel size report");

        cell_size_from_reports(&char_reply, &pixel_reply)
    }

    /// Cell size of the terminal, never failing.
    pub fn calibrate(&mut self) -> CellSize {
        match self.try_calibrate() {
            Ok(cell) => {
                info!(width = cell.width, height = cell.height, "Calibrated character size");
                cell
            }
            Err(err) => {
                warn!(%err, "Terminal calibration failed");
                info!(
                    width = self.fallback.width,
                    height = self.fallback.height,
                    "Using default character size"
                );
                self.fallback
            }
        }
    }
}
