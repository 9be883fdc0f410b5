//! Error types for the frame pipeline.
//!
//! This module provides error handling for the termium display client.
//! All errors implement the `std::error::Error` trait and carry enough
//! context to be logged meaningfully in the in-terminal log panel.
//!
//! ## Error Categories
//!
//! - **Calibration Errors**: terminal cell-size query failed (always recovered
//!   locally by falling back to a default cell size)
//! - **Decode Errors**: a frame payload was corrupt or truncated
//! - **Encode Errors**: the sixel encoder rejected an image
//! - **RPC Errors**: a forwarded input call failed or timed out
//! - **Stream Errors**: the screenshot stream ended or broke
//! - **Terminal Errors**: the terminal device could not be driven (fatal)
//! - **Config Errors**: invalid configuration values (fatal at startup)
//!
//! ## Recovery
//!
//! ```rust
//! use termium::TermiumError;
//!
//! let error = TermiumError::calibration_failed("no response from terminal");
//! assert!(error.is_recoverable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for termium operations.
pub type Result<T, E = TermiumError> = std::result::Result<T, E>;

/// Main error type for termium operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TermiumError {
    #[error("Terminal calibration failed: {reason}")]
    Calibration { reason: String },

    #[error("Failed to decode frame {sequence}")]
    Decode {
        sequence: u64,
        #[source]
        source: image::ImageError,
    },

    #[error("Sixel encoding failed: {reason}")]
    Encode { reason: String },

    #[error("{operation} request failed (input: {input})")]
    Rpc {
        operation: String,
        input: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Screenshot stream error: {reason}")]
    Stream {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("Terminal error: {context}")]
    Terminal {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {details}")]
    Config { path: Option<PathBuf>, details: String },

    #[error("Failed to write debug dump {path}")]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TermiumError {
    /// Returns whether the client can keep running after this error.
    ///
    /// Only terminal and configuration failures are fatal; everything else is
    /// logged and the pipeline carries on with the next frame or event.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TermiumError::Calibration { .. } => true,
            TermiumError::Decode { .. } => true,
            TermiumError::Encode { .. } => true,
            TermiumError::Rpc { .. } => true,
            TermiumError::Stream { .. } => true,
            TermiumError::Timeout { .. } => true,
            TermiumError::Dump { .. } => true,
            TermiumError::Terminal { .. } => false,
            TermiumError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TermiumError::Calibration { .. } => vec![
                "Use an xterm-compatible terminal that answers window size reports",
                "Set default_cell in the configuration to your font size",
            ],
            TermiumError::Decode { .. } => vec![
                "Check the remote service is sending JPEG or PNG frames",
                "Inspect dumped frames with dump_frames enabled",
            ],
            TermiumError::Encode { .. } => vec![
                "Switch render_mode to mosaic",
                "Try a fixed palette (websafe or plan9)",
            ],
            TermiumError::Rpc { .. } => vec![
                "Verify the remote browser service is reachable",
                "Increase rpc_timeout_ms for slow links",
            ],
            TermiumError::Stream { .. } => vec![
                "Restart the remote browser service",
                "Reconnect the client",
            ],
            TermiumError::Timeout { .. } => vec![
                "Increase rpc_timeout_ms",
                "Check network latency to the service",
            ],
            TermiumError::Terminal { .. } => vec![
                "Run termium from an interactive terminal",
                "Check that stdout and stdin are not redirected",
            ],
            TermiumError::Config { .. } => vec![
                "Check the configuration file against the documented fields",
                "Remove the offending key to fall back to its default",
            ],
            TermiumError::Dump { .. } => vec![
                "Check dump_dir exists and is writable",
                "Disable dump_frames",
            ],
        }
    }

    /// Helper constructor for calibration failures.
    pub fn calibration_failed(reason: impl Into<String>) -> Self {
        TermiumError::Calibration { reason: reason.into() }
    }

    /// Helper constructor for frame decode failures.
    pub fn decode_failed(sequence: u64, source: image::ImageError) -> Self {
        TermiumError::Decode { sequence, source }
    }

    /// Helper constructor for encoder failures.
    pub fn encode_failed(reason: impl Into<String>) -> Self {
        TermiumError::Encode { reason: reason.into() }
    }

    /// Helper constructor for failed service calls.
    pub fn rpc_failed(
        operation: impl Into<String>,
        input: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        TermiumError::Rpc { operation: operation.into(), input: input.into(), source }
    }

    /// Helper constructor for screenshot stream failures.
    pub fn stream_failed(reason: impl Into<String>) -> Self {
        TermiumError::Stream { reason: reason.into(), source: None }
    }

    /// Helper constructor for terminal I/O failures with context.
    pub fn terminal(context: impl Into<String>, source: std::io::Error) -> Self {
        TermiumError::Terminal { context: context.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(details: impl Into<String>) -> Self {
        TermiumError::Config { path: None, details: details.into() }
    }
}

impl From<std::io::Error> for TermiumError {
    fn from(err: std::io::Error) -> Self {
        TermiumError::Terminal { context: "<unknown>".to_string(), source: err }
    }
}
