//! Client configuration.
//!
//! Every field has a default, so an empty document is a valid configuration.
//! Values come from YAML; control characters are stripped before parsing so a
//! file pasted from a terminal still loads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TermiumError};
use crate::mosaic::MosaicOptions;
use crate::sixel::PaletteKind;
use crate::types::{CellSize, FrameRate};

/// Which backend draws frames into the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Inline sixel graphics
    #[default]
    Sixel,
    /// Coloured block characters
    Mosaic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render_mode: RenderMode,
    pub palette: PaletteKind,
    pub mosaic: MosaicOptions,

    /// Frame rate requested from the remote service
    pub target_fps: u32,
    /// Client-side cap on frames handed to the display
    pub max_display_rate: FrameRate,
    /// Render loop sleep between empty polls
    pub poll_interval_ms: u64,

    /// Timeout for each forwarded input call
    pub rpc_timeout_ms: u64,
    pub input_workers: usize,
    pub input_queue: usize,

    /// Write raw and decoded frames to `dump_dir`
    pub dump_frames: bool,
    pub dump_dir: PathBuf,
    /// Log per-stage timings for every displayed frame
    pub show_timings: bool,

    /// Page opened once the session starts
    pub home_url: Option<String>,
    pub log_file: Option<PathBuf>,
    pub debug: bool,

    /// Cell size used when calibration is impossible
    pub default_cell: CellSize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Sixel,
            palette: PaletteKind::Websafe,
            mosaic: MosaicOptions::default(),
            target_fps: 10,
            max_display_rate: FrameRate::Native,
            poll_interval_ms: 10,
            rpc_timeout_ms: 5000,
            input_workers: 4,
            input_queue: 64,
            dump_frames: false,
            dump_dir: PathBuf::from("."),
            show_timings: false,
            home_url: None,
            log_file: None,
            debug: false,
            default_cell: CellSize::DEFAULT,
        }
    }
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cleaned = strip_control_chars(yaml);
        let config: Config = if cleaned.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml_ng::from_str(&cleaned).map_err(|e| {
                TermiumError::invalid_config(format!("YAML parsing failed: {e}"))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| TermiumError::Config {
            path: Some(path.to_path_buf()),
            details: format!("cannot read configuration: {e}"),
        })?;
        Self::from_yaml_str(&yaml).map_err(|err| match err {
            TermiumError::Config { details, .. } => {
                TermiumError::Config { path: Some(path.to_path_buf()), details }
            }
            other => other,
        })
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.target_fps == 0, "target_fps must be at least 1"),
            (self.poll_interval_ms == 0, "poll_interval_ms must be at least 1"),
            (self.rpc_timeout_ms == 0, "rpc_timeout_ms must be at least 1"),
            (self.input_workers == 0, "input_workers must be at least 1"),
            (self.input_queue == 0, "input_queue must be at least 1"),
            (
                !(0.0..=255.0).contains(&self.mosaic.threshold),
                "mosaic.threshold must be within 0..=255",
            ),
            (
                self.default_cell.width == 0 || self.default_cell.height == 0,
                "default_cell must be non-zero in both dimensions",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, details)) => Err(TermiumError::invalid_config(*details)),
            None => Ok(()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Remove control characters other than newline, carriage return and tab.
fn strip_control_chars(yaml: &str) -> String {
    yaml.chars()
        .filter(|&c| !matches!(c, '\x00'..='\x08' | '\x0B'..='\x0C' | '\x0E'..='\x1F' | '\x7F'))
        .collect()
}
