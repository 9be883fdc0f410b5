//! Display rate control for the screenshot stream

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on how often received frames are handed to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrameRate {
    /// Every frame the service sends is offered to the render loop
    #[default]
    Native,

    /// Throttled to at most this many frames per second.
    /// If the requested rate reaches the stream rate, Native is used
    Max(u32),
}

impl FrameRate {
    /// Normalize against the rate requested from the service
    pub fn normalize(self, stream_fps: u32) -> Self {
        match self {
            FrameRate::Native => FrameRate::Native,
            FrameRate::Max(0) => FrameRate::Native,
            FrameRate::Max(hz) if hz >= stream_fps => FrameRate::Native,
            FrameRate::Max(hz) => FrameRate::Max(hz),
        }
    }

    /// Throttle interval if one is needed
    pub fn throttle_interval(self, stream_fps: u32) -> Option<Duration> {
        match self.normalize(stream_fps) {
            FrameRate::Native => None,
            FrameRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
