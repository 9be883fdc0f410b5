//! Frame types for the triple-buffered hand-off.

use std::time::Instant;

/// One screenshot as delivered by the remote service.
///
/// The payload stays in its wire encoding (JPEG or PNG) until the render loop
/// picks it up; decoding happens off the network path so a slow decode never
/// stalls the stream. A frame is written only by the receive task while it
/// owns the write slot and read only by the render loop while it owns the
/// displaying slot.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Encoded image bytes as received from the stream
    pub data: Vec<u8>,

    /// Monotonic sequence number assigned by the receive task (1-based)
    pub sequence: u64,

    /// Arrival time, `None` for the empty placeholder frames
    pub timestamp: Option<Instant>,
}

impl Frame {
    /// Create a frame from a received payload.
    pub fn new(data: Vec<u8>, sequence: u64) -> Self {
        Self { data, sequence, timestamp: Some(Instant::now()) }
    }

    /// Whether this is a placeholder that never carried a payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replace the contents in place, moving the payload instead of copying it.
    pub fn fill(&mut self, data: Vec<u8>, sequence: u64) {
        self.data = data;
        self.sequence = sequence;
        self.timestamp = Some(Instant::now());
    }

    /// Time since arrival, zero for placeholders.
    pub fn age(&self) -> std::time::Duration {
        self.timestamp.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Best guess at the payload's image format, used for dump file names.
    pub fn format_extension(&self) -> &'static str {
        match image::guess_format(&self.data) {
            Ok(image::ImageFormat::Png) => "png",
            Ok(image::ImageFormat::Jpeg) => "jpg",
            _ => "bin",
        }
    }
}
