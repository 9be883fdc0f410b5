//! Remote browser service seam.

use futures::stream::BoxStream;

use crate::Result;

/// Encoded screenshots (JPEG or PNG), one item per frame.
pub type ScreenshotStream = BoxStream<'static, Result<Vec<u8>>>;

/// The five remote operations the client depends on.
///
/// Transport is the implementor's concern; the client only needs a stream of
/// encoded frames and one-way calls for input. Implementations must be
/// shareable across the receive task and the input workers.
#[async_trait::async_trait]
pub trait BrowserService: Send + Sync + 'static {
    /// Open the screenshot stream at the requested rate.
    ///
    /// The rate is a hint; the service may deliver faster or slower. The
    /// stream ends with `None` when the service closes it.
    async fn stream_screenshots(&self, fps: u32) -> Result<ScreenshotStream>;

    /// Resize the remote viewport to match the terminal view area.
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Left click at viewport pixel coordinates.
    async fn click_mouse(&self, x: i32, y: i32) -> Result<()>;

    /// Type text. Named keys arrive as `__KEY__Enter`, `__KEY__Tab` or
    /// `__KEY__Backspace`.
    async fn send_keyboard_input(&self, text: &str) -> Result<()>;

    async fn navigate_to_url(&self, url: &str) -> Result<()>;
}
