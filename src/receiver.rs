//! Network receive task: moves screenshot payloads into the triple buffer.

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::service::ScreenshotStream;
use crate::stream::ThrottleExt;
use crate::triple_buffer::FrameWriter;
use crate::types::FrameRate;

/// Why the receive task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The service closed the stream
    Completed,
    /// The stream yielded an error
    Failed(String),
    Cancelled,
}

/// Outcome of one receive task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverSummary {
    /// Frames published into the buffer
    pub frames: u64,
    pub end: StreamEnd,
}

/// Owns the screenshot stream and the producer end of the frame buffer.
///
/// The task never touches rendering state; its only output is the write slot.
pub struct FrameReceiver {
    stream: ScreenshotStream,
    writer: FrameWriter,
    cancel: CancellationToken,
}

impl FrameReceiver {
    /// Wrap `stream`, throttling it client-side when `rate` is below `stream_fps`.
    pub fn new(
        stream: ScreenshotStream,
        writer: FrameWriter,
        rate: FrameRate,
        stream_fps: u32,
        cancel: CancellationToken,
    ) -> Self {
        let stream = match rate.throttle_interval(stream_fps) {
            Some(period) => {
                debug!(?period, "Throttling screenshot stream");
                stream.throttle(period).boxed()
            }
            None => stream,
        };
        Self { stream, writer, cancel }
    }

    pub fn spawn(self) -> JoinHandle<ReceiverSummary> {
        tokio::spawn(self.run())
    }

    /// Receive until the stream ends, fails, or is cancelled.
    pub async fn run(mut self) -> ReceiverSummary {
        info!("Frame receiver started");
        let mut frames = 0u64;

        let end = loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break StreamEnd::Cancelled,
                next = self.stream.next() => next,
            };

            match next {
                Some(Ok(payload)) => {
                    frames += 1;
                    trace!(sequence = frames, bytes = payload.len(), "Frame received");
                    self.writer.acquire_write_slot().fill(payload, frames);
                    self.writer.publish();
                }
                Some(Err(e)) => {
                    warn!("Screenshot stream failed after {} frames: {}", frames, e);
                    break StreamEnd::Failed(e.to_string());
                }
                None => {
                    warn!("Screenshot stream ended after {} frames", frames);
                    break StreamEnd::Completed;
                }
            }
        };

        let stats = self.writer.stats();
        info!(
            received = stats.received,
            displayed = stats.displayed,
            dropped = stats.dropped,
            "Frame receiver stopped"
        );
        ReceiverSummary { frames, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TermiumError;
    use crate::triple_buffer;
    use std::time::Duration;

    fn payloads(items: Vec<crate::Result<Vec<u8>>>) -> ScreenshotStream {
        futures::stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn publishes_every_frame_and_reports_completion() {
        let (writer, mut reader) = triple_buffer::channel();
        let stream = payloads(vec![Ok(vec![1]), Ok(vec![2]), Ok(vec![3])]);
        let receiver =
            FrameReceiver::new(stream, writer, FrameRate::Native, 10, CancellationToken::new());

        let summary = receiver.run().await;
        assert_eq!(summary, ReceiverSummary { frames: 3, end: StreamEnd::Completed });

        let frame = reader.try_acquire_ready().expect("latest frame is ready");
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.data, vec![3]);
        assert!(frame.timestamp.is_some());
        drop(frame);
        let stats = reader.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.dropped, 2);
    }

    #[tokio::test]
    async fn stream_error_stops_the_task() {
        let (writer, _reader) = triple_buffer::channel();
        let stream = payloads(vec![
            Ok(vec![1]),
            Err(TermiumError::stream_failed("connection reset")),
            Ok(vec![2]),
        ]);
        let summary =
            FrameReceiver::new(stream, writer, FrameRate::Native, 10, CancellationToken::new())
                .run()
                .await;

        assert_eq!(summary.frames, 1);
        assert!(matches!(summary.end, StreamEnd::Failed(ref r) if r.contains("connection reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_an_idle_stream() {
        let (writer, _reader) = triple_buffer::channel();
        let cancel = CancellationToken::new();
        let stream = futures::stream::pending::<crate::Result<Vec<u8>>>().boxed();
        let handle =
            FrameReceiver::new(stream, writer, FrameRate::Native, 10, cancel.clone()).spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let summary = handle.await.unwrap();
        assert_eq!(summary, ReceiverSummary { frames: 0, end: StreamEnd::Cancelled });
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_burst_publishes_only_the_newest() {
        let (writer, mut reader) = triple_buffer::channel();
        let stream = payloads((1..=6).map(|i| Ok(vec![i])).collect());
        let summary =
            FrameReceiver::new(stream, writer, FrameRate::Max(2), 30, CancellationToken::new())
                .run()
                .await;

        assert_eq!(summary.frames, 1);
        assert_eq!(reader.try_acquire_ready().unwrap().data, vec![6]);
    }
}
