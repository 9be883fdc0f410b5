//! Bounded fire-and-forget forwarding of input to the browser service.
//!
//! A fixed set of worker tasks drains one bounded queue. Submitting never
//! waits: when the queue is full the request is dropped with a warning, so a
//! burst of input can neither stall the event loop nor pile up unbounded
//! concurrent calls. Every call runs under a timeout and its failure is only
//! logged.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, TermiumError};
use crate::service::BrowserService;

/// Marks keyboard input that names a key rather than typing text
pub const NAMED_KEY_PREFIX: &str = "__KEY__";

/// Non-printing keys forwarded to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Tab,
    Backspace,
}

impl NamedKey {
    pub fn name(self) -> &'static str {
        match self {
            NamedKey::Enter => "Enter",
            NamedKey::Tab => "Tab",
            NamedKey::Backspace => "Backspace",
        }
    }

    /// Keyboard input text the service receives, e.g. `__KEY__Enter`.
    pub fn wire_text(self) -> String {
        format!("{NAMED_KEY_PREFIX}{}", self.name())
    }
}

/// One forwarded input action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Navigate(String),
    Click { x: i32, y: i32 },
    /// Literal typed text
    Keyboard(String),
    Key(NamedKey),
    Viewport { width: u32, height: u32 },
}

impl Request {
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Navigate(_) => "NavigateToURL",
            Request::Click { .. } => "ClickMouse",
            Request::Keyboard(_) | Request::Key(_) => "SendKeyboardInput",
            Request::Viewport { .. } => "SetViewport",
        }
    }

    /// Human-readable input, for log lines.
    pub fn input(&self) -> String {
        match self {
            Request::Navigate(url) => url.clone(),
            Request::Click { x, y } => format!("({x}, {y})"),
            Request::Keyboard(text) => format!("{text:?}"),
            Request::Key(key) => key.wire_text(),
            Request::Viewport { width, height } => format!("{width}x{height}"),
        }
    }

    async fn send(&self, service: &dyn BrowserService) -> Result<()> {
        match self {
            Request::Navigate(url) => service.navigate_to_url(url).await,
            Request::Click { x, y } => service.click_mouse(*x, *y).await,
            Request::Keyboard(text) => service.send_keyboard_input(text).await,
            Request::Key(key) => service.send_keyboard_input(&key.wire_text()).await,
            Request::Viewport { width, height } => service.set_viewport(*width, *height).await,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation(), self.input())
    }
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Queued for a worker
    pub accepted: u64,
    /// Dropped because the queue was full or closed
    pub rejected: u64,
    pub succeeded: u64,
    /// Returned an error or timed out
    pub failed: u64,
}

/// Handle for submitting requests to the worker pool.
pub struct RequestDispatcher {
    queue: mpsc::Sender<Request>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl RequestDispatcher {
    /// Start `workers` tasks sharing a queue of `capacity` requests.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        service: Arc<dyn BrowserService>,
        workers: usize,
        capacity: usize,
        timeout: Duration,
    ) -> Self {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let service = Arc::clone(&service);
                let counters = Arc::clone(&counters);
                tokio::spawn(worker(id, rx, service, counters, timeout))
            })
            .collect();

        Self { queue, workers, counters }
    }

    /// Queue `request` without waiting. Returns `false` if it was dropped.
    pub fn dispatch(&self, request: Request) -> bool {
        match self.queue.try_send(request) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(request)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    operation = request.operation(),
                    input = %request.input(),
                    "Input queue full, request dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(operation = request.operation(), "Input workers stopped, request dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait for queued requests to finish.
    pub async fn shutdown(self) -> DispatchStats {
        let Self { queue, workers, counters } = self;
        drop(queue);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Input worker panicked: {}", e);
            }
        }
        let dispatcher_stats = DispatchStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        };
        debug!(?dispatcher_stats, "Input workers stopped");
        dispatcher_stats
    }
}

async fn worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Request>>>,
    service: Arc<dyn BrowserService>,
    counters: Arc<Counters>,
    timeout: Duration,
) {
    loop {
        // Lock only while waiting for the next request, not while running it
        let request = { rx.lock().await.recv().await };
        let Some(request) = request else { break };

        let outcome = match tokio::time::timeout(timeout, request.send(service.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(TermiumError::Timeout {
                operation: request.operation().to_string(),
                duration: timeout,
            }),
        };

        match outcome {
            Ok(()) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(worker = id, "{} completed", request);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    operation = request.operation(),
                    input = %request.input(),
                    "Request failed: {}",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ScreenshotStream;
    use std::sync::Mutex as StdMutex;

    /// Records calls; clicks hang until the timeout, navigation fails.
    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<Request>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Request> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl BrowserService for Recorder {
        async fn stream_screenshots(&self, _fps: u32) -> Result<ScreenshotStream> {
            Err(TermiumError::stream_failed("not streaming"))
        }

        async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Viewport { width, height });
            Ok(())
        }

        async fn click_mouse(&self, x: i32, y: i32) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Click { x, y });
            futures::future::pending::<()>().await;
            Ok(())
        }

        async fn send_keyboard_input(&self, text: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Keyboard(text.to_string()));
            Ok(())
        }

        async fn navigate_to_url(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Navigate(url.to_string()));
            Err(TermiumError::rpc_failed("NavigateToURL", url, None))
        }
    }

    #[tokio::test]
    async fn requests_reach_the_service() {
        let service = Arc::new(Recorder::default());
        let dispatcher = RequestDispatcher::spawn(service.clone(), 2, 8, Duration::from_secs(1));

        assert!(dispatcher.dispatch(Request::Keyboard("a".into())));
        assert!(dispatcher.dispatch(Request::Viewport { width: 640, height: 384 }));
        let stats = dispatcher.shutdown().await;

        assert_eq!(stats, DispatchStats { accepted: 2, rejected: 0, succeeded: 2, failed: 0 });
        let calls = service.calls();
        assert!(calls.contains(&Request::Keyboard("a".into())));
        assert!(calls.contains(&Request::Viewport { width: 640, height: 384 }));
    }

    #[tokio::test]
    async fn failures_are_counted_not_propagated() {
        let service = Arc::new(Recorder::default());
        let dispatcher = RequestDispatcher::spawn(service, 1, 4, Duration::from_secs(1));
        dispatcher.dispatch(Request::Navigate("https://example.com".into()));
        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_calls_time_out() {
        let service = Arc::new(Recorder::default());
        let dispatcher = RequestDispatcher::spawn(service, 1, 4, Duration::from_millis(200));
        dispatcher.dispatch(Request::Click { x: 1, y: 2 });
        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_without_blocking() {
        let service = Arc::new(Recorder::default());
        // One worker stuck on a click, queue of one
        let dispatcher = RequestDispatcher::spawn(service, 1, 1, Duration::from_secs(5));
        assert!(dispatcher.dispatch(Request::Click { x: 0, y: 0 }));
        tokio::task::yield_now().await;

        assert!(dispatcher.dispatch(Request::Keyboard("x".into())));
        assert!(!dispatcher.dispatch(Request::Keyboard("y".into())));
        assert_eq!(dispatcher.stats().rejected, 1);
    }

    #[test]
    fn display_names_operation_and_input() {
        assert_eq!(Request::Click { x: 3, y: 4 }.to_string(), "ClickMouse (3, 4)");
        assert_eq!(Request::Keyboard("Enter".into()).to_string(), "SendKeyboardInput \"Enter\"");
        assert_eq!(Request::Key(NamedKey::Enter).to_string(), "SendKeyboardInput __KEY__Enter");
    }

    #[tokio::test]
    async fn named_keys_are_distinct_from_typed_text() {
        let service = Arc::new(Recorder::default());
        let dispatcher = RequestDispatcher::spawn(service.clone(), 1, 8, Duration::from_secs(1));

        assert!(dispatcher.dispatch(Request::Keyboard("Enter".into())));
        assert!(dispatcher.dispatch(Request::Key(NamedKey::Enter)));
        assert!(dispatcher.dispatch(Request::Key(NamedKey::Backspace)));
        dispatcher.shutdown().await;

        assert_eq!(
            service.calls(),
            vec![
                Request::Keyboard("Enter".into()),
                Request::Keyboard("__KEY__Enter".into()),
                Request::Keyboard("__KEY__Backspace".into()),
            ]
        );
    }
}
