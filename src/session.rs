//! Session wiring: service, receiver task, dispatcher and render loop.

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::event::{Event, EventStream};
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::calibrate::Calibrator;
use crate::config::Config;
use crate::dispatch::{Request, RequestDispatcher};
use crate::error::Result;
use crate::log_buffer::LogBuffer;
use crate::logging;
use crate::receiver::{FrameReceiver, ReceiverSummary};
use crate::render_loop::{RenderLoop, RenderSummary};
use crate::screen::{Screen, TerminalGuard};
use crate::service::BrowserService;
use crate::triple_buffer;
use crate::types::CellSize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub render: RenderSummary,
    /// `None` when the screenshot stream could not be opened
    pub receiver: Option<ReceiverSummary>,
}

/// One client session against a browser service.
pub struct Session {
    config: Config,
    service: Arc<dyn BrowserService>,
    log: LogBuffer,
}

impl Session {
    pub fn new(config: Config, service: Arc<dyn BrowserService>) -> Self {
        Self { config, service, log: LogBuffer::new() }
    }

    /// Use `log` as the log panel source instead of a private buffer.
    pub fn with_log_buffer(mut self, log: LogBuffer) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log_buffer(&self) -> &LogBuffer {
        &self.log
    }

    /// Run against the real terminal until the user quits.
    ///
    /// Installs logging, calibrates the cell size, then takes over the
    /// terminal; it is restored on every exit path.
    pub async fn run(self) -> Result<SessionSummary> {
        logging::init(&self.config, self.log.clone())?;
        let cell = Calibrator::from_env(self.config.default_cell).calibrate();

        let _guard = TerminalGuard::enter()?;
        let size = TerminalGuard::size()?;
        self.run_with(io::stdout(), size, cell, EventStream::new(), CancellationToken::new())
            .await
    }

    /// Run on any writer and event source; `size` is the terminal size in cells.
    pub async fn run_with<W, E>(
        self,
        out: W,
        size: (u16, u16),
        cell: CellSize,
        events: E,
        cancel: CancellationToken,
    ) -> Result<SessionSummary>
    where
        W: Write,
        E: Stream<Item = io::Result<Event>> + Unpin,
    {
        let Self { config, service, log } = self;
        info!(width = cell.width, height = cell.height, "Using character cell size");

        let dispatcher = RequestDispatcher::spawn(
            Arc::clone(&service),
            config.input_workers,
            config.input_queue,
            config.rpc_timeout(),
        );
        let (writer, reader) = triple_buffer::channel();
        let screen = Screen::new(out, size.0, size.1);
        let render = RenderLoop::new(&config, reader, screen, cell, dispatcher, log);

        render.dispatch(render.viewport_request());
        if let Some(url) = &config.home_url {
            render.dispatch(Request::Navigate(url.clone()));
        }

        let receiver_cancel = cancel.child_token();
        let receiver = match service.stream_screenshots(config.target_fps).await {
            Ok(stream) => Some(
                FrameReceiver::new(
                    stream,
                    writer,
                    config.max_display_rate,
                    config.target_fps,
                    receiver_cancel.clone(),
                )
                .spawn(),
            ),
            Err(e) => {
                warn!("Screenshot stream unavailable: {}", e);
                None
            }
        };

        let rendered = render.run(events, cancel).await;

        receiver_cancel.cancel();
        let receiver = match receiver {
            Some(handle) => match handle.await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("Frame receiver panicked: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(SessionSummary { render: rendered?, receiver })
    }
}
