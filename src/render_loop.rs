//! The render loop: frame pickup, rendering and every write to the terminal.
//!
//! One task owns the screen. It waits on terminal input and a fixed poll
//! tick at the same time; each tick it takes the newest frame from the
//! triple buffer (if any), decodes it, renders it with the configured
//! backend and flushes, then services the cursor blink and the log panel.
//!
//! Per displayed frame the loop walks
//! `Idle → FrameAcquired → BandsDetected → Encoded → Written → Idle`;
//! the band step only exists for the sixel backend.
//!
//! The poll tick bounds the added display latency to one poll interval
//! (10 ms by default) on top of decode and encode time.

use std::error::Error as _;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::event::Event;
use futures::{Stream, StreamExt};
use image::RgbaImage;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{Config, RenderMode};
use crate::decode::{FrameDumper, decode_frame, scale_to_fit};
use crate::dispatch::{DispatchStats, Request, RequestDispatcher};
use crate::error::{Result, TermiumError};
use crate::input::{Action, InputHandler};
use crate::log_buffer::LogBuffer;
use crate::mosaic::MosaicRenderer;
use crate::screen::Screen;
use crate::sixel::{BandEncoder, BandReport};
use crate::triple_buffer::{FrameReader, FrameStats};
use crate::types::CellSize;

/// Where the loop is in handling the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPhase {
    #[default]
    Idle,
    FrameAcquired,
    BandsDetected,
    Encoded,
    Written,
}

/// Wall time spent in each stage of one displayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTimings {
    pub decode: Duration,
    pub scale: Duration,
    pub render: Duration,
    pub flush: Duration,
    pub total: Duration,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Esc or Ctrl+C
    Quit,
    Cancelled,
    /// The terminal event source ended
    EventsClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub exit: LoopExit,
    pub frames_displayed: u64,
    pub decode_errors: u64,
    pub encode_errors: u64,
    pub buffer: FrameStats,
    pub dispatch: DispatchStats,
}

/// Current phase and, in tests, every transition taken.
#[derive(Debug, Default)]
struct PhaseTrack {
    current: RenderPhase,
    #[cfg(test)]
    walked: Vec<RenderPhase>,
}

impl PhaseTrack {
    fn set(&mut self, to: RenderPhase) {
        trace!(from = ?self.current, to = ?to, "Render phase");
        self.current = to;
        #[cfg(test)]
        self.walked.push(to);
    }
}

enum Backend {
    Sixel(BandEncoder),
    Mosaic(MosaicRenderer),
}

pub struct RenderLoop<W: Write> {
    reader: FrameReader,
    screen: Screen<W>,
    cell: CellSize,
    backend: Backend,
    dumper: Option<FrameDumper>,
    input: InputHandler,
    dispatcher: RequestDispatcher,
    log: LogBuffer,
    log_generation: Option<u64>,
    poll_interval: Duration,
    show_timings: bool,
    phase: PhaseTrack,
    /// Kept to re-render after a resize while the stream is idle
    last_raster: Option<RgbaImage>,
    frames_displayed: u64,
    decode_errors: u64,
    encode_errors: u64,
}

impl<W: Write> RenderLoop<W> {
    pub fn new(
        config: &Config,
        reader: FrameReader,
        screen: Screen<W>,
        cell: CellSize,
        dispatcher: RequestDispatcher,
        log: LogBuffer,
    ) -> Self {
        let backend = match config.render_mode {
            RenderMode::Sixel => Backend::Sixel(BandEncoder::new(config.palette)),
            RenderMode::Mosaic => Backend::Mosaic(MosaicRenderer::new(config.mosaic)),
        };
        let dumper = config.dump_frames.then(|| FrameDumper::new(config.dump_dir.clone()));
        let input = InputHandler::new(screen.layout(), cell);
        Self {
            reader,
            screen,
            cell,
            backend,
            dumper,
            input,
            dispatcher,
            log,
            log_generation: None,
            poll_interval: config.poll_interval(),
            show_timings: config.show_timings,
            phase: PhaseTrack::default(),
            last_raster: None,
            frames_displayed: 0,
            decode_errors: 0,
            encode_errors: 0,
        }
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase.current
    }

    pub fn screen(&self) -> &Screen<W> {
        &self.screen
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }

    pub fn dispatch(&self, request: Request) -> bool {
        self.dispatcher.dispatch(request)
    }

    /// Viewport update matching the current view area.
    pub fn viewport_request(&self) -> Request {
        let (width, height) = self.screen.layout().viewport_pixels(self.cell);
        Request::Viewport { width, height }
    }

    /// Repaint everything: chrome, log panel, and the last frame if any.
    pub fn redraw_all(&mut self) -> Result<()> {
        self.screen.invalidate();
        self.screen.draw_borders();
        self.screen.clear_view();
        self.draw_log();
        self.screen.draw_mouse_info(self.input.mouse());
        if let Backend::Sixel(encoder) = &mut self.backend {
            encoder.invalidate();
        }

        match self.last_raster.take() {
            Some(raster) => {
                let shown = self.display(&raster);
                self.last_raster = Some(raster);
                shown.map(|_| ())
            }
            None => self.refresh(false),
        }
    }

    fn draw_log(&mut self) {
        let lines = self.log.tail(self.screen.layout().log.height as usize);
        self.screen.draw_log(&lines);
        self.log_generation = Some(self.log.generation());
    }

    /// Flush pending cell changes; with `graphics`, re-emit the last sixel stream too.
    fn refresh(&mut self, graphics: bool) -> Result<()> {
        self.screen.set_overlay(self.input.cursor().overlay());
        let view = self.screen.layout().view;
        match &self.backend {
            Backend::Sixel(encoder) if graphics && !encoder.last_output().is_empty() => {
                self.screen.flush_with_graphics(view.x, view.y, encoder.last_output())?;
            }
            _ => {
                self.screen.flush()?;
            }
        }
        Ok(())
    }

    /// Take, decode and show the newest frame. Returns whether one was shown.
    ///
    /// Decode and encode failures discard the frame and are only logged;
    /// terminal write failures are returned.
    pub fn poll_frame(&mut self) -> Result<bool> {
        let start = Instant::now();
        let (raster, sequence) = {
            let Some(frame) = self.reader.try_acquire_ready() else {
                return Ok(false);
            };
            self.phase.set(RenderPhase::FrameAcquired);

            match decode_frame(&frame) {
                Ok(raster) => {
                    if let Some(dumper) = self.dumper.as_mut() {
                        dumper.dump_logged(&frame, &raster);
                    }
                    (raster, frame.sequence)
                }
                Err(e) => {
                    warn!(error = %e, source = ?e.source(), "Frame decode failed");
                    self.decode_errors += 1;
                    self.phase.set(RenderPhase::Idle);
                    return Ok(false);
                }
            }
        };
        let decode = start.elapsed();

        let shown = self.display(&raster);
        self.last_raster = Some(raster);
        let Some((mut timings, report)) = shown? else {
            return Ok(false);
        };
        self.frames_displayed += 1;

        timings.decode = decode;
        timings.total = start.elapsed();
        if self.show_timings {
            self.log_timings(sequence, &timings, report);
        }
        Ok(true)
    }

    /// Render `raster` with the active backend and flush.
    ///
    /// `Ok(None)` means the frame was abandoned before anything was written.
    fn display(
        &mut self,
        raster: &RgbaImage,
    ) -> Result<Option<(FrameTimings, Option<BandReport>)>> {
        let view = self.screen.layout().view;
        if view.is_empty() {
            self.phase.set(RenderPhase::Idle);
            return Ok(None);
        }
        let mut timings = FrameTimings::default();
        let overlay = self.input.cursor().overlay();

        let report = match &mut self.backend {
            Backend::Sixel(encoder) => {
                let t = Instant::now();
                let max = self.screen.layout().viewport_pixels(self.cell);
                let scaled = scale_to_fit(raster, max);
                let image = scaled.as_ref().unwrap_or(raster);
                timings.scale = t.elapsed();

                let t = Instant::now();
                let encoded = match encoder.detect(image) {
                    Ok(detected) => {
                        trace!(dirty = detected.dirty.len(), "Bands detected");
                        self.phase.set(RenderPhase::BandsDetected);
                        encoder.encode_detected(image, detected)
                    }
                    Err(e) => Err(e),
                };
                let (payload, report) = match encoded {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        warn!(error = %e, source = ?e.source(), "Frame encode failed");
                        self.encode_errors += 1;
                        self.phase.set(RenderPhase::Idle);
                        return Ok(None);
                    }
                };
                self.phase.set(RenderPhase::Encoded);
                timings.render = t.elapsed();

                let t = Instant::now();
                self.screen.set_overlay(overlay);
                self.screen.flush_with_graphics(view.x, view.y, payload)?;
                timings.flush = t.elapsed();
                Some(report)
            }
            Backend::Mosaic(renderer) => {
                let t = Instant::now();
                self.screen.clear_view();
                let placed = renderer.render(raster, view, self.cell, &mut self.screen);
                trace!(?placed, "Mosaic placed");
                self.phase.set(RenderPhase::Encoded);
                timings.render = t.elapsed();

                let t = Instant::now();
                self.screen.set_overlay(overlay);
                self.screen.flush()?;
                timings.flush = t.elapsed();
                None
            }
        };

        self.phase.set(RenderPhase::Written);
        self.phase.set(RenderPhase::Idle);
        Ok(Some((timings, report)))
    }

    fn log_timings(&self, sequence: u64, timings: &FrameTimings, report: Option<BandReport>) {
        let stats = self.reader.stats();
        info!(
            "Frame {} decode {:?} scale {:?} render {:?} flush {:?} total {:?}",
            sequence, timings.decode, timings.scale, timings.render, timings.flush, timings.total
        );
        match (&self.backend, report) {
            (Backend::Sixel(encoder), Some(report)) => info!(
                received = stats.received,
                displayed = stats.displayed,
                dropped = stats.dropped,
                dirty = report.dirty,
                bands = report.total,
                cache_hit_rate = encoder.matcher().hit_rate(),
                "Frame stats"
            ),
            _ => info!(
                received = stats.received,
                displayed = stats.displayed,
                dropped = stats.dropped,
                "Frame stats"
            ),
        }
    }

    /// Periodic work between frames: cursor blink and log panel refresh.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        let log_changed = self.log_generation != Some(self.log.generation());
        if log_changed {
            self.draw_log();
        }
        let blinked = self.input.cursor_mut().tick(now);
        if log_changed || blinked {
            self.refresh(blinked)?;
        }
        Ok(())
    }

    /// Apply one terminal event. Returns `true` when the user asked to quit.
    pub fn handle_event(&mut self, event: &Event) -> Result<bool> {
        let layout = *self.screen.layout();
        let action = self.input.handle(event, &layout);
        if matches!(event, Event::Mouse(_)) {
            self.screen.draw_mouse_info(self.input.mouse());
        }

        match action {
            None => {}
            Some(Action::Quit) => {
                info!("Exit requested");
                return Ok(true);
            }
            Some(Action::Forward(request)) => {
                self.dispatcher.dispatch(request);
                self.refresh(false)?;
            }
            Some(Action::MouseMoved) => self.refresh(false)?,
            // Uncovering the old cursor cell blanks it, so the image goes out again
            Some(Action::CursorMoved) => self.refresh(true)?,
            Some(Action::Resize { width, height }) => {
                debug!(width, height, "Terminal resized");
                self.screen.resize(width, height);
                self.input.cursor_mut().clamp_to(self.screen.layout());
                self.dispatcher.dispatch(self.viewport_request());
                self.redraw_all()?;
            }
        }
        Ok(false)
    }

    /// Run until quit, cancellation, or the end of the event stream.
    ///
    /// The dispatcher is shut down on every exit path; queued requests are
    /// allowed to finish.
    pub async fn run<E>(mut self, events: E, cancel: CancellationToken) -> Result<RenderSummary>
    where
        E: Stream<Item = io::Result<Event>> + Unpin,
    {
        let outcome = self.run_inner(events, cancel).await;
        let buffer = self.reader.stats();
        let dispatch = self.dispatcher.shutdown().await;
        let exit = outcome?;

        let summary = RenderSummary {
            exit,
            frames_displayed: self.frames_displayed,
            decode_errors: self.decode_errors,
            encode_errors: self.encode_errors,
            buffer,
            dispatch,
        };
        info!(?summary, "Render loop stopped");
        Ok(summary)
    }

    async fn run_inner<E>(&mut self, mut events: E, cancel: CancellationToken) -> Result<LoopExit>
    where
        E: Stream<Item = io::Result<Event>> + Unpin,
    {
        self.redraw_all()?;
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(LoopExit::Cancelled),
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        if self.handle_event(&event)? {
                            return Ok(LoopExit::Quit);
                        }
                    }
                    Some(Err(e)) => return Err(TermiumError::terminal("read terminal event", e)),
                    None => return Ok(LoopExit::EventsClosed),
                },
                _ = poll.tick() => {
                    self.poll_frame()?;
                    self.tick(Instant::now())?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{BrowserService, ScreenshotStream};
    use crate::test_utils::{encode_png, gradient_frame};
    use crate::triple_buffer::{self, FrameWriter};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Request>>,
    }

    #[async_trait::async_trait]
    impl BrowserService for Recorder {
        async fn stream_screenshots(&self, _fps: u32) -> Result<ScreenshotStream> {
            Ok(futures::stream::empty().boxed())
        }
        async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Viewport { width, height });
            Ok(())
        }
        async fn click_mouse(&self, x: i32, y: i32) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Click { x, y });
            Ok(())
        }
        async fn send_keyboard_input(&self, text: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Keyboard(text.into()));
            Ok(())
        }
        async fn navigate_to_url(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Request::Navigate(url.into()));
            Ok(())
        }
    }

    fn render_loop(mode: RenderMode) -> (RenderLoop<Vec<u8>>, FrameWriter, Arc<Recorder>) {
        let config = Config { render_mode: mode, ..Config::default() };
        let (writer, reader) = triple_buffer::channel();
        let service = Arc::new(Recorder::default());
        let dispatcher = RequestDispatcher::spawn(service.clone(), 1, 8, Duration::from_secs(1));
        let screen = Screen::new(Vec::new(), 40, 16);
        let log = LogBuffer::new();
        let lp = RenderLoop::new(&config, reader, screen, CellSize::DEFAULT, dispatcher, log);
        (lp, writer, service)
    }

    fn publish(writer: &mut FrameWriter, payload: Vec<u8>, sequence: u64) {
        writer.acquire_write_slot().fill(payload, sequence);
        writer.publish();
    }

    fn take_output(lp: &mut RenderLoop<Vec<u8>>) -> Vec<u8> {
        std::mem::take(lp.screen.writer_mut())
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn sixel_frame_is_written_at_the_view_origin() {
        let (mut lp, mut writer, _) = render_loop(RenderMode::Sixel);
        lp.redraw_all().unwrap();
        take_output(&mut lp);

        assert!(!lp.poll_frame().unwrap());
        publish(&mut writer, encode_png(&gradient_frame(64, 30, 0)), 1);
        assert!(lp.poll_frame().unwrap());
        assert_eq!(lp.phase(), RenderPhase::Idle);

        let out = take_output(&mut lp);
        assert!(contains(&out, b"\x1b[2;2H\x1bP0;0;8q\"1;1;64;30"));
        assert!(contains(&out, b"\x1b\\\x1b8"));
        assert_eq!(lp.frames_displayed(), 1);
    }

    #[tokio::test]
    async fn large_frames_are_scaled_to_the_view() {
        let (mut lp, mut writer, _) = render_loop(RenderMode::Sixel);
        // View is 38x10 cells = 304x160 px
        publish(&mut writer, encode_png(&gradient_frame(608, 200, 0)), 1);
        assert!(lp.poll_frame().unwrap());
        let out = take_output(&mut lp);
        assert!(contains(&out, b"\"1;1;304;100"));
    }

    #[tokio::test]
    async fn corrupt_frames_are_discarded() {
        let (mut lp, mut writer, _) = render_loop(RenderMode::Sixel);
        publish(&mut writer, b"not an image".to_vec(), 1);
        assert!(!lp.poll_frame().unwrap());
        assert_eq!(lp.decode_errors, 1);
        assert_eq!(lp.phase(), RenderPhase::Idle);

        publish(&mut writer, encode_png(&gradient_frame(8, 8, 0)), 2);
        assert!(lp.poll_frame().unwrap());
    }

    #[tokio::test]
    async fn mosaic_frame_fills_cells() {
        let (mut lp, mut writer, _) = render_loop(RenderMode::Mosaic);
        lp.redraw_all().unwrap();
        publish(&mut writer, encode_png(&gradient_frame(304, 160, 0)), 1);
        assert!(lp.poll_frame().unwrap());

        let view = lp.screen().layout().view;
        let painted = (view.x..view.right())
            .filter_map(|c| lp.screen().get(c, view.y + 2))
            .filter(|cell| cell.bg != crossterm::style::Color::Reset)
            .count();
        assert!(painted > 0);
        assert!(!contains(&take_output(&mut lp), b"\x1bP"));
    }

    #[tokio::test]
    async fn resize_sends_viewport_and_quit_stops() {
        let (mut lp, _writer, service) = render_loop(RenderMode::Sixel);
        assert!(!lp.handle_event(&Event::Resize(50, 20)).unwrap());
        assert_eq!(lp.screen().size(), (50, 20));

        let esc = Event::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(lp.handle_event(&esc).unwrap());

        let summary = lp.run(futures::stream::empty(), CancellationToken::new()).await.unwrap();
        assert_eq!(summary.exit, LoopExit::EventsClosed);
        let viewport = Request::Viewport { width: 384, height: 224 };
        assert!(service.calls.lock().unwrap().contains(&viewport));
    }

    #[tokio::test]
    async fn log_lines_reach_the_panel() {
        let (mut lp, _writer, _) = render_loop(RenderMode::Sixel);
        lp.redraw_all().unwrap();
        lp.log.push("Calibrated character size: 8x16");
        lp.tick(Instant::now()).unwrap();

        let log = lp.screen().layout().log;
        let row: String = (log.x..log.right())
            .filter_map(|c| lp.screen().get(c, log.y))
            .map(|c| c.ch)
            .collect();
        assert!(row.starts_with("Calibrated character size: 8x16"));
    }

    #[tokio::test]
    async fn sixel_frames_walk_every_phase() {
        let (mut lp, mut writer, _) = render_loop(RenderMode::Sixel);
        publish(&mut writer, encode_png(&gradient_frame(16, 12, 0)), 1);
        assert!(lp.poll_frame().unwrap());
        assert_eq!(
            lp.phase.walked,
            [
                RenderPhase::FrameAcquired,
                RenderPhase::BandsDetected,
                RenderPhase::Encoded,
                RenderPhase::Written,
                RenderPhase::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn mosaic_frames_skip_band_detection() {
        let (mut lp, mut writer, _) = render_loop(RenderMode::Mosaic);
        publish(&mut writer, encode_png(&gradient_frame(16, 12, 0)), 1);
        assert!(lp.poll_frame().unwrap());
        assert!(!lp.phase.walked.contains(&RenderPhase::BandsDetected));
        assert_eq!(lp.phase.walked.first(), Some(&RenderPhase::FrameAcquired));
        assert_eq!(lp.phase(), RenderPhase::Idle);
    }

    #[tokio::test]
    async fn redraw_does_not_count_as_a_new_frame() {
        let (mut lp, mut writer, _) = render_loop(RenderMode::Sixel);
        publish(&mut writer, encode_png(&gradient_frame(32, 24, 0)), 1);
        assert!(lp.poll_frame().unwrap());
        take_output(&mut lp);

        lp.redraw_all().unwrap();
        assert!(!lp.handle_event(&Event::Resize(48, 18)).unwrap());
        assert!(contains(&take_output(&mut lp), b"\x1bP0;0;8q"));
        assert_eq!(lp.frames_displayed(), 1);

        publish(&mut writer, encode_png(&gradient_frame(32, 24, 9)), 2);
        assert!(lp.poll_frame().unwrap());
        assert_eq!(lp.frames_displayed(), 2);
    }
}
