//! End-to-end sessions against an in-memory browser service and terminal.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, ensure};
use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use futures::StreamExt;
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use termium::dispatch::Request;
use termium::receiver::StreamEnd;
use termium::render_loop::LoopExit;
use termium::{BrowserService, CellSize, Config, Result, ScreenshotStream, Session, TermiumError};

/// Browser service whose screenshots are fed by the test.
#[derive(Default)]
struct FakeBrowser {
    frames: Mutex<Option<mpsc::Receiver<Result<Vec<u8>>>>>,
    calls: Mutex<Vec<Request>>,
}

impl FakeBrowser {
    fn with_frames() -> (Arc<Self>, mpsc::Sender<Result<Vec<u8>>>) {
        let (tx, rx) = mpsc::channel(8);
        let browser = Self { frames: Mutex::new(Some(rx)), ..Self::default() };
        (Arc::new(browser), tx)
    }

    fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, request: Request) -> Result<()> {
        self.calls.lock().unwrap().push(request);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrowserService for FakeBrowser {
    async fn stream_screenshots(&self, _fps: u32) -> Result<ScreenshotStream> {
        match self.frames.lock().unwrap().take() {
            Some(rx) => Ok(ReceiverStream::new(rx).boxed()),
            None => Err(TermiumError::stream_failed("no screenshot source")),
        }
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.record(Request::Viewport { width, height })
    }

    async fn click_mouse(&self, x: i32, y: i32) -> Result<()> {
        self.record(Request::Click { x, y })
    }

    async fn send_keyboard_input(&self, text: &str) -> Result<()> {
        self.record(Request::Keyboard(text.to_string()))
    }

    async fn navigate_to_url(&self, url: &str) -> Result<()> {
        self.record(Request::Navigate(url.to_string()))
    }
}

/// Terminal output the test can inspect while the session runs.
#[derive(Clone, Default)]
struct SharedTerminal(Arc<Mutex<Vec<u8>>>);

impl SharedTerminal {
    fn contains(&self, needle: &[u8]) -> bool {
        self.0.lock().unwrap().windows(needle.len()).any(|w| w == needle)
    }

    async fn wait_for(&self, needle: &[u8]) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.contains(needle) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("terminal output never appeared");
    }
}

impl Write for SharedTerminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 128, 255])
    })
}

fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = io::Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => image::DynamicImage::ImageRgba8(image.clone())
            .into_rgb8()
            .write_to(&mut bytes, format)
            .unwrap(),
        _ => image.write_to(&mut bytes, format).unwrap(),
    }
    bytes.into_inner()
}

fn key(code: KeyCode) -> io::Result<Event> {
    Ok(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
}

fn left_click(column: u16, row: u16) -> io::Result<Event> {
    Ok(Event::Mouse(MouseEvent {
        kind: MouseEventKind::Down(MouseButton::Left),
        column,
        row,
        modifiers: KeyModifiers::NONE,
    }))
}

#[tokio::test]
async fn sixel_session_displays_frames_and_forwards_input() {
    let (browser, frames) = FakeBrowser::with_frames();
    let (events_tx, events_rx) = mpsc::channel(8);
    let terminal = SharedTerminal::default();
    let config = Config { home_url: Some("https://example.org".into()), ..Config::default() };

    let session = Session::new(config, browser.clone()).run_with(
        terminal.clone(),
        (80, 24),
        CellSize::DEFAULT,
        ReceiverStream::new(events_rx),
        CancellationToken::new(),
    );
    let driver = async {
        frames.send(Ok(encode(&gradient(320, 180), ImageFormat::Png))).await.unwrap();
        terminal.wait_for(b"\x1bP0;0;8q\"1;1;320;180").await;

        events_tx.send(key(KeyCode::Char('a'))).await.unwrap();
        events_tx.send(left_click(11, 3)).await.unwrap();
        events_tx.send(key(KeyCode::Esc)).await.unwrap();
    };

    let (summary, ()) = tokio::join!(session, driver);
    let summary = summary.unwrap();

    assert_eq!(summary.render.exit, LoopExit::Quit);
    assert_eq!(summary.render.frames_displayed, 1);
    assert_eq!(summary.render.buffer.received, 1);
    let receiver = summary.receiver.expect("stream was opened");
    assert_eq!(receiver.frames, 1);
    assert_eq!(receiver.end, StreamEnd::Cancelled);

    let calls = browser.calls();
    assert!(calls.contains(&Request::Viewport { width: 624, height: 288 }));
    assert!(calls.contains(&Request::Navigate("https://example.org".into())));
    assert!(calls.contains(&Request::Keyboard("a".into())));
    assert!(calls.contains(&Request::Click { x: 80, y: 32 }));
}

#[tokio::test]
async fn missing_stream_leaves_the_ui_running() {
    let browser = Arc::new(FakeBrowser::default());
    let terminal = SharedTerminal::default();
    let events = futures::stream::iter(vec![key(KeyCode::Char('x')), key(KeyCode::Esc)]);

    let summary = Session::new(Config::default(), browser.clone())
        .run_with(terminal.clone(), (80, 24), CellSize::DEFAULT, events, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.render.exit, LoopExit::Quit);
    assert_eq!(summary.render.frames_displayed, 0);
    assert!(summary.receiver.is_none());
    assert!(browser.calls().contains(&Request::Keyboard("x".into())));
    assert!(terminal.contains("┌".as_bytes()));
}

#[tokio::test]
async fn stream_failure_keeps_the_last_frame_on_screen() {
    let (browser, frames) = FakeBrowser::with_frames();
    let terminal = SharedTerminal::default();
    let cancel = CancellationToken::new();

    let session = Session::new(Config::default(), browser).run_with(
        terminal.clone(),
        (80, 24),
        CellSize::DEFAULT,
        futures::stream::pending::<io::Result<Event>>(),
        cancel.clone(),
    );
    let driver = async {
        frames.send(Ok(encode(&gradient(64, 48), ImageFormat::Jpeg))).await.unwrap();
        terminal.wait_for(b"\"1;1;64;48").await;
        frames.send(Err(TermiumError::stream_failed("connection reset"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    };

    let (summary, ()) = tokio::join!(session, driver);
    let summary = summary.unwrap();

    assert_eq!(summary.render.exit, LoopExit::Cancelled);
    assert_eq!(summary.render.frames_displayed, 1);
    let receiver = summary.receiver.unwrap();
    assert!(matches!(receiver.end, StreamEnd::Failed(_)));
}

#[tokio::test]
async fn mosaic_session_from_yaml_draws_block_glyphs() -> anyhow::Result<()> {
    let config = Config::from_yaml_str(
        "render_mode: mosaic\nmosaic:\n  glyphs: half_block\n  enhance: false\n",
    )
    .context("mosaic config should parse")?;
    let (browser, frames) = FakeBrowser::with_frames();
    let terminal = SharedTerminal::default();
    let cancel = CancellationToken::new();

    let session = Session::new(config, browser).run_with(
        terminal.clone(),
        (80, 24),
        CellSize::DEFAULT,
        futures::stream::pending::<io::Result<Event>>(),
        cancel.clone(),
    );
    let driver = async {
        frames.send(Ok(encode(&gradient(320, 180), ImageFormat::Png))).await.unwrap();
        terminal.wait_for("▀".as_bytes()).await;
        cancel.cancel();
    };

    let (summary, ()) = tokio::join!(session, driver);
    let summary = summary.context("mosaic session failed")?;
    ensure!(summary.render.frames_displayed == 1, "expected one frame, got {:?}", summary.render);
    ensure!(!terminal.contains(b"\x1bP"), "mosaic mode must not emit sixel");
    Ok(())
}
