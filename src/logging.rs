//! Tracing subscriber setup.
//!
//! While the terminal UI owns the screen nothing may be printed to stderr, so
//! events are routed into the [`LogBuffer`] shown in the log panel and,
//! optionally, appended to a plain-text log file.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Local, TimeZone};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::Config;
use crate::error::{Result, TermiumError};
use crate::log_buffer::LogBuffer;

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "TERMIUM_LOG";

/// Tracing layer that formats each event as one `HH:MM:SS LEVEL message` line.
#[derive(Debug, Clone)]
pub struct LogPanelLayer {
    buffer: LogBuffer,
}

impl LogPanelLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for LogPanelLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} {:<5} {}{}",
            clock_time(&Local::now()),
            level_tag(*event.metadata().level()),
            visitor.message,
            visitor.fields
        );
        self.buffer.push(&line);
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// Wall clock as `HH:MM:SS` in the timezone of `now`.
fn clock_time<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%H:%M:%S").to_string()
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Filter from `TERMIUM_LOG`, else `debug` or `info` depending on the config.
pub fn env_filter(config: &Config) -> EnvFilter {
    let default = if config.debug { "debug" } else { "info" };
    match std::env::var(LOG_ENV) {
        Ok(directives) => {
            EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(default))
        }
        Err(_) => EnvFilter::new(default),
    }
}

/// Open `path` for appending, creating missing parent directories.
pub fn open_log_file(path: &Path) -> Result<File> {
    let config_error = |details: String| TermiumError::Config {
        path: Some(path.to_path_buf()),
        details,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| config_error(format!("cannot create log directory: {e}")))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| config_error(format!("cannot open log file: {e}")))
}

/// Install the global subscriber: panel layer plus optional file layer.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init(config: &Config, buffer: LogBuffer) -> Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false).with_target(true))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(LogPanelLayer::new(buffer))
        .with(file_layer)
        .try_init()
        .map_err(|e| TermiumError::invalid_config(format!("logging already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn panel_layer_formats_level_message_and_fields() {
        let buffer = LogBuffer::new();
        let subscriber = tracing_subscriber::registry().with(LogPanelLayer::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            info!("Calibrated character size");
            warn!(operation = "Click", input = "(10, 20)", "Request failed");
        });

        let lines = buffer.tail(2);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO  Calibrated character size"));
        assert!(lines[1].contains("WARN  Request failed"));
        assert!(lines[1].ends_with("operation=Click input=(10, 20)"));
    }

    #[test]
    fn clock_follows_the_local_offset() {
        let utc = chrono::Utc.with_ymd_and_hms(2026, 3, 4, 23, 0, 0).unwrap();
        assert_eq!(clock_time(&utc), "23:00:00");

        let ahead = chrono::FixedOffset::east_opt(10 * 3600).unwrap();
        assert_eq!(clock_time(&utc.with_timezone(&ahead)), "09:00:00");
    }

    #[test]
    fn log_file_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("termium.log");
        let file = open_log_file(&path).unwrap();

        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false));
        tracing::subscriber::with_default(subscriber, || info!("written to disk"));

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("written to disk"));

        // A second open appends instead of truncating
        drop(open_log_file(&path).unwrap());
        assert!(fs::read_to_string(&path).unwrap().contains("written to disk"));
    }

    #[test]
    fn unopenable_log_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let path = blocker.join("termium.log");

        let err = open_log_file(&path).unwrap_err();
        assert!(matches!(&err, TermiumError::Config { path: Some(p), .. } if *p == path));
        assert!(!err.is_recoverable());

        let config = Config { log_file: Some(path), ..Config::default() };
        assert!(matches!(init(&config, LogBuffer::new()), Err(TermiumError::Config { .. })));
    }

    #[test]
    fn second_init_is_rejected() {
        let config = Config::default();
        // Only this test installs a global subscriber, so the first call wins
        init(&config, LogBuffer::new()).unwrap();
        let err = init(&config, LogBuffer::new()).unwrap_err();
        assert!(err.to_string().contains("already initialised"));
    }
}
