//! In-memory ring of log lines shown in the log panel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lines kept before the oldest are discarded
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
struct Inner {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    /// Bumped on every push so readers can skip redraws
    generation: AtomicU64,
}

/// Shared, cheaply cloneable log ring.
///
/// Writers are tracing layers on any thread; the render loop reads the newest
/// lines on redraw. A single mutex guards the lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Inner>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                lines: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        // A panic while holding the lock leaves the ring itself intact
        self.inner.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a message, one entry per non-empty line, control characters removed.
    pub fn push(&self, message: &str) {
        let mut lines = self.lock();
        let mut pushed = false;
        for line in message.lines() {
            let clean = clean_line(line);
            if clean.trim().is_empty() {
                continue;
            }
            if lines.len() == self.inner.capacity {
                lines.pop_front();
            }
            lines.push_back(clean);
            pushed = true;
        }
        if pushed {
            self.inner.generation.fetch_add(1, Ordering::Release);
        }
    }

    /// The newest `count` lines, oldest first.
    pub fn tail(&self, count: usize) -> Vec<String> {
        let lines = self.lock();
        let skip = lines.len().saturating_sub(count);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }
}

/// Drop control characters; tabs become spaces.
pub fn clean_line(line: &str) -> String {
    line.chars()
        .filter_map(|c| match c {
            '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}
