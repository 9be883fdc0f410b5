//! Triple-buffered frame hand-off between the receive task and the render loop.
//!
//! Three [`Frame`] slots rotate through three roles:
//!
//! - **writing**: owned by the receive task, filled with the next payload
//! - **ready**: the newest complete frame, waiting for pickup
//! - **displaying**: the frame the render loop consumed last
//!
//! All three role indices plus a "fresh" flag live in one atomic byte and are
//! exchanged with compare-and-swap, so the invariant "each slot has exactly one
//! role" holds at every instant and pixel data is never copied. Publishing
//! never waits for the reader: if the previous ready frame was not picked up
//! it is overwritten and counted as dropped, which bounds latency to one frame.
//!
//! The two ends are split into a [`FrameWriter`] and a [`FrameReader`], each
//! non-`Clone`, so the single-producer / single-consumer discipline is checked
//! by the type system.
//!
//! ```rust
//! use termium::triple_buffer;
//!
//! let (mut writer, mut reader) = triple_buffer::channel();
//! writer.acquire_write_slot().fill(vec![1, 2, 3], 1);
//! writer.publish();
//!
//! let frame = reader.try_acquire_ready().expect("frame was published");
//! assert_eq!(frame.sequence, 1);
//! drop(frame);
//! assert!(reader.try_acquire_ready().is_none());
//! ```

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::types::Frame;

const FRESH: u8 = 1 << 6;

/// Packed role assignment: which slot currently holds which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRoles {
    pub writing: usize,
    pub ready: usize,
    pub displaying: usize,
    /// The ready slot holds a frame the reader has not picked up yet
    pub fresh: bool,
}

impl SlotRoles {
    const INITIAL: SlotRoles = SlotRoles { writing: 0, ready: 1, displaying: 2, fresh: false };

    fn pack(self) -> u8 {
        let mut bits =
            (self.writing as u8) | ((self.ready as u8) << 2) | ((self.displaying as u8) << 4);
        if self.fresh {
            bits |= FRESH;
        }
        bits
    }

    fn unpack(bits: u8) -> Self {
        Self {
            writing: (bits & 0b11) as usize,
            ready: ((bits >> 2) & 0b11) as usize,
            displaying: ((bits >> 4) & 0b11) as usize,
            fresh: bits & FRESH != 0,
        }
    }

    /// Every slot index appears exactly once.
    pub fn is_permutation(&self) -> bool {
        let mut seen = [false; 3];
        for idx in [self.writing, self.ready, self.displaying] {
            if idx > 2 || seen[idx] {
                return false;
            }
            seen[idx] = true;
        }
        true
    }
}

/// Monotonic hand-off counters.
///
/// Once the reader has drained the buffer, `dropped == received - displayed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub received: u64,
    pub displayed: u64,
    pub dropped: u64,
}

struct Shared {
    // Each slot is only ever locked by the end that owns its current role, so
    // these locks are uncontended; they exist to hand out `&mut Frame` safely.
    slots: [Mutex<Frame>; 3],
    roles: AtomicU8,
    received: AtomicU64,
    displayed: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn lock(&self, idx: usize) -> MutexGuard<'_, Frame> {
        self.slots[idx].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn roles(&self) -> SlotRoles {
        SlotRoles::unpack(self.roles.load(Ordering::Acquire))
    }

    fn stats(&self) -> FrameStats {
        FrameStats {
            received: self.received.load(Ordering::Relaxed),
            displayed: self.displayed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Swap ready and displaying if a fresh frame is waiting.
    fn take_ready(&self) -> Option<usize> {
        let mut current = self.roles.load(Ordering::Acquire);
        loop {
            let roles = SlotRoles::unpack(current);
            if !roles.fresh {
                return None;
            }
            let next = SlotRoles {
                writing: roles.writing,
                ready: roles.displaying,
                displaying: roles.ready,
                fresh: false,
            };
            match self.roles.compare_exchange_weak(
                current,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.displayed.fetch_add(1, Ordering::Relaxed);
                    return Some(next.displaying);
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Create a triple buffer with three empty placeholder frames.
pub fn channel() -> (FrameWriter, FrameReader) {
    let shared = Arc::new(Shared {
        slots: [
            Mutex::new(Frame::default()),
            Mutex::new(Frame::default()),
            Mutex::new(Frame::default()),
        ],
        roles: AtomicU8::new(SlotRoles::INITIAL.pack()),
        received: AtomicU64::new(0),
        displayed: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });
    // Capacity one: a pending wake-up token is enough, further signals coalesce
    let (signal, wake) = sync_channel(1);
    (FrameWriter { shared: Arc::clone(&shared), signal }, FrameReader { shared, wake })
}

/// Producer end, owned by the network receive task.
pub struct FrameWriter {
    shared: Arc<Shared>,
    signal: SyncSender<()>,
}

impl FrameWriter {
    /// The frame currently designated for writing.
    pub fn acquire_write_slot(&mut self) -> MutexGuard<'_, Frame> {
        let idx = self.shared.roles().writing;
        self.shared.lock(idx)
    }

    /// Promote the written frame to ready and take the old ready slot back.
    ///
    /// Never blocks. If the previous ready frame was never consumed it is
    /// discarded and the drop counter increments.
    pub fn publish(&mut self) {
        let mut current = self.shared.roles.load(Ordering::Acquire);
        let was_fresh = loop {
            let roles = SlotRoles::unpack(current);
            let next = SlotRoles {
                writing: roles.ready,
                ready: roles.writing,
                displaying: roles.displaying,
                fresh: true,
            };
            match self.shared.roles.compare_exchange_weak(
                current,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break roles.fresh,
                Err(actual) => current = actual,
            }
        };

        if was_fresh {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.received.fetch_add(1, Ordering::Relaxed);

        match self.signal.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            // Reader gone; nothing left to wake
            Err(TrySendError::Disconnected(())) => {}
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.shared.stats()
    }
}

/// Consumer end, owned by the render loop.
pub struct FrameReader {
    shared: Arc<Shared>,
    wake: Receiver<()>,
}

impl FrameReader {
    /// Non-blocking pickup of the newest frame.
    ///
    /// Returns `None` when nothing was published since the last pickup.
    pub fn try_acquire_ready(&mut self) -> Option<MutexGuard<'_, Frame>> {
        let idx = self.shared.take_ready()?;
        Some(self.shared.lock(idx))
    }

    /// Blocking pickup bounded by `timeout`.
    pub fn wait_for_ready(&mut self, timeout: Duration) -> Option<MutexGuard<'_, Frame>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(idx) = self.shared.take_ready() {
                return Some(self.shared.lock(idx));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.wake.recv_timeout(remaining) {
                // Stale tokens are possible after a non-blocking pickup; re-check
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    return self.shared.take_ready().map(|idx| self.shared.lock(idx));
                }
            }
        }
    }

    /// The frame consumed last, without changing any role.
    pub fn displaying(&mut self) -> MutexGuard<'_, Frame> {
        let idx = self.shared.roles().displaying;
        self.shared.lock(idx)
    }

    pub fn roles(&self) -> SlotRoles {
        self.shared.roles()
    }

    pub fn stats(&self) -> FrameStats {
        self.shared.stats()
    }
}
