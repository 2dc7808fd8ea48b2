// clock.rs — monotonic tick counter

use std::cell::Cell;
use std::time::Instant;

// ============================================================
// TickSource
// ============================================================

/// Monotonic millisecond counter used for recency stamps.
pub trait TickSource {
    fn ticks(&self) -> u64;
}

/// Wall-clock tick source; counts milliseconds since construction.
pub struct SystemTicks {
    start: Instant,
}

impl SystemTicks {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SystemTicks {
    fn ticks(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Hand-driven tick source for tests and replay.
pub struct ManualTicks {
    value: Cell<u64>,
}

impl ManualTicks {
    pub fn new(start: u64) -> Self {
        Self {
            value: Cell::new(start),
        }
    }

    pub fn set(&self, ticks: u64) {
        self.value.set(ticks);
    }

    pub fn advance(&self, delta: u64) {
        self.value.set(self.value.get() + delta);
    }
}

impl TickSource for ManualTicks {
    fn ticks(&self) -> u64 {
        self.value.get()
    }
}

impl<T: TickSource + ?Sized> TickSource for std::sync::Arc<T> {
    fn ticks(&self) -> u64 {
        (**self).ticks()
    }
}

// ============================================================
// Unit tests
// ============================================================
