// Clock sources for beat scheduling and tap timestamps
// All engine times are monotonic milliseconds as f64

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic, high-resolution clock
///
/// Returns `None` when the underlying time primitive is unavailable.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Option<f64>;
}

/// Wall-independent clock backed by `Instant`
/// Milliseconds are counted from the moment the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Option<f64> {
        Some(self.origin.elapsed().as_secs_f64() * 1000.0)
    }
}

/// Manually driven clock shared between threads
///
/// Time only moves when `advance`/`set` is called, which makes session
/// timing fully deterministic in tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Current time, stored as f64 bits
    now_bits: Arc<AtomicU64>,
    available: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(start_ms.to_bits())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Current time regardless of availability
    pub fn current_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, ms: f64) {
        self.now_bits.store(ms.to_bits(), Ordering::Relaxed);
    }

    /// Advance time (negative deltas are ignored, the clock is monotonic)
    pub fn advance(&self, delta_ms: f64) {
        if delta_ms > 0.0 {
            self.set(self.current_ms() + delta_ms);
        }
    }

    /// Simulate a missing clock primitive
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Option<f64> {
        if self.available.load(Ordering::Relaxed) {
            Some(self.current_ms())
        } else {
            None
        }
    }
}
