// Beat scheduler - Drift-corrected periodic tick timing
// Ground truth for beat times: tick n is due at anchor + n * interval

use crate::error::TimingError;
use std::time::Duration;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerPhase {
    #[default]
    Idle,
    Armed,
    Running,
}

/// Timing state of a running scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerState {
    /// Monotonic time of tick 0
    pub anchor_time_ms: f64,
    /// Monotonic time the next tick is due
    pub expected_next_tick_ms: f64,
    pub interval_ms: f64,
    /// Number of ticks completed so far
    pub ticks_fired: u64,
}

/// Drift-corrected scheduler state machine (Idle -> Armed -> Running -> Idle)
///
/// The scheduler itself never sleeps; a driver asks it when the next tick is
/// due and reports back when a tick has been delivered. Because the next due
/// time is always derived from the anchor, callback jitter never accumulates.
#[derive(Debug, Clone, Default)]
pub struct BeatScheduler {
    phase: SchedulerPhase,
    interval_ms: f64,
    state: Option<SchedulerState>,
}

impl BeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SchedulerPhase::Running
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Set the tick interval; the scheduler must not be running
    pub fn arm(&mut self, interval_ms: f64) -> Result<(), TimingError> {
        if !interval_ms.is_finite() || interval_ms <= 0.0 {
            return Err(TimingError::InvalidInterval(interval_ms));
        }
        if self.is_running() {
            self.stop();
        }
        self.interval_ms = interval_ms;
        self.phase = SchedulerPhase::Armed;
        Ok(())
    }

    /// Start running; `now` is `None` when the clock is unavailable
    ///
    /// Returns the anchor time. Tick 0 is due immediately. On failure the
    /// scheduler is left exactly as it was.
    pub fn start(&mut self, now: Option<f64>) -> Result<f64, TimingError> {
        if self.phase != SchedulerPhase::Armed {
            return Err(TimingError::SchedulerNotArmed);
        }
        let anchor = now.ok_or_else(|| {
            TimingError::SchedulerUnavailable("clock returned no reading".to_string())
        })?;

        self.state = Some(SchedulerState {
            anchor_time_ms: anchor,
            expected_next_tick_ms: anchor,
            interval_ms: self.interval_ms,
            ticks_fired: 0,
        });
        self.phase = SchedulerPhase::Running;
        Ok(anchor)
    }

    /// Record that the due tick has been delivered and return the wait until
    /// the next one
    ///
    /// The next due time advances by exactly one interval before the wait is
    /// computed, so a late callback only shortens the following wait.
    pub fn complete_tick(&mut self, now: f64) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        let state = self.state.as_mut()?;
        state.ticks_fired += 1;
        state.expected_next_tick_ms =
            state.anchor_time_ms + state.ticks_fired as f64 * state.interval_ms;

        let wait_ms = (state.expected_next_tick_ms - now).max(0.0);
        Some(Duration::from_micros((wait_ms * 1000.0).round() as u64))
    }

    /// Number of the tick that is due next (0 right after start)
    pub fn next_tick_number(&self) -> Option<u64> {
        self.running_state().map(|s| s.ticks_fired)
    }

    /// Monotonic time the next tick is due
    pub fn next_due_ms(&self) -> Option<f64> {
        self.running_state().map(|s| s.expected_next_tick_ms)
    }

    /// Stop and return to Idle; safe to call repeatedly
    pub fn stop(&mut self) {
        self.phase = SchedulerPhase::Idle;
    }

    /// Undo a start whose driver could not be brought up
    pub(crate) fn abort_start(&mut self) {
        if self.is_running() {
            self.phase = SchedulerPhase::Armed;
            self.state = None;
        }
    }

    /// Timing state of the current or most recent run
    pub fn state(&self) -> Option<&SchedulerState> {
        self.state.as_ref()
    }

    fn running_state(&self) -> Option<&SchedulerState> {
        if self.is_running() {
            self.state.as_ref()
        } else {
            None
        }
    }

    /// Time of tick 0 of the current or most recent run
    pub fn anchor_time(&self) -> Option<f64> {
        self.state.map(|s| s.anchor_time_ms)
    }

    /// Ground-truth time of beat `n`
    pub fn beat_time(&self, n: u64) -> Option<f64> {
        self.state
            .map(|s| s.anchor_time_ms + n as f64 * s.interval_ms)
    }
}
