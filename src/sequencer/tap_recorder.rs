// Tap Recorder - Captures press/release timestamps during a session
// Each input source (player, key, pad) keeps its own independent tap list

use crate::error::TimingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a logical input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputSource(pub u8);

impl InputSource {
    pub const PRIMARY: InputSource = InputSource(0);
}

impl Default for InputSource {
    fn default() -> Self {
        Self::PRIMARY
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source {}", self.0)
    }
}

/// A recorded tap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tap {
    /// Monotonic press time (ms)
    pub timestamp_ms: f64,
    /// Monotonic release time, set once on release
    pub release_timestamp_ms: Option<f64>,
}

impl Tap {
    pub fn new(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            release_timestamp_ms: None,
        }
    }

    pub fn with_release(timestamp_ms: f64, release_timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            release_timestamp_ms: Some(release_timestamp_ms),
        }
    }

    pub fn is_open(&self) -> bool {
        self.release_timestamp_ms.is_none()
    }

    /// How long the tap was held, when the release is known
    pub fn hold_duration_ms(&self) -> Option<f64> {
        self.release_timestamp_ms
            .map(|release| (release - self.timestamp_ms).max(0.0))
    }

    /// Press time relative to an anchor (e.g. the scheduler's tick 0)
    pub fn relative_to(&self, anchor_ms: f64) -> f64 {
        self.timestamp_ms - anchor_ms
    }
}

/// Recording window
#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
    start_ms: f64,
    end_ms: f64,
}

/// Tap recorder with per-source tap lists
#[derive(Debug, Default)]
pub struct TapRecorder {
    taps: BTreeMap<InputSource, Vec<Tap>>,
    window: Option<Window>,
    discarded: usize,
}

impl TapRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting presses in `[start_ms, end_ms]`
    ///
    /// Clears taps from any previous recording. Presses already rejected stay
    /// counted in `discarded()`.
    pub fn open(&mut self, start_ms: f64, end_ms: f64) {
        self.taps.clear();
        self.window = Some(Window { start_ms, end_ms });
    }

    /// Stop accepting presses; recorded taps are kept
    pub fn close(&mut self) {
        self.window = None;
    }

    pub fn is_open(&self) -> bool {
        self.window.is_some()
    }

    /// Whether a press at `timestamp_ms` would be recorded
    pub fn accepts(&self, timestamp_ms: f64) -> bool {
        self.window
            .is_some_and(|w| timestamp_ms >= w.start_ms && timestamp_ms <= w.end_ms)
    }

    /// Record a press and return its index in the source's tap list
    pub fn on_press(&mut self, source: InputSource, timestamp_ms: f64) -> Result<usize, TimingError> {
        if !self.accepts(timestamp_ms) {
            self.discarded += 1;
            return Err(TimingError::RecordingWindowClosed { timestamp_ms });
        }

        let taps = self.taps.entry(source).or_default();
        taps.push(Tap::new(timestamp_ms));
        Ok(taps.len() - 1)
    }

    /// Close the most recent open tap of `source`
    ///
    /// Returns false when the source has no open tap. Releases are accepted
    /// after the window closes so a held final note keeps its duration.
    pub fn on_release(&mut self, source: InputSource, timestamp_ms: f64) -> bool {
        let Some(tap) = self
            .taps
            .get_mut(&source)
            .and_then(|taps| taps.iter_mut().rev().find(|t| t.is_open()))
        else {
            return false;
        };

        tap.release_timestamp_ms = Some(timestamp_ms.max(tap.timestamp_ms));
        true
    }

    /// Copy of a source's taps in recording order
    pub fn snapshot(&self, source: InputSource) -> Vec<Tap> {
        self.taps.get(&source).cloned().unwrap_or_default()
    }

    /// Sources that recorded at least one tap
    pub fn sources(&self) -> Vec<InputSource> {
        self.taps.keys().copied().collect()
    }

    pub fn tap_count(&self, source: InputSource) -> usize {
        self.taps.get(&source).map_or(0, Vec::len)
    }

    /// Presses rejected because they fell outside the window
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Forget all taps and the discarded count
    pub fn clear(&mut self) {
        self.taps.clear();
        self.discarded = 0;
    }
}
