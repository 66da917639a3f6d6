// Rhythm Trainer - Library exports for the demo binary, tests and benchmarks

pub mod audio;
pub mod error;
pub mod latency;
pub mod messaging;
pub mod scoring;
pub mod sequencer;
pub mod session;

// Re-export commonly used types for convenience
pub use audio::timing::{Clock, ManualClock, MonotonicClock};
pub use error::TimingError;
pub use latency::{LatencyCompensator, SharedCompensator};
pub use messaging::channels::{create_notification_channel, create_tick_channel};
pub use messaging::notification::{Notification, NotificationCategory, NotificationLevel};
pub use scoring::{BeatMatcher, BeatResult, Classification, CumulativeStats, SessionStats};
pub use sequencer::{
    ClickType, InputSource, Metronome, NoteElement, NoteValue, Pattern, ScoringBeat, Tap, Tempo,
    TimeSignature, decompose,
};
pub use session::config::{ConfigError, EngineConfig};
pub use session::{Session, SessionOutcome, SessionReport, TapHandle};
