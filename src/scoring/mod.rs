// Scoring module - Tap-to-beat matching and performance statistics

pub mod matcher;
pub mod stats;
pub mod types;

pub use matcher::BeatMatcher;
pub use stats::CumulativeStats;
pub use types::{BeatResult, Classification, SessionStats, TimingTendency};
