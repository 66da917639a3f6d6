// Cumulative practice statistics across sessions

use crate::scoring::types::SessionStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeStats {
    pub sessions: u32,
    pub total_beats: u64,
    pub perfect: u64,
    pub good: u64,
    pub miss: u64,
    /// Best single-session accuracy (0-1)
    pub best_accuracy: f64,
    /// Mean of per-session accuracies (0-1)
    pub mean_accuracy: f64,
    pub last_session: Option<DateTime<Utc>>,
}

impl CumulativeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one session into the totals, stamped now
    pub fn record(&mut self, stats: &SessionStats) {
        self.record_at(stats, Utc::now());
    }

    pub fn record_at(&mut self, stats: &SessionStats, at: DateTime<Utc>) {
        let previous = self.sessions as f64;
        self.sessions += 1;
        self.total_beats += stats.total_beats as u64;
        self.perfect += stats.perfect as u64;
        self.good += stats.good as u64;
        self.miss += stats.miss as u64;
        self.best_accuracy = self.best_accuracy.max(stats.accuracy);
        self.mean_accuracy = (self.mean_accuracy * previous + stats.accuracy) / self.sessions as f64;
        self.last_session = Some(at);
    }

    /// Accuracy over every beat ever played
    pub fn overall_accuracy(&self) -> f64 {
        if self.total_beats == 0 {
            0.0
        } else {
            (self.perfect + self.good) as f64 / self.total_beats as f64
        }
    }
}
