use crate::sequencer::tap_recorder::Tap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timing judgment for one scoring beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Perfect,
    Good,
    Miss,
}

impl Classification {
    /// Perfect or good
    pub fn is_accurate(&self) -> bool {
        matches!(self, Classification::Perfect | Classification::Good)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::Perfect => "perfect",
            Classification::Good => "good",
            Classification::Miss => "miss",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingTendency {
    Early,
    Late,
    OnTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatResult {
    pub beat_index: usize,
    /// Compensated time the tap was expected at
    pub expected_time_ms: f64,
    pub matched_tap: Option<Tap>,
    /// Index of the matched tap in recording order
    pub tap_index: Option<usize>,
    pub classification: Classification,
    /// Signed error (tap - expected), positive = late
    pub timing_error_ms: Option<f64>,
    pub timing_score: f64,     // 0-100
    pub duration_score: f64,   // 0-100
    /// Beat expected silence (rest or held note)
    pub expects_silence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_beats: u32,
    pub perfect: u32,
    pub good: u32,
    pub miss: u32,
    /// (perfect + good) / total, 0-1
    pub accuracy: f64,
    /// Over note beats with a matched tap
    pub mean_abs_timing_error_ms: f64,
    pub mean_signed_timing_error_ms: f64,
    pub mean_timing_score: f64,
    pub mean_duration_score: f64,
    pub tendency: TimingTendency,
}

impl SessionStats {
    pub fn empty() -> Self {
        Self {
            total_beats: 0,
            perfect: 0,
            good: 0,
            miss: 0,
            accuracy: 0.0,
            mean_abs_timing_error_ms: 0.0,
            mean_signed_timing_error_ms: 0.0,
            mean_timing_score: 0.0,
            mean_duration_score: 0.0,
            tendency: TimingTendency::OnTime,
        }
    }

    /// Aggregate per-beat results
    pub fn from_results(results: &[BeatResult], tendency_threshold_ms: f64) -> Self {
        if results.is_empty() {
            return Self::empty();
        }

        let count = |c: Classification| results.iter().filter(|r| r.classification == c).count() as u32;
        let perfect = count(Classification::Perfect);
        let good = count(Classification::Good);
        let miss = count(Classification::Miss);
        let total = results.len() as f64;

        let timing_errors: Vec<f64> = results
            .iter()
            .filter(|r| !r.expects_silence)
            .filter_map(|r| r.timing_error_ms)
            .collect();

        let (mean_abs, mean_signed) = if timing_errors.is_empty() {
            (0.0, 0.0)
        } else {
            let n = timing_errors.len() as f64;
            (
                timing_errors.iter().map(|e| e.abs()).sum::<f64>() / n,
                timing_errors.iter().sum::<f64>() / n,
            )
        };

        let tendency = if timing_errors.is_empty() {
            TimingTendency::OnTime
        } else if mean_signed > tendency_threshold_ms {
            TimingTendency::Late
        } else if mean_signed < -tendency_threshold_ms {
            TimingTendency::Early
        } else {
            TimingTendency::OnTime
        };

        Self {
            total_beats: results.len() as u32,
            perfect,
            good,
            miss,
            accuracy: (perfect + good) as f64 / total,
            mean_abs_timing_error_ms: mean_abs,
            mean_signed_timing_error_ms: mean_signed,
            mean_timing_score: results.iter().map(|r| r.timing_score).sum::<f64>() / total,
            mean_duration_score: results.iter().map(|r| r.duration_score).sum::<f64>() / total,
            tendency,
        }
    }

    pub fn accuracy_percent(&self) -> f64 {
        self.accuracy * 100.0
    }

    /// Short human-readable summary lines for the result sink
    pub fn feedback(&self) -> Vec<String> {
        let mut feedback = Vec::new();
        if self.total_beats == 0 {
            return feedback;
        }

        let pct = self.accuracy_percent();
        if pct >= 90.0 {
            feedback.push(format!("Excellent! {:.0}% of beats on time.", pct));
        } else if pct >= 70.0 {
            feedback.push(format!("Good job! {:.0}% of beats on time.", pct));
        } else if pct >= 50.0 {
            feedback.push(format!("Keep practicing! {:.0}% of beats on time.", pct));
        } else {
            feedback.push(format!(
                "{:.0}% of beats on time. Try slowing down the tempo.",
                pct
            ));
        }

        match self.tendency {
            TimingTendency::Late => feedback.push(format!(
                "You tend to tap late (by {:.0} ms on average).",
                self.mean_signed_timing_error_ms
            )),
            TimingTendency::Early => feedback.push(format!(
                "You tend to tap early (by {:.0} ms on average).",
                -self.mean_signed_timing_error_ms
            )),
            TimingTendency::OnTime => {}
        }

        if self.miss > 0 {
            feedback.push(format!(
                "{} beat{} missed.",
                self.miss,
                if self.miss == 1 { "" } else { "s" }
            ));
        }
        feedback
    }
}
