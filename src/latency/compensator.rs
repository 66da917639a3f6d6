// Latency compensator - Shifts expected beat times by the estimated output delay
// and learns a correction from how early/late accurate taps land

use crate::error::TimingError;
use crate::latency::heuristics;
use crate::scoring::types::{BeatResult, Classification};
use crate::session::config::LatencyConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Compensator shared between a session and its owner
pub type SharedCompensator = Arc<Mutex<LatencyCompensator>>;

/// One observed tap outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    /// Tap time minus compensated expected time (positive = late)
    pub error_ms: f64,
    /// Tap was judged perfect or good
    pub accurate: bool,
}

/// Mutable compensation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationState {
    /// Heuristic, calibrated or manually set offset
    pub base_offset_ms: f64,
    /// Learned correction on top of the base offset
    pub adaptive_offset_ms: f64,
    /// Most recent samples, oldest first
    pub history: VecDeque<LatencySample>,
    pub enabled: bool,
    pub learning_enabled: bool,
    /// Samples accepted since the last analysis
    pub accepted_since_analysis: usize,
}

/// Latency compensation model
#[derive(Debug, Clone)]
pub struct LatencyCompensator {
    config: LatencyConfig,
    state: CompensationState,
}

impl LatencyCompensator {
    /// Compensator seeded with the configured default base offset
    pub fn new(config: LatencyConfig) -> Self {
        let base_offset_ms = config.default_base_offset_ms;
        Self::with_base_offset(config, base_offset_ms)
    }

    /// Compensator seeded from the environment heuristic table
    pub fn for_environment(config: LatencyConfig, environment: &str) -> Self {
        let base = heuristics::base_offset_for(environment, config.default_base_offset_ms);
        log::debug!("Base latency {} ms for environment '{}'", base, environment);
        Self::with_base_offset(config, base)
    }

    /// Compensator seeded from an explicit calibration value
    pub fn with_base_offset(config: LatencyConfig, base_offset_ms: f64) -> Self {
        let history = VecDeque::with_capacity(config.history_capacity);
        Self {
            config,
            state: CompensationState {
                base_offset_ms,
                adaptive_offset_ms: 0.0,
                history,
                enabled: true,
                learning_enabled: true,
                accepted_since_analysis: 0,
            },
        }
    }

    pub fn into_shared(self) -> SharedCompensator {
        Arc::new(Mutex::new(self))
    }

    /// Expected tap time for a raw scheduled beat time
    pub fn compensate(&self, raw_expected_ms: f64) -> f64 {
        if self.state.enabled {
            raw_expected_ms - self.total_offset_ms()
        } else {
            raw_expected_ms
        }
    }

    pub fn total_offset_ms(&self) -> f64 {
        self.state.base_offset_ms + self.state.adaptive_offset_ms
    }

    pub fn base_offset_ms(&self) -> f64 {
        self.state.base_offset_ms
    }

    pub fn adaptive_offset_ms(&self) -> f64 {
        self.state.adaptive_offset_ms
    }

    pub fn state(&self) -> &CompensationState {
        &self.state
    }

    pub fn config(&self) -> &LatencyConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    /// When disabled, `compensate` is the identity
    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
    }

    pub fn is_learning_enabled(&self) -> bool {
        self.state.learning_enabled
    }

    pub fn set_learning_enabled(&mut self, enabled: bool) {
        self.state.learning_enabled = enabled;
        self.state.accepted_since_analysis = 0;
    }

    /// Replace the base offset with a calibration result; learning continues
    pub fn set_base_offset(&mut self, base_offset_ms: f64) {
        self.state.base_offset_ms = base_offset_ms;
    }

    /// Manual override: fixed base, no learned correction, learning off
    pub fn set_manual(&mut self, offset_ms: f64) {
        self.state.base_offset_ms = offset_ms;
        self.state.adaptive_offset_ms = 0.0;
        self.set_learning_enabled(false);
        log::info!("Manual latency offset set to {} ms", offset_ms);
    }

    /// Forget learned data (calibration restart)
    pub fn reset(&mut self) {
        self.state.adaptive_offset_ms = 0.0;
        self.state.history.clear();
        self.state.accepted_since_analysis = 0;
    }

    /// Record one tap outcome; returns the applied adjustment if an
    /// adaptation ran and changed the offset
    pub fn learn(
        &mut self,
        tap_time_ms: f64,
        expected_time_ms: f64,
        classification: Classification,
    ) -> Option<f64> {
        self.learn_sample(LatencySample {
            error_ms: tap_time_ms - expected_time_ms,
            accurate: classification.is_accurate(),
        })
    }

    pub fn learn_sample(&mut self, sample: LatencySample) -> Option<f64> {
        if !self.state.learning_enabled {
            return None;
        }

        if self.state.history.len() >= self.config.history_capacity {
            self.state.history.pop_front();
        }
        self.state.history.push_back(sample);
        self.state.accepted_since_analysis += 1;

        if self.state.accepted_since_analysis < self.config.adapt_every {
            return None;
        }
        self.state.accepted_since_analysis = 0;

        match self.analyze_and_adapt() {
            Ok(change) if change != 0.0 => Some(change),
            Ok(_) => None,
            Err(e) => {
                log::debug!("Latency adaptation skipped: {}", e);
                None
            }
        }
    }

    /// Feed a session's results back; beats without a matched tap are skipped
    pub fn learn_from_results(&mut self, results: &[BeatResult]) -> f64 {
        let before = self.state.adaptive_offset_ms;
        for result in results {
            if let Some(tap) = &result.matched_tap {
                self.learn(tap.timestamp_ms, result.expected_time_ms, result.classification);
            }
        }
        self.state.adaptive_offset_ms - before
    }

    /// Adjust the adaptive offset from the recent accurate samples
    ///
    /// Returns the change applied (0 when the mean error is within the noise
    /// threshold).
    pub fn analyze_and_adapt(&mut self) -> Result<f64, TimingError> {
        let window = self.config.analysis_window;
        let required = self.config.min_accurate_samples;

        let accurate: Vec<f64> = self
            .state
            .history
            .iter()
            .rev()
            .take(window)
            .filter(|s| s.accurate)
            .map(|s| s.error_ms)
            .collect();

        if self.state.history.len() < window || accurate.len() < required {
            return Err(TimingError::InsufficientLearningData {
                accurate: accurate.len(),
                required,
            });
        }

        let avg_error = accurate.iter().sum::<f64>() / accurate.len() as f64;
        if avg_error.abs() <= self.config.noise_threshold_ms {
            return Ok(0.0);
        }

        let limit = self.config.max_adaptive_offset_ms;
        let before = self.state.adaptive_offset_ms;
        self.state.adaptive_offset_ms =
            (before - (avg_error * self.config.damping).round()).clamp(-limit, limit);

        let change = self.state.adaptive_offset_ms - before;
        log::info!(
            "Latency adapted by {} ms (mean error {:.1} ms, adaptive offset now {} ms)",
            change,
            avg_error,
            self.state.adaptive_offset_ms
        );
        Ok(change)
    }
}

impl Default for LatencyCompensator {
    fn default() -> Self {
        Self::new(LatencyConfig::default())
    }
}
