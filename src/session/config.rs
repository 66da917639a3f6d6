// Engine configuration - tuning constants for matching, latency learning and sessions
// Stored as RON (primary) or JSON; every field has a default so partial files load

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tolerance windows and scoring constants for the beat matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub perfect_ms: f64,
    pub good_ms: f64,
    /// Relaxed windows for the first beat (start-of-session reaction lag)
    pub first_beat_perfect_ms: f64,
    pub first_beat_good_ms: f64,
    /// Window in which a tap counts against a beat that expects silence
    pub rest_tolerance_ms: f64,
    /// Score bonus for taps played after the last assigned one
    pub order_bonus_ms: f64,
    /// Duration score given to a matched tap without release data
    pub duration_score_floor: f64,
    /// Mean signed error beyond which a session is called early/late
    pub tendency_threshold_ms: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            perfect_ms: 70.0,
            good_ms: 170.0,
            first_beat_perfect_ms: 150.0,
            first_beat_good_ms: 300.0,
            rest_tolerance_ms: 150.0,
            order_bonus_ms: 25.0,
            duration_score_floor: 60.0,
            tendency_threshold_ms: 30.0,
        }
    }
}

/// Latency compensation and learning constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Base offset used when no heuristic matches the environment
    pub default_base_offset_ms: f64,
    pub history_capacity: usize,
    /// Run an analysis every N accepted samples
    pub adapt_every: usize,
    /// Number of most recent samples analysed
    pub analysis_window: usize,
    pub min_accurate_samples: usize,
    /// Mean errors at or below this are treated as jitter
    pub noise_threshold_ms: f64,
    /// Fraction of the mean error applied per adaptation
    pub damping: f64,
    /// Adaptive offset is clamped to [-max, max]
    pub max_adaptive_offset_ms: f64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            default_base_offset_ms: 80.0,
            history_capacity: 50,
            adapt_every: 10,
            analysis_window: 20,
            min_accurate_samples: 5,
            noise_threshold_ms: 30.0,
            damping: 0.3,
            max_adaptive_offset_ms: 200.0,
        }
    }
}

/// Session lifecycle options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Metronome ticks played before the pattern's first beat
    pub count_in_beats: u32,
    /// Recording stays open this long after the last beat's scheduled time
    pub trailing_grace_ms: f64,
    /// Feed results back into the latency compensator on finish
    pub learn_after_session: bool,
    pub tick_channel_capacity: usize,
    pub notification_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            count_in_beats: 0,
            trailing_grace_ms: 170.0,
            learn_after_session: true,
            tick_channel_capacity: 256,
            notification_channel_capacity: 64,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub latency: LatencyConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn from_ron_str(ron_data: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron_data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json_data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json_data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Load from a `.ron` or `.json` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => Self::from_ron_str(&data),
            Some("json") => Self::from_json_str(&data),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    /// Per-user config location (`<config dir>/rhythm_trainer/config.ron`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rhythm_trainer").join("config.ron"))
    }

    /// Reject inconsistent tuning values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        let windows = [
            ("perfect_ms", m.perfect_ms),
            ("good_ms", m.good_ms),
            ("first_beat_perfect_ms", m.first_beat_perfect_ms),
            ("first_beat_good_ms", m.first_beat_good_ms),
            ("rest_tolerance_ms", m.rest_tolerance_ms),
        ];
        for (name, value) in windows {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        if m.perfect_ms > m.good_ms || m.first_beat_perfect_ms > m.first_beat_good_ms {
            return Err(ConfigError::Invalid(
                "perfect window must not exceed good window".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&m.duration_score_floor) || m.order_bonus_ms < 0.0 {
            return Err(ConfigError::Invalid(
                "duration_score_floor must be 0-100 and order_bonus_ms >= 0".to_string(),
            ));
        }

        let l = &self.latency;
        if !(l.damping > 0.0 && l.damping <= 1.0) {
            return Err(ConfigError::Invalid("damping must be in (0, 1]".to_string()));
        }
        if l.history_capacity == 0 || l.adapt_every == 0 || l.analysis_window == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity, adapt_every and analysis_window must be > 0".to_string(),
            ));
        }
        if l.analysis_window > l.history_capacity {
            return Err(ConfigError::Invalid(
                "analysis_window cannot exceed history_capacity".to_string(),
            ));
        }
        if l.max_adaptive_offset_ms < 0.0 {
            return Err(ConfigError::Invalid(
                "max_adaptive_offset_ms must be >= 0".to_string(),
            ));
        }

        let s = &self.session;
        if s.trailing_grace_ms < 0.0 || s.tick_channel_capacity == 0 || s.notification_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session grace must be >= 0 and channel capacities > 0".to_string(),
            ));
        }
        Ok(())
    }
}
