// Engine error taxonomy
// Setup errors abort a session start, runtime anomalies are absorbed by the session

/// Errors raised by the timing engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimingError {
    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    #[error("Scheduler must be armed before it can start")]
    SchedulerNotArmed,

    #[error("Invalid tick interval: {0} ms")]
    InvalidInterval(f64),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Tap at {timestamp_ms:.1} ms arrived outside the recording window")]
    RecordingWindowClosed { timestamp_ms: f64 },

    #[error("Not enough accurate samples to adapt ({accurate}/{required})")]
    InsufficientLearningData { accurate: usize, required: usize },

    #[error("Session has not been started")]
    SessionNotStarted,
}

impl TimingError {
    /// Whether this error must abort session setup
    /// Runtime anomalies (stray taps, noisy learning data) never do
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TimingError::RecordingWindowClosed { .. }
                | TimingError::InsufficientLearningData { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_anomalies_are_not_fatal() {
        assert!(!TimingError::RecordingWindowClosed { timestamp_ms: 10.0 }.is_fatal());
        assert!(
            !TimingError::InsufficientLearningData {
                accurate: 2,
                required: 5
            }
            .is_fatal()
        );
        assert!(TimingError::SchedulerUnavailable("no clock".to_string()).is_fatal());
        assert!(TimingError::InvalidPattern("empty".to_string()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = TimingError::RecordingWindowClosed { timestamp_ms: 12.34 };
        assert_eq!(
            err.to_string(),
            "Tap at 12.3 ms arrived outside the recording window"
        );
    }
}
