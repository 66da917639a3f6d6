// Diagnostics surfaced to the UI without interrupting a session

use crate::error::TimingError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Engine area a notification comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationCategory {
    Input,
    Scheduler,
    Latency,
    Pattern,
    Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub message: String,
    pub timestamp: u64, // Unix timestamp in milliseconds
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        category: NotificationCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            category,
            message: message.into(),
            timestamp: unix_millis(),
        }
    }

    pub fn info(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, category, message)
    }

    pub fn warning(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, category, message)
    }

    pub fn error(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, category, message)
    }

    /// Notification for an engine error; fatal errors become `Error` level
    pub fn from_error(error: &TimingError) -> Self {
        let category = match error {
            TimingError::SchedulerUnavailable(_)
            | TimingError::SchedulerNotArmed
            | TimingError::InvalidInterval(_) => NotificationCategory::Scheduler,
            TimingError::InvalidPattern(_) => NotificationCategory::Pattern,
            TimingError::RecordingWindowClosed { .. } => NotificationCategory::Input,
            TimingError::InsufficientLearningData { .. } => NotificationCategory::Latency,
            TimingError::SessionNotStarted => NotificationCategory::Session,
        };
        let level = if error.is_fatal() {
            NotificationLevel::Error
        } else {
            NotificationLevel::Warning
        };
        Self::new(level, category, error.to_string())
    }

    /// Whether the notification is younger than `max_age_ms`
    pub fn is_recent(&self, max_age_ms: u64) -> bool {
        unix_millis().saturating_sub(self.timestamp) < max_age_ms
    }
}
