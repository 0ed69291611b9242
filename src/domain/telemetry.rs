// Telemetry data domain models
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single weight reading, expressed in the feed's base unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn new(weight: f64, timestamp: DateTime<Utc>) -> Self {
        Self { weight, timestamp }
    }

    pub fn time_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Severity attached to activity log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }
}
