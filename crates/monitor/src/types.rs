use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::Service;

/// Number of history points retained per service.
pub const MAX_HISTORY: usize = 90;

/// Classification of a service (or of the whole system)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Operational,
    Degraded,
    Down,
}

impl Status {
    /// Operational and degraded both count as "up" for uptime purposes.
    pub fn is_up(self) -> bool {
        matches!(self, Status::Operational | Status::Degraded)
    }

    /// Parse a persisted status label, mapping anything unrecognised to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "operational" => Status::Operational,
            "degraded" => Status::Degraded,
            "down" => Status::Down,
            _ => Status::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Operational => "operational",
            Status::Degraded => "degraded",
            Status::Down => "down",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: Status,
    pub response_time: Duration,
    /// HTTP status, days until certificate expiry or banner code; 0 when not applicable
    pub code: i64,
    /// Empty when healthy
    pub message: String,
}

impl ProbeOutcome {
    pub fn operational(response_time: Duration, code: i64) -> Self {
        Self { status: Status::Operational, response_time, code, message: String::new() }
    }

    pub fn degraded(response_time: Duration, code: i64, message: impl Into<String>) -> Self {
        Self { status: Status::Degraded, response_time, code, message: message.into() }
    }

    pub fn down(response_time: Duration, code: i64, message: impl Into<String>) -> Self {
        Self { status: Status::Down, response_time, code, message: message.into() }
    }

    /// Attach a message without changing the classification
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// One retained check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: i64,
    pub status: Status,
    pub status_code: i64,
}

/// Current state of a monitored service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub group: String,
    pub url: String,
    pub description: String,
    pub status: Status,
    pub response_time_ms: i64,
    pub status_code: i64,
    pub last_check: Option<DateTime<Utc>>,
    /// Percentage of retained history points that were up
    pub uptime: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    pub history: Vec<HistoryPoint>,
}

impl ServiceStatus {
    /// Fresh, never-checked status for a configured service
    pub fn new(service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            group: service.group.clone(),
            url: service.target(),
            description: service.description.clone(),
            status: Status::Unknown,
            response_time_ms: 0,
            status_code: 0,
            last_check: None,
            uptime: 100.0,
            error_message: String::new(),
            history: Vec::with_capacity(MAX_HISTORY),
        }
    }

    pub fn response_time(&self) -> Duration {
        Duration::from_millis(self.response_time_ms.max(0) as u64)
    }

    /// Apply a probe outcome: overwrite current fields, append to history,
    /// trim to `max_history` and recompute uptime.
    pub fn record(&mut self, outcome: &ProbeOutcome, now: DateTime<Utc>, max_history: usize) {
        let response_time_ms = outcome.response_time.as_millis() as i64;

        self.status = outcome.status;
        self.response_time_ms = response_time_ms;
        self.status_code = outcome.code;
        self.last_check = Some(now);
        self.error_message = outcome.message.clone();

        self.history.push(HistoryPoint {
            timestamp: now,
            response_time_ms,
            status: outcome.status,
            status_code: outcome.code,
        });

        if self.history.len() > max_history {
            let excess = self.history.len() - max_history;
            self.history.drain(..excess);
        }

        self.uptime = uptime(&self.history);
    }
}

/// `100 × up / len`, or 100 for an empty history
pub fn uptime(history: &[HistoryPoint]) -> f64 {
    if history.is_empty() {
        return 100.0;
    }
    let up = history.iter().filter(|point| point.status.is_up()).count();
    up as f64 / history.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(status: Status) -> HistoryPoint {
        HistoryPoint {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            response_time_ms: 10,
            status,
            status_code: 0,
        }
    }

    fn blank_status() -> ServiceStatus {
        ServiceStatus {
            name: "api".to_string(),
            group: String::new(),
            url: String::new(),
            description: String::new(),
            status: Status::Unknown,
            response_time_ms: 0,
            status_code: 0,
            last_check: None,
            uptime: 100.0,
            error_message: String::new(),
            history: Vec::new(),
        }
    }

    #[test]
    fn test_uptime_empty_history_is_full() {
        assert_eq!(uptime(&[]), 100.0);
    }

    #[test]
    fn test_uptime_counts_degraded_as_up() {
        let history = vec![
            point(Status::Operational),
            point(Status::Degraded),
            point(Status::Down),
            point(Status::Unknown),
        ];
        assert_eq!(uptime(&history), 50.0);
    }

    #[test]
    fn test_record_trims_oldest_first() {
        let mut status = blank_status();
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        for i in 0..(MAX_HISTORY as i64 + 1) {
            let outcome = ProbeOutcome::operational(Duration::from_millis(i as u64), i);
            status.record(&outcome, base + chrono::Duration::seconds(i), MAX_HISTORY);
        }

        assert_eq!(status.history.len(), MAX_HISTORY);
        assert_eq!(status.history.first().unwrap().status_code, 1);
        assert_eq!(status.history.last().unwrap().status_code, MAX_HISTORY as i64);
        assert!(status.history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_record_overwrites_current_fields() {
        let mut status = blank_status();
        let now = Utc::now();

        status.record(
            &ProbeOutcome::down(Duration::from_millis(1500), 503, "unexpected status code: 503"),
            now,
            MAX_HISTORY,
        );

        assert_eq!(status.status, Status::Down);
        assert_eq!(status.response_time_ms, 1500);
        assert_eq!(status.status_code, 503);
        assert_eq!(status.last_check, Some(now));
        assert_eq!(status.error_message, "unexpected status code: 503");
        assert_eq!(status.uptime, 0.0);

        status.record(&ProbeOutcome::operational(Duration::from_millis(20), 200), now, MAX_HISTORY);
        assert!(status.error_message.is_empty());
        assert_eq!(status.uptime, 50.0);
    }

    #[test]
    fn test_status_labels_round_trip() {
        for status in [Status::Unknown, Status::Operational, Status::Degraded, Status::Down] {
            assert_eq!(Status::from_label(status.as_str()), status);
        }
        assert_eq!(Status::from_label("bogus"), Status::Unknown);
    }
}
