//! Structured event log (C6): one JSON object per line, emitted through
//! `tracing` so the sink (stdout, or an OpenTelemetry exporter wired up by
//! `gateway-server`) stays a swappable `tracing_subscriber` layer while the
//! field shape stays fixed, as spec.md §3/§6 require.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity, matching spec.md §3's `level` enum.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

/// The tagged union of loggable events from spec.md §3.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventLog {
    Start {
        date: DateTime<Utc>,
        server_id: String,
        server_version: String,
    },
    Stop {
        date: DateTime<Utc>,
        server_id: String,
        server_version: String,
        reason: Option<String>,
    },
    Request {
        date: DateTime<Utc>,
        server_id: String,
        server_version: String,
        level: LogLevel,
        request_id: String,
        model_id: Option<String>,
        route: String,
        status_code: u16,
        duration_ms: i64,
        error_detail: Option<String>,
    },
    RequestStream {
        date: DateTime<Utc>,
        server_id: String,
        server_version: String,
        level: LogLevel,
        request_id: String,
        model_id: Option<String>,
        route: String,
        duration_ms: i64,
        chunks_emitted: u64,
        error_detail: Option<String>,
    },
    Background {
        date: DateTime<Utc>,
        server_id: String,
        server_version: String,
        level: LogLevel,
        request_id: String,
        task: String,
        duration_ms: i64,
        error_detail: Option<String>,
    },
}

impl EventLog {
    pub fn level(&self) -> LogLevel {
        match self {
            EventLog::Start { .. } | EventLog::Stop { .. } => LogLevel::Info,
            EventLog::Request { level, .. }
            | EventLog::RequestStream { level, .. }
            | EventLog::Background { level, .. } => *level,
        }
    }

    /// Emits this event as a single `tracing` record; the configured
    /// subscriber (JSON-formatted in production) turns it into one line of
    /// JSONL on stdout, satisfying spec.md §6's log wire format.
    pub fn emit(&self) {
        let payload = serde_json::to_value(self).unwrap_or_default();
        match self.level() {
            LogLevel::Info => tracing::info!(event = %payload, "event"),
            LogLevel::Warning => tracing::warn!(event = %payload, "event"),
            LogLevel::Error => tracing::error!(event = %payload, "event"),
            LogLevel::Critical => tracing::error!(event = %payload, critical = true, "event"),
        }
    }
}

/// Status-code → level assignment from spec.md §4.8/§7: 5xx logs at
/// `error`, everything else (4xx) at `warning`.
pub fn level_for_status(status_code: u16) -> LogLevel {
    if status_code >= 500 {
        LogLevel::Error
    } else {
        LogLevel::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_log_at_error() {
        assert_eq!(level_for_status(503), LogLevel::Error);
        assert_eq!(level_for_status(500), LogLevel::Error);
    }

    #[test]
    fn client_errors_log_at_warning() {
        assert_eq!(level_for_status(400), LogLevel::Warning);
        assert_eq!(level_for_status(404), LogLevel::Warning);
        assert_eq!(level_for_status(429), LogLevel::Warning);
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = EventLog::Request {
            date: Utc::now(),
            server_id: "srv-1".into(),
            server_version: "0.1.0".into(),
            level: LogLevel::Warning,
            request_id: "req-1".into(),
            model_id: Some("claude-3".into()),
            route: "/v1/chat/completions".into(),
            status_code: 404,
            duration_ms: 12,
            error_detail: Some("model_not_found".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "request");
        assert_eq!(value["status_code"], 404);
    }
}
