//! Structured logging utilities
//!
//! Provides helpers for:
//! - Structured JSON log events
//! - Async file logging bootstrap (see `setup`)

use serde_json::{json, Value};

use crate::common_utils::get_current_timestamp_ms;

pub mod setup;

/// Get hostname for log identification
pub fn hostname() -> String {
    hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Structured log event builder
///
/// Usage:
/// ```
/// use orderwal::logging::LogEvent;
///
/// let log_value = LogEvent::new("WAL_SEALED")
///     .field("sequence", 123456)
///     .field("error", "disk full")
///     .service("oms")
///     .build();
///
/// tracing::error!("{}", log_value);
/// ```
pub struct LogEvent {
    fields: serde_json::Map<String, Value>,
}

impl LogEvent {
    /// Create a new log event with the given event name
    pub fn new(event: &str) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("event".to_string(), json!(event));
        fields.insert("timestamp_ms".to_string(), json!(get_current_timestamp_ms()));

        Self { fields }
    }

    /// Add a field to the log event
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Add service name
    pub fn service(mut self, service: &str) -> Self {
        self.fields.insert("service".to_string(), json!(service));
        self
    }

    /// Add host information
    pub fn with_host(mut self) -> Self {
        self.fields.insert("host".to_string(), json!(hostname()));
        self
    }

    /// Build the final JSON value
    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_builder() {
        let log = LogEvent::new("REPLAY_DONE")
            .field("entries_replayed", 2000)
            .field("corrupted_entries", 1)
            .service("oms")
            .build();

        assert_eq!(log["event"], "REPLAY_DONE");
        assert_eq!(log["entries_replayed"], 2000);
        assert_eq!(log["corrupted_entries"], 1);
        assert_eq!(log["service"], "oms");
        assert!(log.get("timestamp_ms").is_some());
    }

    #[test]
    fn test_log_event_with_host() {
        let log = LogEvent::new("WAL_SEALED")
            .field("sequence", 42)
            .with_host()
            .build();

        assert_eq!(log["event"], "WAL_SEALED");
        assert_eq!(log["host"], hostname());
        assert!(log["host"].is_string());
    }
}
