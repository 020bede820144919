//! Log records and their rendered line form.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use warren_data::CappedRow;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Routine operational messages.
    Info,
    /// Unexpected but handled conditions.
    Warn,
    /// Failures.
    Error,
}

impl LogLevel {
    /// Uppercase label used in rendered lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Parse a stored level label, case-insensitively.
    ///
    /// Unknown labels map to `Info` so a record written by a different
    /// version still renders instead of being dropped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    const fn color_code(self) -> &'static str {
        match self {
            Self::Debug => "\x1b[36m",
            Self::Info => "\x1b[32m",
            Self::Warn => "\x1b[33m",
            Self::Error => "\x1b[31m",
        }
    }
}

/// One log record as read back from a capped stream.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Insertion sequence assigned by the store.
    pub id: i64,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
}

impl LogEntry {
    /// Decode a stored stream row.
    ///
    /// Missing payload fields fall back to `Info` and an empty message; a
    /// capped stream can hold records from any past version.
    #[must_use]
    pub fn from_row(row: &CappedRow) -> Self {
        let level = row
            .payload
            .get("level")
            .and_then(Value::as_str)
            .map_or(LogLevel::Info, LogLevel::parse);
        let message = row
            .payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            id: row.id,
            timestamp: row.created_at,
            level,
            message,
        }
    }

    /// The payload document stored for a record.
    #[must_use]
    pub fn payload(level: LogLevel, message: &str) -> Value {
        json!({
            "level": level.as_str().to_ascii_lowercase(),
            "message": message,
        })
    }

    /// Render as `[YYYY-MM-DD HH:MM:SS][LEVEL] message`.
    ///
    /// `formatted` wraps the line in an ANSI color matching the severity.
    #[must_use]
    pub fn format_line(&self, formatted: bool) -> String {
        let line = format!(
            "[{}][{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level.as_str(),
            self.message
        );
        if formatted {
            format!("{}{line}\x1b[0m", self.level.color_code())
        } else {
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(level: LogLevel) -> LogEntry {
        LogEntry {
            id: 1,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            level,
            message: "tunnel established".to_string(),
        }
    }

    #[test]
    fn level_parsing_is_lenient() {
        assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("Error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("mystery"), LogLevel::Info);
    }

    #[test]
    fn plain_lines_carry_timestamp_level_and_message() {
        assert_eq!(
            entry(LogLevel::Info).format_line(false),
            "[2026-03-14 09:26:53][INFO] tunnel established"
        );
    }

    #[test]
    fn formatted_lines_are_wrapped_in_color() {
        let line = entry(LogLevel::Error).format_line(true);
        assert!(line.starts_with("\x1b[31m["));
        assert!(line.ends_with("\x1b[0m"));
    }

    #[test]
    fn rows_with_unknown_payloads_still_decode() {
        let row = CappedRow {
            id: 7,
            created_at: Utc::now(),
            payload: json!({"unexpected": true}),
        };
        let decoded = LogEntry::from_row(&row);
        assert_eq!(decoded.level, LogLevel::Info);
        assert!(decoded.message.is_empty());
    }

    #[test]
    fn payload_round_trips_through_a_row() {
        let payload = LogEntry::payload(LogLevel::Warn, "disk nearly full");
        let row = CappedRow {
            id: 3,
            created_at: Utc::now(),
            payload,
        };
        let decoded = LogEntry::from_row(&row);
        assert_eq!(decoded.level, LogLevel::Warn);
        assert_eq!(decoded.message, "disk nearly full");
    }
}
