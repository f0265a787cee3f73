//! ---
//! culvert_section: "01-wire-contract"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Historical log entry shape and the shared display-line format."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// One historical journal entry for the supervised unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Raw message text.
    pub message: String,
    /// Syslog level name, e.g. `info`, `warning`, `err`.
    pub priority: String,
}

impl LogEntry {
    /// Construct an entry.
    pub fn new(
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            message: message.into(),
            priority: priority.into(),
        }
    }

    /// Render the entry the way log views and the live stream present it:
    /// `[local timestamp] message`. Live stream lines use the same format so
    /// seeded history and streamed tail read uniformly.
    pub fn display_line(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}
