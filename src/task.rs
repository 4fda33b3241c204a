// Task record and creation helpers

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One to-do entry
///
/// Tasks are only created by [`crate::Store::add_item`]; outside the crate the
/// fields are read through accessors so nothing but the store can change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) completed: bool,
    pub(crate) created_at: String,
}

impl Task {
    /// Build a fresh task from an already-trimmed, non-empty title
    pub(crate) fn new(title: String) -> Self {
        Self {
            id: new_id(),
            title,
            completed: false,
            created_at: now_iso(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Creation time as stored (ISO 8601)
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Parsed creation time, `None` when the stored string is not ISO 8601
    pub fn created_at_parsed(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

/// Parse an ISO 8601 timestamp
///
/// Accepts full RFC 3339 values, date-times without an offset and bare dates.
/// Values without an offset are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Generate a task id: UUID v7 (millisecond timestamp + random bits)
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Current time as RFC 3339 UTC with millisecond precision, e.g. `2025-01-01T00:00:00.000Z`
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
