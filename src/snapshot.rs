// Persisted document layout: `{ "items": [Task, ...] }`

use crate::task::Task;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// The whole task collection, as returned by `Store::load` and as persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub items: Vec<Task>,
}

#[derive(Serialize)]
struct Document<'a> {
    items: &'a [Task],
}

/// Serialize a collection into the persisted document
pub fn encode(items: &[Task]) -> Result<String> {
    serde_json::to_string(&Document { items }).context("Failed to serialize task collection")
}

/// Restore a collection from a persisted document
///
/// Returns `None` for a document that does not parse, is not an object, or
/// whose `items` is not an array. Otherwise items are checked one by one and
/// anything that is not a well-typed task, or repeats an id already seen, is
/// skipped.
pub fn decode(raw: &str) -> Option<Vec<Task>> {
    let document: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = ?e, "Persisted state is not valid JSON");
            return None;
        }
    };

    let Some(candidates) = document.get("items").and_then(Value::as_array) else {
        warn!("Persisted state has no items array");
        return None;
    };

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.iter().enumerate() {
        let task: Task = match Task::deserialize(candidate) {
            Ok(t) => t,
            Err(e) => {
                warn!(index, error = ?e, "Dropping malformed task");
                continue;
            }
        };

        if !seen.insert(task.id.clone()) {
            warn!(index, id = %task.id, "Dropping task with duplicate id");
            continue;
        }

        items.push(task);
    }

    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{"id":"1","title":"ok","completed":false,"createdAt":"2025-01-01T00:00:00.000Z"}"#;

    #[test]
    fn test_decode_valid_document() {
        let raw = format!(r#"{{"items":[{}]}}"#, GOOD);
        let items = decode(&raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title(), "ok");
        assert_eq!(items[0].created_at(), "2025-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(decode("invalid json{{{").is_none());
    }

    #[test]
    fn test_decode_items_not_array() {
        assert!(decode(r#"{"items":"not-array"}"#).is_none());
    }

    #[test]
    fn test_decode_not_an_object() {
        assert!(decode("[1,2,3]").is_none());
        assert!(decode("42").is_none());
        assert!(decode("null").is_none());
        assert!(decode("{}").is_none());
    }

    #[test]
    fn test_decode_empty_items_is_valid() {
        assert_eq!(decode(r#"{"items":[]}"#), Some(Vec::new()));
    }

    #[test]
    fn test_decode_drops_malformed_items() {
        let raw = format!(
            r#"{{"items":[{},{{"id":"2","title":"bad","completed":"not boolean","createdAt":""}},null,{{"id":"3","title":"missing"}},7]}}"#,
            GOOD
        );
        let items = decode(&raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id(), "1");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let raw = r#"{"version":1,"items":[{"id":"1","title":"ok","completed":true,"createdAt":"x","color":"red"}]}"#;
        let items = decode(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_completed());
    }

    #[test]
    fn test_decode_drops_duplicate_ids() {
        let raw = r#"{"items":[
            {"id":"1","title":"first","completed":false,"createdAt":"2025-01-01T00:00:00.000Z"},
            {"id":"1","title":"second","completed":true,"createdAt":"2025-01-02T00:00:00.000Z"}
        ]}"#;
        let items = decode(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title(), "first");
    }

    #[test]
    fn test_encode_layout() {
        let items = decode(&format!(r#"{{"items":[{}]}}"#, GOOD)).unwrap();
        let raw = encode(&items).unwrap();

        let parsed: Value = serde_json::from_str(&raw).unwrap();
        let stored = parsed["items"].as_array().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["id"], "1");
        assert_eq!(stored[0]["createdAt"], "2025-01-01T00:00:00.000Z");
    }
}
