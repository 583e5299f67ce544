//! Wire types of the events API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use showrunner_core::Event;

/// One page of the events feed.
///
/// ```json
/// { "events": [ { "method": "tip", "object": { ... }, "id": "..." } ], "nextUrl": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    /// Events since the previous cursor, oldest first.
    #[serde(default)]
    pub events: Vec<FeedEvent>,
    /// Cursor URL for the next poll.
    pub next_url: String,
}

/// An event as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Event method, e.g. `"tip"` or `"chatMessage"`.
    pub method: String,
    /// Method-specific payload.
    #[serde(default)]
    pub object: Value,
    /// Identifier assigned by the API, when it sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FeedEvent {
    /// Converts to a pipeline event, using `fallback_id` when the API sent no id.
    #[must_use]
    pub fn into_event(self, fallback_id: impl FnOnce() -> String) -> Event {
        let source_id = self.id.unwrap_or_else(fallback_id);
        Event::new(self.method, self.object, source_id)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_page_with_cursor() {
        let page: FeedPage = serde_json::from_value(json!({
            "events": [
                {"method": "tip", "object": {"tip": {"tokens": 50}}, "id": "abc"},
                {"method": "follow", "object": {}}
            ],
            "nextUrl": "https://events.example/next?i=2"
        }))
        .unwrap();

        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].id.as_deref(), Some("abc"));
        assert_eq!(page.events[1].id, None);
        assert_eq!(page.next_url, "https://events.example/next?i=2");
    }

    #[test]
    fn missing_cursor_is_rejected() {
        let result = serde_json::from_value::<FeedPage>(json!({"events": []}));
        assert!(result.is_err());
    }

    #[test]
    fn fallback_id_only_used_without_api_id() {
        let with_id = FeedEvent {
            method: "tip".to_string(),
            object: json!({}),
            id: Some("abc".to_string()),
        };
        assert_eq!(with_id.into_event(|| "fallback".to_string()).source_id(), "abc");

        let without_id = FeedEvent {
            method: "tip".to_string(),
            object: json!({}),
            id: None,
        };
        assert_eq!(without_id.into_event(|| "fallback".to_string()).source_id(), "fallback");
    }
}
