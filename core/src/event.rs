//! Events as they travel from a source, through the queue, to a handler.
//!
//! An [`Event`] is the unit of work of the pipeline. It is created by an
//! [`EventSource`](crate::source::EventSource), consumed exactly once by the
//! dispatcher and discarded afterwards. The `method` string is kept verbatim so
//! that unknown methods can still be logged; [`EventKind`] is the closed set of
//! methods the dispatcher knows how to route.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding a stored or fetched event document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The document lacks a required field.
    #[error("Event document is missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape.
    #[error("Event document field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// A raw activity event.
///
/// Immutable once built: all accessors borrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    method: String,
    payload: Value,
    source_id: String,
}

impl Event {
    /// Creates an event from its parts.
    #[must_use]
    pub fn new(method: impl Into<String>, payload: Value, source_id: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            payload,
            source_id: source_id.into(),
        }
    }

    /// Decodes a stored document of the form `{ _id, method, object }`.
    ///
    /// `fallback_id` is used when the document has no `_id` of its own. A
    /// missing `object` decodes as `null`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when `method` is absent or not a string.
    pub fn from_document(document: &Value, fallback_id: &str) -> Result<Self, EventError> {
        let method = match document.get("method") {
            Some(Value::String(method)) => method.clone(),
            Some(other) => {
                return Err(EventError::InvalidField {
                    field: "method",
                    reason: format!("expected a string, got {other}"),
                });
            },
            None => return Err(EventError::MissingField("method")),
        };

        let source_id = match document.get("_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => fallback_id.to_string(),
            Some(other) => other.to_string(),
        };

        let payload = document.get("object").cloned().unwrap_or(Value::Null);

        Ok(Self {
            method,
            payload,
            source_id,
        })
    }

    /// The method string exactly as received.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The opaque event body handed to the handler.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Identifier of the event at its origin (document id, feed id, ...).
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Resolves the method to a known kind, if any.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_method(&self.method)
    }
}

/// The closed set of event methods the platform emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Public chat message in the room.
    ChatMessage,
    /// Private message to the broadcaster.
    PrivateMessage,
    /// Token tip.
    Tip,
    /// Broadcast went live.
    BroadcastStart,
    /// Broadcast ended.
    BroadcastStop,
    /// User joined the fan club.
    FanclubJoin,
    /// User entered the room.
    UserEnter,
    /// User left the room.
    UserLeave,
    /// User followed the broadcaster.
    Follow,
    /// User unfollowed the broadcaster.
    Unfollow,
    /// User purchased media.
    MediaPurchase,
    /// Room subject was changed.
    RoomSubjectChange,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::ChatMessage,
        Self::PrivateMessage,
        Self::Tip,
        Self::BroadcastStart,
        Self::BroadcastStop,
        Self::FanclubJoin,
        Self::UserEnter,
        Self::UserLeave,
        Self::Follow,
        Self::Unfollow,
        Self::MediaPurchase,
        Self::RoomSubjectChange,
    ];

    /// Maps a wire method name to its kind.
    #[must_use]
    pub fn from_method(method: &str) -> Option<Self> {
        let kind = match method {
            "chatMessage" => Self::ChatMessage,
            "privateMessage" => Self::PrivateMessage,
            "tip" => Self::Tip,
            "broadcastStart" => Self::BroadcastStart,
            "broadcastStop" => Self::BroadcastStop,
            "fanclubJoin" => Self::FanclubJoin,
            "userEnter" => Self::UserEnter,
            "userLeave" => Self::UserLeave,
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            "mediaPurchase" => Self::MediaPurchase,
            "roomSubjectChange" => Self::RoomSubjectChange,
            _ => return None,
        };
        Some(kind)
    }

    /// The wire method name.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::ChatMessage => "chatMessage",
            Self::PrivateMessage => "privateMessage",
            Self::Tip => "tip",
            Self::BroadcastStart => "broadcastStart",
            Self::BroadcastStop => "broadcastStop",
            Self::FanclubJoin => "fanclubJoin",
            Self::UserEnter => "userEnter",
            Self::UserLeave => "userLeave",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::MediaPurchase => "mediaPurchase",
            Self::RoomSubjectChange => "roomSubjectChange",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn every_kind_round_trips_through_its_method_name() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_method(kind.method()), Some(kind));
        }
    }

    #[test]
    fn unknown_methods_do_not_resolve() {
        assert_eq!(EventKind::from_method("spaceshipLanded"), None);
        assert_eq!(EventKind::from_method("Tip"), None);
        assert_eq!(EventKind::from_method(""), None);
    }

    #[test]
    fn decodes_stored_document() {
        let doc = json!({
            "_id": "65f0c1",
            "method": "tip",
            "object": { "tip": { "tokens": 100 } }
        });

        let event = Event::from_document(&doc, "fallback").unwrap();

        assert_eq!(event.method(), "tip");
        assert_eq!(event.kind(), Some(EventKind::Tip));
        assert_eq!(event.source_id(), "65f0c1");
        assert_eq!(event.payload()["tip"]["tokens"], 100);
    }

    #[test]
    fn uses_fallback_id_and_null_payload_when_absent() {
        let doc = json!({ "method": "follow" });

        let event = Event::from_document(&doc, "42").unwrap();

        assert_eq!(event.source_id(), "42");
        assert!(event.payload().is_null());
    }

    #[test]
    fn non_string_ids_are_stringified() {
        let doc = json!({ "_id": 7, "method": "follow", "object": {} });

        let event = Event::from_document(&doc, "fallback").unwrap();

        assert_eq!(event.source_id(), "7");
    }

    #[test]
    fn rejects_documents_without_a_method() {
        let missing = Event::from_document(&json!({ "object": {} }), "1");
        assert_eq!(missing, Err(EventError::MissingField("method")));

        let wrong_type = Event::from_document(&json!({ "method": 3 }), "1");
        assert!(matches!(
            wrong_type,
            Err(EventError::InvalidField { field: "method", .. })
        ));
    }

    #[test]
    fn unknown_methods_still_decode() {
        let event = Event::from_document(&json!({ "method": "newThing" }), "1").unwrap();
        assert_eq!(event.method(), "newThing");
        assert_eq!(event.kind(), None);
    }
}
