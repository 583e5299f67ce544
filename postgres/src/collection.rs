//! Validated table names.

use showrunner_core::StoreError;
use std::fmt;

/// Name of a document collection (a table with a `document JSONB` column).
///
/// Collection names are interpolated into SQL, so only lowercase ASCII
/// letters, digits and underscores are accepted, starting with a letter or
/// underscore, at most 48 bytes (leaving room for derived trigger names).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Validates a collection name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidDocument`] if the name is not a safe
    /// identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if valid_start && valid_rest && name.len() <= 48 {
            Ok(Self(name))
        } else {
            Err(StoreError::InvalidDocument(format!(
                "invalid collection name `{name}`"
            )))
        }
    }

    /// The table name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The notification channel carrying ids of inserted rows.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("{}_inserted", self.0)
    }

    pub(crate) fn trigger_function(&self) -> String {
        format!("{}_notify_insert", self.0)
    }

    pub(crate) fn trigger(&self) -> String {
        format!("{}_insert_notify", self.0)
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert_eq!(CollectionName::new("events").unwrap().as_str(), "events");
        assert!(CollectionName::new("_users_v2").is_ok());
    }

    #[test]
    fn rejects_anything_that_could_break_sql() {
        for name in ["", "Events", "1events", "events; drop table x", "ev-ents", "évents"] {
            assert!(CollectionName::new(name).is_err(), "{name} should be rejected");
        }
        assert!(CollectionName::new("a".repeat(49)).is_err());
    }

    #[test]
    fn derives_channel_and_trigger_names() {
        let events = CollectionName::new("events").unwrap();
        assert_eq!(events.channel(), "events_inserted");
        assert_eq!(events.trigger_function(), "events_notify_insert");
        assert_eq!(events.trigger(), "events_insert_notify");
    }
}
