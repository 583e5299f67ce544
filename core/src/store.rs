//! Document store capabilities used by the pipeline.
//!
//! The pipeline only needs two things from its document store: a way to look
//! up active privileged users ([`UserDirectory`]) and, in pull mode, a way to
//! keep a copy of every polled event ([`EventArchive`]). The production
//! implementation lives in `showrunner-postgres`; in-memory doubles live in
//! `showrunner-testing`.

use crate::event::Event;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach the store.
    #[error("Store connection error: {0}")]
    Connection(String),

    /// A statement failed.
    #[error("Store query error: {0}")]
    Query(String),

    /// A stored document did not have the expected shape.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The store has been closed.
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// The boolean attribute a user-directory query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserFlag {
    /// Users with an entrance audio file.
    Vip,
    /// Users allowed to run chat commands.
    Admin,
    /// Users with custom chat triggers.
    Action,
}

impl UserFlag {
    /// The document attribute holding the flag.
    #[must_use]
    pub const fn attribute(self) -> &'static str {
        match self {
            Self::Vip => "vip",
            Self::Admin => "admin",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for UserFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

/// One user document returned by a directory query.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// The platform username; cache key.
    pub username: String,
    /// The whole stored document, for kind-specific fields.
    pub document: Value,
}

impl UserRecord {
    /// Builds a record from a stored document, reading `username` from it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidDocument`] if `username` is missing or not
    /// a string.
    pub fn from_document(document: Value) -> Result<Self, StoreError> {
        let username = document
            .get("username")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::InvalidDocument("user document has no username".to_string()))?
            .to_string();
        Ok(Self { username, document })
    }
}

/// Queries over the user-record collection.
pub trait UserDirectory: Send + Sync {
    /// Returns every user with `flag` set and `active` true.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn find_active(
        &self,
        flag: UserFlag,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UserRecord>, StoreError>> + Send + '_>>;
}

/// Persistent copy of ingested events.
pub trait EventArchive: Send + Sync {
    /// Stores one event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    fn archive<'a>(
        &'a self,
        event: &'a Event,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;
}
