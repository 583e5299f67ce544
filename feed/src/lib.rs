//! Events API client and long-polling event source for showrunner.
//!
//! The events API serves pages of `{ events: [{ method, object }], nextUrl }`.
//! [`PollingSource`] requests the current cursor URL once per batch, follows
//! `nextUrl` on success and keeps the cursor on failure, sleeping
//! [`poll_interval`] between polls either way.
//!
//! # Example
//!
//! ```ignore
//! use showrunner_feed::PollingSourceFactory;
//!
//! let factory = PollingSourceFactory::new("https://events.example/events/token/", 1000)?;
//! ```

pub mod client;
pub mod error;
pub mod source;
pub mod types;

pub use client::EventsClient;
pub use error::FeedError;
pub use source::{PollingSource, PollingSourceFactory, poll_interval};
pub use types::{FeedEvent, FeedPage};
