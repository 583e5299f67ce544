//! # Showrunner Core
//!
//! Domain types and capability traits for the showrunner event pipeline.
//!
//! The pipeline observes live activity events from a streaming platform,
//! queues them in arrival order and dispatches each one to a side-effecting
//! handler, while a set of background loops keep privileged-user caches fresh
//! and advance a queue of requested songs.
//!
//! ```text
//! EventSource ──► EventQueue ──► Dispatcher ──► EventHandler
//!                                   ▲
//!                 CacheRefresher ───┘ (snapshots)
//!                 QueuePoller ──► PlaybackSink
//! ```
//!
//! This crate holds only the vocabulary shared by every other crate:
//!
//! - [`Event`] and the closed set of [`EventKind`]s
//! - capability traits at the external boundaries: [`EventSource`],
//!   [`SourceFactory`], [`EventHandler`], [`UserDirectory`], [`EventArchive`],
//!   [`PlaybackSink`]
//! - the shared [`StopSignal`], [`SongQueue`] and [`CacheSnapshots`]
//!
//! The loops themselves live in `showrunner-runtime`.

pub mod event;
pub mod handler;
pub mod playback;
pub mod snapshot;
pub mod source;
pub mod stop;
pub mod store;

pub use event::{Event, EventError, EventKind};
pub use handler::{EventHandler, HandlerError};
pub use playback::{PlaybackError, PlaybackMode, PlaybackSink, SongQueue, TrackId};
pub use snapshot::{CacheSnapshots, CustomActions, Snapshot};
pub use source::{ErrorPolicy, EventSource, SourceError, SourceFactory};
pub use stop::StopSignal;
pub use store::{EventArchive, StoreError, UserDirectory, UserFlag, UserRecord};
