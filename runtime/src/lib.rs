//! # Showrunner Runtime
//!
//! The background loops of the showrunner pipeline and the coordinator that
//! starts and stops them.
//!
//! ## Components
//!
//! - [`EventQueue`]: unbounded FIFO between ingestion and dispatch
//! - [`IngestionLoop`]: drives an event source into the queue
//! - [`Dispatcher`]: single consumer routing events to handlers
//! - [`CacheRefresher`]: keeps one privileged-user [`Cache`] fresh
//! - [`QueuePoller`]: advances requested songs against the player
//! - [`LifecycleCoordinator`]: spawns every loop, then signals, joins and
//!   cleans up on shutdown
//!
//! ## Example
//!
//! ```ignore
//! let queue = EventQueue::new();
//! let caches = Caches::default();
//!
//! let mut coordinator = LifecycleCoordinator::new(DEFAULT_JOIN_TIMEOUT);
//! coordinator.register(Arc::new(IngestionLoop::new(factory, queue.clone())));
//! coordinator.register(Arc::new(Dispatcher::new(queue, table, caches)));
//! coordinator.run()?;
//!
//! tokio::signal::ctrl_c().await?;
//! coordinator.stop().await;
//! ```

/// Privileged-user caches and their refresh loops
pub mod cache;

/// Event dispatch
pub mod dispatcher;

/// Source-to-queue ingestion
pub mod ingest;

/// Task supervision and shutdown
pub mod lifecycle;

/// Prometheus metrics for observability
pub mod metrics;

/// Song-request queue poller
pub mod poller;

/// The event queue
pub mod queue;

/// Retry logic with exponential backoff
pub mod retry;

pub use cache::{Cache, CacheRefresher, Caches};
pub use dispatcher::{DispatchOutcome, DispatchStats, DispatchTable, Dispatcher};
pub use ingest::{ArchivingSourceFactory, IngestionLoop};
pub use lifecycle::{
    BackgroundTask, Cleanup, CleanupError, DEFAULT_JOIN_TIMEOUT, LifecycleCoordinator,
    LifecycleError, LifecycleState, RestartPolicy, ShutdownReport, TaskExit,
};
pub use poller::{PollAction, QueuePoller};
pub use queue::EventQueue;
