//! Wires the configured components into a running pipeline.
//!
//! Startup order:
//!
//! 1. connect to the document store (retried with backoff) and bootstrap
//!    its schema
//! 2. load every active privileged-user cache once
//! 3. register the cache refreshers, queue poller, dispatcher and ingestion
//!    loop with the [`LifecycleCoordinator`]
//! 4. register cleanups: the song queue first, the store pool last
//!
//! Only a failure in step 1 is fatal. Everything after it logs and carries on.

use crate::audio::AudioError;
use crate::config::{Config, SourceKind};
use crate::context::AppContext;
use crate::handlers::dispatch_table;
use showrunner_core::{SourceFactory, StoreError, UserDirectory};
use showrunner_feed::{FeedError, PollingSourceFactory};
use showrunner_postgres::{CollectionName, PostgresDocumentStore, StoreOptions};
use showrunner_runtime::retry::{RetryPolicy, retry_with_predicate};
use showrunner_runtime::{
    ArchivingSourceFactory, BackgroundTask, CacheRefresher, Cleanup, CleanupError, DispatchStats,
    Dispatcher, EventQueue, IngestionLoop, LifecycleCoordinator, LifecycleError, QueuePoller,
    ShutdownReport,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors that prevent the pipeline from starting.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The document store could not be reached or prepared.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The events API source could not be set up.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// The audio player could not be set up.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Pull mode without an events API URL.
    #[error("Pull mode requires an events API URL")]
    MissingApiUrl,
}

/// Closes the store's pool once every task has stopped.
#[derive(Debug, Clone)]
pub struct StoreCloser {
    store: PostgresDocumentStore,
}

impl Cleanup for StoreCloser {
    fn name(&self) -> &str {
        "document-store"
    }

    fn cleanup(&self) -> Pin<Box<dyn Future<Output = Result<(), CleanupError>> + Send + '_>> {
        Box::pin(async move {
            self.store.close().await;
            Ok(())
        })
    }
}

/// The assembled pipeline: context plus a coordinator holding every loop.
pub struct Pipeline {
    context: AppContext,
    queue: EventQueue,
    coordinator: LifecycleCoordinator,
    stats: Arc<DispatchStats>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("context", &self.context)
            .field("queued_events", &self.queue.len())
            .field("state", &self.coordinator.state())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Connects to the configured store and assembles the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] if the store stays unreachable through
    /// every connection attempt, the schema cannot be created, or the
    /// configured source cannot be built.
    pub async fn connect(config: Config) -> Result<Self, BootstrapError> {
        let store = connect_store(&config).await?;
        store.ensure_schema().await?;

        let factory: Arc<dyn SourceFactory> = match config.source.kind {
            SourceKind::Push => Arc::new(store.change_feed()),
            SourceKind::Pull => {
                let url = config.source.api_url.clone().ok_or(BootstrapError::MissingApiUrl)?;
                let polling: Arc<dyn SourceFactory> =
                    Arc::new(PollingSourceFactory::new(url, config.source.requests_per_minute)?);
                if config.source.archive_events {
                    Arc::new(ArchivingSourceFactory::new(polling, Arc::new(store.clone())))
                } else {
                    polling
                }
            },
        };

        let context = AppContext::new(config)?;
        let mut pipeline = Self::assemble(context, Arc::new(store.clone()), factory).await;
        pipeline.coordinator.register_cleanup(Arc::new(StoreCloser { store }));
        Ok(pipeline)
    }

    /// Assembles the pipeline around already-built collaborators.
    ///
    /// Active caches are loaded once before returning; load failures are
    /// logged and leave the cache empty until the next refresh.
    pub async fn assemble(
        context: AppContext,
        directory: Arc<dyn UserDirectory>,
        factory: Arc<dyn SourceFactory>,
    ) -> Self {
        let config = Arc::clone(&context.config);
        let components = config.components;
        tracing::info!(components = ?components.active(), source = factory.name(), "Assembling pipeline");

        let mut coordinator = LifecycleCoordinator::new(config.runtime.join_timeout);

        if components.vip_audio {
            let refresher = CacheRefresher::vip(Arc::clone(&directory), context.caches.vip.clone())
                .with_interval(config.caches.vip_refresh);
            register_refresher(&mut coordinator, refresher).await;
        }
        if components.command_parser {
            let refresher = CacheRefresher::admin(Arc::clone(&directory), context.caches.admin.clone())
                .with_interval(config.caches.admin_refresh);
            register_refresher(&mut coordinator, refresher).await;
        }
        if components.custom_actions {
            let refresher =
                CacheRefresher::custom_actions(Arc::clone(&directory), context.caches.actions.clone())
                    .with_interval(config.caches.action_refresh);
            register_refresher(&mut coordinator, refresher).await;
        }

        let queue = EventQueue::new();
        let dispatcher = Dispatcher::new(queue.clone(), dispatch_table(&context), context.caches.clone())
            .with_poll_timeout(config.runtime.dispatch_poll_timeout);
        let stats = dispatcher.stats();
        coordinator.register(Arc::new(dispatcher));

        let ingest = IngestionLoop::new(factory, queue.clone()).with_restart_delay(config.runtime.restart_delay);
        coordinator.register(Arc::new(ingest));

        if components.chat_auto_dj {
            let poller = Arc::new(
                QueuePoller::new(Arc::clone(&context.playback), context.songs.clone())
                    .with_interval(config.runtime.queue_poll_interval),
            );
            coordinator.register(poller.clone());
            coordinator.register_cleanup(poller);
        }

        Self {
            context,
            queue,
            coordinator,
            stats,
        }
    }

    /// Spawns every loop. Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if already running or stopped.
    pub fn run(&mut self) -> Result<(), LifecycleError> {
        self.coordinator.run()
    }

    /// Stops every loop within the join bound and runs the cleanups.
    /// Safe to call more than once.
    pub async fn stop(&mut self) -> ShutdownReport {
        let report = self.coordinator.stop().await;
        tracing::info!(
            handled = self.stats.handled(),
            declined = self.stats.declined(),
            failed = self.stats.failed(),
            unhandled = self.stats.unhandled(),
            left_in_queue = self.queue.len(),
            "Pipeline stopped"
        );
        report
    }

    /// The shared context.
    #[must_use]
    pub const fn context(&self) -> &AppContext {
        &self.context
    }

    /// The raw event queue.
    #[must_use]
    pub const fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Dispatch counters.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }
}

async fn register_refresher<V: Send + Sync + 'static>(
    coordinator: &mut LifecycleCoordinator,
    refresher: CacheRefresher<V>,
) {
    if let Err(e) = refresher.load_once().await {
        tracing::warn!(cache = refresher.name(), error = %e, "Initial cache load failed");
    }
    coordinator.register(Arc::new(refresher));
}

async fn connect_store(config: &Config) -> Result<PostgresDocumentStore, StoreError> {
    let mut options = StoreOptions::new(config.database.url.clone())?;
    options.max_connections = config.database.max_connections;
    options.events = CollectionName::new(config.database.events_collection.clone())?;
    options.users = CollectionName::new(config.database.users_collection.clone())?;

    let policy = RetryPolicy::builder()
        .max_retries(config.database.connect_attempts.saturating_sub(1))
        .build();

    retry_with_predicate(
        "document-store",
        &policy,
        || PostgresDocumentStore::connect(&options),
        StoreError::is_transient,
    )
    .await
}
