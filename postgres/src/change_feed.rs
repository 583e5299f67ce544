//! Push source: `LISTEN` on the events collection's insert channel.

use crate::store::PostgresDocumentStore;
use showrunner_core::{ErrorPolicy, Event, EventSource, SourceError, SourceFactory};
use sqlx::postgres::PgListener;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default wait on the subscription per `next_batch` call.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// Opens [`ChangeFeed`]s on a store's events collection.
#[derive(Debug, Clone)]
pub struct ChangeFeedFactory {
    store: PostgresDocumentStore,
    wait: Duration,
}

impl ChangeFeedFactory {
    /// Creates a factory for `store`.
    #[must_use]
    pub const fn new(store: PostgresDocumentStore) -> Self {
        Self {
            store,
            wait: DEFAULT_WAIT,
        }
    }

    /// Sets how long each `next_batch` waits for a notification.
    #[must_use]
    pub const fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    async fn subscribe(&self) -> Result<ChangeFeed, SourceError> {
        let channel = self.store.events_collection().channel();
        let mut listener = PgListener::connect_with(self.store.pool())
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;
        listener
            .listen(&channel)
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        tracing::info!(channel = %channel, "Subscribed to event inserts");
        Ok(ChangeFeed {
            listener,
            store: self.store.clone(),
            wait: self.wait,
        })
    }
}

impl SourceFactory for ChangeFeedFactory {
    fn name(&self) -> &str {
        "change-feed"
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EventSource>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let feed = self.subscribe().await?;
            let source: Box<dyn EventSource> = Box::new(feed);
            Ok(source)
        })
    }
}

/// A live subscription to inserts into the events collection.
///
/// Each notification carries the new row id; the document is then loaded and
/// decoded as `{ _id, method, object }`. Losing the subscription is reported
/// as an error and ends the ingestion loop, which the coordinator restarts
/// with a fresh subscription. Inserts made while no subscription is open are
/// not replayed.
pub struct ChangeFeed {
    listener: PgListener,
    store: PostgresDocumentStore,
    wait: Duration,
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("events", self.store.events_collection())
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl ChangeFeed {
    async fn next_inserted(&mut self) -> Result<Vec<Event>, SourceError> {
        let notification = match tokio::time::timeout(self.wait, self.listener.try_recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(Ok(Some(notification))) => notification,
            Ok(Ok(None)) => {
                return Err(SourceError::SubscriptionLost(
                    "notification connection closed".to_string(),
                ));
            },
            Ok(Err(e)) => return Err(SourceError::SubscriptionLost(e.to_string())),
        };

        let Ok(id) = notification.payload().parse::<i64>() else {
            tracing::warn!(payload = notification.payload(), "Ignoring malformed insert notification");
            return Ok(Vec::new());
        };

        let document = self
            .store
            .fetch_event(id)
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let Some(document) = document else {
            tracing::warn!(id, "Inserted event no longer exists");
            return Ok(Vec::new());
        };

        match Event::from_document(&document, &id.to_string()) {
            Ok(event) => Ok(vec![event]),
            Err(e) => {
                tracing::warn!(id, error = %e, "Skipping undecodable event document");
                Ok(Vec::new())
            },
        }
    }
}

impl EventSource for ChangeFeed {
    fn name(&self) -> &str {
        "change-feed"
    }

    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, SourceError>> + Send + '_>> {
        Box::pin(self.next_inserted())
    }

    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::Exit
    }
}
