//! Connection pool, schema bootstrap, event archiving and user queries.

use crate::change_feed::ChangeFeedFactory;
use crate::collection::CollectionName;
use chrono::Utc;
use serde_json::{Value, json};
use showrunner_core::{Event, EventArchive, StoreError, UserDirectory, UserFlag, UserRecord};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Connection and collection settings.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// `postgres://` connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// Collection holding raw events.
    pub events: CollectionName,
    /// Collection holding user records.
    pub users: CollectionName,
}

impl StoreOptions {
    /// Options for `url` with the `events` and `users` collections.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in collection names; the `Result` mirrors
    /// [`CollectionName::new`].
    pub fn new(url: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            url: url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            events: CollectionName::new("events")?,
            users: CollectionName::new("users")?,
        })
    }
}

pub(crate) fn store_error(err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut => StoreError::Connection(err.to_string()),
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => StoreError::Closed,
        _ => StoreError::Query(err.to_string()),
    }
}

/// Document store on `PostgreSQL` JSONB tables.
///
/// Each collection is a table `(id BIGSERIAL, document JSONB, created_at)`.
/// Inserts into the events collection fire `pg_notify` on
/// [`CollectionName::channel`] with the new row id, which
/// [`ChangeFeed`](crate::ChangeFeed) listens to.
///
/// Clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
    events: CollectionName,
    users: CollectionName,
}

impl PostgresDocumentStore {
    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the database cannot be reached
    /// and [`StoreError::Query`] for other failures (bad credentials, ...).
    pub async fn connect(options: &StoreOptions) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(&options.url)
            .await
            .map_err(|e| store_error(&e))?;

        tracing::info!(
            events = %options.events,
            users = %options.users,
            max_connections = options.max_connections,
            "Connected to document store"
        );
        Ok(Self::from_pool(pool, options.events.clone(), options.users.clone()))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool, events: CollectionName, users: CollectionName) -> Self {
        Self { pool, events, users }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The events collection.
    #[must_use]
    pub const fn events_collection(&self) -> &CollectionName {
        &self.events
    }

    /// Creates both collections and the insert-notification trigger if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for collection in [&self.events, &self.users] {
            let create = format!(
                "CREATE TABLE IF NOT EXISTS {collection} (
                    id BIGSERIAL PRIMARY KEY,
                    document JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )"
            );
            self.execute(&create).await?;
        }

        let function = format!(
            "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $$
             BEGIN
                 PERFORM pg_notify('{channel}', NEW.id::text);
                 RETURN NEW;
             END;
             $$ LANGUAGE plpgsql",
            function = self.events.trigger_function(),
            channel = self.events.channel(),
        );
        self.execute(&function).await?;

        let drop_trigger = format!(
            "DROP TRIGGER IF EXISTS {trigger} ON {events}",
            trigger = self.events.trigger(),
            events = self.events,
        );
        self.execute(&drop_trigger).await?;

        let create_trigger = format!(
            "CREATE TRIGGER {trigger} AFTER INSERT ON {events}
             FOR EACH ROW EXECUTE FUNCTION {function}()",
            trigger = self.events.trigger(),
            events = self.events,
            function = self.events.trigger_function(),
        );
        self.execute(&create_trigger).await?;

        tracing::info!(events = %self.events, users = %self.users, "Document store schema ready");
        Ok(())
    }

    async fn execute(&self, statement: &str) -> Result<(), StoreError> {
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;
        Ok(())
    }

    async fn insert(&self, collection: &CollectionName, document: &Value) -> Result<i64, StoreError> {
        let statement = format!("INSERT INTO {collection} (document) VALUES ($1) RETURNING id");
        let row = sqlx::query(&statement)
            .bind(document)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;
        row.try_get::<i64, _>("id").map_err(|e| store_error(&e))
    }

    /// Stores an event as `{ method, object, source_id, timestamp }` and
    /// returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub async fn insert_event(&self, event: &Event) -> Result<i64, StoreError> {
        let document = json!({
            "method": event.method(),
            "object": event.payload(),
            "source_id": event.source_id(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let id = self.insert(&self.events, &document).await?;
        metrics::counter!("showrunner_events_archived_total").increment(1);
        tracing::debug!(id, method = event.method(), "Event archived");
        Ok(id)
    }

    /// Stores a raw document in the events collection, as an external
    /// collector would.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub async fn insert_event_document(&self, document: &Value) -> Result<i64, StoreError> {
        self.insert(&self.events, document).await
    }

    /// Stores a user document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub async fn insert_user(&self, document: &Value) -> Result<i64, StoreError> {
        self.insert(&self.users, document).await
    }

    /// Loads one event document by row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub async fn fetch_event(&self, id: i64) -> Result<Option<Value>, StoreError> {
        let statement = format!("SELECT document FROM {} WHERE id = $1", self.events);
        let row = sqlx::query(&statement)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

        row.map(|row| row.try_get::<Value, _>("document"))
            .transpose()
            .map_err(|e| store_error(&e))
    }

    async fn active_users(&self, flag: UserFlag) -> Result<Vec<UserRecord>, StoreError> {
        let statement = format!(
            "SELECT document FROM {} \
             WHERE document -> $1 = 'true'::jsonb AND document -> 'active' = 'true'::jsonb \
             ORDER BY id",
            self.users
        );
        let rows = sqlx::query(&statement)
            .bind(flag.attribute())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let document: Value = row.try_get("document").map_err(|e| store_error(&e))?;
            match UserRecord::from_document(document) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(flag = %flag, error = %e, "Skipping user document"),
            }
        }
        Ok(records)
    }

    /// A factory for push sources on the events collection.
    #[must_use]
    pub fn change_feed(&self) -> ChangeFeedFactory {
        ChangeFeedFactory::new(self.clone())
    }

    /// Closes the pool. Further queries fail with [`StoreError::Closed`].
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::info!("Document store connection closed");
        }
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl UserDirectory for PostgresDocumentStore {
    fn find_active(
        &self,
        flag: UserFlag,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UserRecord>, StoreError>> + Send + '_>> {
        Box::pin(self.active_users(flag))
    }
}

impl EventArchive for PostgresDocumentStore {
    fn archive<'a>(
        &'a self,
        event: &'a Event,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move { self.insert_event(event).await.map(|_| ()) })
    }
}
