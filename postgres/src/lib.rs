//! `PostgreSQL` document store for showrunner.
//!
//! Collections are JSONB tables. This crate provides:
//!
//! - [`PostgresDocumentStore`]: pool, schema bootstrap, event archiving and
//!   the [`UserDirectory`](showrunner_core::UserDirectory) queries behind the
//!   privileged-user caches
//! - [`ChangeFeed`]: the push event source, built on `LISTEN`/`NOTIFY` and an
//!   insert trigger on the events collection
//!
//! # Example
//!
//! ```ignore
//! use showrunner_postgres::{PostgresDocumentStore, StoreOptions};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = StoreOptions::new("postgres://localhost/showrunner")?;
//!     let store = PostgresDocumentStore::connect(&options).await?;
//!     store.ensure_schema().await?;
//!     let feed = store.change_feed();
//!     Ok(())
//! }
//! ```

mod change_feed;
mod collection;
mod store;

pub use change_feed::{ChangeFeed, ChangeFeedFactory, DEFAULT_WAIT};
pub use collection::CollectionName;
pub use store::{PostgresDocumentStore, StoreOptions};
