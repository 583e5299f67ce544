//! # Showrunner
//!
//! Live-stream automation on top of the showrunner runtime: events from the
//! broadcast platform are ingested, dispatched to feature handlers and turned
//! into side effects.
//!
//! ## Features
//!
//! Each feature is a component toggled in [`Config`]:
//!
//! - **VIP audio**: a VIP entering the room plays their entrance audio
//! - **Chat auto-DJ**: tips that are a multiple of the song cost request songs
//! - **Command parser**: admins run commands from chat
//! - **Custom actions**: per-user trigger phrases run mapped actions
//!
//! ## Example
//!
//! ```ignore
//! let config = Config::from_env()?;
//! init_tracing(config.telemetry.log_format);
//!
//! let mut pipeline = Pipeline::connect(config).await?;
//! pipeline.run()?;
//!
//! tokio::signal::ctrl_c().await?;
//! pipeline.stop().await;
//! ```

pub mod actions;
pub mod audio;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod handlers;
pub mod playback;
pub mod songs;
pub mod telemetry;

pub use bootstrap::{BootstrapError, Pipeline};
pub use config::{Config, ConfigError};
pub use context::AppContext;
pub use handlers::dispatch_table;
pub use telemetry::init_tracing;
