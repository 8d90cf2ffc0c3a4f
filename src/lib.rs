//! Keyval: async key-value stores over SQLite with coalesced writes.
//!
//! Each operation runs as one atomic SQLite transaction. Concurrent `set`
//! calls against the same store are merged into a single physical
//! transaction, so a burst of N writes costs one commit instead of N.
//!
//! # Architecture
//!
//! - **Lazy connections**: a store opens its database on first use and
//!   creates its table if missing; `close` drops the connection and the next
//!   operation reopens it
//! - **Single writer**: each open database is served by one worker thread
//!   that runs transactions in arrival order
//! - **Write coalescing**: `set` calls queue into a per-store batcher that
//!   drains the queue one transaction at a time
//! - **Observable**: `tracing` events and OpenTelemetry counters
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> keyval::Result<()> {
//! use keyval::Store;
//!
//! let store = Store::new("app", "settings");
//! let (a, b) = tokio::join!(store.set("theme", "dark"), store.set("volume", &7));
//! a?;
//! b?;
//! assert_eq!(store.get::<u8>("volume").await?, Some(7));
//!
//! // Same operations on the default store
//! keyval::set("greeting", "hello", None).await?;
//! let keys = keyval::keys(None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: clap/environment configuration
//! - [`error`]: error type
//! - [`observability`]: tracing and metrics setup
//! - [`storage`]: SQLite connections, transactions and write batching
//! - [`store`]: the public store API and default store

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // storage::batch::BatcherRegistry is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod config;
pub mod error;
pub mod observability;
pub mod storage;
pub mod store;

pub use config::{Config, LogFormat};
pub use error::{Error, Result};
pub use storage::batch::BatcherRegistry;
pub use storage::connection::StoreStats;
pub use storage::handle::StoreId;
pub use storage::key::Key;
pub use storage::txn::{StoreTxn, TxnMode};
pub use store::{
    clear, close, default_store, del, get, keys, set, set_default_store, update, Store,
};
