//! SQLite storage layer for keyval.
//!
//! Provides:
//! - Connection setup and first-use store creation
//! - Dedicated connection worker per open database
//! - Lazily opened, memoized connection handles
//! - Write coalescing for `set`

pub mod batch;
pub mod connection;
pub mod handle;
pub mod key;
pub mod schema;
pub mod txn;
