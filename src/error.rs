//! Error type shared by every store operation.
//!
//! Engine and codec errors are held behind `Arc` so a single failure can be
//! handed to every waiter of a shared open or of a coalesced write batch.

use std::sync::Arc;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by store operations.
///
/// A missing key is not an error; reads return `None` instead.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The engine refused to open (or upgrade) the database.
    #[error("failed to open database '{db}': {source}")]
    Open {
        db: String,
        #[source]
        source: Arc<rusqlite::Error>,
    },

    #[error("invalid database name '{0}'")]
    InvalidName(String),

    #[error("failed to prepare data directory: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The engine aborted a transaction, or the commit itself failed.
    #[error("transaction aborted: {0}")]
    TransactionAbort(#[source] Arc<rusqlite::Error>),

    #[error("value codec error: {0}")]
    Codec(#[source] Arc<serde_json::Error>),

    #[error("database connection is closed")]
    ConnectionClosed,

    /// A transaction body panicked; its transaction was rolled back.
    #[error("transaction body panicked")]
    Panicked,
}

impl Error {
    /// The engine error behind this failure, if there is one.
    pub fn engine_error(&self) -> Option<&rusqlite::Error> {
        match self {
            Self::Open { source, .. } | Self::TransactionAbort(source) => Some(source),
            _ => None,
        }
    }

    pub(crate) fn open(db: &str, source: rusqlite::Error) -> Self {
        Self::Open {
            db: db.to_string(),
            source: Arc::new(source),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::TransactionAbort(Arc::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(Arc::new(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}
