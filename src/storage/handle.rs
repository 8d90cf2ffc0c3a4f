//! Lazily opened, memoized connection to one store.
//!
//! The handle moves through `Closed -> Opening -> Open -> Closed`. The slot
//! holds a shared open future while opening and after it resolves, so every
//! concurrent caller waits on the same open and there is never more than one
//! in flight. `close` empties the slot; the next operation opens afresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::connection::{Database, StoreStats, TxnCounters};
use super::txn::{StoreTxn, TxnMode};
use crate::config::Config;
use crate::error::{Error, Result};

/// Identity of a store: the database it lives in and its own name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId {
    pub db_name: String,
    pub store_name: String,
}

impl StoreId {
    pub fn new(db_name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            store_name: store_name.into(),
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dbName:{};;storeName:{}", self.db_name, self.store_name)
    }
}

type OpenFuture = Shared<BoxFuture<'static, Result<Arc<Database>>>>;

/// Memoized connection to one store.
pub struct ConnectionHandle {
    id: StoreId,
    config: Arc<Config>,
    counters: Arc<TxnCounters>,
    slot: Mutex<Option<OpenFuture>>,
}

impl ConnectionHandle {
    pub fn new(id: StoreId, config: Arc<Config>) -> Self {
        Self {
            id,
            config,
            counters: Arc::default(),
            slot: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &StoreId {
        &self.id
    }

    /// Directory holding this store's database file.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn stats(&self) -> StoreStats {
        self.counters.snapshot()
    }

    /// True while an open is in flight or a connection is cached.
    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Return the live connection, opening it if nothing is in flight.
    ///
    /// A failed open is delivered to every caller waiting on it and then
    /// forgotten, so a later call tries again.
    pub async fn ensure_open(&self) -> Result<Arc<Database>> {
        let opening = {
            let mut slot = self.slot.lock();
            slot.get_or_insert_with(|| self.begin_open()).clone()
        };

        let result = opening.clone().await;
        if result.is_err() {
            let mut slot = self.slot.lock();
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&opening)) {
                *slot = None;
            }
        }
        result
    }

    fn begin_open(&self) -> OpenFuture {
        tracing::debug!(store = %self.id, "Opening database");
        Database::open(
            self.id.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.counters),
        )
        .map(|result| result.map(Arc::new))
        .boxed()
        .shared()
    }

    /// Run `body` in one transaction of the given mode.
    pub async fn with_transaction<T, F>(&self, mode: TxnMode, body: F) -> Result<T>
    where
        F: FnOnce(&StoreTxn<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.ensure_open().await?;
        db.transaction(mode, body).await
    }

    /// Close the connection and forget it.
    ///
    /// Opens first if needed, so closing a never-used handle still touches
    /// the engine. Transactions already queued finish before the close.
    pub async fn close(&self) -> Result<()> {
        let opening = {
            let mut slot = self.slot.lock();
            slot.get_or_insert_with(|| self.begin_open()).clone()
        };
        let db = match opening.clone().await {
            Ok(db) => db,
            Err(e) => {
                self.forget(&opening);
                return Err(e);
            }
        };
        self.forget(&opening);

        match db.shutdown().await {
            Ok(()) | Err(Error::ConnectionClosed) => {
                tracing::debug!(store = %self.id, "Connection closed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn forget(&self, opening: &OpenFuture) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(opening)) {
            *slot = None;
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
