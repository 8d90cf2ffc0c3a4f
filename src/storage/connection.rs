//! Dedicated connection worker.
//!
//! Every open database handle owns one SQLite connection on its own thread.
//! Async callers submit transaction jobs over a bounded channel and await the
//! reply on a oneshot. The worker runs jobs strictly in arrival order, so a
//! handle never has two transactions in flight, and jobs queued before a
//! shutdown still run before the connection is closed.

use rusqlite::{Connection, TransactionBehavior};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

use super::handle::StoreId;
use super::schema::{apply_pragmas, ensure_store, KeyScan};
use super::txn::{StoreTxn, TxnMode};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::observability::metrics;

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

enum Command {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

/// Counters shared by every connection a handle opens over its lifetime.
#[derive(Debug, Default)]
pub struct TxnCounters {
    opens: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

/// Point-in-time copy of a handle's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful engine opens.
    pub opens: u64,
    /// Physical transactions that committed.
    pub transactions_committed: u64,
    /// Physical transactions rolled back or rejected by the engine.
    pub transactions_aborted: u64,
}

impl TxnCounters {
    pub fn snapshot(&self) -> StoreStats {
        StoreStats {
            opens: self.opens.load(Ordering::SeqCst),
            transactions_committed: self.committed.load(Ordering::SeqCst),
            transactions_aborted: self.aborted.load(Ordering::SeqCst),
        }
    }

    fn record(&self, committed: bool) {
        let counter = if committed {
            &self.committed
        } else {
            &self.aborted
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// A live engine connection for one store.
pub struct Database {
    id: StoreId,
    label: Arc<str>,
    commands: mpsc::Sender<Command>,
    key_scan: KeyScan,
    counters: Arc<TxnCounters>,
}

impl Database {
    /// Spawn the worker thread and wait until the database is open and the
    /// store exists.
    #[tracing::instrument(skip(id, config, counters), fields(db = %id.db_name, store = %id.store_name))]
    pub async fn open(id: StoreId, config: Arc<Config>, counters: Arc<TxnCounters>) -> Result<Self> {
        validate_db_name(&id.db_name)?;
        let path = config.data_dir.join(format!("{}.sqlite3", id.db_name));

        let (commands, rx) = mpsc::channel(config.job_channel_size.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker_id = id.clone();
        std::thread::Builder::new()
            .name(format!("keyval-{}", id.db_name))
            .spawn(move || run_worker(path, worker_id, config, rx, ready_tx))?;

        let key_scan = ready_rx.await.map_err(|_| Error::ConnectionClosed)??;
        counters.opens.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(?key_scan, "Database opened");

        Ok(Self {
            label: id.to_string().into(),
            id,
            commands,
            key_scan,
            counters,
        })
    }

    pub fn id(&self) -> &StoreId {
        &self.id
    }

    pub fn key_scan(&self) -> KeyScan {
        self.key_scan
    }

    /// Run `body` inside one transaction on the worker thread.
    ///
    /// Commits when `body` returns `Ok`, rolls back otherwise. A panic in
    /// `body` rolls back and surfaces as [`Error::Panicked`]; the connection
    /// stays usable.
    pub async fn transaction<T, F>(&self, mode: TxnMode, body: F) -> Result<T>
    where
        F: FnOnce(&StoreTxn<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let store_name = self.id.store_name.clone();
        let key_scan = self.key_scan;
        let counters = Arc::clone(&self.counters);
        let label = Arc::clone(&self.label);

        let job: Job = Box::new(move |conn| {
            let started = Instant::now();
            let result = run_scope(conn, &store_name, key_scan, mode, body);
            let committed = result.is_ok();
            counters.record(committed);
            metrics::record_transaction(&label, mode, committed, started.elapsed().as_secs_f64());
            if let Err(e) = &result {
                tracing::debug!(store = %label, %mode, error = %e, "Transaction rolled back");
            }
            let _ = reply_tx.send(result);
        });

        self.commands
            .send(Command::Run(job))
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        reply_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close the engine connection after every job queued so far has run.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(done_tx))
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        done_rx.await.map_err(|_| Error::ConnectionClosed)
    }
}

fn validate_db_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

fn open_connection(path: &Path, id: &StoreId, config: &Config) -> Result<(Connection, KeyScan)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path).map_err(|e| Error::open(&id.db_name, e))?;
    apply_pragmas(&conn, config).map_err(|e| Error::open(&id.db_name, e))?;
    let scan = ensure_store(&mut conn, &id.store_name).map_err(|e| Error::open(&id.db_name, e))?;
    Ok((conn, scan))
}

fn run_worker(
    path: PathBuf,
    id: StoreId,
    config: Arc<Config>,
    mut rx: mpsc::Receiver<Command>,
    ready: oneshot::Sender<Result<KeyScan>>,
) {
    let mut conn = match open_connection(&path, &id, &config) {
        Ok((conn, scan)) => {
            if ready.send(Ok(scan)).is_err() {
                return;
            }
            conn
        }
        Err(e) => {
            tracing::warn!(db = %id.db_name, error = %e, "Failed to open database");
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut shutdown_ack = None;
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Run(job) => job(&mut conn),
            Command::Shutdown(done) => {
                shutdown_ack = Some(done);
                break;
            }
        }
    }
    drop(rx);

    if let Err((_, e)) = conn.close() {
        tracing::warn!(db = %id.db_name, error = %e, "Error closing database");
    }
    tracing::debug!(db = %id.db_name, store = %id.store_name, "Database closed");
    if let Some(done) = shutdown_ack {
        let _ = done.send(());
    }
}

fn run_scope<T, F>(
    conn: &mut Connection,
    store_name: &str,
    key_scan: KeyScan,
    mode: TxnMode,
    body: F,
) -> Result<T>
where
    F: FnOnce(&StoreTxn<'_>) -> Result<T>,
{
    if mode == TxnMode::ReadOnly {
        conn.pragma_update(None, "query_only", true)?;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(conn, store_name, key_scan, mode, body)
    }))
    .unwrap_or_else(|_| Err(Error::Panicked));

    if mode == TxnMode::ReadOnly {
        if let Err(e) = conn.pragma_update(None, "query_only", false) {
            tracing::warn!(error = %e, "Failed to reset query_only");
        }
    }
    result
}

fn execute<T, F>(
    conn: &mut Connection,
    store_name: &str,
    key_scan: KeyScan,
    mode: TxnMode,
    body: F,
) -> Result<T>
where
    F: FnOnce(&StoreTxn<'_>) -> Result<T>,
{
    let behavior = match mode {
        TxnMode::ReadOnly => TransactionBehavior::Deferred,
        TxnMode::ReadWrite => TransactionBehavior::Immediate,
    };
    let tx = conn.transaction_with_behavior(behavior)?;
    let out = body(&StoreTxn::new(&tx, store_name, key_scan))?;
    tx.commit()?;
    Ok(out)
}
