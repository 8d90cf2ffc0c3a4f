//! Write coalescing for `set`.
//!
//! Concurrent writes to one store are queued and drained into a single
//! read-write transaction:
//! - At most one drain (and so one write transaction) per store is in flight
//! - Queue order is commit order within a drain
//! - Items queued while a drain runs wait for the next drain
//! - Every caller in a drained batch receives that batch's outcome

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::oneshot;

use super::handle::{ConnectionHandle, StoreId};
use super::key::Key;
use super::txn::TxnMode;
use crate::error::{Error, Result};
use crate::observability::metrics;

/// Writes one drained batch. Resolves once the whole batch is durable.
pub type Executor<T> = Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Pending<T> {
    item: T,
    done: oneshot::Sender<Result<()>>,
}

/// Items waiting for the next drain.
struct BatchQueue<T> {
    items: Vec<Pending<T>>,
    draining: bool,
}

/// Coalesces queued items into executor calls, one at a time.
pub struct Batcher<T> {
    label: String,
    queue: Mutex<BatchQueue<T>>,
    executor: Executor<T>,
}

impl<T: Send + 'static> Batcher<T> {
    pub fn new(label: impl Into<String>, executor: Executor<T>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            queue: Mutex::new(BatchQueue {
                items: Vec::new(),
                draining: false,
            }),
            executor,
        })
    }

    /// Queue an item and return a future that settles once it is written.
    ///
    /// The item joins the queue when `queue` is called, not when the future
    /// is first polled, and dropping the future does not withdraw it. Starts
    /// a drain task if none is running, so it must be called from within a
    /// tokio runtime.
    pub fn queue(self: &Arc<Self>, item: T) -> impl Future<Output = Result<()>> + Send + 'static {
        let (done, rx) = oneshot::channel();
        let start = {
            let mut queue = self.queue.lock();
            queue.items.push(Pending { item, done });
            !std::mem::replace(&mut queue.draining, true)
        };
        if start {
            tokio::spawn(DrainTask::new(Arc::clone(self)).run());
        }
        async move { rx.await.map_err(|_| Error::ConnectionClosed)? }
    }

    /// Number of items waiting for a drain.
    pub fn pending(&self) -> usize {
        self.queue.lock().items.len()
    }

    pub fn is_draining(&self) -> bool {
        self.queue.lock().draining
    }
}

/// One drain task. Owns the batcher's `draining` flag from spawn until the
/// queue is found empty.
///
/// If the task is dropped before that (aborted, or its runtime shut down
/// before or while it ran) the flag is handed back so the next `queue`
/// starts a fresh drain. Items still queued are picked up by that drain;
/// callers of an in-flight batch see their reply channel close and get
/// [`Error::ConnectionClosed`].
struct DrainTask<T> {
    batcher: Arc<Batcher<T>>,
    finished: bool,
}

impl<T: Send + 'static> DrainTask<T> {
    fn new(batcher: Arc<Batcher<T>>) -> Self {
        Self {
            batcher,
            finished: false,
        }
    }

    async fn run(mut self) {
        loop {
            let batch = {
                let mut queue = self.batcher.queue.lock();
                if queue.items.is_empty() {
                    queue.draining = false;
                    self.finished = true;
                    return;
                }
                std::mem::take(&mut queue.items)
            };

            let label = &self.batcher.label;
            let (items, waiters): (Vec<T>, Vec<_>) =
                batch.into_iter().map(|p| (p.item, p.done)).unzip();
            let batch_size = items.len();
            tracing::debug!(store = %label, batch_size, "Draining write batch");

            let result = (self.batcher.executor)(items).await;
            metrics::record_batch(label, batch_size);
            if let Err(e) = &result {
                tracing::warn!(store = %label, batch_size, error = %e, "Write batch failed");
            }

            for done in waiters {
                // The caller may have dropped its future
                let _ = done.send(result.clone());
            }
        }
    }
}

impl<T> Drop for DrainTask<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.batcher.queue.lock().draining = false;
            tracing::debug!(store = %self.batcher.label, "Write drain cancelled");
        }
    }
}

/// One queued `set`: the key and its JSON-encoded value.
#[derive(Debug, Clone)]
pub struct PendingPut {
    pub key: Key,
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
    data_dir: PathBuf,
    id: StoreId,
}

/// Write batchers by store identity.
///
/// A batcher is created on the first write to a store and kept for the
/// lifetime of the registry; its writes go through the handle of the store
/// that created it. Entries are never evicted, so that store's connection
/// handle (and, once opened, its worker thread and database file) stays
/// alive for as long as the registry does, even after every `Store` for the
/// identity is dropped. `Store::close` still closes it; the next write
/// reopens it.
#[derive(Default)]
pub struct BatcherRegistry {
    batchers: Mutex<HashMap<BatchKey, Arc<Batcher<PendingPut>>>>,
}

impl BatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by stores that were not given one.
    pub fn global() -> &'static Arc<BatcherRegistry> {
        static GLOBAL: OnceLock<Arc<BatcherRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(BatcherRegistry::new()))
    }

    /// The batcher for `handle`'s store, creating it on first use.
    pub fn batcher_for(&self, handle: &Arc<ConnectionHandle>) -> Arc<Batcher<PendingPut>> {
        let key = BatchKey {
            data_dir: handle.data_dir().to_path_buf(),
            id: handle.id().clone(),
        };
        let mut batchers = self.batchers.lock();
        let batcher = batchers.entry(key).or_insert_with(|| {
            tracing::debug!(store = %handle.id(), "Creating write batcher");
            Batcher::new(handle.id().to_string(), put_executor(Arc::clone(handle)))
        });
        Arc::clone(batcher)
    }

    pub fn len(&self) -> usize {
        self.batchers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batchers.lock().is_empty()
    }
}

impl std::fmt::Debug for BatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatcherRegistry")
            .field("batchers", &self.len())
            .finish()
    }
}

/// Executor writing a batch of puts in one read-write transaction.
fn put_executor(handle: Arc<ConnectionHandle>) -> Executor<PendingPut> {
    Arc::new(move |puts: Vec<PendingPut>| {
        let handle = Arc::clone(&handle);
        async move {
            handle
                .with_transaction(TxnMode::ReadWrite, move |txn| {
                    for put in &puts {
                        txn.put_raw(&put.key, &put.json)?;
                    }
                    Ok(())
                })
                .await
        }
        .boxed()
    })
}
