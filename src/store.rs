//! Public store API.
//!
//! A [`Store`] names one key-value store inside one database. Reads, deletes
//! and updates each run as their own transaction; `set` goes through the
//! store's write batcher so concurrent writes share a transaction.
//!
//! The free functions at the bottom of this module act on an explicit store
//! or, when given `None`, on the process-wide default store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::batch::{BatcherRegistry, PendingPut};
use crate::storage::connection::StoreStats;
use crate::storage::handle::{ConnectionHandle, StoreId};
use crate::storage::key::Key;
use crate::storage::txn::{StoreTxn, TxnMode};

/// Handle to one named store.
///
/// Cloning is cheap and clones share the cached connection. Separately
/// constructed stores with the same identity open their own connections
/// but share a write batcher when they share a registry.
#[derive(Clone, Debug)]
pub struct Store {
    handle: Arc<ConnectionHandle>,
    registry: Arc<BatcherRegistry>,
}

impl Store {
    /// Store `store_name` in database `db_name` under the default data dir.
    pub fn new(db_name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self::with_config(Config::default(), db_name, store_name)
    }

    pub fn with_config(
        config: Config,
        db_name: impl Into<String>,
        store_name: impl Into<String>,
    ) -> Self {
        let id = StoreId::new(db_name, store_name);
        Self {
            handle: Arc::new(ConnectionHandle::new(id, Arc::new(config))),
            registry: Arc::clone(BatcherRegistry::global()),
        }
    }

    /// Store named by `config.db_name` / `config.store_name`.
    pub fn from_config(config: Config) -> Self {
        let db_name = config.db_name.clone();
        let store_name = config.store_name.clone();
        Self::with_config(config, db_name, store_name)
    }

    /// Use `registry` for write batching instead of the process-wide one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<BatcherRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn id(&self) -> &StoreId {
        self.handle.id()
    }

    /// Transaction counters for this store handle.
    pub fn stats(&self) -> StoreStats {
        self.handle.stats()
    }

    /// Run `body` in one transaction against this store.
    ///
    /// The body runs on the connection's worker thread. Returning `Err`
    /// rolls the transaction back.
    pub async fn transaction<T, F>(&self, mode: TxnMode, body: F) -> Result<T>
    where
        F: FnOnce(&StoreTxn<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle.with_transaction(mode, body).await
    }

    pub async fn get<V: DeserializeOwned>(&self, key: impl Into<Key>) -> Result<Option<V>> {
        let key = key.into();
        let json = self
            .handle
            .with_transaction(TxnMode::ReadWrite, move |txn| txn.get_raw(&key))
            .await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Write `value` under `key` through the store's write batcher.
    ///
    /// The write is queued when `set` is called; writes queued in the same
    /// scheduling window commit in one transaction, in call order. The
    /// returned future settles once that transaction commits or aborts.
    /// Must be called from within a tokio runtime.
    pub fn set<V: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: &V,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let encoded = serde_json::to_string(value).map_err(Error::from);
        self.queue_put(key.into(), encoded)
    }

    fn queue_put(
        &self,
        key: Key,
        encoded: Result<String>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let queued = encoded.map(|json| {
            self.registry
                .batcher_for(&self.handle)
                .queue(PendingPut { key, json })
        });
        async move { queued?.await }
    }

    /// Read, transform and write back one value in a single transaction.
    ///
    /// `updater` receives `None` when the key is absent.
    pub async fn update<V, F>(&self, key: impl Into<Key>, updater: F) -> Result<()>
    where
        V: Serialize + DeserializeOwned + 'static,
        F: FnOnce(Option<V>) -> V + Send + 'static,
    {
        let key = key.into();
        self.handle
            .with_transaction(TxnMode::ReadWrite, move |txn| {
                let current = txn.get::<V>(&key)?;
                txn.put(&key, &updater(current))
            })
            .await
    }

    pub async fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        self.handle
            .with_transaction(TxnMode::ReadWrite, move |txn| txn.delete(&key))
            .await
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<()> {
        self.handle
            .with_transaction(TxnMode::ReadWrite, |txn| txn.clear())
            .await
    }

    /// Every key, in ascending engine order.
    pub async fn keys(&self) -> Result<Vec<Key>> {
        self.handle
            .with_transaction(TxnMode::ReadWrite, |txn| txn.keys())
            .await
    }

    /// Close the connection. The next operation reopens it.
    pub async fn close(&self) -> Result<()> {
        self.handle.close().await
    }
}

// ============================================================================
// Default store
// ============================================================================

static DEFAULT_STORE: OnceLock<Store> = OnceLock::new();

/// The process-wide default store, created on first use.
///
/// Built from [`Config::from_env`], falling back to [`Config::default`] if
/// the environment holds invalid values.
pub fn default_store() -> &'static Store {
    DEFAULT_STORE.get_or_init(|| {
        let config = Config::from_env().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid keyval environment, using defaults");
            Config::default()
        });
        Store::from_config(config)
    })
}

/// Install the default store before anything uses it.
///
/// Hands `store` back if a default already exists.
pub fn set_default_store(store: Store) -> Result<(), Store> {
    DEFAULT_STORE.set(store)
}

fn resolve(store: Option<&Store>) -> &Store {
    match store {
        Some(store) => store,
        None => default_store(),
    }
}

pub async fn get<V: DeserializeOwned>(
    key: impl Into<Key>,
    store: Option<&Store>,
) -> Result<Option<V>> {
    resolve(store).get(key).await
}

pub fn set<V: Serialize + ?Sized>(
    key: impl Into<Key>,
    value: &V,
    store: Option<&Store>,
) -> impl Future<Output = Result<()>> + Send + 'static {
    resolve(store).set(key, value)
}

pub async fn update<V, F>(key: impl Into<Key>, updater: F, store: Option<&Store>) -> Result<()>
where
    V: Serialize + DeserializeOwned + 'static,
    F: FnOnce(Option<V>) -> V + Send + 'static,
{
    resolve(store).update(key, updater).await
}

pub async fn del(key: impl Into<Key>, store: Option<&Store>) -> Result<()> {
    resolve(store).delete(key).await
}

pub async fn clear(store: Option<&Store>) -> Result<()> {
    resolve(store).clear().await
}

pub async fn keys(store: Option<&Store>) -> Result<Vec<Key>> {
    resolve(store).keys().await
}

pub async fn close(store: Option<&Store>) -> Result<()> {
    resolve(store).close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Store {
        Store::with_config(Config::with_data_dir(dir.path()), "db", "kv")
            .with_registry(Arc::new(BatcherRegistry::new()))
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.get::<String>("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_encodes_at_call_time() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut value = vec![1, 2];
        let pending = store.set("list", &value);
        value.push(3);
        pending.await.unwrap();

        assert_eq!(store.get::<Vec<i32>>("list").await.unwrap(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_update_sees_absence() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .update("counter", |current: Option<u64>| {
                assert!(current.is_none());
                1
            })
            .await
            .unwrap();
        store
            .update("counter", |current: Option<u64>| current.unwrap_or(0) + 10)
            .await
            .unwrap();
        assert_eq!(store.get::<u64>("counter").await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_update_with_wrong_type_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.set("name", "ada").await.unwrap();
        let result = store
            .update("name", |current: Option<u64>| current.unwrap_or(0) + 1)
            .await;
        assert!(matches!(result, Err(Error::Codec(_))));
        assert_eq!(
            store.get::<String>("name").await.unwrap(),
            Some("ada".to_string())
        );
    }

    #[tokio::test]
    async fn test_explicit_store_overrides_default() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        set("k", &5, Some(&store)).await.unwrap();
        assert_eq!(get::<i32>("k", Some(&store)).await.unwrap(), Some(5));
        assert_eq!(keys(Some(&store)).await.unwrap(), vec![Key::from("k")]);
        del("k", Some(&store)).await.unwrap();
        assert!(keys(Some(&store)).await.unwrap().is_empty());
        close(Some(&store)).await.unwrap();
    }

    #[test]
    fn test_resolve_returns_borrowed_store() {
        let dir = TempDir::new().unwrap();
        let local = store(&dir);
        // A store borrowed for less than 'static resolves to itself
        assert!(std::ptr::eq(resolve(Some(&local)), &local));
    }
}
