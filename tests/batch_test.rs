//! Integration tests for write coalescing against a real database.
//!
//! Tests:
//! - Writes issued in one scheduling window share one transaction
//! - Last write wins across batch boundaries
//! - Writes queued during an in-flight drain commit in the next drain
//! - An aborted batch fails every write in it
//! - A drain lost with its runtime does not block later writes

mod common;

use common::TestFixture;
use keyval::{BatcherRegistry, Error, Key};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_same_tick_writes_share_one_transaction() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let store = fixture.store("kv");
    // Open the connection so it does not count below
    store.get::<i32>("warm-up").await?;
    let before = store.stats();

    let writes: Vec<_> = (0..20).map(|i| store.set(format!("key-{i:02}"), &i)).collect();
    for result in futures::future::join_all(writes).await {
        result?;
    }

    let after = store.stats();
    assert_eq!(
        after.transactions_committed - before.transactions_committed,
        1,
        "20 concurrent writes should commit in one transaction"
    );
    assert_eq!(store.keys().await?.len(), 20);
    Ok(())
}

#[tokio::test]
async fn test_last_write_wins() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let store = fixture.store("kv");

    // Same batch
    let (a, b, c) = tokio::join!(store.set("k", &1), store.set("k", &2), store.set("k", &3));
    a?;
    b?;
    c?;
    assert_eq!(store.get::<i32>("k").await?, Some(3));

    // Across batches: the first write is in flight when the second is queued
    let first = store.set("k", &4);
    tokio::task::yield_now().await;
    let second = store.set("k", &5);
    let (first, second) = tokio::join!(first, second);
    first?;
    second?;
    assert_eq!(store.get::<i32>("k").await?, Some(5));
    Ok(())
}

#[tokio::test]
async fn test_writes_during_drain_go_to_next_transaction() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let store = fixture.store("kv");
    store.get::<i32>("warm-up").await?;
    let before = store.stats();

    // Hold the write lock from outside so the first drain stalls in BEGIN
    let raw = fixture.raw_connection();
    raw.execute_batch("BEGIN IMMEDIATE")?;

    let first = store.set("a", &1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = store.set("b", &2);
    let third = store.set("c", &3);

    raw.execute_batch("COMMIT")?;
    let (first, second, third) = tokio::join!(first, second, third);
    first?;
    second?;
    third?;

    let after = store.stats();
    assert_eq!(
        after.transactions_committed - before.transactions_committed,
        2
    );
    assert_eq!(
        store.keys().await?,
        vec![Key::from("a"), Key::from("b"), Key::from("c")]
    );
    Ok(())
}

#[tokio::test]
async fn test_aborted_batch_fails_every_write() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let store = fixture.store("kv");
    store.get::<i32>("warm-up").await?;

    fixture.raw_connection().execute_batch(
        "CREATE TRIGGER reject_poison BEFORE INSERT ON kv
         WHEN NEW.key = 'poison'
         BEGIN SELECT RAISE(ABORT, 'poisoned write'); END;",
    )?;

    let (a, b, c) = tokio::join!(
        store.set("a", &1),
        store.set("poison", &2),
        store.set("c", &3)
    );
    for result in [a, b, c] {
        match result {
            Err(Error::TransactionAbort(e)) => {
                assert!(e.to_string().contains("poisoned write"), "unexpected error: {e}");
            }
            other => panic!("expected transaction abort, got {other:?}"),
        }
    }

    // Nothing from the failed batch was committed
    assert!(store.keys().await?.is_empty());

    // Later batches are unaffected
    store.set("a", &1).await?;
    assert_eq!(store.get::<i32>("a").await?, Some(1));
    assert!(store.stats().transactions_aborted >= 1);
    Ok(())
}

#[tokio::test]
async fn test_stores_with_same_identity_share_a_batcher() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let registry = Arc::new(BatcherRegistry::new());
    let one = fixture.store("kv").with_registry(Arc::clone(&registry));
    let two = fixture.store("kv").with_registry(Arc::clone(&registry));
    let other = fixture.store("other").with_registry(Arc::clone(&registry));

    let (a, b) = tokio::join!(one.set("x", &1), two.set("y", &2));
    a?;
    b?;
    other.set("z", &3).await?;

    assert_eq!(registry.len(), 2);
    // Both writes went through the first store's connection
    assert_eq!(one.stats().transactions_committed, 1);
    assert_eq!(two.stats().opens, 0);
    assert_eq!(two.keys().await?, vec![Key::from("x"), Key::from("y")]);
    Ok(())
}

#[tokio::test]
async fn test_dropped_set_future_still_writes() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let store = fixture.store("kv");

    drop(store.set("fire-and-forget", &true));
    store.set("awaited", &true).await?;

    assert_eq!(store.get::<bool>("fire-and-forget").await?, Some(true));
    Ok(())
}

#[test]
fn test_store_writes_after_runtime_restart() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let store = fixture.store("kv");
    let runtime = || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    };

    // The first runtime goes away with the drain task it spawned
    let first = runtime()?;
    first.block_on(async { drop(store.set("a", &1)) });
    drop(first);

    runtime()?.block_on(async {
        tokio::time::timeout(Duration::from_secs(3), store.set("b", &2)).await??;
        assert_eq!(store.get::<i32>("b").await?, Some(2));
        Ok::<_, anyhow::Error>(())
    })
}
