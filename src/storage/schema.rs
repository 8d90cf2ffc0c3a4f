//! Connection setup and first-use store creation.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::time::Duration;

use crate::config::Config;

/// How `keys()` walks a store table, chosen once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScan {
    /// Clustered-key table: the key index alone is enough.
    KeysOnly,
    /// Rowid table created elsewhere: walk full entries and keep the keys.
    Entries,
}

/// Quote an identifier for use in SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Apply connection pragmas.
///
/// - WAL journal so readers on other connections do not block the writer
/// - `synchronous` and busy timeout from config
pub fn apply_pragmas(conn: &Connection, config: &Config) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", config.synchronous.as_pragma())?;
    Ok(())
}

/// Create the store table on first use and pick its key scan strategy.
///
/// Runs as one immediate transaction so two connections racing to create
/// the same store cannot both try.
pub fn ensure_store(conn: &mut Connection, store_name: &str) -> rusqlite::Result<KeyScan> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            key PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        ) WITHOUT ROWID;",
        quote_ident(store_name)
    ))?;
    let scan = detect_key_scan(&tx, store_name)?;
    tx.commit()?;
    Ok(scan)
}

/// Inspect the table definition to decide how keys can be scanned.
pub fn detect_key_scan(conn: &Connection, store_name: &str) -> rusqlite::Result<KeyScan> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [store_name],
            |row| row.get(0),
        )
        .optional()?;

    let clustered = sql
        .map(|s| s.to_ascii_uppercase().contains("WITHOUT ROWID"))
        .unwrap_or(false);

    Ok(if clustered {
        KeyScan::KeysOnly
    } else {
        KeyScan::Entries
    })
}
