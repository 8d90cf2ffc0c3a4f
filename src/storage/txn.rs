//! Transaction-scoped access to one store table.

use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use super::key::Key;
use super::schema::{quote_ident, KeyScan};
use crate::error::Result;

/// Access mode of a transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

impl TxnMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
        }
    }
}

impl fmt::Display for TxnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The store accessor handed to a transaction body.
///
/// Every call runs inside the surrounding transaction; the scope commits
/// only if the body returns `Ok`.
pub struct StoreTxn<'a> {
    conn: &'a Connection,
    table: String,
    scan: KeyScan,
}

impl<'a> StoreTxn<'a> {
    pub(crate) fn new(conn: &'a Connection, store_name: &str, scan: KeyScan) -> Self {
        Self {
            conn,
            table: quote_ident(store_name),
            scan,
        }
    }

    /// Raw JSON text stored under `key`.
    pub fn get_raw(&self, key: &Key) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT value FROM {} WHERE key = ?1", self.table))?;
        Ok(stmt.query_row([key], |row| row.get(0)).optional()?)
    }

    pub fn get<V: DeserializeOwned>(&self, key: &Key) -> Result<Option<V>> {
        match self.get_raw(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Store pre-encoded JSON text under `key`, replacing any existing value.
    pub fn put_raw(&self, key: &Key, json: &str) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            self.table
        ))?;
        stmt.execute(rusqlite::params![key, json])?;
        Ok(())
    }

    pub fn put<V: Serialize + ?Sized>(&self, key: &Key, value: &V) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.put_raw(key, &json)
    }

    pub fn delete(&self, key: &Key) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE key = ?1", self.table))?;
        stmt.execute([key])?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(())
    }

    /// All keys in ascending engine order.
    pub fn keys(&self) -> Result<Vec<Key>> {
        let sql = match self.scan {
            KeyScan::KeysOnly => format!("SELECT key FROM {} ORDER BY key", self.table),
            KeyScan::Entries => format!("SELECT key, value FROM {} ORDER BY key", self.table),
        };
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, Key>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    pub fn len(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
