//! Store keys and their SQLite mapping.
//!
//! The key column has no declared type, so SQLite keeps each key in its
//! native storage class and orders them integers < text < blobs, comparing
//! text and blobs bytewise. `Key`'s derived `Ord` follows the same rules.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A key in a store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Integer(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl ToSql for Key {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Integer(n) => ToSqlOutput::Borrowed(ValueRef::Integer(*n)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for Key {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(n) => Ok(Self::Integer(n)),
            ValueRef::Text(t) => std::str::from_utf8(t)
                .map(|s| Self::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(b) => Ok(Self::Bytes(b.to_vec())),
            ValueRef::Null | ValueRef::Real(_) => Err(FromSqlError::InvalidType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_ordering_matches_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (key PRIMARY KEY NOT NULL) WITHOUT ROWID")
            .unwrap();

        let mut keys = vec![
            Key::from(vec![0x01u8]),
            Key::from("b"),
            Key::from(10),
            Key::from("a"),
            Key::from(-3),
            Key::from(vec![0x00u8, 0xff]),
        ];
        for key in &keys {
            conn.execute("INSERT INTO t (key) VALUES (?1)", [key]).unwrap();
        }

        let mut stmt = conn.prepare("SELECT key FROM t ORDER BY key").unwrap();
        let from_sqlite: Vec<Key> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        keys.sort();
        assert_eq!(from_sqlite, keys);
        assert_eq!(keys.first(), Some(&Key::Integer(-3)));
        assert_eq!(keys.last(), Some(&Key::Bytes(vec![0x01])));
    }

    #[test]
    fn test_real_is_not_a_key() {
        let conn = Connection::open_in_memory().unwrap();
        let result: rusqlite::Result<Key> = conn.query_row("SELECT 1.5", [], |row| row.get(0));
        assert!(result.is_err());
    }
}
