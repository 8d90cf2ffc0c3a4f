//! Test utilities for keyval integration tests.
//!
//! Provides:
//! - Temporary data directory fixtures
//! - Store construction against the fixture
//! - Raw SQLite access for simulating outside interference

#![allow(dead_code)]

use keyval::{Config, Store};
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test fixture that manages a temporary data directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory holding the database files
    pub temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with a temporary data directory.
    pub fn new() -> Self {
        keyval::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self { temp_dir }
    }

    /// Configuration rooted at the fixture directory.
    pub fn config(&self) -> Config {
        Config::with_data_dir(self.temp_dir.path())
    }

    /// A store in the fixture's `test` database.
    pub fn store(&self, store_name: &str) -> Store {
        Store::with_config(self.config(), "test", store_name)
    }

    /// Path of a database file inside the fixture.
    pub fn db_path(&self, db_name: &str) -> PathBuf {
        self.temp_dir.path().join(format!("{db_name}.sqlite3"))
    }

    /// A second, raw connection to the `test` database.
    pub fn raw_connection(&self) -> Connection {
        let conn = Connection::open(self.db_path("test")).expect("failed to open raw connection");
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .expect("failed to set busy timeout");
        conn
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
