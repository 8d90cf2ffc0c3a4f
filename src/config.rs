//! Configuration for keyval stores.
//!
//! Supports:
//! - Flattening into a host application's clap CLI
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default database name used by the process-wide default store.
pub const DEFAULT_DB_NAME: &str = "keyval-store";

/// Default store name used by the process-wide default store.
pub const DEFAULT_STORE_NAME: &str = "keyval";

/// SQLite `synchronous` setting applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Synchronous {
    Off,
    Normal,
    Full,
}

impl Synchronous {
    pub(crate) fn as_pragma(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

/// Output format for `init_tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Keyval storage configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "keyval")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Directory holding one SQLite file per database
    #[arg(long, env = "KEYVAL_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Database name of the default store
    #[arg(long, env = "KEYVAL_DB_NAME", default_value = DEFAULT_DB_NAME)]
    pub db_name: String,

    /// Store name of the default store
    #[arg(long, env = "KEYVAL_STORE_NAME", default_value = DEFAULT_STORE_NAME)]
    pub store_name: String,

    /// How long a transaction waits on a locked database before aborting
    #[arg(long, env = "KEYVAL_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// SQLite synchronous mode
    #[arg(long, env = "KEYVAL_SYNCHRONOUS", value_enum, default_value_t = Synchronous::Full)]
    pub synchronous: Synchronous,

    /// Size of the job channel feeding each connection worker
    #[arg(long, env = "KEYVAL_JOB_CHANNEL_SIZE", default_value_t = 256)]
    pub job_channel_size: usize,

    /// Log output format used by `init_tracing`
    #[arg(long, env = "KEYVAL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Read configuration from the environment, ignoring process arguments.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from(["keyval"])
    }

    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            db_name: DEFAULT_DB_NAME.into(),
            store_name: DEFAULT_STORE_NAME.into(),
            busy_timeout_ms: 5000,
            synchronous: Synchronous::Full,
            job_channel_size: 256,
            log_format: LogFormat::Text,
        }
    }
}
