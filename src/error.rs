//! Error types, one enum per concern.
//!
//! Vanished or access-denied processes are not represented here: collectors
//! skip them and return `None` or a shorter list.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot create store directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot create session store {path}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot encode extra metrics: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid stored timestamp '{0}'")]
    InvalidTimestamp(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write config file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("a monitoring session is already running")]
    AlreadyRunning,
    #[error("watch-list is empty, add at least one process name")]
    EmptyWatchList,
    #[error("output directory is not set")]
    EmptyOutputDir,
    #[error("metrics collector is not available")]
    CollectorUnavailable,
    #[error("cannot create session store: {0}")]
    Store(#[from] StoreError),
    #[error("cannot spawn monitor thread: {0}")]
    Spawn(io::Error),
}
