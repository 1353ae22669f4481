//! Error types shared across the storage, network and caching layers.
//!
//! The split matters for control flow: remote failures are always recovered
//! locally (cache fallback or offline queue), while store failures are
//! surfaced to the immediate caller and never retried here.

use thiserror::Error;

/// Local store transaction failure.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Underlying SQLite failure
  #[error("database error: {0}")]
  Sqlite(rusqlite::Error),

  /// Record (de)serialization failure
  #[error("failed to encode record: {0}")]
  Codec(#[from] serde_json::Error),

  /// A stored value could not be read back (e.g. a malformed timestamp)
  #[error("corrupt store content: {0}")]
  Corrupt(String),

  /// Storage quota exhausted. Offline saves stop working until space is
  /// freed; there is no special-cased recovery.
  #[error("storage quota exceeded")]
  QuotaExceeded,

  /// Connection mutex poisoned by a panicking writer
  #[error("store lock poisoned")]
  LockPoisoned,

  /// The store could not be opened at all
  #[error("storage unavailable: {0}")]
  Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
  fn from(err: rusqlite::Error) -> Self {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
      if e.code == rusqlite::ErrorCode::DiskFull {
        return StoreError::QuotaExceeded;
      }
    }
    StoreError::Sqlite(err)
  }
}

/// Remote authority failure.
#[derive(Debug, Error)]
pub enum RemoteError {
  /// The request could not complete
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  /// The request completed with a non-success status
  #[error("server rejected request with status {status}")]
  Rejected { status: u16 },
}

/// Failure inside the cache policy engine.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  Store(#[from] StoreError),

  /// The network fetch failed and no cached copy could stand in for it
  #[error(transparent)]
  Upstream(#[from] RemoteError),
}

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(String),

  #[error("failed to read config file: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse config file: {0}")]
  Parse(#[from] serde_yaml::Error),
}
