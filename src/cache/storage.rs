//! Partitioned response cache backing the policy engine.
//!
//! Two partitions exist per version tag: an immutable install-time precache
//! and a runtime partition populated opportunistically. Eviction is
//! generational: activating a version deletes every partition built under
//! another tag. The response cache lives in its own database file, separate
//! from the sync store.

use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::StoreError;

/// Schema for the response cache table.
const RESPONSE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    partition TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (partition, url_hash)
);
"#;

/// A stored (or freshly fetched) response body with the metadata the
/// strategies need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  /// Only OK responses are ever written into a cache partition.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

pub struct ResponseCache {
  conn: Mutex<Connection>,
  version: String,
}

impl ResponseCache {
  pub fn open(path: &Path, version: &str) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Unavailable(format!("failed to create cache directory: {e}")))?;
    }

    let conn = Connection::open(path)?;
    Self::from_connection(conn, version)
  }

  /// In-memory cache, used by tests.
  pub fn open_in_memory(version: &str) -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?, version)
  }

  fn from_connection(conn: Connection, version: &str) -> Result<Self, StoreError> {
    conn.execute_batch(RESPONSE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
      version: version.to_string(),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }

  fn precache_partition(&self) -> String {
    format!("precache-{}", self.version)
  }

  fn runtime_partition(&self) -> String {
    format!("runtime-{}", self.version)
  }

  /// Look up a response for this URL, precache partition first.
  pub fn lookup(&self, url: &str) -> Result<Option<CachedResponse>, StoreError> {
    let hash = url_hash(url);
    let conn = self.lock()?;

    for partition in [self.precache_partition(), self.runtime_partition()] {
      let mut stmt = conn.prepare(
        "SELECT status, content_type, body FROM response_cache
         WHERE partition = ?1 AND url_hash = ?2",
      )?;
      let found: Option<CachedResponse> = stmt
        .query_row(params![partition, hash], |row| {
          Ok(CachedResponse {
            status: row.get::<_, i64>(0)? as u16,
            content_type: row.get(1)?,
            body: row.get(2)?,
          })
        })
        .ok();
      if found.is_some() {
        return Ok(found);
      }
    }
    Ok(None)
  }

  /// Write a response into the runtime partition.
  pub fn put_runtime(&self, url: &str, response: &CachedResponse) -> Result<(), StoreError> {
    self.put(&self.runtime_partition(), url, response)
  }

  /// Write a response into the install-time precache partition.
  pub fn put_precache(&self, url: &str, response: &CachedResponse) -> Result<(), StoreError> {
    self.put(&self.precache_partition(), url, response)
  }

  fn put(&self, partition: &str, url: &str, response: &CachedResponse) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO response_cache
         (partition, url_hash, url, status, content_type, body, cached_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        partition,
        url_hash(url),
        url,
        response.status as i64,
        response.content_type,
        response.body,
        Utc::now().to_rfc3339(),
      ],
    )?;
    Ok(())
  }

  /// Delete every partition not matching the current version tag. Returns
  /// the number of evicted rows.
  pub fn activate(&self) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let evicted = conn.execute(
      "DELETE FROM response_cache WHERE partition NOT IN (?1, ?2)",
      params![self.precache_partition(), self.runtime_partition()],
    )?;
    if evicted > 0 {
      debug!(evicted, version = %self.version, "evicted stale cache partitions");
    }
    Ok(evicted)
  }
}

/// Stable fixed-length key for arbitrary URLs.
fn url_hash(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}
