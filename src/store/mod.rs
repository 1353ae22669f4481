//! Durable local store: the discovery cache table plus the pending-mutation
//! queue.
//!
//! Both execution contexts (the page-side orchestrator and the detached
//! background reconciler) open their own handle to the same database file;
//! SQLite transactions are the only cross-context serialization. Multi-table
//! writes here are atomic: a record is never left only-queued or only-cached.

pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::StoreError;
use crate::records::Discovery;

/// One pending mutation awaiting transmission to the remote authority.
#[derive(Debug, Clone)]
pub struct QueueRow {
  pub id: i64,
  pub entity_key: String,
  /// Full snapshot of the discovery at enqueue time, not a diff
  pub data: Discovery,
  pub timestamp: DateTime<Utc>,
}

/// A cached discovery together with its sync bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub record: Discovery,
  pub updated_at: DateTime<Utc>,
  /// True iff the value is believed to match the remote authority's copy
  pub synced: bool,
}

pub struct LocalStore {
  conn: Mutex<Connection>,
}

impl LocalStore {
  /// Open (or create) the store at the given path.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Unavailable(format!("failed to create store directory: {e}")))?;
    }

    let conn = Connection::open(path)?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Open the store at the default location under the platform data dir.
  pub fn open_default() -> Result<Self, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("could not determine data directory".to_string()))?;

    Self::open(&data_dir.join("sightline").join("store.db"))
  }

  /// In-memory store, used by tests.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    self.lock()?.execute_batch(schema::SCHEMA)?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }

  /// Write or overwrite one cache row per entry, marking each as in sync
  /// with the remote authority. All-or-nothing: a failed batch applies no
  /// rows at all.
  pub fn upsert_cache_entries(
    &self,
    entries: &HashMap<String, Discovery>,
  ) -> Result<(), StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    let now = Utc::now().to_rfc3339();

    for (key, record) in entries {
      let data = serde_json::to_vec(record)?;
      tx.execute(
        "INSERT OR REPLACE INTO discovery_cache (entity_key, data, updated_at, synced)
         VALUES (?1, ?2, ?3, 1)",
        params![key, data, now],
      )?;
    }

    tx.commit()?;
    Ok(())
  }

  /// Read the full cache table, keyed by entity key.
  pub fn read_all_cache_entries(&self) -> Result<HashMap<String, Discovery>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT entity_key, data FROM discovery_cache")?;

    let rows = stmt.query_map([], |row| {
      let key: String = row.get(0)?;
      let data: Vec<u8> = row.get(1)?;
      Ok((key, data))
    })?;

    let mut entries = HashMap::new();
    for row in rows {
      let (key, data) = row?;
      entries.insert(key, serde_json::from_slice(&data)?);
    }
    Ok(entries)
  }

  /// Read one cache row with its sync bookkeeping.
  pub fn read_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT data, updated_at, synced FROM discovery_cache WHERE entity_key = ?1",
    )?;

    let found: Option<(Vec<u8>, String, bool)> = stmt
      .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .ok();

    match found {
      Some((data, updated_at, synced)) => Ok(Some(CacheEntry {
        record: serde_json::from_slice(&data)?,
        updated_at: parse_timestamp(&updated_at)?,
        synced,
      })),
      None => Ok(None),
    }
  }

  /// Append one queue row and upsert the same record into the cache table
  /// with `synced = false`, as a single transaction spanning both tables.
  pub fn enqueue_mutation(&self, key: &str, record: &Discovery) -> Result<(), StoreError> {
    let data = serde_json::to_vec(record)?;
    let now = Utc::now().to_rfc3339();

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "INSERT INTO sync_queue (entity_key, data, timestamp, status)
       VALUES (?1, ?2, ?3, 'pending')",
      params![key, data, now],
    )?;
    tx.execute(
      "INSERT OR REPLACE INTO discovery_cache (entity_key, data, updated_at, synced)
       VALUES (?1, ?2, ?3, 0)",
      params![key, data, now],
    )?;
    tx.commit()?;

    debug!(%key, "queued offline mutation");
    Ok(())
  }

  /// All pending queue rows in insertion order (oldest first). This order is
  /// the commit order used by reconciliation.
  pub fn read_pending_mutations(&self) -> Result<Vec<QueueRow>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT id, entity_key, data, timestamp FROM sync_queue
       WHERE status = 'pending' ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
      let id: i64 = row.get(0)?;
      let entity_key: String = row.get(1)?;
      let data: Vec<u8> = row.get(2)?;
      let timestamp: String = row.get(3)?;
      Ok((id, entity_key, data, timestamp))
    })?;

    let mut pending = Vec::new();
    for row in rows {
      let (id, entity_key, data, timestamp) = row?;
      pending.push(QueueRow {
        id,
        entity_key,
        data: serde_json::from_slice(&data)?,
        timestamp: parse_timestamp(&timestamp)?,
      });
    }
    Ok(pending)
  }

  /// Delete a queue row and flag its cache row as synced, atomically.
  /// A cache row that no longer exists is a no-op for the flag update.
  pub fn mark_mutation_synced(&self, queue_id: i64, key: &str) -> Result<(), StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM sync_queue WHERE id = ?1", params![queue_id])?;
    tx.execute(
      "UPDATE discovery_cache SET synced = 1 WHERE entity_key = ?1",
      params![key],
    )?;
    tx.commit()?;
    Ok(())
  }

  /// Cheap pending count through the status index, for UI badges.
  pub fn count_pending_mutations(&self) -> Result<u64, StoreError> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
      [],
      |row| row.get(0),
    )?;
    Ok(count as u64)
  }

  /// Truncate both tables. Explicit user-initiated reset only.
  pub fn clear_all(&self) -> Result<(), StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM discovery_cache", [])?;
    tx.execute("DELETE FROM sync_queue", [])?;
    tx.commit()?;
    Ok(())
  }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{s}': {e}")))
}
