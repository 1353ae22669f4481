//! SQL schema for the offline store tables.

/// Applied idempotently on every open. The status index lets pending
/// mutations be counted and listed without a full table scan.
pub const SCHEMA: &str = r#"
-- Materialized cache of discoveries, one row per entity key
CREATE TABLE IF NOT EXISTS discovery_cache (
    entity_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 1
);

-- Ordered queue of unsynchronized mutations, each a full snapshot.
-- Completion is modeled by row deletion; 'pending' is the only status
-- ever stored.
CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    timestamp TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status);
"#;
