//! Online/offline orchestration and reconciliation of pending mutations.
//!
//! Two execution contexts run this logic: the page-side
//! [`SyncOrchestrator`], and the detached [`BackgroundReconciler`] driven by
//! the platform's deferred-retry mechanism. They never share in-process
//! state; each owns its own store handle, and the store's transactions plus
//! a broadcast channel are their only common ground.

mod background;
mod events;
mod orchestrator;

pub use background::{BackgroundOutcome, BackgroundReconciler, RetryHandle, SYNC_TAG};
pub use events::{Subscription, SyncEvent};
pub use orchestrator::{Connectivity, LoadResult, Source, SyncOrchestrator};

use std::collections::HashMap;

use crate::records::Discovery;
use crate::store::QueueRow;

/// Collapse pending queue rows into one push batch.
///
/// A key mutated several times while offline has several queue rows, each a
/// full snapshot; only the latest one should reach the remote authority.
/// Latest is by timestamp, with the greater queue id breaking ties, never
/// by incidental map-insertion order.
pub(crate) fn collapse_pending(rows: &[QueueRow]) -> HashMap<String, Discovery> {
  let mut latest: HashMap<&str, &QueueRow> = HashMap::new();

  for row in rows {
    let supersedes = latest
      .get(row.entity_key.as_str())
      .map_or(true, |current| {
        (row.timestamp, row.id) > (current.timestamp, current.id)
      });
    if supersedes {
      latest.insert(&row.entity_key, row);
    }
  }

  latest
    .into_iter()
    .map(|(key, row)| (key.to_string(), row.data.clone()))
    .collect()
}


#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, Utc};

  fn row(id: i64, key: &str, description: &str, offset_secs: i64) -> QueueRow {
    QueueRow {
      id,
      entity_key: key.to_string(),
      data: testing::discovery(description),
      timestamp: Utc::now() + Duration::seconds(offset_secs),
    }
  }

  #[test]
  fn test_collapse_keeps_latest_snapshot_per_key() {
    let rows = vec![
      row(1, "007", "stale", 0),
      row(2, "012", "only", 5),
      row(3, "007", "fresh", 10),
    ];

    let batch = collapse_pending(&rows);
    assert_eq!(batch.len(), 2);
    assert_eq!(batch["007"].description.as_deref(), Some("fresh"));
    assert_eq!(batch["012"].description.as_deref(), Some("only"));
  }

  #[test]
  fn test_collapse_is_timestamp_ordered_not_row_ordered() {
    // A later row id with an earlier timestamp must lose
    let rows = vec![row(1, "007", "newer", 10), row(2, "007", "older", 0)];

    let batch = collapse_pending(&rows);
    assert_eq!(batch["007"].description.as_deref(), Some("newer"));
  }

  #[test]
  fn test_collapse_breaks_timestamp_ties_by_queue_id() {
    let stamp = Utc::now();
    let mut first = row(1, "007", "first", 0);
    let mut second = row(2, "007", "second", 0);
    first.timestamp = stamp;
    second.timestamp = stamp;

    let batch = collapse_pending(&[first, second]);
    assert_eq!(batch["007"].description.as_deref(), Some("second"));
  }
}
