//! Detached reconciliation: the execution context that runs with no page
//! attached, woken by the platform's deferred-retry mechanism.
//!
//! This task cannot call into any page's orchestrator; it re-runs the
//! read-pending → collapse → push → mark-synced sequence against its own
//! store handle, then broadcasts the outcome so every open page can update
//! its observable state and badge counts without reconciling again.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::remote::Remote;
use crate::store::LocalStore;

use super::collapse_pending;

/// Tag identifying deferred sync-retry requests. Requests carrying any
/// other tag are not ours and are ignored.
pub const SYNC_TAG: &str = "sync-discoveries";

/// Outcome of one detached reconciliation pass.
#[derive(Debug, Clone)]
pub enum BackgroundOutcome {
  /// The batch was accepted and this many entities were cleared
  Flushed { count: usize },
  /// The pass failed; the queue is untouched and a later trigger retries
  Failed { reason: String },
  /// Nothing was pending
  Idle,
}

/// Sender half of the deferred-retry capability.
///
/// Registering a tag is best-effort: when the background context is gone
/// the request is dropped, and the next online transition reconciles
/// instead.
#[derive(Clone)]
pub struct RetryHandle {
  tx: mpsc::UnboundedSender<String>,
}

impl RetryHandle {
  pub fn request(&self, tag: &str) {
    if self.tx.send(tag.to_string()).is_err() {
      debug!(%tag, "background reconciler gone, retry request dropped");
    }
  }
}

/// The detached reconciliation task.
pub struct BackgroundReconciler {
  store: Arc<LocalStore>,
  remote: Arc<dyn Remote>,
  requests: mpsc::UnboundedReceiver<String>,
  outcomes: broadcast::Sender<BackgroundOutcome>,
}

impl BackgroundReconciler {
  /// Build the reconciler with its own store and remote handles, plus the
  /// retry handle the rest of the system uses to reach it.
  pub fn new(store: Arc<LocalStore>, remote: Arc<dyn Remote>) -> (Self, RetryHandle) {
    let (tx, requests) = mpsc::unbounded_channel();
    let (outcomes, _) = broadcast::channel(16);
    (
      Self {
        store,
        remote,
        requests,
        outcomes,
      },
      RetryHandle { tx },
    )
  }

  /// Subscribe a page to detached-pass outcomes.
  pub fn subscribe(&self) -> broadcast::Receiver<BackgroundOutcome> {
    self.outcomes.subscribe()
  }

  /// Drive the task: one reconciliation pass per matching retry request,
  /// until every retry handle is dropped.
  pub async fn run(mut self) {
    while let Some(tag) = self.requests.recv().await {
      if tag != SYNC_TAG {
        debug!(%tag, "ignoring retry request with unknown tag");
        continue;
      }

      let outcome = self.flush_pending().await;
      // A receiver-less broadcast just means no page is currently open
      let _ = self.outcomes.send(outcome);
    }
  }

  async fn flush_pending(&self) -> BackgroundOutcome {
    let pending = match self.store.read_pending_mutations() {
      Ok(rows) => rows,
      Err(err) => {
        return BackgroundOutcome::Failed {
          reason: err.to_string(),
        }
      }
    };
    if pending.is_empty() {
      return BackgroundOutcome::Idle;
    }

    let batch = collapse_pending(&pending);
    if let Err(err) = self.remote.push(&batch).await {
      warn!(error = %err, "detached reconciliation push failed, queue left pending");
      return BackgroundOutcome::Failed {
        reason: err.to_string(),
      };
    }

    for row in &pending {
      if let Err(err) = self.store.mark_mutation_synced(row.id, &row.entity_key) {
        return BackgroundOutcome::Failed {
          reason: err.to_string(),
        };
      }
    }

    info!(count = batch.len(), "detached reconciliation flushed pending mutations");
    BackgroundOutcome::Flushed { count: batch.len() }
  }
}
