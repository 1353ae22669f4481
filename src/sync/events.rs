//! State-transition events and the subscriber registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Lifecycle notifications published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
  Online,
  Offline,
  ReconcileStart,
  /// A reconciliation batch was accepted; `count` entities were transmitted
  ReconcileSuccess { count: usize },
  ReconcileError { reason: String },
  ReconcileEnd,
  /// A record was persisted; `offline` distinguishes "saved locally, will
  /// sync later" from "saved" at the call site
  Saved { offline: bool },
}

type Callback = Box<dyn Fn(&SyncEvent) + Send + Sync>;
type Registry = Mutex<HashMap<u64, Callback>>;

/// Single broadcast stream of fire-and-forget observers; no topics.
/// Callbacks run synchronously on every state transition.
#[derive(Default)]
pub(crate) struct Subscribers {
  registry: Arc<Registry>,
  next_id: AtomicU64,
}

impl Subscribers {
  pub fn subscribe(&self, callback: impl Fn(&SyncEvent) + Send + Sync + 'static) -> Subscription {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    if let Ok(mut registry) = self.registry.lock() {
      registry.insert(id, Box::new(callback));
    }
    Subscription {
      id,
      registry: Arc::downgrade(&self.registry),
    }
  }

  pub fn emit(&self, event: &SyncEvent) {
    let Ok(registry) = self.registry.lock() else {
      return;
    };
    for callback in registry.values() {
      callback(event);
    }
  }
}

/// Handle returned at subscribe time. Delivery stops when it is dropped or
/// explicitly unsubscribed.
pub struct Subscription {
  id: u64,
  registry: Weak<Registry>,
}

impl Subscription {
  pub fn unsubscribe(self) {
    // Drop does the work
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(registry) = self.registry.upgrade() {
      if let Ok(mut registry) = registry.lock() {
        registry.remove(&self.id);
      }
    }
  }
}
