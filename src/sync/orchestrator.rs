//! The component pages call directly: online/offline state machine, save
//! and load operations, and page-driven reconciliation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::records::Discovery;
use crate::remote::Remote;
use crate::store::LocalStore;

use super::background::{BackgroundOutcome, RetryHandle, SYNC_TAG};
use super::collapse_pending;
use super::events::{Subscribers, Subscription, SyncEvent};

/// Connectivity as last reported by the platform signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// Where a [`SyncOrchestrator::load`] was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  Remote,
  Local,
}

/// Result of a load: the full entity mapping plus its provenance.
#[derive(Debug)]
pub struct LoadResult {
  pub entries: HashMap<String, Discovery>,
  pub source: Source,
}

enum FlushOutcome {
  /// Nothing was pending; zero network calls were made
  Idle,
  Flushed(usize),
  RemoteFailed(String),
}

/// Sole writer of the discovery cache and the sync queue.
///
/// Network failures are never fatal here; they only ever cause a fall-back
/// to the offline path or a left-as-pending queue. Store failures propagate
/// to the caller unmodified.
pub struct SyncOrchestrator {
  store: Arc<LocalStore>,
  remote: Arc<dyn Remote>,
  online: AtomicBool,
  reconciling: AtomicBool,
  subscribers: Subscribers,
  retry: Option<RetryHandle>,
}

impl SyncOrchestrator {
  pub fn new(store: Arc<LocalStore>, remote: Arc<dyn Remote>, initial: Connectivity) -> Self {
    Self {
      store,
      remote,
      online: AtomicBool::new(initial == Connectivity::Online),
      reconciling: AtomicBool::new(false),
      subscribers: Subscribers::default(),
      retry: None,
    }
  }

  /// Attach the platform's deferred-retry capability. Without it, offline
  /// saves still work; they just wait for the next online transition.
  pub fn with_retry(mut self, retry: RetryHandle) -> Self {
    self.retry = Some(retry);
    self
  }

  /// Register a fire-and-forget observer of every state transition.
  pub fn subscribe(&self, callback: impl Fn(&SyncEvent) + Send + Sync + 'static) -> Subscription {
    self.subscribers.subscribe(callback)
  }

  pub fn connectivity(&self) -> Connectivity {
    if self.online.load(Ordering::SeqCst) {
      Connectivity::Online
    } else {
      Connectivity::Offline
    }
  }

  pub fn is_reconciling(&self) -> bool {
    self.reconciling.load(Ordering::SeqCst)
  }

  /// Pending-mutation count for UI badges.
  pub fn pending_count(&self) -> Result<u64, StoreError> {
    self.store.count_pending_mutations()
  }

  /// Mirror a platform connectivity transition. Going online triggers a
  /// reconciliation pass; its errors travel through the event stream.
  pub async fn set_connectivity(&self, connectivity: Connectivity) {
    let now_online = connectivity == Connectivity::Online;
    let was_online = self.online.swap(now_online, Ordering::SeqCst);
    if was_online == now_online {
      return;
    }

    match connectivity {
      Connectivity::Online => {
        info!("connectivity regained");
        self.subscribers.emit(&SyncEvent::Online);
        let _ = self.reconcile().await;
      }
      Connectivity::Offline => {
        info!("connectivity lost");
        self.subscribers.emit(&SyncEvent::Offline);
      }
    }
  }

  /// Persist one record. Online, the record goes to the remote authority
  /// and the cache; any remote failure falls through to the offline path,
  /// which queues the snapshot and asks the platform to retry later.
  pub async fn save(&self, key: &str, record: Discovery) -> Result<(), StoreError> {
    if self.connectivity() == Connectivity::Online {
      let batch = HashMap::from([(key.to_string(), record.clone())]);
      match self.remote.push(&batch).await {
        Ok(()) => {
          self.store.upsert_cache_entries(&batch)?;
          self.subscribers.emit(&SyncEvent::Saved { offline: false });
          return Ok(());
        }
        Err(err) => {
          warn!(%key, error = %err, "online save failed, queuing offline");
        }
      }
    }

    self.store.enqueue_mutation(key, &record)?;
    if let Some(retry) = &self.retry {
      // Best-effort; a missing background context is not an error
      retry.request(SYNC_TAG);
    }
    self.subscribers.emit(&SyncEvent::Saved { offline: true });
    Ok(())
  }

  /// Read the full entity mapping, from the remote authority when it is
  /// reachable (refreshing the cache), from the local cache otherwise.
  pub async fn load(&self) -> Result<LoadResult, StoreError> {
    if self.connectivity() == Connectivity::Online {
      match self.remote.fetch_all().await {
        Ok(entries) => {
          self.store.upsert_cache_entries(&entries)?;
          return Ok(LoadResult {
            entries,
            source: Source::Remote,
          });
        }
        Err(err) => {
          warn!(error = %err, "remote load failed, serving local cache");
        }
      }
    }

    let entries = self.store.read_all_cache_entries()?;
    Ok(LoadResult {
      entries,
      source: Source::Local,
    })
  }

  /// Push all pending mutations as one batch and clear them on success.
  ///
  /// At most one pass is in flight per orchestrator: a call that observes
  /// another pass running (or no connectivity) returns immediately. Remote
  /// failures leave the queue untouched and are reported only through
  /// `ReconcileError`; the next trigger retries.
  pub async fn reconcile(&self) -> Result<(), StoreError> {
    if self.connectivity() == Connectivity::Offline {
      debug!("reconcile skipped: offline");
      return Ok(());
    }
    if self.reconciling.swap(true, Ordering::SeqCst) {
      debug!("reconcile skipped: pass already in flight");
      return Ok(());
    }

    self.subscribers.emit(&SyncEvent::ReconcileStart);
    let result = self.flush_pending().await;
    match &result {
      Ok(FlushOutcome::Idle) => {}
      Ok(FlushOutcome::Flushed(count)) => {
        self.subscribers.emit(&SyncEvent::ReconcileSuccess { count: *count });
      }
      Ok(FlushOutcome::RemoteFailed(reason)) => {
        self.subscribers.emit(&SyncEvent::ReconcileError {
          reason: reason.clone(),
        });
      }
      Err(err) => {
        self.subscribers.emit(&SyncEvent::ReconcileError {
          reason: err.to_string(),
        });
      }
    }
    self.reconciling.store(false, Ordering::SeqCst);
    self.subscribers.emit(&SyncEvent::ReconcileEnd);

    result.map(|_| ())
  }

  async fn flush_pending(&self) -> Result<FlushOutcome, StoreError> {
    let pending = self.store.read_pending_mutations()?;
    if pending.is_empty() {
      return Ok(FlushOutcome::Idle);
    }

    let batch = collapse_pending(&pending);
    if let Err(err) = self.remote.push(&batch).await {
      warn!(error = %err, "reconciliation push failed, queue left pending");
      return Ok(FlushOutcome::RemoteFailed(err.to_string()));
    }

    // The batch was accepted as a whole; every row read at pass start is
    // now superseded, including older rows for collapsed keys.
    for row in &pending {
      self.store.mark_mutation_synced(row.id, &row.entity_key)?;
    }

    info!(count = batch.len(), "reconciliation flushed pending mutations");
    Ok(FlushOutcome::Flushed(batch.len()))
  }

  /// Republish a detached-context outcome to this orchestrator's
  /// subscribers, without re-running the reconciliation.
  pub fn apply_background_outcome(&self, outcome: &BackgroundOutcome) {
    match outcome {
      BackgroundOutcome::Flushed { count } => {
        self.subscribers.emit(&SyncEvent::ReconcileSuccess { count: *count });
      }
      BackgroundOutcome::Failed { reason } => {
        self.subscribers.emit(&SyncEvent::ReconcileError {
          reason: reason.clone(),
        });
      }
      BackgroundOutcome::Idle => {}
    }
  }

  /// Forward detached-context outcomes to this orchestrator's subscribers
  /// for as long as the broadcast channel stays open.
  pub fn watch_background(
    self: Arc<Self>,
    mut outcomes: broadcast::Receiver<BackgroundOutcome>,
  ) -> tokio::task::JoinHandle<()> {
    let this = self;
    tokio::spawn(async move {
      loop {
        match outcomes.recv().await {
          Ok(outcome) => this.apply_background_outcome(&outcome),
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "background outcomes dropped");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::testing::{discovery, fake_remote, init_tracing, FakeRemote};
  use std::sync::Mutex;

  fn orchestrator(
    remote: Arc<FakeRemote>,
    initial: Connectivity,
  ) -> (Arc<SyncOrchestrator>, Arc<LocalStore>) {
    init_tracing();
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let orch = Arc::new(SyncOrchestrator::new(
      Arc::clone(&store),
      remote,
      initial,
    ));
    (orch, store)
  }

  fn collect_events(orch: &SyncOrchestrator) -> (Subscription, Arc<Mutex<Vec<SyncEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let sub = orch.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    (sub, events)
  }

  #[tokio::test]
  async fn test_offline_save_queues_and_tags_cache_row() {
    let remote = fake_remote();
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Offline);
    let (_sub, events) = collect_events(&orch);

    orch.save("007", discovery("grebe")).await.unwrap();

    // No network was touched
    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(store.count_pending_mutations().unwrap(), 1);
    assert!(!store.read_cache_entry("007").unwrap().unwrap().synced);
    assert_eq!(
      events.lock().unwrap().as_slice(),
      &[SyncEvent::Saved { offline: true }]
    );
  }

  #[tokio::test]
  async fn test_online_save_pushes_and_caches_synced() {
    let remote = fake_remote();
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Online);
    let (_sub, events) = collect_events(&orch);

    orch.save("007", discovery("grebe")).await.unwrap();

    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(store.count_pending_mutations().unwrap(), 0);
    assert!(store.read_cache_entry("007").unwrap().unwrap().synced);
    assert_eq!(
      events.lock().unwrap().as_slice(),
      &[SyncEvent::Saved { offline: false }]
    );
  }

  #[tokio::test]
  async fn test_online_save_falls_back_when_push_fails() {
    let remote = fake_remote();
    remote.fail_push.store(true, std::sync::atomic::Ordering::SeqCst);
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Online);
    let (_sub, events) = collect_events(&orch);

    orch.save("007", discovery("grebe")).await.unwrap();

    assert_eq!(store.count_pending_mutations().unwrap(), 1);
    assert!(!store.read_cache_entry("007").unwrap().unwrap().synced);
    assert_eq!(
      events.lock().unwrap().as_slice(),
      &[SyncEvent::Saved { offline: true }]
    );
  }

  #[tokio::test]
  async fn test_load_refreshes_cache_from_remote() {
    let remote = fake_remote();
    remote
      .entries
      .lock()
      .unwrap()
      .insert("012".to_string(), discovery("heron"));
    let (orch, store) = orchestrator(remote, Connectivity::Online);

    let result = orch.load().await.unwrap();

    assert_eq!(result.source, Source::Remote);
    assert_eq!(result.entries.len(), 1);
    assert!(store.read_cache_entry("012").unwrap().unwrap().synced);
  }

  #[tokio::test]
  async fn test_load_serves_local_cache_when_remote_fails() {
    let remote = fake_remote();
    remote.fail_fetch.store(true, std::sync::atomic::Ordering::SeqCst);
    let (orch, store) = orchestrator(remote, Connectivity::Online);
    store.enqueue_mutation("007", &discovery("grebe")).unwrap();

    let result = orch.load().await.unwrap();

    assert_eq!(result.source, Source::Local);
    assert_eq!(
      result.entries["007"].description.as_deref(),
      Some("grebe")
    );
  }

  #[tokio::test]
  async fn test_load_serves_local_cache_when_offline() {
    let remote = fake_remote();
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Offline);
    store.enqueue_mutation("007", &discovery("grebe")).unwrap();

    let result = orch.load().await.unwrap();

    assert_eq!(result.source, Source::Local);
    assert_eq!(remote.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_reconcile_is_noop_while_offline() {
    let remote = fake_remote();
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Offline);
    store.enqueue_mutation("007", &discovery("grebe")).unwrap();
    let (_sub, events) = collect_events(&orch);

    orch.reconcile().await.unwrap();

    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(store.count_pending_mutations().unwrap(), 1);
    assert!(events.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_reconcile_with_empty_queue_makes_no_network_call() {
    let remote = fake_remote();
    let (orch, _store) = orchestrator(Arc::clone(&remote), Connectivity::Online);
    let (_sub, events) = collect_events(&orch);

    orch.reconcile().await.unwrap();

    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(
      events.lock().unwrap().as_slice(),
      &[SyncEvent::ReconcileStart, SyncEvent::ReconcileEnd]
    );
  }

  #[tokio::test]
  async fn test_reconcile_flushes_queue_and_flags_cache() {
    let remote = fake_remote();
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Offline);
    orch.save("007", discovery("first")).await.unwrap();
    orch.save("012", discovery("second")).await.unwrap();
    let (_sub, events) = collect_events(&orch);

    orch.set_connectivity(Connectivity::Online).await;

    assert_eq!(store.count_pending_mutations().unwrap(), 0);
    assert!(store.read_cache_entry("007").unwrap().unwrap().synced);
    assert!(store.read_cache_entry("012").unwrap().unwrap().synced);
    assert_eq!(
      events.lock().unwrap().as_slice(),
      &[
        SyncEvent::Online,
        SyncEvent::ReconcileStart,
        SyncEvent::ReconcileSuccess { count: 2 },
        SyncEvent::ReconcileEnd,
      ]
    );
  }

  #[tokio::test]
  async fn test_reconcile_transmits_latest_snapshot_per_key() {
    let remote = fake_remote();
    let (orch, _store) = orchestrator(Arc::clone(&remote), Connectivity::Offline);
    orch.save("007", discovery("stale")).await.unwrap();
    orch.save("007", discovery("fresh")).await.unwrap();

    orch.set_connectivity(Connectivity::Online).await;

    let batch = remote.last_batch.lock().unwrap().clone().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch["007"].description.as_deref(), Some("fresh"));
    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_reconcile_failure_leaves_queue_untouched() {
    let remote = fake_remote();
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Offline);
    orch.save("007", discovery("grebe")).await.unwrap();
    remote.fail_push.store(true, std::sync::atomic::Ordering::SeqCst);
    let (_sub, events) = collect_events(&orch);

    orch.set_connectivity(Connectivity::Online).await;

    assert_eq!(store.count_pending_mutations().unwrap(), 1);
    let seen = events.lock().unwrap();
    assert!(matches!(seen[1], SyncEvent::ReconcileStart));
    assert!(matches!(seen[2], SyncEvent::ReconcileError { .. }));
    assert!(matches!(seen[3], SyncEvent::ReconcileEnd));
    assert!(!orch.is_reconciling());
  }

  #[tokio::test]
  async fn test_concurrent_reconcile_pushes_exactly_once() {
    let remote = fake_remote();
    remote.push_delay_ms.store(20, std::sync::atomic::Ordering::SeqCst);
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Offline);
    orch.save("007", discovery("grebe")).await.unwrap();
    orch.online.store(true, std::sync::atomic::Ordering::SeqCst);

    let (first, second) = tokio::join!(orch.reconcile(), orch.reconcile());
    first.unwrap();
    second.unwrap();

    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(store.count_pending_mutations().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_offline_transition_does_not_reconcile() {
    let remote = fake_remote();
    let (orch, store) = orchestrator(Arc::clone(&remote), Connectivity::Online);
    store.enqueue_mutation("007", &discovery("grebe")).unwrap();
    let (_sub, events) = collect_events(&orch);

    orch.set_connectivity(Connectivity::Offline).await;

    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(events.lock().unwrap().as_slice(), &[SyncEvent::Offline]);
  }

  #[tokio::test]
  async fn test_redundant_connectivity_report_is_ignored() {
    let remote = fake_remote();
    let (orch, _store) = orchestrator(remote, Connectivity::Online);
    let (_sub, events) = collect_events(&orch);

    orch.set_connectivity(Connectivity::Online).await;

    assert!(events.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_background_outcome_republishes_without_reconciling() {
    let remote = fake_remote();
    let (orch, _store) = orchestrator(Arc::clone(&remote), Connectivity::Online);
    let (_sub, events) = collect_events(&orch);

    orch.apply_background_outcome(&BackgroundOutcome::Flushed { count: 3 });
    orch.apply_background_outcome(&BackgroundOutcome::Idle);

    assert_eq!(remote.push_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(
      events.lock().unwrap().as_slice(),
      &[SyncEvent::ReconcileSuccess { count: 3 }]
    );
  }
}
