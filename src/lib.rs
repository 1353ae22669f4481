//! Offline-first sync and caching layer for field sighting records.
//!
//! Users keep creating and editing discoveries while disconnected; this
//! crate reconciles that local state with the remote authority once
//! connectivity returns. Three subsystems cooperate:
//!
//! - [`store`]: a transactional SQLite store holding the discovery cache
//!   and the ordered queue of unsynchronized mutations.
//! - [`cache`]: request interception; every outgoing request is classified
//!   and served under one of four caching strategies.
//! - [`sync`]: the online/offline state machine pages talk to, plus the
//!   detached background reconciler triggered by deferred retries.
//!
//! The page-side [`sync::SyncOrchestrator`] and the detached
//! [`sync::BackgroundReconciler`] share no in-process state; they
//! coordinate only through the store's transactions and a broadcast
//! channel.

pub mod cache;
pub mod config;
pub mod error;
pub mod records;
pub mod remote;
pub mod store;
pub mod sync;

pub use cache::{CachePolicyEngine, CachedResponse, ResponseCache, Strategy};
pub use config::Config;
pub use error::{CacheError, ConfigError, RemoteError, StoreError};
pub use records::{Coordinates, Discovery, DiscoveryMap, Observation, Sex};
pub use remote::{HttpRemote, Remote};
pub use store::LocalStore;
pub use sync::{
  BackgroundOutcome, BackgroundReconciler, Connectivity, LoadResult, RetryHandle, Source,
  Subscription, SyncEvent, SyncOrchestrator,
};
