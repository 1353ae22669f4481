//! Request-interception caching.
//!
//! Every outgoing request the application issues is classified once and run
//! under one of four strategies ([`CachePolicyEngine`]):
//! bypass, network-only, network-first with cache fallback, or cache-first.
//! Opportunistic writes land in a runtime partition separate from the
//! install-time precache; partitions are evicted wholesale when a new
//! version activates.

mod layer;
mod policy;
mod storage;

pub use layer::CachePolicyEngine;
pub use policy::{classify, Strategy};
pub use storage::{CachedResponse, ResponseCache};
