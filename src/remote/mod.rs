//! Remote authority: the entity-collection endpoints.
//!
//! The sync layer consumes a deliberately narrow surface (fetch the full
//! mapping, push a partial mapping) behind the [`Remote`] trait so both
//! reconciliation contexts can be exercised against fakes.

mod client;

pub use client::HttpRemote;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::RemoteError;
use crate::records::Discovery;

/// The remote authority as seen by this layer.
#[async_trait]
pub trait Remote: Send + Sync {
  /// Fetch the full current entity mapping.
  async fn fetch_all(&self) -> Result<HashMap<String, Discovery>, RemoteError>;

  /// Upsert the given keys server-side. Used identically by the direct
  /// save path and the batched reconciliation path.
  async fn push(&self, entries: &HashMap<String, Discovery>) -> Result<(), RemoteError>;
}
