//! Strategy application: the layer between callers and the network.
//!
//! The engine never performs network I/O itself; callers inject a fetcher
//! closure per request. The fetcher resolves with a [`CachedResponse`] for
//! any completed exchange (including non-success statuses, like a browser
//! fetch) and errs only on transport failure.

use reqwest::Method;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CacheError, RemoteError};

use super::policy::{classify, Strategy};
use super::storage::{CachedResponse, ResponseCache};

/// Applies one of the four caching strategies to every request before its
/// result reaches the caller.
pub struct CachePolicyEngine {
  cache: Arc<ResponseCache>,
}

impl CachePolicyEngine {
  pub fn new(cache: ResponseCache) -> Self {
    Self {
      cache: Arc::new(cache),
    }
  }

  /// Handle one request under its classified strategy.
  pub async fn handle<F, Fut>(
    &self,
    method: &Method,
    url: &Url,
    fetch: F,
  ) -> Result<CachedResponse, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<CachedResponse, RemoteError>>,
  {
    match classify(method, url) {
      // Both pass straight through; the classification difference only
      // matters for what may NOT happen (no cache read, no cache write).
      Strategy::Bypass | Strategy::NetworkOnly => Ok(fetch().await?),
      Strategy::NetworkFirst => self.network_first(url, fetch).await,
      Strategy::CacheFirst => self.cache_first(url, fetch).await,
    }
  }

  /// Populate the precache partition from a fixed manifest. Failing to
  /// fetch any manifest entry fails the install.
  pub async fn install<F, Fut>(&self, manifest: &[String], mut fetch: F) -> Result<usize, CacheError>
  where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<CachedResponse, RemoteError>>,
  {
    let mut stored = 0;
    for url in manifest {
      let response = fetch(url).await?;
      if response.is_ok() {
        self.cache.put_precache(url, &response)?;
        stored += 1;
      } else {
        warn!(%url, status = response.status, "precache entry skipped");
      }
    }
    debug!(stored, "precache installed");
    Ok(stored)
  }

  /// Drop every cache partition built under another version tag.
  pub fn activate(&self) -> Result<usize, CacheError> {
    Ok(self.cache.activate()?)
  }

  async fn network_first<F, Fut>(&self, url: &Url, fetch: F) -> Result<CachedResponse, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<CachedResponse, RemoteError>>,
  {
    match fetch().await {
      Ok(response) => {
        if response.is_ok() {
          self.cache.put_runtime(url.as_str(), &response)?;
        }
        Ok(response)
      }
      Err(err) => {
        // Network failed; the most recent cached copy stands in if one
        // exists, else the original failure propagates.
        if let Some(cached) = self.cache.lookup(url.as_str())? {
          debug!(%url, "network failed, served cached copy");
          return Ok(cached);
        }
        Err(err.into())
      }
    }
  }

  async fn cache_first<F, Fut>(&self, url: &Url, fetch: F) -> Result<CachedResponse, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<CachedResponse, RemoteError>>,
  {
    if let Some(cached) = self.cache.lookup(url.as_str())? {
      return Ok(cached);
    }

    let response = fetch().await?;
    if response.is_ok() {
      self.cache.put_runtime(url.as_str(), &response)?;
    }
    Ok(response)
  }
}

impl Clone for CachePolicyEngine {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
    }
  }
}
