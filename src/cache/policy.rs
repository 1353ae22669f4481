//! Static request classification.
//!
//! Every outgoing request is classified once, by method and target path,
//! before any cache or network work happens. First match wins.

use reqwest::Method;
use url::Url;

/// The four request-handling strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Pass through to the network untouched; never read or write any cache
  Bypass,
  /// Always fetch fresh; serving stale data for these is worse than failing
  NetworkOnly,
  /// Try the network, overwrite the cached copy on success, fall back to
  /// the cached copy on failure
  NetworkFirst,
  /// Serve the cached copy when present; fetch and cache only on miss
  CacheFirst,
}

/// User-owned mutable data: record and photo endpoints, session state,
/// per-user settings, sharing tokens, admin surfaces.
const VOLATILE_PATHS: &[&str] = &[
  "/api/discoveries",
  "/api/photo/",
  "/api/auth/",
  "/api/theme",
  "/api/share",
  "/api/admin",
  "/api/debug",
];

/// Reference data that changes rarely and is safe to serve stale.
const REFERENCE_PATHS: &[&str] = &["/api/birds"];

const ASSET_EXTENSIONS: &[&str] = &[
  ".js", ".css", ".html", ".png", ".jpg", ".jpeg", ".svg", ".ico", ".woff", ".woff2",
];

/// Classify a request. Precedence: non-read methods bypass everything,
/// volatile endpoints are network-only, reference data and the default
/// class are network-first, static assets are cache-first.
pub fn classify(method: &Method, url: &Url) -> Strategy {
  if *method != Method::GET {
    return Strategy::Bypass;
  }

  let path = url.path();
  if VOLATILE_PATHS.iter().any(|p| path.starts_with(p)) {
    return Strategy::NetworkOnly;
  }
  if REFERENCE_PATHS.iter().any(|p| path.starts_with(p)) {
    return Strategy::NetworkFirst;
  }
  if is_static_asset(path) {
    return Strategy::CacheFirst;
  }

  Strategy::NetworkFirst
}

fn is_static_asset(path: &str) -> bool {
  if path.starts_with("/static/") || path == "/manifest.json" {
    return true;
  }
  ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(path: &str) -> Url {
    Url::parse(&format!("https://fieldbook.example.org{path}")).unwrap()
  }

  #[test]
  fn test_non_get_bypasses_everything() {
    // Even a path that would otherwise be cache-first
    assert_eq!(
      classify(&Method::POST, &url("/static/app.js")),
      Strategy::Bypass
    );
    assert_eq!(
      classify(&Method::POST, &url("/api/discoveries")),
      Strategy::Bypass
    );
  }

  #[test]
  fn test_volatile_endpoints_are_network_only() {
    for path in [
      "/api/discoveries",
      "/api/discoveries/metadata",
      "/api/photo/12/34",
      "/api/auth/me",
      "/api/theme",
      "/api/share/token",
      "/api/admin/stats",
    ] {
      assert_eq!(classify(&Method::GET, &url(path)), Strategy::NetworkOnly);
    }
  }

  #[test]
  fn test_reference_data_is_network_first() {
    assert_eq!(classify(&Method::GET, &url("/api/birds")), Strategy::NetworkFirst);
  }

  #[test]
  fn test_static_assets_are_cache_first() {
    for path in [
      "/static/app.js",
      "/static/img/logo.png",
      "/vendor/leaflet.css",
      "/manifest.json",
    ] {
      assert_eq!(classify(&Method::GET, &url(path)), Strategy::CacheFirst);
    }
  }

  #[test]
  fn test_everything_else_defaults_to_network_first() {
    assert_eq!(classify(&Method::GET, &url("/")), Strategy::NetworkFirst);
    assert_eq!(
      classify(&Method::GET, &url("/share/abc123")),
      Strategy::NetworkFirst
    );
  }
}
