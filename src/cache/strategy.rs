//! Strategy selection for intercepted fetches.
//!
//! Each GET request is routed to exactly one of three strategies based on
//! its URL: network-first for volatile content, cache-first for immutable
//! assets and known third-party font/style origins, and
//! stale-while-revalidate for everything else. The offline document and the
//! single-flight guard used by cache-first dispatch also live here.

use crate::config::CacheConfig;
use crate::types::{RequestMeta, StoredResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Caching strategy for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Try the network, fall back to cache, then offline document.
    NetworkFirst,
    /// Serve from cache, populate on miss.
    CacheFirst,
    /// Serve stale immediately while revalidating in the background.
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network_first",
            Strategy::CacheFirst => "cache_first",
            Strategy::StaleWhileRevalidate => "stale_while_revalidate",
        }
    }
}

/// Routes URLs to strategies from precompiled pattern lists.
pub struct RouteTable {
    network_first_prefixes: Vec<String>,
    cache_first_extensions: Vec<String>,
    cache_first_origins: Vec<String>,
}

impl RouteTable {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            network_first_prefixes: config.network_first_prefixes.clone(),
            cache_first_extensions: config
                .cache_first_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            cache_first_origins: config.cache_first_origins.clone(),
        }
    }

    /// Select the strategy for a request. Network-priority patterns win over
    /// cache-priority patterns; everything else revalidates in place.
    pub fn select(&self, meta: &RequestMeta) -> Strategy {
        if self
            .network_first_prefixes
            .iter()
            .any(|prefix| meta.path.starts_with(prefix.as_str()))
        {
            return Strategy::NetworkFirst;
        }

        let extension = meta
            .path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext.to_lowercase());
        if extension.is_some_and(|ext| self.cache_first_extensions.contains(&ext)) {
            return Strategy::CacheFirst;
        }

        if meta
            .host
            .as_deref()
            .is_some_and(|host| self.cache_first_origins.iter().any(|o| o == host))
        {
            return Strategy::CacheFirst;
        }

        Strategy::StaleWhileRevalidate
    }
}

/// Minimal self-contained document served when network-first dispatch fails
/// with no cached fallback. Renders without further network access.
const OFFLINE_DOCUMENT: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
  body { font-family: system-ui, sans-serif; display: flex; align-items: center;
         justify-content: center; min-height: 100vh; margin: 0; background: #fafafa; }
  main { text-align: center; color: #333; }
  h1 { font-size: 1.5rem; }
</style>
</head>
<body>
<main>
  <h1>You are offline</h1>
  <p>This page is not available right now. Reconnect and try again.</p>
</main>
</body>
</html>
"#;

/// Build the synthesized offline response.
pub fn offline_response() -> StoredResponse {
    StoredResponse::new(503, OFFLINE_DOCUMENT.as_bytes().to_vec())
        .with_header("content-type", "text/html; charset=utf-8")
        .with_header("cache-control", "no-store")
}

/// Serializes concurrent fetches of the same URL so a cold cache-first miss
/// produces exactly one network fetch.
pub struct SingleFlight {
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the per-URL guard. Holders of the same URL run one at a time;
    /// distinct URLs do not contend.
    pub async fn acquire(&self, url: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the bookkeeping entry for a URL once its fetch settled.
    pub async fn release(&self, url: &str) {
        self.inflight.lock().await.remove(url);
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}
