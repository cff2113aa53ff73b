//! Shared test fixtures for integration tests.

use async_trait::async_trait;
use cirrus::dispatch::Origin;
use cirrus::error::{CirrusError, Result};
use cirrus::types::{RequestMeta, StoredResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory origin for tests: a path→response map with an offline toggle
/// and a fetch counter.
pub struct TestOrigin {
    responses: RwLock<HashMap<String, StoredResponse>>,
    offline: AtomicBool,
    fetches: AtomicUsize,
}

impl TestOrigin {
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    pub async fn insert(&self, path: &str, response: StoredResponse) {
        self.responses
            .write()
            .await
            .insert(path.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for TestOrigin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Origin for TestOrigin {
    async fn fetch(&self, meta: &RequestMeta) -> Result<StoredResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(CirrusError::OriginUnavailable("origin offline".into()));
        }
        self.responses
            .read()
            .await
            .get(&meta.path)
            .cloned()
            .ok_or_else(|| CirrusError::OriginUnavailable(format!("no route for {}", meta.path)))
    }
}

/// A request with the ordinary desktop browser header set.
pub fn browser_request(path: &str) -> RequestMeta {
    RequestMeta::get(path)
        .with_header(
            "user-agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        )
        .with_header("accept", "text/html,application/xhtml+xml")
        .with_header("accept-language", "en-US,en;q=0.9")
        .with_header("accept-encoding", "gzip, deflate, br")
        .with_header("cache-control", "max-age=0")
        .with_header("referer", "https://example.com/")
}
