//! Deferred work queue.
//!
//! Requests that fail while the client is offline are queued here and
//! replayed, in enqueue order, when the reconnect signal fires. Successful
//! items are removed; failed items stay queued for the next signal. There is
//! no backoff schedule and no implicit expiry.

use crate::dispatch::Origin;
use crate::observability;
use crate::types::RequestMeta;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

/// A queued request that failed while offline.
#[derive(Debug, Clone)]
pub struct DeferredWorkItem {
    /// The request to replay.
    pub request: RequestMeta,
    /// When the item was enqueued.
    pub queued_at: DateTime<Utc>,
    /// Replay attempts so far.
    pub attempts: u32,
}

/// Result of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Items that succeeded and were removed.
    pub replayed: usize,
    /// Items that failed again and remain queued.
    pub retained: usize,
}

/// FIFO queue of deferred work, replayed on the reconnect signal.
pub struct DeferredQueue {
    items: RwLock<VecDeque<DeferredWorkItem>>,
    reconnect: Notify,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(VecDeque::new()),
            reconnect: Notify::new(),
        }
    }

    /// Queue a request for replay on the next reconnect signal.
    pub async fn enqueue(&self, request: RequestMeta) {
        observability::record_deferred_enqueued();
        debug!(path = %request.path, "Deferred request queued");
        self.items.write().await.push_back(DeferredWorkItem {
            request,
            queued_at: Utc::now(),
            attempts: 0,
        });
    }

    /// Number of queued items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Check if the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Fire the reconnect signal. Carries no payload; the listener replays
    /// the queue.
    pub fn signal_reconnect(&self) {
        self.reconnect.notify_one();
    }

    /// Replay all queued items against the network in enqueue order.
    ///
    /// Items enqueued while a replay pass runs are not replayed until the
    /// next signal, and failed items keep their position ahead of them.
    pub async fn replay(&self, origin: &dyn Origin) -> ReplayReport {
        let pending: Vec<DeferredWorkItem> = {
            let mut items = self.items.write().await;
            items.drain(..).collect()
        };

        if pending.is_empty() {
            return ReplayReport::default();
        }

        let mut report = ReplayReport::default();
        let mut retained: Vec<DeferredWorkItem> = Vec::new();

        for mut item in pending {
            match origin.fetch(&item.request).await {
                Ok(_) => {
                    report.replayed += 1;
                }
                Err(e) => {
                    debug!(path = %item.request.path, error = %e, "Deferred replay failed, retaining");
                    item.attempts += 1;
                    retained.push(item);
                    report.retained += 1;
                }
            }
        }

        if !retained.is_empty() {
            let mut items = self.items.write().await;
            for item in retained.into_iter().rev() {
                items.push_front(item);
            }
        }

        observability::record_deferred_replay(report.replayed, report.retained);
        info!(
            replayed = report.replayed,
            retained = report.retained,
            "Deferred work replay complete"
        );
        report
    }

    /// Run the reconnect listener: replay the queue each time the signal
    /// fires. Intended to be spawned once per client context.
    pub async fn run_listener(self: Arc<Self>, origin: Arc<dyn Origin>) {
        loop {
            self.reconnect.notified().await;
            self.replay(origin.as_ref()).await;
        }
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CirrusError, Result};
    use crate::types::StoredResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// Origin that records fetch order and can be toggled offline.
    struct RecordingOrigin {
        offline: AtomicBool,
        fetched: Mutex<Vec<String>>,
    }

    impl RecordingOrigin {
        fn new(offline: bool) -> Self {
            Self {
                offline: AtomicBool::new(offline),
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Origin for RecordingOrigin {
        async fn fetch(&self, meta: &RequestMeta) -> Result<StoredResponse> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(CirrusError::OriginUnavailable("offline".into()));
            }
            self.fetched.lock().await.push(meta.path.clone());
            Ok(StoredResponse::new(200, vec![]))
        }
    }

    #[tokio::test]
    async fn test_replay_in_enqueue_order() {
        let queue = DeferredQueue::new();
        for path in ["/api/a", "/api/b", "/api/c"] {
            queue.enqueue(RequestMeta::new("POST", path)).await;
        }

        let origin = RecordingOrigin::new(false);
        let report = queue.replay(&origin).await;

        assert_eq!(report.replayed, 3);
        assert_eq!(report.retained, 0);
        assert!(queue.is_empty().await);
        assert_eq!(
            *origin.fetched.lock().await,
            vec!["/api/a", "/api/b", "/api/c"]
        );
    }

    #[tokio::test]
    async fn test_failed_items_retained_in_order() {
        let queue = DeferredQueue::new();
        queue.enqueue(RequestMeta::new("POST", "/api/a")).await;
        queue.enqueue(RequestMeta::new("POST", "/api/b")).await;

        let origin = RecordingOrigin::new(true);
        let report = queue.replay(&origin).await;

        assert_eq!(report.replayed, 0);
        assert_eq!(report.retained, 2);
        assert_eq!(queue.len().await, 2);

        // Back online: the retained items replay in their original order.
        origin.offline.store(false, Ordering::SeqCst);
        let report = queue.replay(&origin).await;
        assert_eq!(report.replayed, 2);
        assert_eq!(*origin.fetched.lock().await, vec!["/api/a", "/api/b"]);

        let items = queue.items.read().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_attempts_counted_no_expiry() {
        let queue = DeferredQueue::new();
        queue.enqueue(RequestMeta::new("POST", "/api/a")).await;

        let origin = RecordingOrigin::new(true);
        queue.replay(&origin).await;
        queue.replay(&origin).await;
        queue.replay(&origin).await;

        let items = queue.items.read().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_empty_replay_is_noop() {
        let queue = DeferredQueue::new();
        let origin = RecordingOrigin::new(false);
        assert_eq!(queue.replay(&origin).await, ReplayReport::default());
    }

    #[tokio::test]
    async fn test_reconnect_listener_drains_queue() {
        let queue = Arc::new(DeferredQueue::new());
        queue.enqueue(RequestMeta::new("POST", "/api/a")).await;

        let origin: Arc<RecordingOrigin> = Arc::new(RecordingOrigin::new(false));
        let listener = tokio::spawn(
            Arc::clone(&queue).run_listener(Arc::clone(&origin) as Arc<dyn Origin>),
        );

        queue.signal_reconnect();

        // Wait for the listener to drain the queue.
        for _ in 0..100 {
            if queue.is_empty().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(queue.is_empty().await);
        listener.abort();
    }
}
