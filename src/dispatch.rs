//! Edge request dispatcher.
//!
//! Per-request orchestration: classify the caller, attach the resource
//! policy, optionally substitute a prerendered variant for crawlers that
//! cannot execute client-side rendering, and forward the (augmented)
//! response.
//!
//! The dispatcher walks a fixed state machine per request:
//!
//! ```text
//! RECEIVED → CLASSIFIED → POLICY_ATTACHED → (PRERENDER_ATTEMPTED | SKIPPED) → RESPONDED
//! ```
//!
//! Classification and policy are advisory: they annotate the response but a
//! failure in either must never prevent a response from being returned. The
//! [`Advisory`] type makes that contract explicit — consumers get a definite
//! value plus an optional degradation note, and cannot mistake the note for
//! a blocking decision. The only failing path is an origin fetch with no
//! substitute.

use crate::classify::{AgentClassification, AgentKind, ClassificationEngine};
use crate::device::{ConnectionProfile, DeviceProfile};
use crate::error::{CirrusError, Result};
use crate::observability;
use crate::policy::{PolicyDirective, PolicySet, ResourceCategory, ResourcePolicyEngine};
use crate::types::{RequestMeta, StoredResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A definite value carrying an optional best-effort degradation note.
///
/// The value is always usable; `degraded` records why it fell back to a
/// default, for logging and response annotation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advisory<T> {
    /// The decided value.
    pub value: T,
    /// Why the value is a fallback, if it is one.
    pub degraded: Option<String>,
}

impl<T> Advisory<T> {
    /// A value decided normally.
    pub fn applied(value: T) -> Self {
        Self {
            value,
            degraded: None,
        }
    }

    /// A fallback value with the reason it was needed.
    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            degraded: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Dispatch state machine phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    Received,
    Classified,
    PolicyAttached,
    PrerenderAttempted,
    Skipped,
    Responded,
}

/// Upstream the edge tier forwards requests to.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetch the response for a request from the origin.
    async fn fetch(&self, meta: &RequestMeta) -> Result<StoredResponse>;
}

/// Source of statically prerendered documents.
#[async_trait]
pub trait PrerenderStore: Send + Sync {
    /// Look up the prerendered variant for a path. `Ok(None)` means no
    /// variant exists; `Err` means the store itself failed.
    async fn lookup(&self, path: &str) -> Result<Option<StoredResponse>>;
}

/// Prerendered documents laid out on disk, one directory per path with an
/// `index.html` inside (`/pricing` → `<root>/pricing/index.html`).
pub struct FilePrerenderStore {
    root: PathBuf,
}

impl FilePrerenderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn variant_path(&self, path: &str) -> Option<PathBuf> {
        // Normalize and refuse traversal outside the store root.
        let trimmed = path.trim_matches('/');
        if trimmed.split('/').any(|seg| seg == "..") {
            return None;
        }
        let mut file = self.root.clone();
        if !trimmed.is_empty() {
            file.push(trimmed);
        }
        file.push("index.html");
        Some(file)
    }
}

#[async_trait]
impl PrerenderStore for FilePrerenderStore {
    async fn lookup(&self, path: &str) -> Result<Option<StoredResponse>> {
        let Some(file) = self.variant_path(path) else {
            return Ok(None);
        };

        match tokio::fs::read(&file).await {
            Ok(body) => Ok(Some(
                StoredResponse::new(200, body)
                    .with_header("content-type", "text/html; charset=utf-8"),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CirrusError::PrerenderStore(format!(
                "{}: {}",
                file.display(),
                e
            ))),
        }
    }
}

/// Dispatcher statistics.
#[derive(Default)]
pub struct DispatchStats {
    requests: AtomicU64,
    bots_detected: AtomicU64,
    prerender_served: AtomicU64,
    prerender_fallback: AtomicU64,
}

/// Statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchStatsSnapshot {
    pub requests: u64,
    pub bots_detected: u64,
    pub prerender_served: u64,
    pub prerender_fallback: u64,
}

/// Outcome of dispatching one request.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// The response to return, headers already augmented.
    pub response: StoredResponse,
    /// Advisory classification annotation.
    pub classification: Advisory<AgentClassification>,
    /// Advisory policy annotation.
    pub policy: Advisory<PolicySet>,
    /// Whether a prerendered variant was substituted.
    pub prerendered: bool,
    /// Final phase; always `Responded` on success.
    pub phase: DispatchPhase,
}

/// Per-request orchestrator for the edge tier.
///
/// Holds only immutable engines and counters; every invocation is an
/// isolated, stateless pass over one request.
pub struct EdgeDispatcher {
    classifier: ClassificationEngine,
    policy: ResourcePolicyEngine,
    prerender: Option<Arc<dyn PrerenderStore>>,
    stats: DispatchStats,
}

impl EdgeDispatcher {
    pub fn new(classifier: ClassificationEngine, policy: ResourcePolicyEngine) -> Self {
        Self {
            classifier,
            policy,
            prerender: None,
            stats: DispatchStats::default(),
        }
    }

    /// Attach a prerender store, enabling substitution for crawlers.
    pub fn with_prerender_store(mut self, store: Arc<dyn PrerenderStore>) -> Self {
        self.prerender = Some(store);
        self
    }

    /// Dispatch one request.
    ///
    /// Classification, policy, and prerender substitution are all advisory;
    /// the only error this returns is an origin failure with no substitute
    /// response available.
    pub async fn dispatch(
        &self,
        meta: &RequestMeta,
        origin: &dyn Origin,
    ) -> Result<DispatchOutcome> {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        let mut phase = DispatchPhase::Received;
        debug!(phase = ?phase, method = %meta.method, path = %meta.path, "Request received");

        let classification = Advisory::applied(self.classifier.classify(meta));
        phase = DispatchPhase::Classified;
        if classification.value.is_bot {
            self.stats.bots_detected.fetch_add(1, Ordering::Relaxed);
        }
        observability::record_classification(
            classification.value.kind.as_str(),
            classification.value.is_bot,
        );
        debug!(
            phase = ?phase,
            path = %meta.path,
            is_bot = classification.value.is_bot,
            kind = classification.value.kind.as_str(),
            confidence = classification.value.confidence,
            "Request classified"
        );

        let device = DeviceProfile::detect(meta);
        let connection = ConnectionProfile::detect(meta);
        let policy = if meta.path.starts_with('/') {
            let category = ResourceCategory::from_path(&meta.path);
            Advisory::applied(self.policy.decide(
                category,
                &meta.path,
                &device,
                &connection,
                meta.accept(),
            ))
        } else {
            // Malformed path: apply the default pass-through policy.
            warn!(path = %meta.path, "Unusable request path, policy passes through");
            Advisory::fallback(PolicySet::pass_through(), "unusable request path")
        };
        phase = DispatchPhase::PolicyAttached;

        let mut prerendered = false;
        let mut response = None;

        let eligible = matches!(
            classification.value.kind,
            AgentKind::SearchEngine | AgentKind::SocialMedia
        );
        if eligible && meta.is_get() {
            if let Some(store) = &self.prerender {
                phase = DispatchPhase::PrerenderAttempted;
                match store.lookup(&meta.path).await {
                    Ok(Some(doc)) => {
                        self.stats.prerender_served.fetch_add(1, Ordering::Relaxed);
                        observability::record_prerender(true);
                        prerendered = true;
                        response = Some(doc);
                    }
                    Ok(None) => {
                        debug!(path = %meta.path, "No prerendered variant, serving origin");
                    }
                    Err(e) => {
                        // Substitution failure must not fail the request.
                        self.stats
                            .prerender_fallback
                            .fetch_add(1, Ordering::Relaxed);
                        observability::record_prerender(false);
                        warn!(path = %meta.path, error = %e, "Prerender lookup failed, serving origin");
                    }
                }
            }
        }
        if phase == DispatchPhase::PolicyAttached {
            phase = DispatchPhase::Skipped;
        }

        let mut response = match response {
            Some(doc) => doc,
            None => origin.fetch(meta).await?,
        };

        self.augment(
            &mut response,
            &classification.value,
            &policy.value,
            &device,
            &connection,
        );
        debug!(phase = ?phase, prerendered, status = response.status, "Responding");

        Ok(DispatchOutcome {
            response,
            classification,
            policy,
            prerendered,
            phase: DispatchPhase::Responded,
        })
    }

    /// Attach classification and policy metadata to the response. All
    /// headers written here are advisory for downstream consumers.
    fn augment(
        &self,
        response: &mut StoredResponse,
        classification: &AgentClassification,
        policy: &PolicySet,
        device: &DeviceProfile,
        connection: &ConnectionProfile,
    ) {
        response.set_header(
            "bot-detected",
            if classification.is_bot { "true" } else { "false" },
        );
        response.set_header("bot-type", classification.kind.as_str());
        response.set_header("bot-confidence", &format!("{:.2}", classification.confidence));
        response.set_header("device-class", device.class.as_str());
        response.set_header("connection-class", connection.class.as_str());

        if let Some(cc) = &policy.cache_control {
            response.set_header("cache-control", cc);
        }

        let mut links: Vec<String> = Vec::new();
        for directive in &policy.directives {
            match directive {
                PolicyDirective::Preload { path, as_kind } => {
                    links.push(format!("<{}>; rel=preload; as={}", path, as_kind));
                }
                PolicyDirective::ModernImageFormat => {
                    response.set_header("accept-modern-images", "true");
                }
                PolicyDirective::LazyLoad => {
                    response.set_header("lazy-load", "recommended");
                }
                PolicyDirective::CrossOriginFont => {
                    response.set_header("access-control-allow-origin", "*");
                }
                PolicyDirective::SwapDisplay => {
                    response.set_header("font-display", "swap");
                }
                PolicyDirective::Critical => {
                    response.set_header("resource-critical", "true");
                }
            }
        }
        for origin in &policy.preconnect {
            links.push(format!("<{}>; rel=preconnect", origin));
        }
        if !links.is_empty() {
            response.set_header("link", &links.join(", "));
        }
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            requests: self.stats.requests.load(Ordering::Relaxed),
            bots_detected: self.stats.bots_detected.load(Ordering::Relaxed),
            prerender_served: self.stats.prerender_served.load(Ordering::Relaxed),
            prerender_fallback: self.stats.prerender_fallback.load(Ordering::Relaxed),
        }
    }
}
