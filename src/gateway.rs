//! Edge gateway server.
//!
//! Runs the [`EdgeDispatcher`] as an HTTP service: every inbound request is
//! converted to [`RequestMeta`] at the boundary, dispatched through the
//! classification/policy/prerender pipeline, and forwarded to the configured
//! origin.

use crate::classify::ClassificationEngine;
use crate::config::{ClassifierConfig, GatewayConfig, PolicyConfig};
use crate::dispatch::{EdgeDispatcher, FilePrerenderStore, Origin};
use crate::error::{CirrusError, Result};
use crate::policy::ResourcePolicyEngine;
use crate::types::{RequestMeta, StoredResponse};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared state for gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    dispatcher: Arc<EdgeDispatcher>,
    origin: Arc<dyn Origin>,
}

/// Origin fetcher backed by an upstream HTTP server.
pub struct HttpOrigin {
    base: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpOrigin {
    /// Create a fetcher for the given base URL with a per-request timeout.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CirrusError::Config(format!("Failed to build origin client: {}", e)))?;

        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    fn target_url(&self, meta: &RequestMeta) -> String {
        let mut url = format!("{}{}", self.base, meta.path);
        if !meta.query.is_empty() {
            let qs: Vec<String> = meta
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            url.push('?');
            url.push_str(&qs.join("&"));
        }
        url
    }
}

/// Hop-by-hop headers never forwarded upstream.
const HOP_HEADERS: &[&str] = &["connection", "host", "content-length", "transfer-encoding"];

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, meta: &RequestMeta) -> Result<StoredResponse> {
        let method = reqwest::Method::from_bytes(meta.method.as_bytes())
            .map_err(|e| CirrusError::OriginUnavailable(format!("invalid method: {}", e)))?;

        let mut request = self.client.request(method, self.target_url(meta));
        for (name, value) in &meta.headers {
            if !HOP_HEADERS.contains(&name.as_str()) {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CirrusError::Timeout(self.timeout.as_millis() as u64)
            } else {
                CirrusError::OriginUnavailable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut stored = StoredResponse::new(status, Vec::new());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                stored.set_header(name.as_str(), value);
            }
        }
        stored.body = response
            .bytes()
            .await
            .map_err(|e| CirrusError::OriginUnavailable(e.to_string()))?
            .to_vec();

        Ok(stored)
    }
}

/// Convert an inbound axum request into normalized request metadata.
fn request_meta_from(req: &Request) -> RequestMeta {
    let mut meta = RequestMeta::new(req.method().as_str(), req.uri().path());

    meta.query = req
        .uri()
        .query()
        .map(RequestMeta::parse_query)
        .unwrap_or_default();

    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            meta.headers
                .insert(name.as_str().to_lowercase(), value.to_string());
        }
    }

    meta.host = req
        .uri()
        .host()
        .map(str::to_string)
        .or_else(|| meta.header("host").map(str::to_string));

    meta.scheme = meta
        .header("x-forwarded-proto")
        .unwrap_or("http")
        .to_string();

    // Prefer the first proxy-forwarded address, matching upstream CDN setups.
    meta.remote_addr = meta
        .header("x-forwarded-for")
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .or_else(|| meta.header("x-real-ip").map(str::to_string));

    meta
}

/// Convert a stored response into an axum response.
fn into_axum_response(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &stored.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(stored.body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

/// Handle one inbound request through the dispatch pipeline.
async fn handle_request(State(state): State<GatewayState>, req: Request) -> Response {
    let meta = request_meta_from(&req);

    match state.dispatcher.dispatch(&meta, state.origin.as_ref()).await {
        Ok(outcome) => into_axum_response(outcome.response),
        Err(e) => {
            warn!(path = %meta.path, error = %e, "Dispatch failed");
            (StatusCode::BAD_GATEWAY, format!("upstream error: {}", e)).into_response()
        }
    }
}

/// Run the edge gateway server.
pub async fn run_edge_gateway(
    gateway: GatewayConfig,
    classifier: ClassifierConfig,
    policy: PolicyConfig,
) -> Result<()> {
    info!("Starting edge gateway");

    let mut dispatcher = EdgeDispatcher::new(
        ClassificationEngine::new(classifier),
        ResourcePolicyEngine::new(policy),
    );
    if let Some(dir) = &gateway.prerender_dir {
        info!(dir = %dir.display(), "Prerender substitution enabled");
        dispatcher = dispatcher.with_prerender_store(Arc::new(FilePrerenderStore::new(dir)));
    }

    let origin = HttpOrigin::new(&gateway.origin_url, gateway.fetch_timeout)?;
    let state = GatewayState {
        dispatcher: Arc::new(dispatcher),
        origin: Arc::new(origin),
    };

    let app = Router::new().fallback(handle_request).with_state(state);

    let listener = TcpListener::bind(gateway.bind_addr).await?;
    info!(addr = %gateway.bind_addr, origin = %gateway.origin_url, "Edge gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .map_err(|e| CirrusError::Network(e.to_string()))?;

    Ok(())
}
