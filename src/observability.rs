//! Observability module for Cirrus.
//!
//! Provides logging initialization, metrics registration, and the
//! Prometheus metrics server.

use crate::config::ObservabilityConfig;
use crate::error::{CirrusError, Result};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize observability (logging).
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| CirrusError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| CirrusError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Run the Prometheus metrics server.
pub async fn run_metrics_server(config: ObservabilityConfig) -> Result<()> {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .map_err(|e| CirrusError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();

    let app = axum::Router::new()
        .route(
            "/metrics",
            axum::routing::get(move || async move { handle.render() }),
        )
        .route("/health", axum::routing::get(|| async { "OK" }));

    let listener = TcpListener::bind(config.metrics_addr).await?;
    info!(addr = %config.metrics_addr, "Metrics server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| CirrusError::Network(e.to_string()))?;

    Ok(())
}

/// Register standard metrics.
fn register_metrics() {
    // Edge tier
    counter!("cirrus_requests_total").absolute(0);
    counter!("cirrus_bots_detected_total").absolute(0);
    counter!("cirrus_prerender_served_total").absolute(0);
    counter!("cirrus_prerender_fallback_total").absolute(0);

    // Client cache tier
    counter!("cirrus_strategy_hits_total").absolute(0);
    counter!("cirrus_strategy_misses_total").absolute(0);
    counter!("cirrus_offline_documents_total").absolute(0);
    counter!("cirrus_partitions_purged_total").absolute(0);

    // Deferred work
    counter!("cirrus_deferred_enqueued_total").absolute(0);
    counter!("cirrus_deferred_replayed_total").absolute(0);
    counter!("cirrus_deferred_retained_total").absolute(0);
}

/// Record a classification decision.
pub fn record_classification(kind: &str, is_bot: bool) {
    counter!("cirrus_requests_total", "kind" => kind.to_string()).increment(1);
    if is_bot {
        counter!("cirrus_bots_detected_total").increment(1);
    }
}

/// Record a prerender substitution attempt.
pub fn record_prerender(served: bool) {
    if served {
        counter!("cirrus_prerender_served_total").increment(1);
    } else {
        counter!("cirrus_prerender_fallback_total").increment(1);
    }
}

/// Record a cache strategy dispatch.
pub fn record_strategy(strategy: &str, hit: bool) {
    if hit {
        counter!("cirrus_strategy_hits_total", "strategy" => strategy.to_string()).increment(1);
    } else {
        counter!("cirrus_strategy_misses_total", "strategy" => strategy.to_string()).increment(1);
    }
}

/// Record a synthesized offline document.
pub fn record_offline_document() {
    counter!("cirrus_offline_documents_total").increment(1);
}

/// Record purged stale partitions.
pub fn record_partitions_purged(count: usize) {
    counter!("cirrus_partitions_purged_total").increment(count as u64);
}

/// Record a deferred-work enqueue.
pub fn record_deferred_enqueued() {
    counter!("cirrus_deferred_enqueued_total").increment(1);
}

/// Record a deferred-work replay pass.
pub fn record_deferred_replay(replayed: usize, retained: usize) {
    counter!("cirrus_deferred_replayed_total").increment(replayed as u64);
    counter!("cirrus_deferred_retained_total").increment(retained as u64);
}
