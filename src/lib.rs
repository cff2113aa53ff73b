//! Cirrus - an edge traffic-shaping and caching pipeline.
//!
//! Cirrus decides, per request, *who is asking* (human or automated agent),
//! *what kind of resource* is requested, and *which caching/delivery
//! strategy* applies - then executes that strategy with correct fallback and
//! eviction behavior.
//!
//! # Features
//!
//! - **Request Classification**: heuristic bot detection with additive
//!   confidence scoring and typed agent kinds.
//! - **Resource Policy**: per-category cache-control, preload, and
//!   preconnect decisions from device and connection signals.
//! - **Edge Dispatch**: advisory classification/policy annotation and
//!   prerender substitution for crawlers, with silent fallback.
//! - **Client Cache Manager**: named versioned partitions, three dispatch
//!   strategies, offline fallback, and a deferred-work queue.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Cirrus                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Edge Tier: Classification │ Resource Policy │ Dispatcher   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Gateway: HTTP boundary | Origin fetcher | Prerender store  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Client Tier: Partitions │ Strategies │ Deferred Work       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The edge tier is stateless per request; the client tier owns the only
//! cross-invocation state (versioned partitions), mutated exactly once
//! during activation.
//!
//! # Quick Start
//!
//! ```no_run
//! use cirrus::config::CirrusConfig;
//!
//! #[tokio::main]
//! async fn main() -> cirrus::Result<()> {
//!     let config = CirrusConfig::development();
//!     cirrus::run(config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod cache;
pub mod classify;
pub mod device;
pub mod dispatch;
pub mod gateway;
pub mod policy;

pub mod cli;
pub mod observability;

// Re-exports
pub use error::{CirrusError, Result};
pub use types::{RequestMeta, StoredResponse};

use config::CirrusConfig;
use tracing::{error, info};

/// Run the Cirrus edge gateway with the given configuration.
pub async fn run(config: CirrusConfig) -> Result<()> {
    info!("Starting Cirrus edge gateway");

    // Initialize observability
    observability::init(&config.observability)?;

    if config.observability.metrics_enabled {
        info!("Starting metrics server on {}", config.observability.metrics_addr);
        let obs_config = config.observability.clone();

        tokio::spawn(async move {
            if let Err(e) = observability::run_metrics_server(obs_config).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    gateway::run_edge_gateway(config.gateway, config.classifier, config.policy).await?;

    info!("Cirrus shutdown complete");
    Ok(())
}
