//! Error types for the Cirrus traffic-shaping pipeline.
//!
//! This module provides a unified error type [`CirrusError`] for all Cirrus
//! operations, along with a convenient [`Result`] type alias.
//!
//! Note that classification and policy decisions never surface here: they are
//! advisory annotations and degrade in place (see [`crate::dispatch::Advisory`]).
//! `CirrusError` covers the conditions that can actually prevent a response
//! from being produced or a subsystem from starting.
//!
//! # Error Categories
//!
//! - **Configuration**: invalid settings or unreadable config files
//! - **Gateway/Network**: bind, serve, and origin fetch errors
//! - **Cache**: partition store errors and the versioned-purge failure that
//!   legitimately stalls activation
//! - **Lifecycle**: operations attempted in the wrong lifecycle state
//!
//! # Example
//!
//! ```rust
//! use cirrus::error::{CirrusError, Result};
//!
//! fn check_origin(url: &str) -> Result<()> {
//!     if url.is_empty() {
//!         return Err(CirrusError::Config("origin URL cannot be empty".into()));
//!     }
//!     Ok(())
//! }
//!
//! fn handle(err: &CirrusError) {
//!     if err.is_retryable() {
//!         println!("Retrying...");
//!     } else {
//!         println!("Fatal: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Main error type for Cirrus operations.
#[derive(Error, Debug)]
pub enum CirrusError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Gateway and network errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Origin unavailable: {0}")]
    OriginUnavailable(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    // Prerender store errors
    #[error("Prerender store error: {0}")]
    PrerenderStore(String),

    // Cache errors
    #[error("Cache store error: {0}")]
    CacheStore(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Failed to purge stale partitions after {attempts} attempts: {reason}")]
    PurgeFailed { attempts: u32, reason: String },

    // Lifecycle errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CirrusError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CirrusError::Network(_)
                | CirrusError::OriginUnavailable(_)
                | CirrusError::Timeout(_)
                | CirrusError::PurgeFailed { .. }
        )
    }
}

impl From<serde_json::Error> for CirrusError {
    fn from(e: serde_json::Error) -> Self {
        CirrusError::Serialization(e.to_string())
    }
}

/// Result type alias for Cirrus operations.
pub type Result<T> = std::result::Result<T, CirrusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CirrusError::OriginUnavailable("down".into()).is_retryable());
        assert!(CirrusError::Timeout(5000).is_retryable());
        assert!(CirrusError::PurgeFailed {
            attempts: 3,
            reason: "store busy".into()
        }
        .is_retryable());

        assert!(!CirrusError::Config("bad".into()).is_retryable());
        assert!(!CirrusError::InvalidState("not active".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = CirrusError::PurgeFailed {
            attempts: 3,
            reason: "store busy".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("store busy"));
        assert!(msg.contains('3'));
    }
}
