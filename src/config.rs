//! Configuration module for Cirrus.

use crate::error::{CirrusError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a Cirrus deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CirrusConfig {
    /// Edge gateway configuration.
    pub gateway: GatewayConfig,
    /// Classification engine configuration.
    pub classifier: ClassifierConfig,
    /// Resource policy configuration.
    pub policy: PolicyConfig,
    /// Client cache configuration.
    pub cache: CacheConfig,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl CirrusConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CirrusError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| CirrusError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.origin_url.is_empty() {
            return Err(CirrusError::InvalidConfig {
                field: "gateway.origin_url".to_string(),
                reason: "Origin URL must be set".to_string(),
            });
        }

        for (name, weight) in [
            ("classifier.signature_weight", self.classifier.signature_weight),
            ("classifier.network_weight", self.classifier.network_weight),
            ("classifier.accept_weight", self.classifier.accept_weight),
            ("classifier.header_weight", self.classifier.header_weight),
            ("classifier.prerender_weight", self.classifier.prerender_weight),
            ("classifier.referrer_weight", self.classifier.referrer_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(CirrusError::InvalidConfig {
                    field: name.to_string(),
                    reason: "Signal weights must be within [0, 1]".to_string(),
                });
            }
        }

        if !(0.0..=1.0).contains(&self.classifier.bot_threshold)
            || self.classifier.bot_threshold == 0.0
        {
            return Err(CirrusError::InvalidConfig {
                field: "classifier.bot_threshold".to_string(),
                reason: "Threshold must be within (0, 1]".to_string(),
            });
        }

        if self.cache.version.is_empty() {
            return Err(CirrusError::InvalidConfig {
                field: "cache.version".to_string(),
                reason: "Cache version tag must be non-empty".to_string(),
            });
        }

        if self.cache.max_entries_per_partition == 0 {
            return Err(CirrusError::InvalidConfig {
                field: "cache.max_entries_per_partition".to_string(),
                reason: "Partition entry cap must be non-zero".to_string(),
            });
        }

        for path in &self.cache.manifest {
            if !path.starts_with('/') {
                return Err(CirrusError::InvalidConfig {
                    field: "cache.manifest".to_string(),
                    reason: format!("Manifest paths must be absolute, got '{}'", path),
                });
            }
        }

        Ok(())
    }

    /// Create a minimal development configuration.
    pub fn development() -> Self {
        Self {
            gateway: GatewayConfig {
                bind_addr: "127.0.0.1:8080".parse().expect("valid socket address"),
                origin_url: "http://127.0.0.1:3000".to_string(),
                prerender_dir: None,
                fetch_timeout: Duration::from_secs(10),
            },
            classifier: ClassifierConfig::default(),
            policy: PolicyConfig::default(),
            cache: CacheConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Edge gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address to bind the edge gateway.
    pub bind_addr: SocketAddr,
    /// Base URL of the origin all requests are forwarded to.
    pub origin_url: String,
    /// Directory of prerendered documents, if substitution is enabled.
    pub prerender_dir: Option<PathBuf>,
    /// Timeout for origin fetches.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("valid socket address"),
            origin_url: String::new(),
            prerender_dir: None,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Classification engine configuration.
///
/// The weights and threshold preserve the tuned production values; treat
/// them as a unit when adjusting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Weight for a user-agent signature match.
    pub signature_weight: f64,
    /// Weight for a known bot network range match.
    pub network_weight: f64,
    /// Weight for a missing or non-HTML Accept header.
    pub accept_weight: f64,
    /// Weight for an incomplete browser header set.
    pub header_weight: f64,
    /// Weight for an explicit prerender query parameter.
    pub prerender_weight: f64,
    /// Weight for a missing referrer on a non-root path.
    pub referrer_weight: f64,
    /// Confidence at or above which a request is classified as a bot.
    pub bot_threshold: f64,
    /// Additional user-agent signatures beyond the built-in tables.
    pub extra_signatures: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            signature_weight: 0.8,
            network_weight: 0.7,
            accept_weight: 0.3,
            header_weight: 0.4,
            prerender_weight: 0.9,
            referrer_weight: 0.2,
            bot_threshold: 0.7,
            extra_signatures: Vec::new(),
        }
    }
}

/// Resource policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Critical shell resources, preloaded on slow connections and treated
    /// as critical scripts/styles.
    pub critical_resources: Vec<String>,
    /// Third-party origins worth preconnecting to on mobile.
    pub third_party_origins: Vec<String>,
    /// max-age for long-lived immutable assets, in seconds.
    pub immutable_max_age_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            critical_resources: vec![
                "/styles/main.css".to_string(),
                "/scripts/app.js".to_string(),
                "/fonts/inter-var.woff2".to_string(),
            ],
            third_party_origins: vec![
                "https://fonts.googleapis.com".to_string(),
                "https://fonts.gstatic.com".to_string(),
            ],
            immutable_max_age_secs: 31_536_000,
        }
    }
}

/// Client cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Deployment version tag; partitions from other versions are purged on
    /// activation.
    pub version: String,
    /// Prefix for partition names.
    pub partition_prefix: String,
    /// Paths fetched into the static partition during install.
    pub manifest: Vec<String>,
    /// Path prefixes dispatched network-first.
    pub network_first_prefixes: Vec<String>,
    /// File extensions dispatched cache-first.
    pub cache_first_extensions: Vec<String>,
    /// Third-party hosts dispatched cache-first (fonts, styles).
    pub cache_first_origins: Vec<String>,
    /// Maximum entries per partition before LRU eviction.
    pub max_entries_per_partition: usize,
    /// Attempts to purge a stale partition before activation stalls.
    pub purge_retry_attempts: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            partition_prefix: "cirrus".to_string(),
            manifest: vec![
                "/".to_string(),
                "/styles/main.css".to_string(),
                "/scripts/app.js".to_string(),
                "/fonts/inter-var.woff2".to_string(),
                "/images/logo.svg".to_string(),
                "/manifest.json".to_string(),
            ],
            network_first_prefixes: vec!["/api/".to_string(), "/generate".to_string()],
            cache_first_extensions: vec![
                "css", "js", "mjs", "woff", "woff2", "ttf", "otf", "png", "jpg", "jpeg", "gif",
                "webp", "avif", "svg", "ico",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            cache_first_origins: vec![
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
            ],
            max_entries_per_partition: 512,
            purge_retry_attempts: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,
    /// Emit JSON-formatted logs.
    pub json_logs: bool,
    /// Enable the Prometheus metrics server.
    pub metrics_enabled: bool,
    /// Address to bind the metrics server.
    pub metrics_addr: SocketAddr,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_addr: "127.0.0.1:9090".parse().expect("valid socket address"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config_is_valid() {
        let config = CirrusConfig::development();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_origin_rejected() {
        let config = CirrusConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("origin_url"));
    }

    #[test]
    fn test_weight_bounds_enforced() {
        let mut config = CirrusConfig::development();
        config.classifier.signature_weight = 1.5;
        assert!(config.validate().is_err());

        config.classifier.signature_weight = 0.8;
        config.classifier.bot_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_manifest_paths_must_be_absolute() {
        let mut config = CirrusConfig::development();
        config.cache.manifest.push("styles/extra.css".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = CirrusConfig::development();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CirrusConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cache.version, config.cache.version);
        assert_eq!(
            parsed.classifier.bot_threshold,
            config.classifier.bot_threshold
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: CirrusConfig =
            serde_json::from_str(r#"{"gateway": {"bind_addr": "127.0.0.1:8088", "origin_url": "http://o", "prerender_dir": null, "fetch_timeout": "5s"}}"#)
                .unwrap();
        assert_eq!(parsed.gateway.fetch_timeout, Duration::from_secs(5));
        assert_eq!(parsed.cache.partition_prefix, "cirrus");
        assert!((parsed.classifier.signature_weight - 0.8).abs() < f64::EPSILON);
    }
}
