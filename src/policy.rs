//! Resource delivery policy engine.
//!
//! Decides cache-control, priority hints, and preconnect targets per
//! resource category from device and connection signals. The engine is
//! stateless and side-effect free; it never inspects classification results,
//! and a decision failure degrades to pass-through rather than propagating.

use crate::config::PolicyConfig;
use crate::device::{ConnectionProfile, DeviceProfile};
use serde::{Deserialize, Serialize};

/// Coarse resource category, derived from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Html,
    Image,
    Font,
    ScriptOrStyle,
    Other,
}

impl ResourceCategory {
    /// Derive the category from a URL path.
    ///
    /// Extension-less paths are navigations and classify as HTML.
    pub fn from_path(path: &str) -> Self {
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = match file.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => return ResourceCategory::Html,
        };

        match ext.as_str() {
            "html" | "htm" => ResourceCategory::Html,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" => {
                ResourceCategory::Image
            }
            "woff" | "woff2" | "ttf" | "otf" | "eot" => ResourceCategory::Font,
            "js" | "mjs" | "css" => ResourceCategory::ScriptOrStyle,
            _ => ResourceCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Html => "html",
            ResourceCategory::Image => "image",
            ResourceCategory::Font => "font",
            ResourceCategory::ScriptOrStyle => "script_or_style",
            ResourceCategory::Other => "other",
        }
    }
}

/// A single delivery directive attached to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "directive")]
pub enum PolicyDirective {
    /// Preload a critical resource.
    Preload { path: String, as_kind: String },
    /// The client may be served a modern image format.
    ModernImageFormat,
    /// Recommend lazy-loading below-the-fold images.
    LazyLoad,
    /// Font may be fetched cross-origin.
    CrossOriginFont,
    /// Render text with fallback font while the webfont loads.
    SwapDisplay,
    /// Resource is on the critical path.
    Critical,
}

/// The full policy decision for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    /// Cache-control header value, if the policy sets one.
    pub cache_control: Option<String>,
    /// Priority hints and delivery markers.
    pub directives: Vec<PolicyDirective>,
    /// Origins worth preconnecting to.
    pub preconnect: Vec<String>,
}

impl PolicySet {
    /// The do-nothing policy: response passes through unchanged.
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn is_pass_through(&self) -> bool {
        self.cache_control.is_none() && self.directives.is_empty() && self.preconnect.is_empty()
    }
}

/// Preload `as` attribute for a resource path.
fn preload_kind(path: &str) -> &'static str {
    match ResourceCategory::from_path(path) {
        ResourceCategory::ScriptOrStyle if path.ends_with(".css") => "style",
        ResourceCategory::ScriptOrStyle => "script",
        ResourceCategory::Font => "font",
        ResourceCategory::Image => "image",
        _ => "fetch",
    }
}

/// Stateless policy engine.
pub struct ResourcePolicyEngine {
    config: PolicyConfig,
}

impl ResourcePolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Decide the delivery policy for one request.
    ///
    /// Rules are evaluated in priority order; the first matching rule wins
    /// per field. `accept` is the inbound Accept header, consulted only for
    /// the modern-image capability marker.
    pub fn decide(
        &self,
        category: ResourceCategory,
        path: &str,
        device: &DeviceProfile,
        connection: &ConnectionProfile,
        accept: Option<&str>,
    ) -> PolicySet {
        let immutable = format!(
            "public, max-age={}, immutable",
            self.config.immutable_max_age_secs
        );

        match category {
            ResourceCategory::Html => {
                let mut policy = PolicySet {
                    cache_control: Some("public, max-age=0, must-revalidate".to_string()),
                    ..Default::default()
                };
                if connection.is_slow() {
                    for critical in &self.config.critical_resources {
                        policy.directives.push(PolicyDirective::Preload {
                            path: critical.clone(),
                            as_kind: preload_kind(critical).to_string(),
                        });
                    }
                }
                if device.is_mobile() {
                    policy.preconnect = self.config.third_party_origins.clone();
                }
                policy
            }

            ResourceCategory::Image => {
                let mut policy = PolicySet {
                    cache_control: Some(immutable),
                    ..Default::default()
                };
                let accept_allows = accept
                    .is_some_and(|a| a.contains("image/webp") || a.contains("image/avif"));
                if device.supports_modern_images && accept_allows {
                    policy.directives.push(PolicyDirective::ModernImageFormat);
                }
                if connection.is_slow() {
                    policy.directives.push(PolicyDirective::LazyLoad);
                }
                policy
            }

            ResourceCategory::Font => PolicySet {
                cache_control: Some(immutable),
                directives: vec![PolicyDirective::CrossOriginFont, PolicyDirective::SwapDisplay],
                preconnect: Vec::new(),
            },

            ResourceCategory::ScriptOrStyle => {
                let mut policy = PolicySet {
                    cache_control: Some(immutable),
                    ..Default::default()
                };
                if self.config.critical_resources.iter().any(|p| p == path) {
                    policy.directives.push(PolicyDirective::Critical);
                }
                policy
            }

            ResourceCategory::Other => PolicySet::pass_through(),
        }
    }
}
