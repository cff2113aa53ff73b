//! Request Classification
//!
//! This module decides, per request, whether traffic originates from an
//! automated agent and which kind. Classification is a pure function of the
//! request metadata: six weighted signals accumulate an additive confidence
//! score, and a request is a bot once the score crosses the configured
//! threshold or a high-certainty signal fires.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Classification Engine                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Signature Table (RegexSet) │ Network Ranges (prefix trie)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Signals: signature, network, accept, header set,           │
//! │           prerender parameter, referrer                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Output: is_bot, confidence, kind, reasons                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine holds only immutable precompiled tables, so classification is
//! deterministic, idempotent, and safe to run once per request in a stateless
//! edge invocation. Malformed or absent metadata fields contribute no signal;
//! classification never fails.

use crate::config::ClassifierConfig;
use crate::types::RequestMeta;
use chrono::{DateTime, Utc};
use regex::RegexSetBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Kind of automated agent, coarse-grained by signature sublist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Search engine crawler (Googlebot, Bingbot, ...).
    SearchEngine,
    /// Social link-preview fetcher (Facebook, Twitter, Slack, ...).
    SocialMedia,
    /// Performance audit tool (Lighthouse, PageSpeed, ...).
    PerformanceTool,
    /// Prerender service requesting a static render.
    PrerenderService,
    /// Automated agent with no more specific sublist match.
    OtherBot,
    /// Not an automated agent.
    None,
}

impl AgentKind {
    /// Stable wire name, used in response headers and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::SearchEngine => "search_engine",
            AgentKind::SocialMedia => "social_media",
            AgentKind::PerformanceTool => "performance_tool",
            AgentKind::PrerenderService => "prerender_service",
            AgentKind::OtherBot => "other_bot",
            AgentKind::None => "none",
        }
    }
}

/// Result of classifying one request.
///
/// Immutable once computed; recomputed per request and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentClassification {
    /// Whether the request is attributed to an automated agent.
    pub is_bot: bool,
    /// Accumulated confidence in [0, 1].
    pub confidence: f64,
    /// Human-readable reason per contributing signal, in evaluation order.
    pub reasons: Vec<String>,
    /// Coarse agent kind.
    pub kind: AgentKind,
    /// When the classification was computed.
    pub evaluated_at: DateTime<Utc>,
}

impl AgentClassification {
    /// Classification for a request with no bot signal at all.
    pub fn human() -> Self {
        Self {
            is_bot: false,
            confidence: 0.0,
            reasons: Vec::new(),
            kind: AgentKind::None,
            evaluated_at: Utc::now(),
        }
    }
}

/// User-agent signatures of search engine crawlers.
const SEARCH_ENGINE_SIGNATURES: &[&str] = &[
    "googlebot",
    "bingbot",
    "baiduspider",
    "duckduckbot",
    "yandexbot",
    "slurp",
    "applebot",
    "sogou",
];

/// User-agent signatures of social link-preview fetchers.
const SOCIAL_MEDIA_SIGNATURES: &[&str] = &[
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "slackbot",
    "discordbot",
    "whatsapp",
    "telegrambot",
    "pinterestbot",
];

/// User-agent signatures of performance audit tools.
const PERFORMANCE_TOOL_SIGNATURES: &[&str] = &[
    "lighthouse",
    "chrome-lighthouse",
    "pagespeed",
    "gtmetrix",
    "pingdom",
    "headlesschrome",
];

/// User-agent signatures of prerender services.
const PRERENDER_SIGNATURES: &[&str] = &["prerender", "rendertron"];

/// Generic automation signatures, checked after the specific sublists.
const GENERIC_BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python-requests",
    "go-http-client",
    "httpclient",
];

/// Network prefixes of known crawler infrastructure.
const BOT_NETWORK_RANGES: &[(&str, &str)] = &[
    ("66.249.", "google"),
    ("157.55.", "bing"),
    ("207.46.", "bing"),
    ("40.77.", "bing"),
    ("31.13.", "facebook"),
    ("66.220.", "facebook"),
    ("69.171.", "facebook"),
    ("199.16.", "twitter"),
    ("199.59.", "twitter"),
];

/// Browser headers whose collective absence is a bot signal.
const EXPECTED_BROWSER_HEADERS: &[&str] = &["accept-language", "accept-encoding", "cache-control"];

/// Query parameters that explicitly request a prerendered document.
const PRERENDER_PARAMS: &[&str] = &["_escaped_fragment_", "prerender"];

/// Precompiled signature table mapping user-agent substrings to agent kinds.
///
/// Sublists are compiled in specificity order, so an agent matching both a
/// specific signature and a generic one (e.g. `googlebot` and `bot`) resolves
/// to the specific kind.
struct SignatureTable {
    set: regex::RegexSet,
    entries: Vec<(String, AgentKind)>,
}

impl SignatureTable {
    fn compile(extra: &[String]) -> Self {
        let mut entries: Vec<(String, AgentKind)> = Vec::new();

        for sig in SEARCH_ENGINE_SIGNATURES {
            entries.push((sig.to_string(), AgentKind::SearchEngine));
        }
        for sig in SOCIAL_MEDIA_SIGNATURES {
            entries.push((sig.to_string(), AgentKind::SocialMedia));
        }
        for sig in PERFORMANCE_TOOL_SIGNATURES {
            entries.push((sig.to_string(), AgentKind::PerformanceTool));
        }
        for sig in PRERENDER_SIGNATURES {
            entries.push((sig.to_string(), AgentKind::PrerenderService));
        }
        for sig in GENERIC_BOT_SIGNATURES {
            entries.push((sig.to_string(), AgentKind::OtherBot));
        }
        for sig in extra {
            entries.push((sig.to_lowercase(), AgentKind::OtherBot));
        }

        let patterns: Vec<String> = entries.iter().map(|(s, _)| regex::escape(s)).collect();
        let set = match RegexSetBuilder::new(&patterns).case_insensitive(true).build() {
            Ok(set) => set,
            Err(e) => {
                warn!("Failed to compile signature table with extras: {}", e);
                entries.truncate(entries.len() - extra.len());
                let builtin: Vec<String> =
                    entries.iter().map(|(s, _)| regex::escape(s)).collect();
                RegexSetBuilder::new(&builtin)
                    .case_insensitive(true)
                    .build()
                    .unwrap_or_else(|_| regex::RegexSet::empty())
            }
        };

        Self { set, entries }
    }

    /// First matching signature in table order, if any.
    fn lookup(&self, user_agent: &str) -> Option<(&str, AgentKind)> {
        self.set
            .matches(user_agent)
            .iter()
            .next()
            .map(|idx| (self.entries[idx].0.as_str(), self.entries[idx].1))
    }
}

/// Byte-level prefix trie for network range lookups.
///
/// Prefixes are inserted as raw address-string bytes; a lookup succeeds when
/// any inserted prefix is a prefix of the probed address.
pub struct PrefixTrie {
    children: HashMap<u8, PrefixTrie>,
    label: Option<String>,
}

impl PrefixTrie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            label: None,
        }
    }

    /// Insert a prefix with an owner label.
    pub fn insert(&mut self, prefix: &str, label: &str) {
        let mut node = self;
        for byte in prefix.bytes() {
            node = node.children.entry(byte).or_insert_with(PrefixTrie::new);
        }
        node.label = Some(label.to_string());
    }

    /// Label of the shortest inserted prefix matching the address, if any.
    pub fn lookup(&self, addr: &str) -> Option<&str> {
        let mut node = self;
        if let Some(label) = &node.label {
            return Some(label);
        }
        for byte in addr.bytes() {
            node = node.children.get(&byte)?;
            if let Some(label) = &node.label {
                return Some(label);
            }
        }
        None
    }
}

impl Default for PrefixTrie {
    fn default() -> Self {
        Self::new()
    }
}

/// Main classification engine.
///
/// Construct once; tables are precompiled and the engine holds no mutable
/// state, so one engine serves any number of concurrent classifications.
pub struct ClassificationEngine {
    config: ClassifierConfig,
    signatures: SignatureTable,
    networks: PrefixTrie,
}

impl ClassificationEngine {
    /// Build an engine from configuration.
    pub fn new(config: ClassifierConfig) -> Self {
        let signatures = SignatureTable::compile(&config.extra_signatures);

        let mut networks = PrefixTrie::new();
        for (prefix, label) in BOT_NETWORK_RANGES {
            networks.insert(prefix, label);
        }

        Self {
            config,
            signatures,
            networks,
        }
    }

    /// Classify one request.
    ///
    /// Pure function of the request metadata: no I/O, no side effects, never
    /// fails. Evaluating the same request twice yields identical results.
    pub fn classify(&self, meta: &RequestMeta) -> AgentClassification {
        let mut confidence: f64 = 0.0;
        let mut reasons: Vec<String> = Vec::new();
        let mut kind = AgentKind::None;
        let mut decisive = false;

        // Signal 1: user-agent signature.
        if let Some((name, matched_kind)) = meta.user_agent().and_then(|ua| self.signatures.lookup(ua)) {
            confidence += self.config.signature_weight;
            reasons.push(format!("user agent matches known signature '{}'", name));
            if kind == AgentKind::None {
                kind = matched_kind;
            }
            decisive = true;
        }

        // Signal 2: remote address in a known crawler network range.
        if let Some(owner) = meta
            .remote_addr
            .as_deref()
            .and_then(|addr| self.networks.lookup(addr))
        {
            confidence += self.config.network_weight;
            reasons.push(format!("remote address in known {} crawler range", owner));
        }

        // Signal 3: missing or non-HTML Accept header.
        match meta.accept() {
            None => {
                confidence += self.config.accept_weight;
                reasons.push("missing accept header".to_string());
            }
            Some(accept) if !accept.contains("text/html") => {
                confidence += self.config.accept_weight;
                reasons.push("accept header does not request a document".to_string());
            }
            _ => {}
        }

        // Signal 4: incomplete browser header set.
        let present = EXPECTED_BROWSER_HEADERS
            .iter()
            .filter(|h| meta.header(h).is_some())
            .count();
        if EXPECTED_BROWSER_HEADERS.len() - present >= 2 {
            confidence += self.config.header_weight;
            reasons.push(format!(
                "only {} of {} expected browser headers present",
                present,
                EXPECTED_BROWSER_HEADERS.len()
            ));
        }

        // Signal 5: explicit prerender request. High-certainty: forces the
        // verdict and kind, and stops further scoring.
        if PRERENDER_PARAMS
            .iter()
            .any(|p| meta.query_param(p).is_some())
        {
            confidence += self.config.prerender_weight;
            reasons.push("explicit prerender query parameter".to_string());
            return AgentClassification {
                is_bot: true,
                confidence: confidence.min(1.0),
                reasons,
                kind: AgentKind::PrerenderService,
                evaluated_at: Utc::now(),
            };
        }

        // Signal 6: missing referrer on a non-root path. Contributory only.
        if meta.referer().is_none() && meta.path != "/" {
            confidence += self.config.referrer_weight;
            reasons.push("no referrer on non-root path".to_string());
        }

        let confidence = confidence.min(1.0);
        let is_bot = decisive || confidence >= self.config.bot_threshold;
        if is_bot && kind == AgentKind::None {
            kind = AgentKind::OtherBot;
        }

        AgentClassification {
            is_bot,
            confidence,
            reasons,
            kind,
            evaluated_at: Utc::now(),
        }
    }
}
