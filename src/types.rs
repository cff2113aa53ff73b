//! Core types shared across the edge and client tiers.
//!
//! [`RequestMeta`] is the normalized view of an inbound request that the
//! classification engine, policy engine, and cache manager all consume.
//! [`StoredResponse`] is the value half of every Request→Response pair held
//! in a cache partition, and the payload every dispatch path produces.
//!
//! Both types are plain data: the gateway converts from HTTP-framework types
//! at the boundary, and everything downstream stays framework-free and
//! testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalized metadata for an inbound request.
///
/// Header names and the method are normalized on construction (lowercase and
/// uppercase respectively), so lookups never need to care about wire casing.
/// Absent or malformed fields simply read as `None` — consumers treat that as
/// "no signal", never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMeta {
    /// HTTP method, uppercase.
    pub method: String,
    /// URL scheme, e.g. `https`.
    pub scheme: String,
    /// Host the request was addressed to, if known.
    pub host: Option<String>,
    /// URL path, always starting with `/`.
    pub path: String,
    /// Decoded query parameters in order of appearance.
    pub query: Vec<(String, String)>,
    /// Header map with lowercase names.
    pub headers: HashMap<String, String>,
    /// Remote address (direct or proxy-forwarded), if known.
    pub remote_addr: Option<String>,
}

impl RequestMeta {
    /// Create request metadata for the given method and path.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            scheme: "https".to_string(),
            host: None,
            path: path.to_string(),
            query: Vec::new(),
            headers: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Shorthand for a GET request to the given path.
    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    /// Set a header, normalizing the name to lowercase.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    /// Append a query parameter.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the remote address.
    pub fn with_remote_addr(mut self, addr: &str) -> Self {
        self.remote_addr = Some(addr.to_string());
        self
    }

    /// Set the host.
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the URL scheme.
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_lowercase();
        self
    }

    /// Look up a header by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// The user-agent identification string, if present.
    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// The `Accept` header, if present.
    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }

    /// The `Referer` header, if present.
    pub fn referer(&self) -> Option<&str> {
        self.header("referer")
    }

    /// First value of a query parameter, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the request expects an HTML document in response.
    pub fn accepts_document(&self) -> bool {
        self.accept().is_some_and(|a| a.contains("text/html"))
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Whether the request uses an http(s) scheme. Extension schemes and the
    /// like pass through the cache tier untouched.
    pub fn is_http_scheme(&self) -> bool {
        self.scheme == "http" || self.scheme == "https"
    }

    /// Full URL used as the cache key for this request.
    pub fn url(&self) -> String {
        let mut url = format!(
            "{}://{}{}",
            self.scheme,
            self.host.as_deref().unwrap_or(""),
            self.path
        );
        if !self.query.is_empty() {
            let qs: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            url.push('?');
            url.push_str(&qs.join("&"));
        }
        url
    }

    /// Cache key for this request: path and query, prefixed with the host
    /// for cross-origin requests. The scheme is ignored so http/https
    /// variants of the same resource share one entry.
    pub fn cache_key(&self) -> String {
        let mut key = match &self.host {
            Some(host) => format!("//{}{}", host, self.path),
            None => self.path.clone(),
        };
        if !self.query.is_empty() {
            let qs: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&qs.join("&"));
        }
        key
    }

    /// Parse a raw query string into ordered key/value pairs.
    ///
    /// Pairs without `=` become keys with an empty value; empty segments are
    /// skipped.
    pub fn parse_query(raw: &str) -> Vec<(String, String)> {
        raw.split('&')
            .filter(|s| !s.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect()
    }
}

/// A response payload as produced by an origin fetch or a cache partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header map with lowercase names.
    pub headers: HashMap<String, String>,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Entity tag assigned when the response was captured.
    pub etag: String,
    /// When the response was captured.
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Create a response with the given status and body.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
            etag: uuid::Uuid::new_v4().to_string(),
            stored_at: Utc::now(),
        }
    }

    /// Shorthand for a 200 HTML response.
    pub fn html(body: &str) -> Self {
        Self::new(200, body.as_bytes().to_vec())
            .with_header("content-type", "text/html; charset=utf-8")
    }

    /// Set a header, normalizing the name to lowercase.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    /// Set a header in place, normalizing the name to lowercase.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_lowercase(), value.to_string());
    }

    /// Look up a header by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the response carries an HTML document.
    pub fn is_document(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.contains("text/html"))
    }

    /// Body size in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }
}
