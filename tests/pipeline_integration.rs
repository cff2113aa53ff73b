//! Integration tests for the edge pipeline: classification, policy
//! attachment, and prerender substitution through the dispatcher.

#[allow(dead_code)]
mod common;

use cirrus::classify::{AgentKind, ClassificationEngine};
use cirrus::config::{ClassifierConfig, PolicyConfig};
use cirrus::dispatch::{EdgeDispatcher, FilePrerenderStore};
use cirrus::policy::ResourcePolicyEngine;
use cirrus::types::{RequestMeta, StoredResponse};
use common::{browser_request, TestOrigin};
use std::sync::Arc;

fn dispatcher() -> EdgeDispatcher {
    EdgeDispatcher::new(
        ClassificationEngine::new(ClassifierConfig::default()),
        ResourcePolicyEngine::new(PolicyConfig::default()),
    )
}

#[tokio::test]
async fn human_navigation_flows_through_with_annotations() {
    let origin = TestOrigin::new();
    origin.insert("/", StoredResponse::html("<h1>home</h1>")).await;

    let outcome = dispatcher()
        .dispatch(&browser_request("/"), &origin)
        .await
        .unwrap();

    assert!(!outcome.prerendered);
    assert_eq!(outcome.response.body, b"<h1>home</h1>");
    assert_eq!(outcome.response.header("bot-detected"), Some("false"));
    assert_eq!(outcome.response.header("bot-type"), Some("none"));
    assert_eq!(outcome.response.header("device-class"), Some("desktop"));
    assert_eq!(outcome.response.header("connection-class"), Some("unknown"));
    assert!(!outcome.classification.value.is_bot);
    assert!(outcome.classification.value.confidence < 0.7);
}

#[tokio::test]
async fn googlebot_served_prerendered_variant_end_to_end() {
    let origin = TestOrigin::new();
    origin
        .insert("/names/elven", StoredResponse::html("<div id=\"app\"></div>"))
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("names/elven")).unwrap();
    std::fs::write(
        dir.path().join("names/elven/index.html"),
        "<h1>Elven names</h1>",
    )
    .unwrap();

    let dispatcher = dispatcher()
        .with_prerender_store(Arc::new(FilePrerenderStore::new(dir.path())));

    let meta = RequestMeta::get("/names/elven").with_header(
        "user-agent",
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    );
    let outcome = dispatcher.dispatch(&meta, &origin).await.unwrap();

    assert!(outcome.prerendered);
    assert_eq!(outcome.response.body, b"<h1>Elven names</h1>");
    assert_eq!(outcome.response.header("bot-detected"), Some("true"));
    assert_eq!(outcome.response.header("bot-type"), Some("search_engine"));
    assert_eq!(outcome.classification.value.kind, AgentKind::SearchEngine);
    assert!(outcome.classification.value.confidence >= 0.8);

    // The origin was never consulted.
    assert_eq!(origin.fetch_count(), 0);
}

#[tokio::test]
async fn social_preview_eligible_but_falls_back_when_variant_missing() {
    let origin = TestOrigin::new();
    origin
        .insert("/share/xyz", StoredResponse::html("<h1>dynamic</h1>"))
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dispatcher = dispatcher()
        .with_prerender_store(Arc::new(FilePrerenderStore::new(dir.path())));

    let meta = RequestMeta::get("/share/xyz")
        .with_header("user-agent", "facebookexternalhit/1.1");
    let outcome = dispatcher.dispatch(&meta, &origin).await.unwrap();

    // Substitution failure is silent: the normal response flows through.
    assert!(!outcome.prerendered);
    assert_eq!(outcome.response.body, b"<h1>dynamic</h1>");
    assert_eq!(outcome.response.header("bot-type"), Some("social_media"));
    assert_eq!(origin.fetch_count(), 1);
}

#[tokio::test]
async fn prerender_parameter_forces_prerender_service_kind() {
    let origin = TestOrigin::new();
    origin
        .insert("/pricing", StoredResponse::html("<h1>pricing</h1>"))
        .await;

    let meta = browser_request("/pricing").with_query("_escaped_fragment_", "");
    let outcome = dispatcher().dispatch(&meta, &origin).await.unwrap();

    assert_eq!(
        outcome.response.header("bot-type"),
        Some("prerender_service")
    );
    // Prerender services are not in the substitution set; origin serves.
    assert!(!outcome.prerendered);
}

#[tokio::test]
async fn slow_mobile_html_gets_preloads_and_preconnects() {
    let origin = TestOrigin::new();
    origin.insert("/", StoredResponse::html("<h1>home</h1>")).await;

    let meta = RequestMeta::get("/")
        .with_header("user-agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile Safari")
        .with_header("accept", "text/html")
        .with_header("accept-language", "en")
        .with_header("accept-encoding", "gzip")
        .with_header("cache-control", "no-cache")
        .with_header("referer", "https://example.com/")
        .with_header("ect", "2g");
    let outcome = dispatcher().dispatch(&meta, &origin).await.unwrap();

    let link = outcome.response.header("link").unwrap().to_string();
    for critical in &PolicyConfig::default().critical_resources {
        assert!(link.contains(critical.as_str()), "missing preload for {}", critical);
    }
    assert!(link.contains("rel=preconnect"));
    assert_eq!(outcome.response.header("device-class"), Some("mobile"));
    assert_eq!(outcome.response.header("connection-class"), Some("slow"));
}

#[tokio::test]
async fn immutable_asset_gets_long_lived_cache_control() {
    let origin = TestOrigin::new();
    origin
        .insert(
            "/images/hero.png",
            StoredResponse::new(200, vec![0u8; 64]).with_header("content-type", "image/png"),
        )
        .await;

    let meta = browser_request("/images/hero.png")
        .with_header("accept", "image/avif,image/webp,image/*");
    let outcome = dispatcher().dispatch(&meta, &origin).await.unwrap();

    let cc = outcome.response.header("cache-control").unwrap();
    assert!(cc.contains("immutable"));
    assert_eq!(
        outcome.response.header("accept-modern-images"),
        Some("true")
    );
}

#[tokio::test]
async fn origin_failure_with_no_substitute_propagates() {
    let origin = TestOrigin::new();
    origin.set_offline(true);

    let result = dispatcher().dispatch(&browser_request("/"), &origin).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn dispatch_stats_accumulate() {
    let origin = TestOrigin::new();
    origin.insert("/", StoredResponse::html("<h1>home</h1>")).await;

    let dispatcher = dispatcher();
    dispatcher
        .dispatch(&browser_request("/"), &origin)
        .await
        .unwrap();
    dispatcher
        .dispatch(
            &RequestMeta::get("/").with_header("user-agent", "bingbot/2.0"),
            &origin,
        )
        .await
        .unwrap();

    let stats = dispatcher.stats();
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.bots_detected, 1);
}
