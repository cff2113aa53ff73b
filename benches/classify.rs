//! Benchmarks for request classification throughput.

use cirrus::classify::ClassificationEngine;
use cirrus::config::ClassifierConfig;
use cirrus::types::RequestMeta;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn representative_requests() -> Vec<(&'static str, RequestMeta)> {
    vec![
        (
            "browser",
            RequestMeta::get("/")
                .with_header(
                    "user-agent",
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                )
                .with_header("accept", "text/html,application/xhtml+xml")
                .with_header("accept-language", "en-US,en;q=0.9")
                .with_header("accept-encoding", "gzip, deflate, br")
                .with_header("cache-control", "max-age=0")
                .with_header("referer", "https://example.com/"),
        ),
        (
            "search_engine",
            RequestMeta::get("/pricing").with_header(
                "user-agent",
                "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            ),
        ),
        (
            "headless",
            RequestMeta::get("/names/fantasy").with_header("user-agent", "curl/8.4.0"),
        ),
        (
            "prerender",
            RequestMeta::get("/pricing").with_query("_escaped_fragment_", ""),
        ),
    ]
}

fn bench_classify(c: &mut Criterion) {
    let engine = ClassificationEngine::new(ClassifierConfig::default());
    let mut group = c.benchmark_group("classify");

    for (name, meta) in representative_requests() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &meta, |b, meta| {
            b.iter(|| engine.classify(black_box(meta)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
