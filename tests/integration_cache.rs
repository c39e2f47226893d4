//! Integration tests for render caching.
//!
//! Renders run against an in-memory overlay so the tests can count builds and
//! drive expiry through a manual clock.

#[allow(dead_code)]
mod common;
#[allow(unused_imports)]
use common::prelude::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_yaml::Value;

use overlay_render::cache::{
    default_key, path_only_key, Cache, CacheOptions, CacheSpec, ManualClock, MemoryCache,
};
use overlay_render::filesystem::MemoryFs;
use overlay_render::{RenderContext, Renderer, RendererOptions, Source};

fn storage() -> Arc<MemoryFs> {
    Arc::new(
        MemoryFs::from_files([
            ("/app/kustomization.yaml", manifests::VALUES_KUSTOMIZATION),
            ("/app/deployment.yaml", manifests::DEPLOYMENT),
        ])
        .unwrap(),
    )
}

fn replicas(renderer: &Renderer, ctx: &RenderContext) -> Value {
    let documents = renderer.process(ctx).unwrap();
    documents[0].get_path("spec.replicas").cloned().unwrap()
}

#[test]
fn test_different_values_do_not_share_entries() {
    let builder = Arc::new(CountingBuilder::default());
    let renderer = Renderer::single(
        Source::new("/app"),
        RendererOptions::new()
            .with_storage(storage())
            .with_builder(builder.clone())
            .with_cache(CacheOptions::new()),
    )
    .unwrap();

    let two = RenderContext::new().with_value("replicas", "2");
    let four = RenderContext::new().with_value("replicas", "4");

    assert_eq!(replicas(&renderer, &two), Value::from("2"));
    assert_eq!(replicas(&renderer, &four), Value::from("4"));
    assert_eq!(replicas(&renderer, &two), Value::from("2"));
    assert_eq!(replicas(&renderer, &four), Value::from("4"));
    assert_eq!(builder.builds(), 2);
}

#[test]
fn test_entries_expire_after_ttl() {
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
    let builder = Arc::new(CountingBuilder::default());

    let renderer = Renderer::single(
        Source::new("/app").with_value("replicas", "3"),
        RendererOptions::new()
            .with_storage(storage())
            .with_builder(builder.clone())
            .with_cache(
                CacheOptions::new()
                    .with_ttl(Duration::from_secs(60))
                    .with_cache(cache.clone()),
            ),
    )
    .unwrap();
    let ctx = RenderContext::new();

    renderer.process(&ctx).unwrap();
    clock.advance(Duration::from_secs(60));
    renderer.process(&ctx).unwrap();
    assert_eq!(builder.builds(), 1, "still live at exactly the TTL");

    clock.advance(Duration::from_secs(1));
    renderer.process(&ctx).unwrap();
    assert_eq!(builder.builds(), 2);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_purge_expired_sweeps_entries() {
    let clock = Arc::new(ManualClock::new());
    let cache = MemoryCache::with_clock(clock.clone());
    cache.set("short", &[], Duration::from_secs(1));
    cache.set("long", &[], Duration::from_secs(100));

    clock.advance(Duration::from_secs(2));
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.get("short").is_none());
    assert!(cache.get("long").is_some());
}

#[test]
fn test_maximum_ttl_renders_and_caches() {
    let builder = Arc::new(CountingBuilder::default());
    let renderer = Renderer::single(
        Source::new("/app").with_value("replicas", "3"),
        RendererOptions::new()
            .with_storage(storage())
            .with_builder(builder.clone())
            .with_cache(CacheOptions::new().with_ttl(Duration::from_secs(u64::MAX))),
    )
    .unwrap();
    let ctx = RenderContext::new();

    renderer.process(&ctx).unwrap();
    renderer.process(&ctx).unwrap();
    assert_eq!(builder.builds(), 1);
}

#[test]
fn test_key_independent_of_value_order() {
    let forward: BTreeMap<String, String> = [("a", "1"), ("b", "2"), ("c", "3")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let backward: BTreeMap<String, String> = [("c", "3"), ("b", "2"), ("a", "1")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let left = default_key(&CacheSpec::new("/app", forward)).unwrap();
    let right = default_key(&CacheSpec::new("/app", backward)).unwrap();
    assert_eq!(left, right);
    assert_eq!(left.len(), 64);

    let other = default_key(&CacheSpec::new("/other", BTreeMap::new())).unwrap();
    assert_ne!(left, other);
}

#[test]
fn test_path_only_key_ignores_values() {
    let with = CacheSpec::new("/app", BTreeMap::from([("k".to_string(), "v".to_string())]));
    let without = CacheSpec::new("/app", BTreeMap::new());
    assert_eq!(path_only_key(&with).unwrap(), path_only_key(&without).unwrap());
}

#[test]
fn test_cached_documents_are_independent_copies() {
    let renderer = Renderer::single(
        Source::new("/app").with_value("replicas", "3"),
        RendererOptions::new()
            .with_storage(storage())
            .with_cache(CacheOptions::new())
            .with_transformer(|mut document| {
                document.set_annotation("post-processed", "yes");
                Ok(document)
            }),
    )
    .unwrap();

    let mut first = renderer.process(&RenderContext::new()).unwrap();
    first[0].set_name("changed");

    let second = renderer.process(&RenderContext::new()).unwrap();
    assert_eq!(second[0].name(), "web");
    // Transformers run on copies served from the cache too.
    assert_eq!(second[0].annotation("post-processed"), Some("yes"));
}

#[test]
fn test_failed_renders_are_not_cached() {
    let fs = storage();
    let builder = Arc::new(CountingBuilder::default());
    let renderer = Renderer::single(
        Source::new("/app"),
        RendererOptions::new()
            .with_storage(fs.clone())
            .with_builder(builder.clone())
            .with_cache(CacheOptions::new()),
    )
    .unwrap();

    // Without values there is no values manifest to load.
    assert!(renderer.process(&RenderContext::new()).is_err());
    assert!(renderer.process(&RenderContext::new()).is_err());
    assert_eq!(builder.builds(), 2);
}

#[test]
fn test_render_file_with_maximum_ttl_seconds() {
    let config = overlay_render::config::parse(
        "sources:\n  - path: /app\n    values:\n      replicas: \"5\"\ncache:\n  ttlSeconds: 18446744073709551615\n",
    )
    .unwrap();
    let (sources, options) = config.into_parts(std::path::Path::new("/"));
    let renderer = Renderer::new(sources, options.with_storage(storage())).unwrap();
    let ctx = RenderContext::new();

    assert_eq!(replicas(&renderer, &ctx), Value::from("5"));
    assert_eq!(replicas(&renderer, &ctx), Value::from("5"));
}
