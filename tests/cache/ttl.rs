use std::{cell::Cell, sync::Arc, time::Duration};

use serde_json::{Value, json};

use catalyst::{
    cache::{CacheSource, TtlCache, TtlPolicy},
    clock::{Clock, ManualClock},
    error::PipelineError,
};

fn cache_with(clock: &ManualClock, policy: TtlPolicy) -> TtlCache {
    TtlCache::new(policy, Arc::new(clock.clone()))
}

fn five_entities() -> Value {
    json!([
        {"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}, {"id": 5}
    ])
}

#[test]
fn expired_entry_is_refetched_and_stored() {
    let clock = ManualClock::starting_at(Duration::from_secs(100));
    let cache = cache_with(
        &clock,
        TtlPolicy::default().with_override("entity_list", Duration::from_secs(30)),
    );
    let now = clock.now();
    cache.set_at(
        "entity_list",
        json!([{"id": 1}, {"id": 2}, {"id": 3}]),
        now - Duration::from_secs(40),
    );
    assert_eq!(cache.read("entity_list").value.as_array().map(Vec::len), Some(3));
    assert!(!cache.is_valid("entity_list"));

    let calls = Cell::new(0);
    let read = cache.get(
        "entity_list",
        Some(|| {
            calls.set(calls.get() + 1);
            Ok::<_, PipelineError>(five_entities())
        }),
        false,
    );

    assert_eq!(calls.get(), 1);
    assert_eq!(read.source, CacheSource::Fresh);
    assert_eq!(read.value, five_entities());
    let entry = cache.entry("entity_list").expect("entry should be stored");
    assert_eq!(entry.stored_at, now);
    assert_eq!(entry.value, five_entities());
    assert!(cache.is_valid("entity_list"));
}

#[test]
fn repeated_reads_within_ttl_fetch_once() {
    let clock = ManualClock::new();
    let cache = cache_with(&clock, TtlPolicy::new(Duration::from_secs(30)));

    let calls = Cell::new(0);
    let fetch = || {
        calls.set(calls.get() + 1);
        Ok::<_, PipelineError>(json!({"total": 7}))
    };

    let first = cache.get("summary_metrics", Some(fetch), false);
    clock.advance(Duration::from_secs(10));
    let second = cache.get("summary_metrics", Some(fetch), false);

    assert_eq!(calls.get(), 1);
    assert_eq!(first.source, CacheSource::Fresh);
    assert_eq!(second.source, CacheSource::Cached);
    assert_eq!(first.value, second.value);
}

#[test]
fn entry_is_still_valid_exactly_at_ttl() {
    let clock = ManualClock::new();
    let cache = cache_with(&clock, TtlPolicy::new(Duration::from_secs(30)));
    cache.set("recent_events", json!([1]));

    clock.advance(Duration::from_secs(30));
    assert!(cache.is_valid("recent_events"));

    clock.advance(Duration::from_millis(1));
    assert!(!cache.is_valid("recent_events"));
    assert_eq!(cache.expired_keys(), vec!["recent_events".to_string()]);
}

#[test]
fn force_refresh_bypasses_a_valid_entry() {
    let clock = ManualClock::new();
    let cache = cache_with(&clock, TtlPolicy::default());
    cache.set("summary_metrics", json!({"total": 1}));

    let read = cache.get(
        "summary_metrics",
        Some(|| Ok::<_, PipelineError>(json!({"total": 2}))),
        true,
    );

    assert_eq!(read.source, CacheSource::Fresh);
    assert_eq!(read.value, json!({"total": 2}));
}

#[test]
fn invalidate_pattern_removes_matching_keys_only() {
    let clock = ManualClock::new();
    let cache = cache_with(&clock, TtlPolicy::default());
    cache.set("bridge_status", json!({}));
    cache.set("BRIDGE_data", json!([]));
    cache.set("entity_list", json!([]));

    let removed = cache.invalidate_pattern("bridge");

    assert_eq!(removed, 2);
    assert_eq!(cache.keys(), vec!["entity_list".to_string()]);
}

#[tokio::test]
async fn async_fetch_follows_the_same_ttl_rules() {
    let clock = ManualClock::new();
    let cache = cache_with(&clock, TtlPolicy::new(Duration::from_secs(5)));

    let first = cache
        .get_with("entity_list", || async { Ok::<_, PipelineError>(five_entities()) }, false)
        .await;
    let second = cache
        .get_with(
            "entity_list",
            || async { Ok::<_, PipelineError>(json!([])) },
            false,
        )
        .await;

    assert_eq!(first.source, CacheSource::Fresh);
    assert_eq!(second.source, CacheSource::Cached);
    assert_eq!(second.value.as_array().map(Vec::len), Some(5));
}
