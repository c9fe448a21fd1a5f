use std::{sync::Arc, time::Duration};

use serde_json::json;

use catalyst::{
    cache::{CacheSource, TtlCache, TtlPolicy},
    clock::ManualClock,
    driver::{CycleContext, LoopWork},
    error::PipelineErrorKind,
    refresher::{CacheRefreshWork, CacheUpdate, DataSource, JsonDirSource, StaticDataSource},
};

fn ctx(cycle: u64) -> CycleContext {
    CycleContext {
        cycle,
        period: Duration::from_secs(5),
    }
}

fn refresher(
    clock: &ManualClock,
    source: Arc<StaticDataSource>,
) -> (Arc<TtlCache>, CacheRefreshWork) {
    let cache = Arc::new(TtlCache::new(
        TtlPolicy::new(Duration::from_secs(30)),
        Arc::new(clock.clone()),
    ));
    let work = CacheRefreshWork::new(
        Arc::clone(&cache),
        source,
        vec!["entity_list".to_string(), "summary_metrics".to_string()],
    );
    (cache, work)
}

#[tokio::test]
async fn refresh_fetches_only_invalid_keys() {
    let clock = ManualClock::new();
    let source = Arc::new(StaticDataSource::new());
    source.set("entity_list", json!([1, 2, 3]));
    source.set("summary_metrics", json!({"total": 3}));
    let (cache, mut work) = refresher(&clock, Arc::clone(&source));

    work.run_cycle(ctx(1)).await.expect("first refresh should succeed");
    clock.advance(Duration::from_secs(10));
    work.run_cycle(ctx(2)).await.expect("second refresh should succeed");

    assert_eq!(source.calls("entity_list"), 1);
    assert_eq!(source.calls("summary_metrics"), 1);
    assert_eq!(cache.read("entity_list").value, json!([1, 2, 3]));

    clock.advance(Duration::from_secs(25));
    work.run_cycle(ctx(3)).await.expect("expired keys should refresh");
    assert_eq!(source.calls("entity_list"), 2);
}

#[tokio::test]
async fn failed_refresh_keeps_stale_value_and_reports_fetch_error() {
    let clock = ManualClock::new();
    let source = Arc::new(StaticDataSource::new());
    source.set("entity_list", json!([1]));
    source.set("summary_metrics", json!({"total": 1}));
    let (cache, mut work) = refresher(&clock, Arc::clone(&source));
    work.run_cycle(ctx(1)).await.expect("first refresh should succeed");

    source.fail("entity_list", "upstream timeout");
    clock.advance(Duration::from_secs(31));
    let err = work.run_cycle(ctx(2)).await.expect_err("failure should surface");

    assert_eq!(err.kind, PipelineErrorKind::Fetch);
    assert!(err.message.contains("entity_list"));
    assert!(!err.message.contains("summary_metrics"));
    let read = cache.read("entity_list");
    assert_eq!(read.source, CacheSource::Stale);
    assert_eq!(read.value, json!([1]));
    assert!(cache.is_valid("summary_metrics"));
}

#[tokio::test]
async fn subscribers_hear_which_keys_were_refreshed() {
    let clock = ManualClock::new();
    let source = Arc::new(StaticDataSource::new());
    source.set("entity_list", json!([1, 2]));
    source.set("summary_metrics", json!({"total": 2}));
    let (_cache, mut work) = refresher(&clock, Arc::clone(&source));
    let mut updates = work.subscribe();
    let mut late = work.update_sender().subscribe();

    work.run_cycle(ctx(1)).await.expect("first refresh should succeed");
    let update = updates.try_recv().expect("a refresh should be announced");
    assert_eq!(
        update,
        CacheUpdate {
            cycle: 1,
            refreshed: vec!["entity_list".to_string(), "summary_metrics".to_string()],
            failed: Vec::new(),
        }
    );
    assert_eq!(late.try_recv().expect("every subscriber hears it"), update);

    // Everything is still fresh, so nothing is announced.
    clock.advance(Duration::from_secs(5));
    work.run_cycle(ctx(2)).await.expect("no-op refresh should succeed");
    assert!(updates.try_recv().is_err());

    source.fail("summary_metrics", "upstream timeout");
    clock.advance(Duration::from_secs(30));
    work.run_cycle(ctx(3)).await.expect_err("failure should surface");
    let update = updates.try_recv().expect("a failed refresh is announced too");
    assert_eq!(update.refreshed, vec!["entity_list".to_string()]);
    assert_eq!(update.failed, vec!["summary_metrics".to_string()]);
}

#[tokio::test]
async fn refresh_without_subscribers_still_succeeds() {
    let clock = ManualClock::new();
    let source = Arc::new(StaticDataSource::new());
    source.set("entity_list", json!([]));
    source.set("summary_metrics", json!({}));
    let (cache, mut work) = refresher(&clock, source);

    work.run_cycle(ctx(1)).await.expect("refresh should not need listeners");
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn json_dir_source_reads_key_files() {
    let dir = std::env::temp_dir().join(format!("catalyst-data-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("temp dir should exist");
    std::fs::write(dir.join("recent_events.json"), r#"[{"event":"boot"}]"#)
        .expect("data file should be written");
    let source = JsonDirSource::new(&dir);

    let value = source.fetch("recent_events").await.expect("file should load");
    let missing = source.fetch("absent").await.expect_err("missing file should fail");

    assert_eq!(value, json!([{"event": "boot"}]));
    assert_eq!(missing.kind, PipelineErrorKind::Fetch);
    assert_eq!(missing.key.as_deref(), Some("absent"));

    let _ = std::fs::remove_dir_all(&dir);
}
