//! Visit store behavior shared by every backend
//!
//! SQLite runs in memory. The Redis variant only runs when `REDIS_URL` points
//! at a reachable server and uses identities unique to the test run.

use chrono::{TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use visitrack::analytics::VisitFact;
use visitrack::storage::{Counter, RedisVisitStore, SqliteVisitStore, VisitStore};

async fn sqlite_store() -> Arc<dyn VisitStore> {
    let store = SqliteVisitStore::new("sqlite::memory:", 1).await.unwrap();
    store.init().await.unwrap();
    Arc::new(store)
}

async fn redis_store() -> Option<Arc<dyn VisitStore>> {
    let url = std::env::var("REDIS_URL").ok()?;
    let store = RedisVisitStore::connect(&url).await.ok()?;
    store.init().await.ok()?;
    Some(Arc::new(store))
}

fn fact(ip: &str, millis: i64) -> VisitFact {
    VisitFact {
        ip: ip.to_string(),
        device: "Unknown".to_string(),
        os: "Unknown".to_string(),
        browser: "Unknown".to_string(),
        is_mobile: false,
        geo: None,
        path: "/".to_string(),
        referrer: "Direct".to_string(),
        timestamp: Utc.timestamp_millis_opt(millis).unwrap(),
    }
}

/// `range` must be exactly the `[from, to]` slice of `history`
async fn check_range_is_history_filter(store: Arc<dyn VisitStore>, ip: &str) {
    let base = (Utc::now() - TimeDelta::days(1)).timestamp_millis();
    for offset in [500, 100, 300, 200, 400] {
        store.append(ip, &fact(ip, base + offset)).await.unwrap();
    }
    store.touch(ip, Duration::from_secs(60)).await.unwrap();

    let history = store.history(ip).await.unwrap();
    let scores: Vec<i64> = history.iter().map(VisitFact::score).collect();
    assert_eq!(
        scores,
        vec![base + 100, base + 200, base + 300, base + 400, base + 500]
    );

    let (from, to) = (base + 200, base + 400);
    let ranged = store.range(ip, from, to).await.unwrap();
    let expected: Vec<VisitFact> = history
        .into_iter()
        .filter(|f| (from..=to).contains(&f.score()))
        .collect();
    assert_eq!(ranged, expected);
    assert_eq!(ranged.len(), 3);

    assert!(store.identities().await.unwrap().contains(&ip.to_string()));
}

#[tokio::test]
async fn test_sqlite_range_matches_history_filter() {
    check_range_is_history_filter(sqlite_store().await, "1.2.3.4").await;
}

#[tokio::test]
async fn test_sqlite_record_attempts_every_step() {
    let store = sqlite_store().await;
    let now = Utc::now().timestamp_millis();

    let mut mobile = fact("2.2.2.2", now);
    mobile.is_mobile = true;
    assert!(store.record(&mobile, Duration::from_secs(60)).await);
    assert!(store.record(&fact("3.3.3.3", now), Duration::from_secs(60)).await);

    let counters = store.counters().await.unwrap();
    assert_eq!(counters.total_visits, 2);
    assert_eq!(counters.mobile_visits, 1);
    assert_eq!(store.identities().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sqlite_expired_timelines_disappear() {
    let store = sqlite_store().await;
    let now = Utc::now().timestamp_millis();

    store.record(&fact("4.4.4.4", now), Duration::ZERO).await;
    store.record(&fact("5.5.5.5", now), Duration::from_secs(60)).await;

    assert_eq!(store.identities().await.unwrap(), vec!["5.5.5.5".to_string()]);
    assert!(store.range("4.4.4.4", 0, i64::MAX).await.unwrap().is_empty());

    // Counters are global and never expire
    assert_eq!(store.counters().await.unwrap().total_visits, 2);
}

#[tokio::test]
async fn test_redis_range_matches_history_filter() {
    let Some(store) = redis_store().await else {
        eprintln!("REDIS_URL not set or unreachable, skipping");
        return;
    };

    let ip = format!("test-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
    check_range_is_history_filter(Arc::clone(&store), &ip).await;

    let before = store.counters().await.unwrap().total_visits;
    assert!(store.increment(Counter::TotalVisits).await.unwrap() > before);

    // Let the test identity expire right away
    store.touch(&ip, Duration::from_secs(1)).await.unwrap();
}
