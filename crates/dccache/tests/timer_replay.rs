#![forbid(unsafe_code)]

use config::Config;
use dccache::clock::ManualClock;
use dccache::notify::LogSink;
use dccache::persistence::{SqliteRepository, TimerRepository};
use dccache::schedule::TimerKind;
use dccache::sync::{MemorySource, Row, TableKind};
use dccache::{ConfigCache, Services};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const NOW: i64 = 1_700_000_000;

async fn cache_at(path: &Path, now: i64) -> ConfigCache {
    let services = Services {
        repo: Box::new(SqliteRepository::new(path.to_path_buf()).await.unwrap()),
        clock: Arc::new(ManualClock::new(now)),
        sink: Arc::new(LogSink),
        secrets: None,
    };
    let cache = ConfigCache::init(&Config::default(), services);
    cache.sync(&trend_trigger()).unwrap();
    cache
}

/// One host with a check evaluated hourly by a `trendavg` trigger.
fn trend_trigger() -> MemorySource {
    let source = MemorySource::new();
    source.push(
        TableKind::Hosts,
        Row::build(TableKind::Hosts, 1).set("host", "host-a").finish(),
    );
    source.push(
        TableKind::Items,
        Row::build(TableKind::Items, 1)
            .set("hostid", 1)
            .set("key_", "net.if.in[eth0]")
            .set("type", 2)
            .finish(),
    );
    source.push(
        TableKind::Triggers,
        Row::build(TableKind::Triggers, 30)
            .set("expression", "{300}>1000")
            .finish(),
    );
    source.push(
        TableKind::Functions,
        Row::build(TableKind::Functions, 300)
            .set("itemid", 1)
            .set("triggerid", 30)
            .set("name", "trendavg")
            .set("parameter", "1h:now/h")
            .finish(),
    );
    source
}

#[tokio::test]
async fn trend_timers_survive_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("timers.db");

    let first = cache_at(&path, NOW).await;
    let saved = first.timer_nextcheck().unwrap();
    assert!(saved > NOW);
    first.shutdown(true).await.unwrap();
    drop(first);

    // two hours later the fresh timer points at a later period
    let later = NOW + 7200;
    let second = cache_at(&path, later).await;
    assert!(second.timer_nextcheck().unwrap() > later);
    assert_eq!(second.restore_timers().await.unwrap(), 1);
    assert_eq!(second.timer_nextcheck(), Some(saved));

    let claimed = second.claim_timers(10, 10);
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].kind, TimerKind::Trend);
    assert_eq!(claimed[0].exec_ts, saved);
    assert_eq!(second.lock_triggers_by_history_items(&[1]), Vec::<u64>::new());
    second.reschedule_timers(claimed);
    assert_eq!(second.lock_triggers_by_history_items(&[1]), vec![30]);

    let repo = SqliteRepository::new(path).await.unwrap();
    assert!(repo.take().await.unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_without_saving_leaves_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("timers.db");

    let cache = cache_at(&path, NOW).await;
    cache.shutdown(false).await.unwrap();
    drop(cache);

    let cache = cache_at(&path, NOW).await;
    assert_eq!(cache.restore_timers().await.unwrap(), 0);
}
