use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use wc26_odds::OddsError;
use wc26_odds::config::CacheConfig;
use wc26_odds::group_sim::{GroupWinnerOdds, TeamWinnerOdds};
use wc26_odds::match_sim::{GroupStageOdds, MatchOdds};
use wc26_odds::odds::OutcomeQuote;
use wc26_odds::odds_cache::{
    CacheCounters, CacheEntry, CacheKind, CacheManager, CacheStats, CachedOdds, StoredEntry,
};
use wc26_odds::odds_store::OddsStore;

fn temp_config(dir: &tempfile::TempDir) -> CacheConfig {
    CacheConfig {
        db_path: Some(dir.path().join("odds.sqlite3")),
        ..CacheConfig::default()
    }
}

fn match_payload() -> CachedOdds {
    CachedOdds::MatchOdds(MatchOdds::GroupStage(GroupStageOdds {
        team_a: OutcomeQuote::from_probability(0.7564),
        team_b: OutcomeQuote::from_probability(0.0876),
        draw: OutcomeQuote::from_probability(0.156),
        iterations: 2500,
    }))
}

fn group_payload() -> CachedOdds {
    let mut teams = BTreeMap::new();
    teams.insert(
        "Spain".to_string(),
        TeamWinnerOdds {
            probability: 1.0,
            odds: None,
            rank: Some(1),
        },
    );
    CachedOdds::GroupWinner(GroupWinnerOdds {
        teams,
        iterations: 2500,
    })
}

fn manager(config: &CacheConfig) -> (CacheManager, Arc<CacheCounters>) {
    let counters = Arc::new(CacheCounters::default());
    let manager = CacheManager::open(config, counters.clone()).unwrap();
    (manager, counters)
}

#[test]
fn set_then_get_returns_payload() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, counters) = manager(&temp_config(&dir));
    assert!(cache.set(&["Beta", "Alpha"], &match_payload(), false));
    let hit = cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false);
    assert_eq!(hit, Some(match_payload()));
    assert_eq!(counters.snapshot().hits, 1);
}

#[test]
fn contexts_and_kinds_never_collide() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, _) = manager(&temp_config(&dir));
    assert!(cache.set(&["Alpha", "Beta"], &match_payload(), true));
    assert_eq!(cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false), None);
    assert_eq!(cache.get(&["Alpha", "Beta"], CacheKind::GroupWinner, true), None);
    assert!(cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, true).is_some());
}

#[test]
fn expired_entries_miss_and_get_swept() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, counters) = manager(&temp_config(&dir));
    assert!(cache.set_with_ttl(
        &["A", "B", "C", "D"],
        &group_payload(),
        false,
        chrono::Duration::milliseconds(-1),
    ));
    assert!(cache.set(&["E", "F", "G", "H"], &group_payload(), false));
    assert_eq!(cache.get(&["A", "B", "C", "D"], CacheKind::GroupWinner, false), None);
    assert_eq!(counters.snapshot().misses, 1);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.active, 1);
    assert_eq!(cache.sweep_expired().unwrap(), 1);
    assert_eq!(cache.stats().unwrap().total, 1);
}

#[test]
fn detached_write_is_visible_to_next_read() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, counters) = manager(&temp_config(&dir));
    cache.set_detached(&["Alpha", "Beta"], &match_payload(), false);
    // The worker drains commands in order, so the read queues behind the write.
    assert_eq!(
        cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false),
        Some(match_payload())
    );
    assert_eq!(counters.snapshot().stored, 1);
}

#[test]
fn clear_by_kind_reports_deleted_rows() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, _) = manager(&temp_config(&dir));
    assert!(cache.set(&["Alpha", "Beta"], &match_payload(), false));
    assert!(cache.set(&["Alpha", "Beta"], &match_payload(), true));
    assert!(cache.set(&["A", "B", "C", "D"], &group_payload(), false));
    assert_eq!(cache.clear(Some(CacheKind::MatchOdds)).unwrap(), 2);
    let stats = cache.stats().unwrap();
    assert_eq!(stats.by_kind.get("group-winner"), Some(&1));
    assert_eq!(stats.by_kind.get("match-odds"), None);
    assert_eq!(cache.clear(None).unwrap(), 1);
}

#[test]
fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir);
    {
        let (cache, _) = manager(&config);
        assert!(cache.set(&["Alpha", "Beta"], &match_payload(), false));
    }
    let (cache, _) = manager(&config);
    assert!(cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false).is_some());
}

/// Store that sleeps before answering reads and fails every write.
struct BrokenStore {
    read_delay: Duration,
}

impl OddsStore for BrokenStore {
    fn find(&self, _: &str, _: CacheKind, _: i64) -> Result<Option<StoredEntry>> {
        thread::sleep(self.read_delay);
        Ok(None)
    }

    fn upsert(&self, _: &CacheEntry) -> Result<()> {
        bail!("disk full")
    }

    fn clear(&self, _: Option<CacheKind>) -> Result<usize> {
        bail!("database is locked")
    }

    fn stats(&self, _: i64) -> Result<CacheStats> {
        Ok(CacheStats::default())
    }

    fn sweep_expired(&self, _: i64) -> Result<usize> {
        Ok(0)
    }
}

fn broken_manager(read_delay: Duration) -> (CacheManager, Arc<CacheCounters>) {
    let config = CacheConfig {
        db_path: None,
        read_timeout: Duration::from_millis(50),
        write_timeout: Duration::from_millis(500),
        ..CacheConfig::default()
    };
    let counters = Arc::new(CacheCounters::default());
    let manager =
        CacheManager::with_store(BrokenStore { read_delay }, &config, counters.clone()).unwrap();
    (manager, counters)
}

#[test]
fn slow_store_read_degrades_to_miss() {
    let (cache, counters) = broken_manager(Duration::from_millis(400));
    let started = Instant::now();
    assert_eq!(cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false), None);
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(counters.snapshot().timeouts, 1);
}

#[test]
fn failing_store_write_returns_false() {
    let (cache, counters) = broken_manager(Duration::ZERO);
    assert!(!cache.set(&["Alpha", "Beta"], &match_payload(), false));
    assert_eq!(counters.snapshot().failures, 1);
}

#[test]
fn detached_write_failure_reaches_observer() {
    let (cache, counters) = broken_manager(Duration::ZERO);
    cache.set_detached(&["Alpha", "Beta"], &match_payload(), false);
    let deadline = Instant::now() + Duration::from_secs(2);
    while counters.snapshot().failures == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(counters.snapshot().failures, 1);
}

#[test]
fn clear_propagates_store_errors() {
    let (cache, _) = broken_manager(Duration::ZERO);
    let err = cache.clear(None).unwrap_err();
    assert!(matches!(err, OddsError::ClearCacheFailure(_)));
    assert!(err.to_string().contains("database is locked"));
}

/// Store with slow reads that counts the operations it actually runs.
#[derive(Clone, Default)]
struct CountingStore {
    read_delay: Duration,
    finds: Arc<AtomicUsize>,
    upserts: Arc<AtomicUsize>,
}

impl OddsStore for CountingStore {
    fn find(&self, _: &str, _: CacheKind, _: i64) -> Result<Option<StoredEntry>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.read_delay);
        Ok(None)
    }

    fn upsert(&self, _: &CacheEntry) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self, _: Option<CacheKind>) -> Result<usize> {
        Ok(0)
    }

    fn stats(&self, _: i64) -> Result<CacheStats> {
        Ok(CacheStats::default())
    }

    fn sweep_expired(&self, _: i64) -> Result<usize> {
        Ok(0)
    }
}

fn counting_manager(
    store: &CountingStore,
    write_timeout: Duration,
) -> (CacheManager, Arc<CacheCounters>) {
    let config = CacheConfig {
        db_path: None,
        read_timeout: Duration::from_millis(50),
        write_timeout,
        ..CacheConfig::default()
    };
    let counters = Arc::new(CacheCounters::default());
    let manager = CacheManager::with_store(store.clone(), &config, counters.clone()).unwrap();
    (manager, counters)
}

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

#[test]
fn abandoned_reads_do_not_starve_detached_writes() {
    let store = CountingStore {
        read_delay: Duration::from_millis(100),
        ..CountingStore::default()
    };
    let (cache, counters) = counting_manager(&store, Duration::from_secs(1));
    for _ in 0..20 {
        assert_eq!(cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false), None);
    }
    assert_eq!(counters.snapshot().timeouts, 20);

    cache.set_detached(&["Alpha", "Beta"], &match_payload(), false);
    assert!(wait_until(Duration::from_secs(3), || counters.snapshot().stored == 1));
    assert_eq!(store.upserts.load(Ordering::SeqCst), 1);
    // Reads whose caller had already given up never reached the store.
    assert!(store.finds.load(Ordering::SeqCst) < 20);
}

#[test]
fn detached_write_past_deadline_is_dropped_and_reported() {
    let store = CountingStore {
        read_delay: Duration::from_millis(300),
        ..CountingStore::default()
    };
    let (cache, counters) = counting_manager(&store, Duration::from_millis(50));
    // The read times out but keeps the worker busy well past the write deadline.
    assert_eq!(cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false), None);
    cache.set_detached(&["Alpha", "Beta"], &match_payload(), false);

    assert!(wait_until(Duration::from_secs(2), || counters.snapshot().timeouts == 2));
    // A later admin call drains the queue, so the dropped write cannot still be pending.
    cache.stats().unwrap();
    assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
    assert_eq!(counters.snapshot().stored, 0);
}

#[test]
fn idle_worker_sweeps_expired_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        sweep_interval: Duration::from_millis(100),
        ..temp_config(&dir)
    };
    let (cache, _) = manager(&config);
    assert!(cache.set_with_ttl(
        &["A", "B", "C", "D"],
        &group_payload(),
        false,
        chrono::Duration::milliseconds(-1),
    ));
    assert!(cache.set(&["E", "F", "G", "H"], &group_payload(), false));
    assert!(wait_until(Duration::from_secs(3), || {
        cache.stats().unwrap().total == 1
    }));
    assert_eq!(cache.stats().unwrap().expired, 0);
}

#[test]
fn zero_sweep_interval_keeps_worker_responsive() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        sweep_interval: Duration::ZERO,
        ..temp_config(&dir)
    };
    let (cache, counters) = manager(&config);
    assert!(cache.set(&["Alpha", "Beta"], &match_payload(), false));
    assert_eq!(
        cache.get(&["Alpha", "Beta"], CacheKind::MatchOdds, false),
        Some(match_payload())
    );
    assert_eq!(counters.snapshot().timeouts, 0);
}

