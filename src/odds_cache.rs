//! Durable odds cache.
//!
//! A single worker thread owns the [`OddsStore`]; every public call is a message to that
//! thread. Reads and writes wait on the reply with a deadline and degrade to a miss or a
//! failed write when it passes, while the worker finishes (or discards) the operation on
//! its own. The worker also deletes expired rows whenever it has been idle for the sweep
//! interval.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::OddsError;
use crate::group_sim::GroupWinnerOdds;
use crate::match_sim::MatchOdds;
use crate::odds_store::{OddsStore, SqliteOddsStore};
use crate::rng::canonical_ids;

pub const KEY_DELIMITER: &str = "|";

const ADMIN_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    GroupWinner,
    MatchOdds,
}

impl CacheKind {
    pub const ALL: [CacheKind; 2] = [CacheKind::GroupWinner, CacheKind::MatchOdds];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::GroupWinner => "group-winner",
            CacheKind::MatchOdds => "match-odds",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "group-winner" | "group_winner" => Some(CacheKind::GroupWinner),
            "match-odds" | "match_odds" => Some(CacheKind::MatchOdds),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = OddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheKind::parse(s)
            .ok_or_else(|| OddsError::InvalidInput(format!("unknown cache kind {s:?}")))
    }
}

/// Cached payload, tagged by kind so a row can be decoded without outside context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum CachedOdds {
    GroupWinner(GroupWinnerOdds),
    MatchOdds(MatchOdds),
}

impl CachedOdds {
    pub fn kind(&self) -> CacheKind {
        match self {
            CachedOdds::GroupWinner(_) => CacheKind::GroupWinner,
            CachedOdds::MatchOdds(_) => CacheKind::MatchOdds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub kind: CacheKind,
    /// JSON-encoded [`CachedOdds`].
    pub payload: String,
    pub teams: Vec<String>,
    pub is_knockout: bool,
    pub expires_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub entry: CacheEntry,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub by_kind: BTreeMap<String, usize>,
}

/// Sorted identifiers joined with `|`, suffixed with the match context so group-stage and
/// knockout entries for the same pairing never collide.
pub fn derive_cache_key<S: AsRef<str>>(ids: &[S], is_knockout: bool) -> String {
    let context = if is_knockout { "knockout" } else { "group" };
    format!("{}_{}", canonical_ids(ids).join(KEY_DELIMITER), context)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Read,
    Write,
    Clear,
    Stats,
    Sweep,
}

impl CacheOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheOp::Read => "read",
            CacheOp::Write => "write",
            CacheOp::Clear => "clear",
            CacheOp::Stats => "stats",
            CacheOp::Sweep => "sweep",
        }
    }
}

#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit { kind: CacheKind, elapsed: Duration },
    Miss { kind: CacheKind, elapsed: Duration },
    Stored { kind: CacheKind },
    Timeout { op: CacheOp, after: Duration },
    Failed { op: CacheOp, error: String },
}

/// Receives the outcome of cache operations, including detached writes nobody waits on.
pub trait CacheObserver: Send + Sync {
    fn record(&self, event: &CacheEvent);
}

#[derive(Debug, Default)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn record(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Hit { kind, elapsed } => {
                debug!(%kind, elapsed_ms = elapsed.as_millis() as u64, "cache hit")
            }
            CacheEvent::Miss { kind, elapsed } => {
                debug!(%kind, elapsed_ms = elapsed.as_millis() as u64, "cache miss")
            }
            CacheEvent::Stored { kind } => debug!(%kind, "cache entry stored"),
            CacheEvent::Timeout { op, after } => warn!(
                op = op.as_str(),
                after_ms = after.as_millis() as u64,
                "cache operation timed out, skipping durable cache"
            ),
            CacheEvent::Failed { op, error } => {
                warn!(op = op.as_str(), %error, "cache operation failed")
            }
        }
    }
}

/// Counts events and forwards them to `tracing`.
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub stored: AtomicU64,
    pub timeouts: AtomicU64,
    pub failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stored: u64,
    pub timeouts: u64,
    pub failures: u64,
}

impl CacheCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl CacheObserver for CacheCounters {
    fn record(&self, event: &CacheEvent) {
        let counter = match event {
            CacheEvent::Hit { .. } => &self.hits,
            CacheEvent::Miss { .. } => &self.misses,
            CacheEvent::Stored { .. } => &self.stored,
            CacheEvent::Timeout { .. } => &self.timeouts,
            CacheEvent::Failed { .. } => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        TracingObserver.record(event);
    }
}

enum Command {
    Find {
        cache_key: String,
        kind: CacheKind,
        now_ms: i64,
        // Reads still queued past this point are skipped; their caller has already missed.
        deadline: Instant,
        reply: Sender<Result<Option<StoredEntry>>>,
    },
    Upsert {
        entry: CacheEntry,
        deadline: Instant,
        // None for detached writes; the worker reports their outcome itself.
        reply: Option<Sender<Result<()>>>,
    },
    Clear {
        kind: Option<CacheKind>,
        reply: Sender<Result<usize>>,
    },
    Stats {
        now_ms: i64,
        reply: Sender<Result<CacheStats>>,
    },
    Sweep {
        now_ms: i64,
        reply: Sender<Result<usize>>,
    },
}

pub struct CacheManager {
    tx: Sender<Command>,
    observer: Arc<dyn CacheObserver>,
    ttl: chrono::Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl CacheManager {
    /// Opens the SQLite store at the configured path, or an in-memory one without a path.
    pub fn open(config: &CacheConfig, observer: Arc<dyn CacheObserver>) -> Result<Self> {
        let store = match config.db_path.as_deref() {
            Some(path) => SqliteOddsStore::open(path)?,
            None => SqliteOddsStore::open_in_memory()?,
        };
        Self::with_store(store, config, observer)
    }

    pub fn with_store(
        store: impl OddsStore + 'static,
        config: &CacheConfig,
        observer: Arc<dyn CacheObserver>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let sweep_interval = effective_sweep_interval(config);
        let worker_observer = Arc::clone(&observer);
        thread::Builder::new()
            .name("odds-cache-store".to_string())
            .spawn(move || run_worker(store, rx, sweep_interval, worker_observer))
            .context("spawn odds cache worker")?;
        Ok(Self {
            tx,
            observer,
            ttl: config.ttl,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        })
    }

    /// Non-expired payload for the identifiers, or `None` on a miss, timeout or error.
    pub fn get<S: AsRef<str>>(
        &self,
        ids: &[S],
        kind: CacheKind,
        is_knockout: bool,
    ) -> Option<CachedOdds> {
        let started = Instant::now();
        let (reply, rx) = mpsc::channel();
        let cmd = Command::Find {
            cache_key: derive_cache_key(ids, is_knockout),
            kind,
            now_ms: Utc::now().timestamp_millis(),
            deadline: started + self.read_timeout,
            reply,
        };
        if self.tx.send(cmd).is_err() {
            self.worker_gone(CacheOp::Read);
            return None;
        }

        let stored = match rx.recv_timeout(self.read_timeout) {
            Ok(Ok(stored)) => stored,
            Ok(Err(err)) => {
                self.observer.record(&CacheEvent::Failed {
                    op: CacheOp::Read,
                    error: format!("{err:#}"),
                });
                return None;
            }
            Err(RecvTimeoutError::Timeout) => {
                self.observer.record(&CacheEvent::Timeout {
                    op: CacheOp::Read,
                    after: started.elapsed(),
                });
                return None;
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.worker_gone(CacheOp::Read);
                return None;
            }
        };

        let decoded = stored.and_then(|s| decode_payload(&s.entry, &*self.observer));
        let elapsed = started.elapsed();
        if decoded.is_some() {
            self.observer.record(&CacheEvent::Hit { kind, elapsed });
        } else {
            self.observer.record(&CacheEvent::Miss { kind, elapsed });
        }
        decoded
    }

    /// Upserts with the configured TTL. Returns `false` instead of failing.
    pub fn set<S: AsRef<str>>(&self, ids: &[S], payload: &CachedOdds, is_knockout: bool) -> bool {
        self.set_with_ttl(ids, payload, is_knockout, self.ttl)
    }

    pub fn set_with_ttl<S: AsRef<str>>(
        &self,
        ids: &[S],
        payload: &CachedOdds,
        is_knockout: bool,
        ttl: chrono::Duration,
    ) -> bool {
        let started = Instant::now();
        let Some(entry) = self.build_entry(ids, payload, is_knockout, ttl) else {
            return false;
        };
        let kind = entry.kind;
        let (reply, rx) = mpsc::channel();
        let cmd = Command::Upsert {
            entry,
            deadline: started + self.write_timeout,
            reply: Some(reply),
        };
        if self.tx.send(cmd).is_err() {
            self.worker_gone(CacheOp::Write);
            return false;
        }

        match rx.recv_timeout(self.write_timeout) {
            Ok(Ok(())) => {
                self.observer.record(&CacheEvent::Stored { kind });
                true
            }
            Ok(Err(err)) => {
                self.observer.record(&CacheEvent::Failed {
                    op: CacheOp::Write,
                    error: format!("{err:#}"),
                });
                false
            }
            Err(RecvTimeoutError::Timeout) => {
                self.observer.record(&CacheEvent::Timeout {
                    op: CacheOp::Write,
                    after: started.elapsed(),
                });
                false
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.worker_gone(CacheOp::Write);
                false
            }
        }
    }

    /// Queues the write and returns at once. A write still queued when the write timeout
    /// passes is dropped; the outcome only reaches the observer.
    pub fn set_detached<S: AsRef<str>>(&self, ids: &[S], payload: &CachedOdds, is_knockout: bool) {
        let Some(entry) = self.build_entry(ids, payload, is_knockout, self.ttl) else {
            return;
        };
        let cmd = Command::Upsert {
            entry,
            deadline: Instant::now() + self.write_timeout,
            reply: None,
        };
        if self.tx.send(cmd).is_err() {
            self.worker_gone(CacheOp::Write);
        }
    }

    /// Deletes every entry, or every entry of one kind. Errors propagate.
    pub fn clear(&self, kind: Option<CacheKind>) -> Result<usize, OddsError> {
        let deleted = self
            .admin(CacheOp::Clear, |reply| Command::Clear { kind, reply })
            .map_err(|err| match err {
                OddsError::Store(inner) => OddsError::ClearCacheFailure(inner),
                other => other,
            })?;
        debug!(
            deleted,
            kind = kind.map(CacheKind::as_str).unwrap_or("all"),
            "odds cache cleared"
        );
        Ok(deleted)
    }

    pub fn stats(&self) -> Result<CacheStats, OddsError> {
        let now_ms = Utc::now().timestamp_millis();
        self.admin(CacheOp::Stats, |reply| Command::Stats { now_ms, reply })
    }

    pub fn sweep_expired(&self) -> Result<usize, OddsError> {
        let now_ms = Utc::now().timestamp_millis();
        let deleted = self.admin(CacheOp::Sweep, |reply| Command::Sweep { now_ms, reply })?;
        debug!(deleted, "expired odds cache entries removed");
        Ok(deleted)
    }

    fn admin<T>(
        &self,
        op: CacheOp,
        make: impl FnOnce(Sender<Result<T>>) -> Command,
    ) -> Result<T, OddsError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| OddsError::CacheUnavailable("cache worker stopped".to_string()))?;
        match rx.recv_timeout(ADMIN_TIMEOUT) {
            Ok(result) => result.map_err(OddsError::Store),
            Err(RecvTimeoutError::Timeout) => Err(OddsError::CacheTimeout {
                op: op.as_str(),
                after: ADMIN_TIMEOUT,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(OddsError::CacheUnavailable(
                "cache worker stopped".to_string(),
            )),
        }
    }

    fn build_entry<S: AsRef<str>>(
        &self,
        ids: &[S],
        payload: &CachedOdds,
        is_knockout: bool,
        ttl: chrono::Duration,
    ) -> Option<CacheEntry> {
        let encoded = match serde_json::to_string(payload) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.observer.record(&CacheEvent::Failed {
                    op: CacheOp::Write,
                    error: format!("encode payload: {err}"),
                });
                return None;
            }
        };
        Some(CacheEntry {
            cache_key: derive_cache_key(ids, is_knockout),
            kind: payload.kind(),
            payload: encoded,
            teams: canonical_ids(ids),
            is_knockout,
            expires_at_ms: (Utc::now() + ttl).timestamp_millis(),
        })
    }

    fn worker_gone(&self, op: CacheOp) {
        self.observer.record(&CacheEvent::Failed {
            op,
            error: "cache worker stopped".to_string(),
        });
    }
}

fn decode_payload(entry: &CacheEntry, observer: &dyn CacheObserver) -> Option<CachedOdds> {
    match serde_json::from_str::<CachedOdds>(&entry.payload) {
        Ok(payload) if payload.kind() == entry.kind => Some(payload),
        Ok(payload) => {
            observer.record(&CacheEvent::Failed {
                op: CacheOp::Read,
                error: format!(
                    "payload tagged {} stored under {}",
                    payload.kind(),
                    entry.kind
                ),
            });
            None
        }
        Err(err) => {
            observer.record(&CacheEvent::Failed {
                op: CacheOp::Read,
                error: format!("decode payload for {}: {err}", entry.cache_key),
            });
            None
        }
    }
}

/// Idle sweep period, floored so a zero interval cannot busy-loop the worker.
fn effective_sweep_interval(config: &CacheConfig) -> Duration {
    config.sweep_interval.max(MIN_SWEEP_INTERVAL)
}

fn run_worker(
    store: impl OddsStore,
    rx: Receiver<Command>,
    sweep_interval: Duration,
    observer: Arc<dyn CacheObserver>,
) {
    let mut next_sweep = Instant::now() + sweep_interval;
    loop {
        let wait = next_sweep.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(cmd) => handle_command(&store, cmd, &*observer),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if Instant::now() >= next_sweep {
            match store.sweep_expired(Utc::now().timestamp_millis()) {
                Ok(0) => {}
                Ok(deleted) => debug!(deleted, "expired odds cache entries swept"),
                Err(err) => observer.record(&CacheEvent::Failed {
                    op: CacheOp::Sweep,
                    error: format!("{err:#}"),
                }),
            }
            next_sweep = Instant::now() + sweep_interval;
        }
    }
    debug!("odds cache worker stopped");
}

// Reply send errors mean the caller already gave up waiting; the result is dropped.
fn handle_command(store: &impl OddsStore, cmd: Command, observer: &dyn CacheObserver) {
    match cmd {
        Command::Find {
            cache_key,
            kind,
            now_ms,
            deadline,
            reply,
        } => {
            if Instant::now() > deadline {
                debug!(%cache_key, "read expired in queue; skipped");
                return;
            }
            let _ = reply.send(store.find(&cache_key, kind, now_ms));
        }
        Command::Upsert {
            entry,
            deadline,
            reply,
        } => {
            if Instant::now() > deadline {
                let err = anyhow!("write for {} expired in queue", entry.cache_key);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(Err(err));
                    }
                    None => observer.record(&CacheEvent::Timeout {
                        op: CacheOp::Write,
                        after: Duration::ZERO,
                    }),
                }
                return;
            }
            let result = store.upsert(&entry);
            match reply {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => match result {
                    Ok(()) => observer.record(&CacheEvent::Stored { kind: entry.kind }),
                    Err(err) => observer.record(&CacheEvent::Failed {
                        op: CacheOp::Write,
                        error: format!("{err:#}"),
                    }),
                },
            }
        }
        Command::Clear { kind, reply } => {
            let _ = reply.send(store.clear(kind));
        }
        Command::Stats { now_ms, reply } => {
            let _ = reply.send(store.stats(now_ms));
        }
        Command::Sweep { now_ms, reply } => {
            let _ = reply.send(store.sweep_expired(now_ms));
        }
    }
}
