use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::match_sim::SimulationPolicy;

const CACHE_DIR: &str = "wc26_odds";
const CACHE_DB_FILE: &str = "odds_cache.sqlite3";

const DEFAULT_TTL_DAYS: i64 = 7;
const DEFAULT_READ_TIMEOUT_MS: u64 = 200;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 500;
const DEFAULT_SWEEP_SECS: u64 = 60;
const DEFAULT_MEMORY_MAX: usize = 512;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub db_path: Option<PathBuf>,
    pub ttl: chrono::Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub sweep_interval: Duration,
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_db_path(),
            ttl: chrono::Duration::days(DEFAULT_TTL_DAYS),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
            memory_capacity: DEFAULT_MEMORY_MAX,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let enabled = env_bool("ODDS_CACHE_ENABLED", true);
        let db_path = env::var("ODDS_CACHE_DB")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(default_db_path);
        let ttl_days = env_parse("ODDS_CACHE_TTL_DAYS", DEFAULT_TTL_DAYS).clamp(1, 90);
        let read_timeout_ms =
            env_parse("ODDS_CACHE_READ_TIMEOUT_MS", DEFAULT_READ_TIMEOUT_MS).clamp(10, 5_000);
        let write_timeout_ms =
            env_parse("ODDS_CACHE_WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT_MS).clamp(10, 10_000);
        let sweep_secs = env_parse("ODDS_CACHE_SWEEP_SECS", DEFAULT_SWEEP_SECS).clamp(1, 86_400);
        let memory_capacity =
            env_parse("ODDS_MEMORY_CACHE_MAX", DEFAULT_MEMORY_MAX).clamp(1, 100_000);

        Self {
            enabled,
            db_path,
            ttl: chrono::Duration::days(ttl_days),
            read_timeout: Duration::from_millis(read_timeout_ms),
            write_timeout: Duration::from_millis(write_timeout_ms),
            sweep_interval: Duration::from_secs(sweep_secs),
            memory_capacity,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub simulation: SimulationPolicy,
    pub ratings_file: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let ratings_file = env::var("ODDS_RATINGS_FILE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Self {
            cache: CacheConfig::from_env(),
            simulation: SimulationPolicy::default(),
            ratings_file,
        }
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(CACHE_DB_FILE))
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
