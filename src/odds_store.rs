use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::odds_cache::{CacheEntry, CacheKind, CacheStats, StoredEntry};

const BUSY_TIMEOUT: Duration = Duration::from_secs(1);

/// Durable backing store for the odds cache. Implementations are driven from a single
/// worker thread, so they only need to be `Send`.
pub trait OddsStore: Send {
    /// Entry for (key, kind) whose expiry is strictly after `now_ms`.
    fn find(&self, cache_key: &str, kind: CacheKind, now_ms: i64) -> Result<Option<StoredEntry>>;
    fn upsert(&self, entry: &CacheEntry) -> Result<()>;
    fn clear(&self, kind: Option<CacheKind>) -> Result<usize>;
    fn stats(&self, now_ms: i64) -> Result<CacheStats>;
    fn sweep_expired(&self, now_ms: i64) -> Result<usize>;
}

pub struct SqliteOddsStore {
    conn: Connection,
}

impl SqliteOddsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache directory {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT).context("set sqlite busy timeout")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS odds_cache (
            cache_key TEXT NOT NULL,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            teams TEXT NOT NULL,
            is_knockout INTEGER NOT NULL DEFAULT 0,
            expires_at INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (cache_key, kind)
        );
        CREATE INDEX IF NOT EXISTS idx_odds_cache_expires ON odds_cache(expires_at);
        CREATE INDEX IF NOT EXISTS idx_odds_cache_kind ON odds_cache(kind, expires_at);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

impl OddsStore for SqliteOddsStore {
    fn find(&self, cache_key: &str, kind: CacheKind, now_ms: i64) -> Result<Option<StoredEntry>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT cache_key, kind, payload, teams, is_knockout, expires_at,
                       created_at, updated_at
                FROM odds_cache
                WHERE cache_key = ?1 AND kind = ?2 AND expires_at > ?3
                "#,
                params![cache_key, kind.as_str(), now_ms],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)? != 0,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .context("query odds cache entry")?;

        let Some((
            cache_key,
            kind_raw,
            payload,
            teams_json,
            is_knockout,
            expires_at_ms,
            created_at,
            updated_at,
        )) = row
        else {
            return Ok(None);
        };
        let kind = CacheKind::parse(&kind_raw)
            .with_context(|| format!("unknown cache kind {kind_raw}"))?;
        let teams = serde_json::from_str::<Vec<String>>(&teams_json).context("decode teams")?;
        Ok(Some(StoredEntry {
            entry: CacheEntry {
                cache_key,
                kind,
                payload,
                teams,
                is_knockout,
                expires_at_ms,
            },
            created_at,
            updated_at,
        }))
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let teams = serde_json::to_string(&entry.teams).context("encode teams")?;
        self.conn
            .execute(
                r#"
                INSERT INTO odds_cache (
                    cache_key, kind, payload, teams, is_knockout, expires_at,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ON CONFLICT(cache_key, kind) DO UPDATE SET
                    payload = excluded.payload,
                    teams = excluded.teams,
                    is_knockout = excluded.is_knockout,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    entry.cache_key,
                    entry.kind.as_str(),
                    entry.payload,
                    teams,
                    i64::from(entry.is_knockout),
                    entry.expires_at_ms,
                    now,
                ],
            )
            .context("upsert odds cache entry")?;
        Ok(())
    }

    fn clear(&self, kind: Option<CacheKind>) -> Result<usize> {
        let deleted = match kind {
            Some(kind) => self
                .conn
                .execute("DELETE FROM odds_cache WHERE kind = ?1", params![kind.as_str()]),
            None => self.conn.execute("DELETE FROM odds_cache", []),
        }
        .context("clear odds cache")?;
        Ok(deleted)
    }

    fn stats(&self, now_ms: i64) -> Result<CacheStats> {
        let total = self
            .conn
            .query_row("SELECT COUNT(*) FROM odds_cache", [], |row| row.get::<_, i64>(0))
            .context("count odds cache")?;
        let expired = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM odds_cache WHERE expires_at <= ?1",
                params![now_ms],
                |row| row.get::<_, i64>(0),
            )
            .context("count expired odds cache")?;

        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM odds_cache GROUP BY kind")
            .context("prepare odds cache kind counts")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .context("query odds cache kind counts")?;
        let mut by_kind = BTreeMap::new();
        for row in rows {
            let (kind, count) = row.context("decode kind count")?;
            by_kind.insert(kind, count as usize);
        }

        Ok(CacheStats {
            total: total as usize,
            active: (total - expired) as usize,
            expired: expired as usize,
            by_kind,
        })
    }

    fn sweep_expired(&self, now_ms: i64) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM odds_cache WHERE expires_at <= ?1",
                params![now_ms],
            )
            .context("delete expired odds cache entries")
    }
}
