use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OddsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no rating available for {team}")]
    InsufficientRatingData { team: String },

    #[error("cache {op} timed out after {}ms", .after.as_millis())]
    CacheTimeout { op: &'static str, after: Duration },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("failed to clear cache: {0:#}")]
    ClearCacheFailure(anyhow::Error),

    #[error("cache store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl OddsError {
    /// Cache failures are recovered locally by the engine; everything else reaches callers.
    pub fn is_cache_failure(&self) -> bool {
        matches!(
            self,
            OddsError::CacheTimeout { .. } | OddsError::CacheUnavailable(_) | OddsError::Store(_)
        )
    }
}
