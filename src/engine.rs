//! Caller-side composition: rating lookup, the two cache tiers, and the simulators.

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::OddsError;
use crate::group_sim::{GROUP_SIZE, GroupTeam, GroupWinnerOdds, simulate_group_winner_seeded};
use crate::match_sim::{IterationBudget, MatchOdds, Stage, simulate_match};
use crate::memory_cache::{MemoryStats, MemoryTier};
use crate::odds_cache::{
    CacheKind, CacheManager, CacheObserver, CacheStats, CachedOdds, TracingObserver,
    derive_cache_key,
};
use crate::ratings::RatingTable;
use crate::rng::{SeededLcg, canonical_ids, compare_ids};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsSource {
    Durable,
    Memory,
    Computed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OddsResponse<T> {
    pub odds: T,
    pub source: OddsSource,
}

impl<T> OddsResponse<T> {
    pub fn cached(&self) -> bool {
        self.source != OddsSource::Computed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub deleted_count: usize,
    pub memory_deleted: usize,
    pub kind: Option<CacheKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    /// `None` when the durable tier is disabled or failed to open.
    pub durable: Option<CacheStats>,
    pub memory: MemoryStats,
}

pub struct OddsEngine {
    config: EngineConfig,
    ratings: RatingTable,
    cache: Option<CacheManager>,
    memory: MemoryTier,
}

impl OddsEngine {
    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env())
    }

    /// Loads ratings and opens the durable tier. A store that fails to open leaves the
    /// engine running on the memory tier alone.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let ratings = match config.ratings_file.as_deref() {
            Some(path) => RatingTable::with_overrides_file(path)?,
            None => RatingTable::fifa(),
        };
        let cache = if config.cache.enabled {
            let observer: Arc<dyn CacheObserver> = Arc::new(TracingObserver);
            match CacheManager::open(&config.cache, observer) {
                Ok(manager) => Some(manager),
                Err(err) => {
                    warn!(
                        error = %format!("{err:#}"),
                        "durable odds cache unavailable, using memory tier only"
                    );
                    None
                }
            }
        } else {
            info!("durable odds cache disabled");
            None
        };
        Ok(Self::with_parts(config, ratings, cache))
    }

    pub fn with_parts(
        config: EngineConfig,
        ratings: RatingTable,
        cache: Option<CacheManager>,
    ) -> Self {
        let memory = MemoryTier::new(config.cache.memory_capacity);
        Self {
            config,
            ratings,
            cache,
            memory,
        }
    }

    pub fn ratings(&self) -> &RatingTable {
        &self.ratings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_durable_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Group-winner probabilities for exactly four teams. Unknown teams play at the
    /// default rating.
    pub fn group_winner_odds<S: AsRef<str>>(
        &self,
        teams: &[S],
    ) -> Result<OddsResponse<GroupWinnerOdds>, OddsError> {
        if teams.len() != GROUP_SIZE {
            return Err(OddsError::InvalidInput(format!(
                "exactly {GROUP_SIZE} teams are required, got {}",
                teams.len()
            )));
        }
        let ids = canonical_ids(teams);
        if ids.iter().any(|id| id.is_empty()) {
            return Err(OddsError::InvalidInput("blank team identifier".to_string()));
        }
        let cache_key = derive_cache_key(&ids, false);

        let durable = self
            .cache
            .as_ref()
            .and_then(|c| c.get(&ids, CacheKind::GroupWinner, false));
        if let Some(CachedOdds::GroupWinner(odds)) = durable {
            return Ok(OddsResponse {
                odds,
                source: OddsSource::Durable,
            });
        }
        if let Some(CachedOdds::GroupWinner(odds)) =
            self.memory.get(CacheKind::GroupWinner, &cache_key)
        {
            return Ok(OddsResponse {
                odds,
                source: OddsSource::Memory,
            });
        }

        let group = ids
            .iter()
            .map(|id| {
                let known = self.ratings.lookup(id);
                GroupTeam {
                    id: id.clone(),
                    rating: self.ratings.points(id),
                    rank: known.and_then(|r| r.rank),
                }
            })
            .collect::<Vec<_>>();
        for team in group.iter().filter(|t| t.rating.is_none()) {
            debug!(team = %team.id, "no rating on file, using default");
        }
        let odds = simulate_group_winner_seeded(&self.config.simulation, &group)?;
        self.remember(&ids, cache_key, CachedOdds::GroupWinner(odds.clone()), false);
        Ok(OddsResponse {
            odds,
            source: OddsSource::Computed,
        })
    }

    /// Head-to-head odds oriented to the caller: `team_a` is `team1`. The simulation always
    /// runs in sorted identifier order, so swapping the arguments mirrors the result.
    pub fn match_odds(
        &self,
        team1: &str,
        team2: &str,
        is_knockout: bool,
    ) -> Result<OddsResponse<MatchOdds>, OddsError> {
        let (team1, team2) = (team1.trim(), team2.trim());
        if team1.is_empty() || team2.is_empty() {
            return Err(OddsError::InvalidInput("blank team identifier".to_string()));
        }
        let same_team = match (
            self.ratings.canonical_name(team1),
            self.ratings.canonical_name(team2),
        ) {
            (Some(a), Some(b)) => a == b,
            _ => team1.to_lowercase() == team2.to_lowercase(),
        };
        if same_team {
            return Err(OddsError::InvalidInput(format!("{team1} cannot play itself")));
        }
        let rating1 = self.require_rating(team1)?;
        let rating2 = self.require_rating(team2)?;

        let flipped = compare_ids(team1, team2) == Ordering::Greater;
        let (first, second, rating_first, rating_second) = if flipped {
            (team2, team1, rating2, rating1)
        } else {
            (team1, team2, rating1, rating2)
        };
        let ids = [first, second];
        let stage = Stage::from_knockout(is_knockout);
        let cache_key = derive_cache_key(&ids, is_knockout);
        let orient = |odds: MatchOdds| if flipped { odds.swapped() } else { odds };

        let durable = self
            .cache
            .as_ref()
            .and_then(|c| c.get(&ids, CacheKind::MatchOdds, is_knockout));
        if let Some(CachedOdds::MatchOdds(odds)) = durable {
            if odds.stage() == stage {
                return Ok(OddsResponse {
                    odds: orient(odds),
                    source: OddsSource::Durable,
                });
            }
            warn!(%cache_key, "cached match odds have the wrong stage, recomputing");
        }
        if let Some(CachedOdds::MatchOdds(odds)) =
            self.memory.get(CacheKind::MatchOdds, &cache_key)
        {
            return Ok(OddsResponse {
                odds: orient(odds),
                source: OddsSource::Memory,
            });
        }

        let mut rng = SeededLcg::from_ids(&ids);
        let odds = simulate_match(
            &self.config.simulation,
            rating_first,
            rating_second,
            stage,
            IterationBudget::Adaptive,
            &mut rng,
        )
        .ok_or_else(|| OddsError::InsufficientRatingData {
            team: format!("{first} / {second}"),
        })?;
        self.remember(&ids, cache_key, CachedOdds::MatchOdds(odds.clone()), is_knockout);
        Ok(OddsResponse {
            odds: orient(odds),
            source: OddsSource::Computed,
        })
    }

    /// Clears both tiers. Durable-store errors propagate.
    pub fn clear_cache(&self, kind: Option<CacheKind>) -> Result<ClearReport, OddsError> {
        let deleted_count = match &self.cache {
            Some(cache) => cache.clear(kind)?,
            None => 0,
        };
        let memory_deleted = self.memory.clear(kind);
        info!(
            deleted_count,
            memory_deleted,
            kind = kind.map(CacheKind::as_str).unwrap_or("all"),
            "odds cache cleared"
        );
        Ok(ClearReport {
            deleted_count,
            memory_deleted,
            kind,
        })
    }

    pub fn cache_stats(&self) -> Result<CacheReport, OddsError> {
        let durable = self.cache.as_ref().map(CacheManager::stats).transpose()?;
        Ok(CacheReport {
            durable,
            memory: self.memory.stats(),
        })
    }

    pub fn sweep_expired(&self) -> Result<usize, OddsError> {
        match &self.cache {
            Some(cache) => cache.sweep_expired(),
            None => Ok(0),
        }
    }

    fn require_rating(&self, team: &str) -> Result<f64, OddsError> {
        self.ratings
            .points(team)
            .ok_or_else(|| OddsError::InsufficientRatingData {
                team: team.to_string(),
            })
    }

    fn remember<S: AsRef<str>>(
        &self,
        ids: &[S],
        cache_key: String,
        payload: CachedOdds,
        is_knockout: bool,
    ) {
        if let Some(cache) = &self.cache {
            cache.set_detached(ids, &payload, is_knockout);
        }
        self.memory.insert(cache_key, payload);
    }
}
