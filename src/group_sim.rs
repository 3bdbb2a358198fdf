use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OddsError;
use crate::match_sim::{
    ConvergenceTracker, IterationBudget, MatchModel, MatchResult, SimulationPolicy, Stage,
};
use crate::odds::probability_to_american_odds;
use crate::ratings::DEFAULT_RATING;
use crate::rng::{RandomSource, SeededLcg, compare_ids};

pub const GROUP_SIZE: usize = 4;

const WIN_POINTS: u32 = 3;
const DRAW_POINTS: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct GroupTeam {
    pub id: String,
    pub rating: Option<f64>,
    pub rank: Option<u32>,
}

impl GroupTeam {
    pub fn new(id: impl Into<String>, rating: Option<f64>) -> Self {
        Self {
            id: id.into(),
            rating,
            rank: None,
        }
    }

    fn effective_rating(&self) -> f64 {
        self.rating
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(DEFAULT_RATING)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamWinnerOdds {
    pub probability: f64,
    pub odds: Option<i32>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupWinnerOdds {
    pub teams: BTreeMap<String, TeamWinnerOdds>,
    pub iterations: u32,
}

impl GroupWinnerOdds {
    pub fn get(&self, team: &str) -> Option<&TeamWinnerOdds> {
        self.teams.get(team.trim())
    }

    /// Teams ordered by descending win probability.
    pub fn ranked(&self) -> Vec<(&str, &TeamWinnerOdds)> {
        let mut out = self
            .teams
            .iter()
            .map(|(id, odds)| (id.as_str(), odds))
            .collect::<Vec<_>>();
        out.sort_by(|a, b| b.1.probability.total_cmp(&a.1.probability));
        out
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Standing {
    points: u32,
    goal_difference: i32,
}

/// Seeds from the team identifiers and runs [`simulate_group_winner`].
pub fn simulate_group_winner_seeded(
    policy: &SimulationPolicy,
    teams: &[GroupTeam],
) -> Result<GroupWinnerOdds, OddsError> {
    let ids = teams.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
    let mut rng = SeededLcg::from_ids(&ids);
    simulate_group_winner(policy, teams, IterationBudget::Adaptive, &mut rng)
}

/// Round-robin Monte Carlo over a four-team group. Teams are played in identifier order;
/// ties on points and goal difference go to the earlier team in that order.
pub fn simulate_group_winner(
    policy: &SimulationPolicy,
    teams: &[GroupTeam],
    budget: IterationBudget,
    rng: &mut impl RandomSource,
) -> Result<GroupWinnerOdds, OddsError> {
    let started = Instant::now();
    let teams = canonical_group(teams)?;
    let ratings = teams
        .iter()
        .map(GroupTeam::effective_rating)
        .collect::<Vec<_>>();

    let mut fixtures = Vec::with_capacity(GROUP_SIZE * (GROUP_SIZE - 1) / 2);
    for i in 0..GROUP_SIZE {
        for j in (i + 1)..GROUP_SIZE {
            // Ratings are always positive here, so the model exists.
            if let Some(model) = MatchModel::new(ratings[i], ratings[j], Stage::GroupStage) {
                fixtures.push((i, j, model));
            }
        }
    }

    let spread = ratings.iter().copied().fold(f64::MIN, f64::max)
        - ratings.iter().copied().fold(f64::MAX, f64::min);
    let max_iterations = policy.max_iterations(spread, budget);
    let mut tracker = ConvergenceTracker::new(policy, budget);

    let mut wins = [0u32; GROUP_SIZE];
    let mut done = 0u32;
    while done < max_iterations {
        let mut table = [Standing::default(); GROUP_SIZE];
        for (i, j, model) in &fixtures {
            match model.play(rng) {
                MatchResult::WinA | MatchResult::ShootoutA => {
                    settle_decisive(&mut table, *i, *j, rng);
                }
                MatchResult::WinB | MatchResult::ShootoutB => {
                    settle_decisive(&mut table, *j, *i, rng);
                }
                MatchResult::Draw => {
                    table[*i].points += DRAW_POINTS;
                    table[*j].points += DRAW_POINTS;
                }
            }
        }
        wins[group_winner(&table)] += 1;
        done += 1;

        if tracker.is_due(done) {
            let n = f64::from(done);
            let current = wins.map(|w| f64::from(w) / n);
            if tracker.settled(&current) {
                debug!(iterations = done, "group simulation converged early");
                break;
            }
        }
    }

    let n = f64::from(done);
    let odds = teams
        .iter()
        .zip(wins)
        .map(|(team, w)| {
            let probability = f64::from(w) / n;
            (
                team.id.clone(),
                TeamWinnerOdds {
                    probability,
                    odds: probability_to_american_odds(probability),
                    rank: team.rank,
                },
            )
        })
        .collect::<BTreeMap<_, _>>();

    debug!(
        iterations = done,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "group winner simulation complete"
    );
    Ok(GroupWinnerOdds {
        teams: odds,
        iterations: done,
    })
}

fn settle_decisive(
    table: &mut [Standing; GROUP_SIZE],
    winner: usize,
    loser: usize,
    rng: &mut impl RandomSource,
) {
    let margin = (rng.next_f64() * 3.0).floor() as i32 + 1;
    table[winner].points += WIN_POINTS;
    table[winner].goal_difference += margin;
    table[loser].goal_difference -= margin;
}

fn group_winner(table: &[Standing; GROUP_SIZE]) -> usize {
    let mut best = 0;
    for (idx, s) in table.iter().enumerate().skip(1) {
        let top = &table[best];
        if s.points > top.points
            || (s.points == top.points && s.goal_difference > top.goal_difference)
        {
            best = idx;
        }
    }
    best
}

fn canonical_group(teams: &[GroupTeam]) -> Result<Vec<GroupTeam>, OddsError> {
    if teams.len() != GROUP_SIZE {
        return Err(OddsError::InvalidInput(format!(
            "a group needs exactly {GROUP_SIZE} teams, got {}",
            teams.len()
        )));
    }
    let mut out = teams
        .iter()
        .map(|t| GroupTeam {
            id: t.id.trim().to_string(),
            ..t.clone()
        })
        .collect::<Vec<_>>();
    if out.iter().any(|t| t.id.is_empty()) {
        return Err(OddsError::InvalidInput("blank team identifier".to_string()));
    }
    let distinct = out.iter().map(|t| t.id.as_str()).collect::<HashSet<_>>();
    if distinct.len() != GROUP_SIZE {
        return Err(OddsError::InvalidInput(
            "group teams must be distinct".to_string(),
        ));
    }
    out.sort_by(|a, b| compare_ids(&a.id, &b.id));
    Ok(out)
}
