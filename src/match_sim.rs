use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::elo;
use crate::odds::OutcomeQuote;
use crate::rng::RandomSource;

pub const BASE_ITERATIONS: u32 = 3000;
pub const CLOSE_ITERATIONS: u32 = 5000;
pub const CLOSE_RATING_GAP: f64 = 100.0;
pub const MIN_ITERATIONS: u32 = 2000;
pub const CONVERGENCE_WINDOW: u32 = 500;
pub const CONVERGENCE_THRESHOLD: f64 = 0.005;

const SLOW_SIMULATION_MS: u128 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GroupStage,
    Knockout,
}

impl Stage {
    pub fn from_knockout(is_knockout: bool) -> Self {
        if is_knockout {
            Stage::Knockout
        } else {
            Stage::GroupStage
        }
    }

    pub fn is_knockout(self) -> bool {
        matches!(self, Stage::Knockout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationBudget {
    /// Base or close-pairing count, stopping early once the estimate settles.
    Adaptive,
    /// Exactly this many iterations, no early stop.
    Fixed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationPolicy {
    pub base_iterations: u32,
    pub close_iterations: u32,
    pub close_rating_gap: f64,
    pub min_iterations: u32,
    pub convergence_window: u32,
    pub convergence_threshold: f64,
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        Self {
            base_iterations: BASE_ITERATIONS,
            close_iterations: CLOSE_ITERATIONS,
            close_rating_gap: CLOSE_RATING_GAP,
            min_iterations: MIN_ITERATIONS,
            convergence_window: CONVERGENCE_WINDOW,
            convergence_threshold: CONVERGENCE_THRESHOLD,
        }
    }
}

impl SimulationPolicy {
    pub fn max_iterations(&self, rating_gap: f64, budget: IterationBudget) -> u32 {
        match budget {
            IterationBudget::Fixed(n) => n.max(1),
            IterationBudget::Adaptive if rating_gap.abs() < self.close_rating_gap => {
                self.close_iterations.max(1)
            }
            IterationBudget::Adaptive => self.base_iterations.max(1),
        }
    }
}

/// Compares the running outcome vector against the previous checkpoint.
#[derive(Debug, Clone)]
pub(crate) struct ConvergenceTracker {
    enabled: bool,
    min_iterations: u32,
    window: u32,
    threshold: f64,
    previous: Option<Vec<f64>>,
}

impl ConvergenceTracker {
    pub(crate) fn new(policy: &SimulationPolicy, budget: IterationBudget) -> Self {
        Self {
            enabled: matches!(budget, IterationBudget::Adaptive) && policy.convergence_window > 0,
            min_iterations: policy.min_iterations,
            window: policy.convergence_window,
            threshold: policy.convergence_threshold,
            previous: None,
        }
    }

    pub(crate) fn is_due(&self, done: u32) -> bool {
        self.enabled && done >= self.min_iterations && done % self.window == 0
    }

    /// Records a checkpoint; true when no component moved by the threshold or more.
    pub(crate) fn settled(&mut self, current: &[f64]) -> bool {
        let settled = self.previous.as_deref().is_some_and(|prev| {
            let max_change = prev
                .iter()
                .zip(current)
                .map(|(p, c)| (c - p).abs())
                .fold(0.0_f64, f64::max);
            max_change < self.threshold
        });
        self.previous = Some(current.to_vec());
        settled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    WinA,
    WinB,
    Draw,
    ShootoutA,
    ShootoutB,
}

/// Per-match probabilities derived from two ratings. `play` is the single-iteration
/// primitive the group simulator reuses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchModel {
    pub stage: Stage,
    pub rating_gap: f64,
    pub expected_a: f64,
    pub expected_b: f64,
    pub win_a: f64,
    pub win_b: f64,
    /// Draw share in the group stage, penalty share in knockouts.
    pub level: f64,
    pub shootout_a: f64,
}

impl MatchModel {
    pub fn new(rating_a: f64, rating_b: f64, stage: Stage) -> Option<Self> {
        if !usable_rating(rating_a) || !usable_rating(rating_b) {
            return None;
        }
        let rating_gap = (rating_a - rating_b).abs();
        let expected_a = elo::expected_score(rating_a, rating_b);
        let expected_b = elo::expected_score(rating_b, rating_a);
        let level = match stage {
            Stage::GroupStage => elo::draw_probability(rating_gap),
            Stage::Knockout => elo::penalty_probability(rating_gap),
        };
        Some(Self {
            stage,
            rating_gap,
            expected_a,
            expected_b,
            win_a: expected_a * (1.0 - level),
            win_b: expected_b * (1.0 - level),
            level,
            shootout_a: elo::shootout_probability(expected_a),
        })
    }

    pub fn play(&self, rng: &mut impl RandomSource) -> MatchResult {
        let roll = rng.next_f64();
        if roll < self.win_a {
            return MatchResult::WinA;
        }
        if roll < self.win_a + self.win_b {
            return MatchResult::WinB;
        }
        match self.stage {
            Stage::GroupStage => MatchResult::Draw,
            Stage::Knockout => {
                if rng.next_f64() < self.shootout_a {
                    MatchResult::ShootoutA
                } else {
                    MatchResult::ShootoutB
                }
            }
        }
    }
}

fn usable_rating(rating: f64) -> bool {
    rating.is_finite() && rating > 0.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStageOdds {
    pub team_a: OutcomeQuote,
    pub team_b: OutcomeQuote,
    pub draw: OutcomeQuote,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnockoutOdds {
    /// Win in regulation or on penalties.
    pub team_a: OutcomeQuote,
    pub team_b: OutcomeQuote,
    /// Conditional on the match reaching a shootout.
    pub team_a_shootout: OutcomeQuote,
    pub team_b_shootout: OutcomeQuote,
    pub penalty_probability: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum MatchOdds {
    GroupStage(GroupStageOdds),
    Knockout(KnockoutOdds),
}

impl MatchOdds {
    pub fn stage(&self) -> Stage {
        match self {
            MatchOdds::GroupStage(_) => Stage::GroupStage,
            MatchOdds::Knockout(_) => Stage::Knockout,
        }
    }

    pub fn iterations(&self) -> u32 {
        match self {
            MatchOdds::GroupStage(o) => o.iterations,
            MatchOdds::Knockout(o) => o.iterations,
        }
    }

    pub fn team_a(&self) -> OutcomeQuote {
        match self {
            MatchOdds::GroupStage(o) => o.team_a,
            MatchOdds::Knockout(o) => o.team_a,
        }
    }

    pub fn team_b(&self) -> OutcomeQuote {
        match self {
            MatchOdds::GroupStage(o) => o.team_b,
            MatchOdds::Knockout(o) => o.team_b,
        }
    }

    /// Same distribution with the two sides exchanged.
    pub fn swapped(self) -> Self {
        match self {
            MatchOdds::GroupStage(o) => MatchOdds::GroupStage(GroupStageOdds {
                team_a: o.team_b,
                team_b: o.team_a,
                ..o
            }),
            MatchOdds::Knockout(o) => MatchOdds::Knockout(KnockoutOdds {
                team_a: o.team_b,
                team_b: o.team_a,
                team_a_shootout: o.team_b_shootout,
                team_b_shootout: o.team_a_shootout,
                ..o
            }),
        }
    }
}

/// Monte Carlo estimate of a single match. `None` when either rating is missing.
pub fn simulate_match(
    policy: &SimulationPolicy,
    rating_a: f64,
    rating_b: f64,
    stage: Stage,
    budget: IterationBudget,
    rng: &mut impl RandomSource,
) -> Option<MatchOdds> {
    let started = Instant::now();
    let model = MatchModel::new(rating_a, rating_b, stage)?;
    let max_iterations = policy.max_iterations(model.rating_gap, budget);
    let mut tracker = ConvergenceTracker::new(policy, budget);

    let mut wins_a = 0u32;
    let mut wins_b = 0u32;
    let mut level = 0u32;
    let mut shootout_a = 0u32;
    let mut shootout_b = 0u32;
    let mut done = 0u32;

    while done < max_iterations {
        match model.play(rng) {
            MatchResult::WinA => wins_a += 1,
            MatchResult::WinB => wins_b += 1,
            MatchResult::Draw => level += 1,
            MatchResult::ShootoutA => {
                level += 1;
                shootout_a += 1;
            }
            MatchResult::ShootoutB => {
                level += 1;
                shootout_b += 1;
            }
        }
        done += 1;

        if tracker.is_due(done) {
            let n = f64::from(done);
            let settled = match stage {
                Stage::GroupStage => tracker.settled(&[
                    f64::from(wins_a) / n,
                    f64::from(wins_b) / n,
                    f64::from(level) / n,
                ]),
                Stage::Knockout => tracker.settled(&[
                    f64::from(wins_a + shootout_a) / n,
                    f64::from(wins_b + shootout_b) / n,
                ]),
            };
            if settled {
                debug!(iterations = done, ?stage, "match simulation converged early");
                break;
            }
        }
    }

    let n = f64::from(done);
    let odds = match stage {
        Stage::GroupStage => MatchOdds::GroupStage(GroupStageOdds {
            team_a: OutcomeQuote::from_probability(f64::from(wins_a) / n),
            team_b: OutcomeQuote::from_probability(f64::from(wins_b) / n),
            draw: OutcomeQuote::from_probability(f64::from(level) / n),
            iterations: done,
        }),
        Stage::Knockout => {
            let (cond_a, cond_b) = if level > 0 {
                let reached = f64::from(level);
                (f64::from(shootout_a) / reached, f64::from(shootout_b) / reached)
            } else {
                (model.shootout_a, 1.0 - model.shootout_a)
            };
            MatchOdds::Knockout(KnockoutOdds {
                team_a: OutcomeQuote::from_probability(f64::from(wins_a + shootout_a) / n),
                team_b: OutcomeQuote::from_probability(f64::from(wins_b + shootout_b) / n),
                team_a_shootout: OutcomeQuote::from_probability(cond_a),
                team_b_shootout: OutcomeQuote::from_probability(cond_b),
                penalty_probability: f64::from(level) / n,
                iterations: done,
            })
        }
    };

    let elapsed = started.elapsed().as_millis();
    if elapsed > SLOW_SIMULATION_MS {
        debug!(iterations = done, elapsed_ms = elapsed as u64, "slow match simulation");
    }
    Some(odds)
}
