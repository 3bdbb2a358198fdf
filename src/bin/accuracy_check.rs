//! Compares adaptive-iteration match odds with a 10k-iteration baseline run on the same
//! seed, for a spread of rating gaps in both stages.
//!
//! Usage:
//!   accuracy_check [--reference]
//!
//! `--reference` swaps the seeded LCG for `StdRng` to check the tolerance does not depend
//! on the generator.

use std::process::ExitCode;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::info;

use wc26_odds::match_sim::{IterationBudget, MatchOdds, SimulationPolicy, Stage, simulate_match};
use wc26_odds::rng::{RandomSource, SeededLcg};
use wc26_odds::{init_tracing, load_dotenv};

const BASELINE_ITERATIONS: u32 = 10_000;
const TOLERANCE_PP: f64 = 2.0;

const SCENARIOS: &[(&str, f64, f64)] = &[
    ("very close, top teams", 1877.0, 1873.0),
    ("very close, mid teams", 1700.0, 1695.0),
    ("close, top vs mid", 1877.0, 1760.0),
    ("close, mid teams", 1700.0, 1650.0),
    ("moderate, top vs lower", 1877.0, 1500.0),
    ("moderate, mid vs lower", 1700.0, 1400.0),
    ("large, top vs bottom", 1877.0, 1200.0),
    ("large, mid vs bottom", 1500.0, 1000.0),
    ("extreme", 1900.0, 800.0),
    ("equal", 1500.0, 1500.0),
];

#[derive(Parser, Debug)]
#[command(name = "accuracy_check")]
#[command(about = "Adaptive vs fixed 10k-iteration simulation accuracy report")]
struct Args {
    /// Use StdRng instead of the seeded LCG
    #[arg(long)]
    reference: bool,
}

struct Outcome {
    name: &'static str,
    stage: Stage,
    rating_a: f64,
    rating_b: f64,
    adaptive_iterations: u32,
    diffs_pp: Vec<f64>,
}

impl Outcome {
    fn max_diff(&self) -> f64 {
        self.diffs_pp.iter().copied().fold(0.0, f64::max)
    }

    fn passed(&self) -> bool {
        self.max_diff() < TOLERANCE_PP
    }
}

fn main() -> ExitCode {
    load_dotenv();
    init_tracing();
    let args = Args::parse();
    let policy = SimulationPolicy::default();

    let cases = SCENARIOS
        .iter()
        .flat_map(|&(name, a, b)| {
            [Stage::GroupStage, Stage::Knockout].map(|stage| (name, a, b, stage))
        })
        .collect::<Vec<_>>();

    let outcomes = cases
        .par_iter()
        .filter_map(|&(name, a, b, stage)| {
            let seed = (a * 1000.0 + b).abs() as u64;
            let (adaptive, baseline) = if args.reference {
                run_pair(&policy, a, b, stage, || StdRng::seed_from_u64(seed))?
            } else {
                run_pair(&policy, a, b, stage, || SeededLcg::new(seed as u32))?
            };
            Some(Outcome {
                name,
                stage,
                rating_a: a,
                rating_b: b,
                adaptive_iterations: adaptive.iterations(),
                diffs_pp: components(&adaptive)
                    .iter()
                    .zip(components(&baseline))
                    .map(|(x, y)| (x - y).abs() * 100.0)
                    .collect(),
            })
        })
        .collect::<Vec<_>>();

    println!(
        "{:<26} {:<12} {:>7} {:>7} {:>6} {:>8}",
        "scenario", "stage", "A", "B", "iters", "max pp"
    );
    for o in &outcomes {
        println!(
            "{:<26} {:<12} {:>7.0} {:>7.0} {:>6} {:>8.2} {}",
            o.name,
            if o.stage.is_knockout() { "knockout" } else { "group" },
            o.rating_a,
            o.rating_b,
            o.adaptive_iterations,
            o.max_diff(),
            if o.passed() { "ok" } else { "FAIL" }
        );
    }

    let failed = outcomes.iter().filter(|o| !o.passed()).count();
    let worst = outcomes.iter().map(Outcome::max_diff).fold(0.0, f64::max);
    info!(
        cases = outcomes.len(),
        failed,
        worst_pp = worst,
        reference_rng = args.reference,
        "accuracy check finished"
    );
    if failed == 0 && outcomes.len() == cases.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_pair<R: RandomSource>(
    policy: &SimulationPolicy,
    a: f64,
    b: f64,
    stage: Stage,
    make_rng: impl Fn() -> R,
) -> Option<(MatchOdds, MatchOdds)> {
    let adaptive = simulate_match(
        policy,
        a,
        b,
        stage,
        IterationBudget::Adaptive,
        &mut make_rng(),
    )?;
    let baseline = simulate_match(
        policy,
        a,
        b,
        stage,
        IterationBudget::Fixed(BASELINE_ITERATIONS),
        &mut make_rng(),
    )?;
    Some((adaptive, baseline))
}

fn components(odds: &MatchOdds) -> Vec<f64> {
    match odds {
        MatchOdds::GroupStage(o) => vec![
            o.team_a.probability,
            o.team_b.probability,
            o.draw.probability,
        ],
        MatchOdds::Knockout(o) => vec![
            o.team_a.probability,
            o.team_b.probability,
            o.penalty_probability,
        ],
    }
}
