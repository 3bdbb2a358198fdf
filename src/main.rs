use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use wc26_odds::odds_cache::CacheKind;
use wc26_odds::{OddsEngine, init_tracing, load_dotenv};

#[derive(Parser, Debug)]
#[command(name = "wc26_odds")]
#[command(about = "World Cup 2026 Monte Carlo odds with a durable result cache")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Group-winner odds for a four-team group
    Group {
        #[arg(num_args = 4, required = true)]
        teams: Vec<String>,
    },
    /// Head-to-head odds, oriented to the order given
    Match {
        team1: String,
        team2: String,
        /// Knockout tie: no draws, level games go to penalties
        #[arg(long)]
        knockout: bool,
    },
    /// Delete cached odds from both tiers
    ClearCache {
        /// group-winner or match-odds; everything when omitted
        #[arg(long)]
        kind: Option<CacheKind>,
    },
    /// Row counts for the durable tier and the in-process tier
    CacheStats,
    /// Delete expired durable entries now
    Sweep,
}

fn main() -> Result<()> {
    load_dotenv();
    init_tracing();
    let args = Args::parse();
    let engine = OddsEngine::from_env().context("start odds engine")?;

    match args.command {
        Command::Group { teams } => {
            let response = engine.group_winner_odds(&teams)?;
            let ranked = response
                .odds
                .ranked()
                .into_iter()
                .map(|(team, odds)| {
                    json!({
                        "team": team,
                        "probability": odds.probability,
                        "odds": odds.odds,
                        "rank": odds.rank,
                    })
                })
                .collect::<Vec<_>>();
            print_json(&json!({
                "teams": ranked,
                "iterations": response.odds.iterations,
                "cached": response.cached(),
                "source": response.source,
            }))?;
        }
        Command::Match {
            team1,
            team2,
            knockout,
        } => {
            let response = engine.match_odds(&team1, &team2, knockout)?;
            print_json(&json!({
                "team1": team1.trim(),
                "team2": team2.trim(),
                "is_knockout": knockout,
                "odds": response.odds,
                "cached": response.cached(),
                "source": response.source,
            }))?;
        }
        Command::ClearCache { kind } => print_json(&engine.clear_cache(kind)?)?,
        Command::CacheStats => print_json(&engine.cache_stats()?)?,
        Command::Sweep => print_json(&json!({ "deleted_count": engine.sweep_expired()? }))?,
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("encode output")?;
    println!("{out}");
    Ok(())
}
