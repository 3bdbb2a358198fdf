pub mod config;
pub mod elo;
pub mod engine;
pub mod error;
pub mod group_sim;
pub mod match_sim;
pub mod memory_cache;
pub mod odds;
pub mod odds_cache;
pub mod odds_store;
pub mod ratings;
pub mod rng;

pub use engine::{CacheReport, ClearReport, OddsEngine, OddsResponse, OddsSource};
pub use error::OddsError;

/// Installs the `tracing` subscriber used by the binaries. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wc26_odds=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Loads `.env.local` then `.env`; variables already set in the environment win.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}
