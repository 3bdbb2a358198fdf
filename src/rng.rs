//! Seeded random streams for the simulators.
//!
//! The LCG constants and the identifier fold are part of the cache contract: a change
//! here changes every simulated distribution, so stored entries would no longer match a
//! fresh run.

use std::cmp::Ordering;

use rand::Rng;
use rand::rngs::StdRng;

const LCG_MULTIPLIER: u64 = 9301;
const LCG_INCREMENT: u64 = 49297;
const LCG_MODULUS: u64 = 233280;

pub const SEED_DELIMITER: &str = "|";

/// Uniform samples in `[0, 1)`.
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;
}

#[derive(Debug, Clone)]
pub struct SeededLcg {
    state: u64,
}

impl SeededLcg {
    pub fn new(seed: u32) -> Self {
        Self {
            state: u64::from(seed),
        }
    }

    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Self {
        Self::new(simulation_seed(ids))
    }
}

impl RandomSource for SeededLcg {
    fn next_f64(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }
}

impl RandomSource for StdRng {
    fn next_f64(&mut self) -> f64 {
        self.r#gen::<f64>()
    }
}

/// Folds the sorted, `|`-joined identifiers into a seed. Arithmetic wraps at 32 bits so
/// the value matches the seeds already persisted by earlier deployments.
pub fn simulation_seed<S: AsRef<str>>(ids: &[S]) -> u32 {
    let joined = canonical_ids(ids).join(SEED_DELIMITER);
    let mut acc: i32 = 0;
    for unit in joined.encode_utf16() {
        acc = acc
            .wrapping_shl(5)
            .wrapping_sub(acc)
            .wrapping_add(i32::from(unit));
    }
    acc.unsigned_abs()
}

/// Identifier order used for seeds and cache keys: UTF-16 code units, so identifiers
/// outside the Basic Multilingual Plane sort the same way as in stored keys.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// Trimmed identifiers in [`compare_ids`] order.
pub fn canonical_ids<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut out = ids
        .iter()
        .map(|id| id.as_ref().trim().to_string())
        .collect::<Vec<_>>();
    out.sort_by(|a, b| compare_ids(a, b));
    out
}
