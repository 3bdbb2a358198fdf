//! Rating-to-probability formulas shared by the match and group simulators.

const ELO_SCALE: f64 = 400.0;
const MARGIN_SCALE: f64 = 2000.0;

const DRAW_BASE: f64 = 0.30;
const DRAW_FLOOR: f64 = 0.15;
const PENALTY_BASE: f64 = 0.25;
const PENALTY_FLOOR: f64 = 0.10;

const SHOOTOUT_BASE: f64 = 0.4;
const SHOOTOUT_LEAN: f64 = 0.2;

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((r_b - r_a) / ELO_SCALE))
}

/// Share of group-stage matches that end level; shrinks as the rating gap widens.
pub fn draw_probability(rating_gap: f64) -> f64 {
    (DRAW_BASE - rating_gap.abs() / MARGIN_SCALE).max(DRAW_FLOOR)
}

/// Share of knockout matches still level after extra time.
pub fn penalty_probability(rating_gap: f64) -> f64 {
    (PENALTY_BASE - rating_gap.abs() / MARGIN_SCALE).max(PENALTY_FLOOR)
}

/// Chance that side A wins a shootout given its regulation expected score. Stays within
/// 0.3..0.5 for any expected score.
pub fn shootout_probability(expected_a: f64) -> f64 {
    SHOOTOUT_BASE + (expected_a - 0.5) * SHOOTOUT_LEAN
}
