use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeQuote {
    pub probability: f64,
    pub odds: Option<i32>,
}

impl OutcomeQuote {
    pub fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            odds: probability_to_american_odds(probability),
        }
    }
}

/// Favourites (p >= 0.5) get negative odds, underdogs positive. `None` outside (0, 1).
pub fn probability_to_american_odds(probability: f64) -> Option<i32> {
    if !(probability > 0.0 && probability < 1.0) {
        return None;
    }
    let odds = if probability >= 0.5 {
        (probability / (1.0 - probability)) * -100.0
    } else {
        ((1.0 - probability) / probability) * 100.0
    };
    Some(js_round(odds) as i32)
}

pub fn american_odds_to_implied_probability(odds: i32) -> Option<f64> {
    let o = f64::from(odds);
    if odds < 0 {
        Some(-o / (-o + 100.0))
    } else if odds > 0 {
        Some(100.0 / (o + 100.0))
    } else {
        None
    }
}

// Half-way cases round toward +inf so -150.5 becomes -150, not -151.
fn js_round(v: f64) -> f64 {
    (v + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favourite_and_underdog_examples() {
        assert_eq!(probability_to_american_odds(0.7), Some(-233));
        assert_eq!(probability_to_american_odds(0.3), Some(233));
        assert_eq!(probability_to_american_odds(0.5), Some(-100));
        assert_eq!(probability_to_american_odds(0.2), Some(400));
        assert_eq!(probability_to_american_odds(0.8), Some(-400));
    }

    #[test]
    fn extremes_have_no_odds() {
        assert_eq!(probability_to_american_odds(0.0), None);
        assert_eq!(probability_to_american_odds(1.0), None);
        assert_eq!(probability_to_american_odds(-0.1), None);
        assert_eq!(probability_to_american_odds(1.5), None);
        assert_eq!(probability_to_american_odds(f64::NAN), None);
    }

    #[test]
    fn implied_probability_of_even_money() {
        assert_eq!(american_odds_to_implied_probability(-100), Some(0.5));
        assert_eq!(american_odds_to_implied_probability(100), Some(0.5));
        assert_eq!(american_odds_to_implied_probability(0), None);
    }

    #[test]
    fn quote_carries_odds() {
        let q = OutcomeQuote::from_probability(0.25);
        assert_eq!(q.odds, Some(300));
        assert_eq!(OutcomeQuote::from_probability(0.0).odds, None);
    }
}
