use proptest::prelude::*;

use wc26_odds::odds::{american_odds_to_implied_probability, probability_to_american_odds};

proptest! {
    #[test]
    fn american_odds_round_trip(p in 0.001f64..0.999) {
        let odds = probability_to_american_odds(p).unwrap();
        let back = american_odds_to_implied_probability(odds).unwrap();
        prop_assert!((back - p).abs() < 0.0015, "p={p} odds={odds} back={back}");
    }

    #[test]
    fn favourites_get_negative_odds(p in 0.5f64..0.999) {
        prop_assert!(probability_to_american_odds(p).unwrap() <= -100);
    }

    #[test]
    fn underdogs_get_positive_odds(p in 0.001f64..0.5) {
        prop_assert!(probability_to_american_odds(p).unwrap() >= 100);
    }
}
