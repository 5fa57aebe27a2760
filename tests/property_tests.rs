//! Property tests for the duration parser and the z-score aggregate.

use argos::shared::util::{parse_relative_duration, zscore};
use chrono::Duration as ChronoDuration;
use proptest::prelude::*;

proptest! {
    #[test]
    fn relative_duration_round_trips_seconds(n in 0i64..1_000_000) {
        let parsed = parse_relative_duration(&format!("-{n}s")).unwrap();
        prop_assert_eq!(parsed, ChronoDuration::seconds(n));
    }

    #[test]
    fn relative_duration_days_are_86400_seconds(n in 0i64..1000) {
        let parsed = parse_relative_duration(&format!("-{n}d")).unwrap();
        prop_assert_eq!(parsed, ChronoDuration::seconds(n * 86_400));
    }

    #[test]
    fn relative_duration_rejects_unknown_units(n in 0i64..1000, unit in "[a-ce-gi-ln-rt-z]") {
        prop_assert_eq!(parse_relative_duration(&format!("-{n}{unit}")), None);
    }

    #[test]
    fn zscore_of_a_constant_series_is_always_zero(
        base in -1_000.0f64..1_000.0,
        len in 2usize..50,
    ) {
        let values = vec![base; len];
        prop_assert_eq!(zscore(base, &values), 0.0);
    }

    #[test]
    fn zscore_is_zero_at_the_mean(values in proptest::collection::vec(-1_000.0f64..1_000.0, 2..50)) {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let z = zscore(mean, &values);
        // either every value equals the mean (sigma == 0, short-circuits to
        // zero) or the ratio (mean - mean) / sigma is exactly zero.
        prop_assert!(z.abs() < 1e-9);
    }
}
