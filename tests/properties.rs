//! Property tests for the metrics, the candidate filter and the labeler.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use shapeseek::config::SearchConfig;
use shapeseek::filter::CandidateFilter;
use shapeseek::labeler::{HitType, Label, TripleBarrier};
use shapeseek::metrics::{dtw_similarity, extract_shape_features, pearson, windowed_dtw};
use shapeseek::rerank::{combined_score, ScoreComponents, TrendMatch};
use shapeseek::stats::WinRateStats;

fn prices(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..500.0, min_len..max_len)
}

fn day(i: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap() + Days::new(i as u64)
}

fn trend_match() -> impl Strategy<Value = TrendMatch> {
    prop_oneof![
        Just(TrendMatch::Aligned),
        Just(TrendMatch::Opposed),
        Just(TrendMatch::Undetermined),
    ]
}

proptest! {
    #[test]
    fn dtw_identity(a in prices(1, 80), window in 0usize..12) {
        prop_assert_eq!(windowed_dtw(&a, &a, window), 0.0);
        prop_assert_eq!(dtw_similarity(&a, &a, window), Some(1.0));
    }

    #[test]
    fn dtw_identity_any_band(a in prices(1, 40), window in any::<usize>()) {
        prop_assert_eq!(windowed_dtw(&a, &a, window), 0.0);
        prop_assert_eq!(windowed_dtw(&a, &a, usize::MAX), 0.0);
    }

    #[test]
    fn dtw_symmetric_and_bounded(a in prices(1, 60), b in prices(1, 60), window in 0usize..10) {
        let ab = windowed_dtw(&a, &b, window);
        let ba = windowed_dtw(&b, &a, window);
        prop_assert!(ab.is_finite());
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() < 1e-9);

        let sim = dtw_similarity(&a, &b, window).unwrap();
        prop_assert!((0.0..=1.0).contains(&sim));
    }

    #[test]
    fn dtw_scale_invariant(a in prices(2, 50), scale in 0.1f64..50.0, shift in -100.0f64..100.0) {
        let b: Vec<f64> = a.iter().map(|v| v * scale + shift).collect();
        prop_assert!(windowed_dtw(&a, &b, 5) < 1e-9);
    }

    #[test]
    fn pearson_in_range(a in prices(2, 60), offset in 0usize..30) {
        let b: Vec<f64> = a.iter().cycle().skip(offset).take(a.len()).copied().collect();
        if let Some(r) = pearson(&a, &b) {
            prop_assert!((-1.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn shape_features_bounded(a in prices(6, 80)) {
        let features = extract_shape_features(&a).unwrap();
        for v in features.as_slice() {
            prop_assert!(v.is_finite());
            prop_assert!((-1.0..=1.0).contains(v));
        }
        let sim = features.similarity(&features);
        prop_assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn filter_keeps_isolated_set(
        hits in prop::collection::vec((0usize..3, 0u32..400), 0..80),
        isolation in 0u32..30,
    ) {
        let symbols = ["AAA", "BBB", "CCC"];
        let mut filter = CandidateFilter::new(isolation);
        let mut kept: Vec<(usize, u32)> = Vec::new();

        for &(s, d) in &hits {
            let conflict = isolation > 0
                && kept
                    .iter()
                    .any(|&(ks, kd)| ks == s && kd.abs_diff(d) <= isolation);
            let admitted = filter.admit(symbols[s], day(d));
            prop_assert_eq!(admitted, !conflict);
            if admitted {
                kept.push((s, d));
            }
        }

        if isolation > 0 {
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(a.0 != b.0 || a.1.abs_diff(b.1) > isolation);
                }
            }
        }
    }

    #[test]
    fn barrier_first_touch(
        returns in prop::collection::vec(-0.1f64..0.1, 1..40),
        upper in 0.01f64..0.08,
        lower in 0.01f64..0.08,
        max_hold in 1usize..30,
    ) {
        let entry = 100.0;
        let path: Vec<f64> = std::iter::once(entry)
            .chain(returns.iter().map(|r| entry * (1.0 + r)))
            .collect();
        let barrier = TripleBarrier::new(upper, lower, max_hold);

        let Some(out) = barrier.label(&path) else {
            prop_assert!(path.len() <= max_hold);
            return Ok(());
        };
        let ret = |t: usize| (path[t] - entry) / entry;

        prop_assert!(out.hit_day >= 1 && out.hit_day <= max_hold);
        for t in 1..out.hit_day {
            prop_assert!(ret(t) < upper && ret(t) > -lower);
        }
        match out.hit_type {
            HitType::Upper => {
                prop_assert_eq!(out.label, Label::Bullish);
                prop_assert!(ret(out.hit_day) >= upper);
            }
            HitType::Lower => {
                prop_assert_eq!(out.label, Label::Bearish);
                prop_assert!(ret(out.hit_day) <= -lower);
            }
            HitType::Timeout => {
                prop_assert_eq!(out.label, Label::Neutral);
                prop_assert_eq!(out.hit_day, max_hold);
                prop_assert!(ret(max_hold) < upper && ret(max_hold) > -lower);
            }
        }
        prop_assert_eq!(out.final_return, ret(max_hold));
    }

    #[test]
    fn combined_score_pure_and_bounded(
        visual in 0.0f64..=1.0,
        dtw in prop::option::of(0.0f64..=1.0),
        correlation in prop::option::of(0.0f64..=1.0),
        shape in prop::option::of(0.0f64..=1.0),
        trend in trend_match(),
    ) {
        let weights = SearchConfig::default().weights();
        let c = ScoreComponents { visual, dtw, correlation, shape, trend };

        let score = combined_score(&c, &weights);
        prop_assert_eq!(score.to_bits(), combined_score(&c, &weights).to_bits());

        let ceiling = weights.dtw + weights.corr + weights.shape + weights.visual + weights.trend_bonus;
        prop_assert!(score >= -weights.trend_bonus - 1e-12);
        prop_assert!(score <= ceiling + 1e-12);
        if dtw.is_none() {
            prop_assert!(score <= 0.3 + 1e-12);
        }
    }

    #[test]
    fn stats_partition_outcomes(paths in prop::collection::vec(prop::collection::vec(-0.08f64..0.08, 21..25), 0..30)) {
        let barrier = TripleBarrier::default();
        let outcomes: Vec<_> = paths
            .iter()
            .filter_map(|rs| {
                let path: Vec<f64> = std::iter::once(100.0)
                    .chain(rs.iter().map(|r| 100.0 * (1.0 + r)))
                    .collect();
                barrier.label(&path)
            })
            .collect();

        let stats = WinRateStats::from_outcomes(&outcomes);
        prop_assert_eq!(stats.total, outcomes.len());
        prop_assert_eq!(stats.bullish + stats.neutral + stats.bearish, stats.total);
        prop_assert!((0.0..=1.0).contains(&stats.win_rate));
        if stats.total > 0 {
            prop_assert_eq!(stats.win_rate, stats.bullish as f64 / stats.total as f64);
        }
    }
}
