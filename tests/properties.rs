//! Property-based tests for extrema classification and pattern ranking
//!
//! Invariants:
//! 1. Locality: a peak's high is strictly above every other high within lookback
//! 2. Boundary exclusion: no extremum closer than lookback to either end
//! 3. Windowing: windowed extrema equal full extrema of the trailing slice, shifted
//! 4. Ranking: results are ordered by non-increasing reliability
//! 5. Determinism: repeated scans are identical
//! 6. Bounds: every reported index lies inside the input

use chartpat::prelude::*;
use proptest::prelude::*;

fn arb_bars(max_len: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((50.0f64..150.0, 0.0f64..5.0), 0..max_len).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (c, r))| Bar::new(i as i64, c, c + r, c - r, c, 1000.0))
            .collect()
    })
}

/// Random walk so trends and swings actually occur
fn arb_walk(max_len: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-3.0f64..3.0, 0.1f64..2.0), 0..max_len).prop_map(|steps| {
        let mut c = 100.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (step, r))| {
                c = (c + step).max(10.0);
                Bar::new(i as i64, c, c + r, c - r, c, 1000.0)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn extrema_are_strict_local_extremes(bars in arb_bars(80), lookback in 1usize..7) {
        let len = bars.len();
        for p in detect_extrema(&bars, lookback) {
            prop_assert!(p.index >= lookback && p.index + lookback < len);
            let lo = p.index - lookback;
            let hi = p.index + lookback;
            for j in (lo..=hi).filter(|&j| j != p.index) {
                if p.is_peak() {
                    prop_assert!(bars[j].high < p.price);
                } else {
                    prop_assert!(bars[j].low > p.price);
                }
            }
        }
    }

    #[test]
    fn extrema_ordered_by_index(bars in arb_bars(80), lookback in 1usize..7) {
        let points = detect_extrema(&bars, lookback);
        prop_assert!(points.windows(2).all(|w| w[0].index <= w[1].index));
    }

    #[test]
    fn windowed_extrema_are_shifted(
        bars in arb_bars(80),
        window in 1usize..60,
        lookback in 1usize..6,
    ) {
        let offset = bars.len().saturating_sub(window);
        let expected: Vec<(usize, ExtremumKind)> = detect_extrema(&bars[offset..], lookback)
            .iter()
            .map(|p| (p.index + offset, p.kind))
            .collect();
        let actual: Vec<(usize, ExtremumKind)> = detect_extrema_in_window(&bars, window, lookback)
            .iter()
            .map(|p| (p.index, p.kind))
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn scan_is_ranked_deterministic_and_bounded(bars in arb_walk(120)) {
        let first = detect_all_patterns(&bars);
        let second = detect_all_patterns(&bars);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.windows(2).all(|w| w[0].reliability >= w[1].reliability));

        for p in &first {
            prop_assert!(p.start_index <= p.end_index);
            prop_assert!(p.end_index < bars.len());
            prop_assert!(p.key_points.iter().all(|k| k.index < bars.len()));
            prop_assert!((0.0..=100.0).contains(&p.completion));
        }
    }

    #[test]
    fn parallel_scan_matches_sequential(bars in arb_walk(120)) {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        prop_assert_eq!(engine.scan(&bars), engine.scan_par(&bars));
    }
}
