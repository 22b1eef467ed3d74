//! Peak and valley classification
//!
//! A bar is a peak when its high is strictly above every other high within
//! `lookback` bars on either side, and a valley when its low is strictly below
//! every other low in the same window. Ties disqualify. Bars closer than
//! `lookback` to either end of the input are never classified.

use serde::{Deserialize, Serialize};

use crate::OHLCV;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtremumKind {
    Peak,
    Valley,
}

/// Local high (price = bar high) or local low (price = bar low)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtremumPoint {
    pub index: usize,
    pub price: f64,
    pub kind: ExtremumKind,
}

impl ExtremumPoint {
    #[inline]
    pub fn is_peak(&self) -> bool {
        self.kind == ExtremumKind::Peak
    }

    #[inline]
    pub fn is_valley(&self) -> bool {
        self.kind == ExtremumKind::Valley
    }
}

/// Classify every eligible bar as peak and/or valley.
///
/// Output is ordered by index; when a bar is both, the peak comes first.
/// Inputs shorter than `2 * lookback + 1` (and a zero lookback) yield nothing.
pub fn detect_extrema<T: OHLCV>(bars: &[T], lookback: usize) -> Vec<ExtremumPoint> {
    let len = bars.len();
    if lookback == 0 || len < 2 * lookback + 1 {
        return Vec::new();
    }

    let mut points = Vec::new();
    for i in lookback..len - lookback {
        let window = (i - lookback)..=(i + lookback);
        let high = bars[i].high();
        let low = bars[i].low();

        let is_peak = window
            .clone()
            .filter(|&j| j != i)
            .all(|j| bars[j].high() < high);
        if is_peak {
            points.push(ExtremumPoint {
                index: i,
                price: high,
                kind: ExtremumKind::Peak,
            });
        }

        let is_valley = window.filter(|&j| j != i).all(|j| bars[j].low() > low);
        if is_valley {
            points.push(ExtremumPoint {
                index: i,
                price: low,
                kind: ExtremumKind::Valley,
            });
        }
    }
    points
}

/// Run [`detect_extrema`] over the trailing `window` bars only.
///
/// Returned indices are absolute positions in `bars`.
pub fn detect_extrema_in_window<T: OHLCV>(
    bars: &[T],
    window: usize,
    lookback: usize,
) -> Vec<ExtremumPoint> {
    let offset = bars.len().saturating_sub(window);
    let mut points = detect_extrema(&bars[offset..], lookback);
    for p in &mut points {
        p.index += offset;
    }
    points
}

/// Peaks only, in index order
pub fn peaks(points: &[ExtremumPoint]) -> Vec<ExtremumPoint> {
    points.iter().filter(|p| p.is_peak()).copied().collect()
}

/// Valleys only, in index order
pub fn valleys(points: &[ExtremumPoint]) -> Vec<ExtremumPoint> {
    points.iter().filter(|p| p.is_valley()).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn bar(high: f64, low: f64) -> Bar {
        Bar::new(0, (high + low) / 2.0, high, low, (high + low) / 2.0, 1000.0)
    }

    #[test]
    fn test_short_input_is_empty() {
        let bars: Vec<Bar> = (0..10).map(|i| bar(100.0 + i as f64, 90.0)).collect();
        assert!(detect_extrema(&bars, 5).is_empty());
        assert!(detect_extrema(&bars, 0).is_empty());
    }

    #[test]
    fn test_single_peak_and_valley() {
        let mut bars = vec![bar(101.0, 99.0); 21];
        bars[7] = bar(105.0, 99.5);
        bars[13] = bar(100.5, 95.0);

        let points = detect_extrema(&bars, 5);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].index, 7);
        assert!(points[0].is_peak());
        assert_eq!(points[0].price, 105.0);
        assert_eq!(points[1].index, 13);
        assert!(points[1].is_valley());
        assert_eq!(points[1].price, 95.0);
    }

    #[test]
    fn test_ties_disqualify() {
        let mut bars = vec![bar(101.0, 99.0); 21];
        bars[8] = bar(105.0, 99.0);
        bars[10] = bar(105.0, 99.0);
        assert!(peaks(&detect_extrema(&bars, 5)).is_empty());
    }

    #[test]
    fn test_boundary_bars_excluded() {
        let mut bars = vec![bar(101.0, 99.0); 21];
        bars[2] = bar(110.0, 99.0);
        bars[18] = bar(101.0, 80.0);
        assert!(detect_extrema(&bars, 5).is_empty());
    }

    #[test]
    fn test_outside_bar_is_both() {
        let mut bars = vec![bar(101.0, 99.0); 11];
        bars[5] = bar(110.0, 90.0);
        let points = detect_extrema(&bars, 5);
        assert_eq!(points.len(), 2);
        assert!(points[0].is_peak());
        assert!(points[1].is_valley());
        assert_eq!(points[0].index, points[1].index);
    }

    #[test]
    fn test_window_indices_are_absolute() {
        let mut bars = vec![bar(101.0, 99.0); 40];
        bars[30] = bar(106.0, 99.5);
        let points = detect_extrema_in_window(&bars, 20, 5);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].index, 30);

        // The same bar sits too close to the window start to qualify
        let points = detect_extrema_in_window(&bars, 14, 5);
        assert!(points.is_empty());
    }
}
