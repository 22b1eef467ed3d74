//! Common thresholds and geometry helpers for chart pattern detection
//!
//! Every empirical constant used by the recognizers lives here. Detectors copy
//! them into their public fields via `Default`, so tuning a threshold never
//! touches detection logic.

use crate::{ExtremumPoint, PatternError, Result, OHLCV};

// ============================================================
// EXTREMA
// ============================================================

/// Half-width of the symmetric window used to classify peaks and valleys
pub const DEFAULT_LOOKBACK: usize = 5;

// ============================================================
// HEAD & SHOULDERS
// ============================================================

/// Maximum relative height difference between the two shoulders
pub const SHOULDER_TOLERANCE: f64 = 0.05;
/// Reliability of a perfectly symmetric head & shoulders
pub const HEAD_AND_SHOULDERS_RELIABILITY: f64 = 85.0;

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

/// Maximum relative difference between the two tops (or bottoms), exclusive
pub const DOUBLE_TOLERANCE: f64 = 0.03;
/// Stop is placed this far beyond the extreme top/bottom
pub const DOUBLE_STOP_BUFFER: f64 = 0.02;
/// Reliability of two perfectly equal tops (or bottoms)
pub const DOUBLE_RELIABILITY: f64 = 80.0;

// ============================================================
// TRIANGLE
// ============================================================

/// Trailing window the triangle is searched in
pub const TRIANGLE_WINDOW: usize = 30;
/// Minimum input length before a triangle is considered
pub const TRIANGLE_MIN_HISTORY: usize = 20;
/// A trendline with |slope| below this is treated as flat
pub const FLAT_SLOPE: f64 = 0.001;
/// Stop buffer around the current close for symmetric triangles
pub const TRIANGLE_STOP_BUFFER: f64 = 0.02;
pub const SYMMETRIC_TRIANGLE_RELIABILITY: f64 = 70.0;
/// Ascending and descending triangles carry a directional bonus
pub const DIRECTIONAL_TRIANGLE_RELIABILITY: f64 = 75.0;

// ============================================================
// CUP & HANDLE
// ============================================================

pub const CUP_WINDOW: usize = 40;
pub const CUP_MIN_HISTORY: usize = 30;
/// Cup rims are the first closes more than this fraction above the bottom
pub const CUP_RIM_RISE: f64 = 0.1;
pub const CUP_MIN_WIDTH: usize = 10;
pub const HANDLE_MIN_BARS: usize = 5;
/// Handle depth may not exceed this fraction of the cup height
pub const HANDLE_MAX_DEPTH: f64 = 0.5;
pub const CUP_AND_HANDLE_RELIABILITY: f64 = 78.0;
/// The handle breakout is never confirmed, so completion stops short of 100
pub const CUP_AND_HANDLE_COMPLETION: f64 = 90.0;

// ============================================================
// FLAG
// ============================================================

pub const FLAG_POLE_BARS: usize = 7;
pub const FLAG_BARS: usize = 8;
/// Minimum relative pole displacement
pub const FLAG_MIN_POLE_MOVE: f64 = 0.05;
/// Flag may retrace at most this fraction of the pole's percentage move
pub const FLAG_MAX_RETRACE: f64 = 0.3;
pub const FLAG_RELIABILITY: f64 = 72.0;
pub const FLAG_COMPLETION: f64 = 85.0;

// ============================================================
// WEDGE
// ============================================================

pub const WEDGE_WINDOW: usize = 25;
pub const WEDGE_MIN_HISTORY: usize = 20;
/// Peaks and valleys each needed to draw a wedge boundary
pub const WEDGE_MIN_TOUCHES: usize = 3;
pub const WEDGE_RELIABILITY: f64 = 68.0;
pub const WEDGE_COMPLETION: f64 = 80.0;

/// Completion reported by recognizers that only fire on a finished shape
pub const FULL_COMPLETION: f64 = 100.0;

// ============================================================
// GEOMETRY
// ============================================================

/// Straight line through two extrema, in (bar index, price) space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub slope: f64,
    pub intercept: f64,
}

impl Line {
    /// Two-point line from the first to the last point. Not a regression fit.
    ///
    /// Returns None for fewer than two points.
    pub fn through(points: &[ExtremumPoint]) -> Option<Self> {
        let (first, last) = (points.first()?, points.last()?);
        if last.index <= first.index {
            return None;
        }
        let slope = (last.price - first.price) / (last.index - first.index) as f64;
        Some(Self {
            slope,
            intercept: first.price - slope * first.index as f64,
        })
    }

    #[inline]
    pub fn price_at(&self, index: f64) -> f64 {
        self.slope * index + self.intercept
    }

    /// x-coordinate where two infinite lines cross.
    /// Parallel lines yield a non-finite value.
    #[inline]
    pub fn intersection_x(&self, other: &Line) -> f64 {
        (self.intercept - other.intercept) / (other.slope - self.slope)
    }
}

/// Lowest low in a slice, None if empty
#[inline]
pub fn lowest_low<T: OHLCV>(bars: &[T]) -> Option<f64> {
    bars.iter().map(|b| b.low()).reduce(f64::min)
}

/// Highest high in a slice, None if empty
#[inline]
pub fn highest_high<T: OHLCV>(bars: &[T]) -> Option<f64> {
    bars.iter().map(|b| b.high()).reduce(f64::max)
}

/// Relative difference `|a - b| / a`
#[inline]
pub fn relative_diff(a: f64, b: f64) -> f64 {
    (a - b).abs() / a
}

/// Clamp a percentage into `[0, 100]`; non-finite values report 0
#[inline]
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// A trailing window must hold at least one bar eligible for extrema classification
pub fn check_window(detector: &str, window: usize, lookback: usize) -> Result<()> {
    if window < 2 * lookback + 1 {
        return Err(PatternError::InvalidConfig(format!(
            "{detector}: window of {window} bars cannot fit a lookback of {lookback}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExtremumKind;

    fn point(index: usize, price: f64) -> ExtremumPoint {
        ExtremumPoint {
            index,
            price,
            kind: ExtremumKind::Peak,
        }
    }

    #[test]
    fn test_line_through_two_points() {
        let line = Line::through(&[point(10, 100.0), point(12, 90.0), point(20, 110.0)]).unwrap();
        assert!((line.slope - 1.0).abs() < 1e-12);
        assert!((line.intercept - 90.0).abs() < 1e-12);
        assert!((line.price_at(15.0) - 105.0).abs() < 1e-12);
    }

    #[test]
    fn test_line_needs_two_points() {
        assert!(Line::through(&[]).is_none());
        assert!(Line::through(&[point(3, 1.0)]).is_none());
    }

    #[test]
    fn test_intersection() {
        let upper = Line {
            slope: 0.0,
            intercept: 105.0,
        };
        let lower = Line {
            slope: 0.25,
            intercept: 91.75,
        };
        assert!((upper.intersection_x(&lower) - 53.0).abs() < 1e-9);
        assert!(!upper.intersection_x(&upper).is_finite());
    }

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(150.0), 100.0);
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(f64::INFINITY), 0.0);
        assert_eq!(clamp_percent(42.5), 42.5);
    }

    #[test]
    fn test_check_window() {
        assert!(check_window("triangle", 11, 5).is_ok());
        assert!(matches!(
            check_window("triangle", 10, 5),
            Err(PatternError::InvalidConfig(_))
        ));
    }
}
