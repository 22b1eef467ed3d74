//! Reversal chart pattern detectors
//!
//! Head & Shoulders, Double Top / Double Bottom, Rising / Falling Wedge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::extrema::{detect_extrema, detect_extrema_in_window, peaks, valleys};
use super::helpers::{self, check_window, relative_diff, Line};
use crate::{
    params::{get_flag, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
    DetectedPattern, ExtremumPoint, KeyPoint, PatternData, PatternDetector, PatternError,
    PatternKind, Period, PointRole, Ratio, Result, Trendline, OHLCV,
};

impl_with_defaults!(
    HeadAndShouldersDetector,
    DoubleTopBottomDetector,
    WedgeDetector,
);

/// Raw reliability, optionally clamped into 0..=100
#[inline]
fn reliability(raw: f64, clamp: bool) -> f64 {
    if clamp {
        raw.clamp(0.0, 100.0)
    } else {
        raw
    }
}

// ============================================================
// HEAD & SHOULDERS
// ============================================================

/// Head & Shoulders top.
///
/// The three most recent peaks are read as left shoulder, head and right
/// shoulder. The neckline averages the first two valleys between the
/// shoulders. Reliability is `85 - shoulder_diff * 100` and is not clamped
/// unless `clamp_reliability` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadAndShouldersDetector {
    pub lookback: Period,
    /// Maximum `|left - right| / left` shoulder asymmetry
    pub shoulder_tolerance: Ratio,
    pub clamp_reliability: bool,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(helpers::DEFAULT_LOOKBACK),
            shoulder_tolerance: Ratio::new_const(helpers::SHOULDER_TOLERANCE),
            clamp_reliability: false,
        }
    }
}

impl PatternDetector for HeadAndShouldersDetector {
    fn name(&self) -> &'static str {
        "HEAD_AND_SHOULDERS"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::HeadAndShoulders]
    }

    fn min_bars(&self) -> usize {
        2 * self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Option<DetectedPattern> {
        let points = detect_extrema(bars, self.lookback.get());
        let peaks = peaks(&points);
        let valleys = valleys(&points);
        if peaks.len() < 3 || valleys.len() < 2 {
            return None;
        }

        let &[left, head, right] = &peaks[peaks.len() - 3..] else {
            return None;
        };
        if head.price <= left.price || head.price <= right.price {
            trace!(head = head.price, "head & shoulders rejected: head not highest");
            return None;
        }

        let shoulder_diff = relative_diff(left.price, right.price);
        if shoulder_diff > self.shoulder_tolerance.get() {
            trace!(shoulder_diff, "head & shoulders rejected: asymmetric shoulders");
            return None;
        }

        // First two valleys between the shoulders, not necessarily the lowest
        let mut between = valleys
            .iter()
            .filter(|v| v.index > left.index && v.index < right.index);
        let (Some(first), Some(second)) = (between.next(), between.next()) else {
            trace!("head & shoulders rejected: fewer than two neckline valleys");
            return None;
        };

        let neckline = (first.price + second.price) / 2.0;
        let pattern_height = head.price - neckline;

        debug!(start = left.index, end = right.index, neckline, "head & shoulders detected");
        Some(
            DetectedPattern::new(
                PatternKind::HeadAndShoulders,
                left.index,
                right.index,
                PatternData::HeadAndShoulders {
                    neckline,
                    pattern_height,
                },
            )
            .scored(
                reliability(
                    helpers::HEAD_AND_SHOULDERS_RELIABILITY - shoulder_diff * 100.0,
                    self.clamp_reliability,
                ),
                helpers::FULL_COMPLETION,
            )
            .levels(neckline - pattern_height, head.price)
            .key_points(vec![
                KeyPoint::at(&left, PointRole::LeftShoulder),
                KeyPoint::at(&head, PointRole::Head),
                KeyPoint::at(&right, PointRole::RightShoulder),
            ])
            .trendlines(vec![Trendline::between(first, second)]),
        )
    }
}

// ============================================================
// DOUBLE TOP / DOUBLE BOTTOM
// ============================================================

/// Double Top, falling back to Double Bottom.
///
/// The top is checked first on the two most recent peaks; only when that
/// fails are the two most recent valleys tried. At most one pattern is
/// reported. Reliability is `80 - diff * 100`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleTopBottomDetector {
    pub lookback: Period,
    /// Two tops (bottoms) must differ by strictly less than this
    pub tolerance: Ratio,
    /// Stop distance beyond the extreme top (bottom)
    pub stop_buffer: Ratio,
    pub clamp_reliability: bool,
}

impl Default for DoubleTopBottomDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(helpers::DEFAULT_LOOKBACK),
            tolerance: Ratio::new_const(helpers::DOUBLE_TOLERANCE),
            stop_buffer: Ratio::new_const(helpers::DOUBLE_STOP_BUFFER),
            clamp_reliability: false,
        }
    }
}

impl DoubleTopBottomDetector {
    fn detect_top(
        &self,
        peaks: &[ExtremumPoint],
        valleys: &[ExtremumPoint],
    ) -> Option<DetectedPattern> {
        if peaks.len() < 2 {
            return None;
        }
        let &[first, second] = &peaks[peaks.len() - 2..] else {
            return None;
        };

        let diff = relative_diff(first.price, second.price);
        if diff >= self.tolerance.get() {
            trace!(diff, "double top rejected: tops too far apart");
            return None;
        }

        let Some(valley) = valleys
            .iter()
            .find(|v| v.index > first.index && v.index < second.index)
        else {
            trace!("double top rejected: no valley between tops");
            return None;
        };

        let resistance = first.price.max(second.price);
        let pattern_height = resistance - valley.price;

        debug!(start = first.index, end = second.index, resistance, "double top detected");
        Some(
            DetectedPattern::new(
                PatternKind::DoubleTop,
                first.index,
                second.index,
                PatternData::Double {
                    resistance,
                    support: valley.price,
                },
            )
            .scored(
                reliability(helpers::DOUBLE_RELIABILITY - diff * 100.0, self.clamp_reliability),
                helpers::FULL_COMPLETION,
            )
            .levels(
                valley.price - pattern_height,
                resistance * (1.0 + self.stop_buffer.get()),
            )
            .key_points(vec![
                KeyPoint::at(&first, PointRole::FirstTop),
                KeyPoint::at(&second, PointRole::SecondTop),
                KeyPoint::at(valley, PointRole::Valley),
            ]),
        )
    }

    fn detect_bottom(
        &self,
        peaks: &[ExtremumPoint],
        valleys: &[ExtremumPoint],
    ) -> Option<DetectedPattern> {
        if valleys.len() < 2 {
            return None;
        }
        let &[first, second] = &valleys[valleys.len() - 2..] else {
            return None;
        };

        let diff = relative_diff(first.price, second.price);
        if diff >= self.tolerance.get() {
            trace!(diff, "double bottom rejected: bottoms too far apart");
            return None;
        }

        let Some(peak) = peaks
            .iter()
            .find(|p| p.index > first.index && p.index < second.index)
        else {
            trace!("double bottom rejected: no peak between bottoms");
            return None;
        };

        let support = first.price.min(second.price);
        let pattern_height = peak.price - support;

        debug!(start = first.index, end = second.index, support, "double bottom detected");
        Some(
            DetectedPattern::new(
                PatternKind::DoubleBottom,
                first.index,
                second.index,
                PatternData::Double {
                    resistance: peak.price,
                    support,
                },
            )
            .scored(
                reliability(helpers::DOUBLE_RELIABILITY - diff * 100.0, self.clamp_reliability),
                helpers::FULL_COMPLETION,
            )
            .levels(
                peak.price + pattern_height,
                support * (1.0 - self.stop_buffer.get()),
            )
            .key_points(vec![
                KeyPoint::at(&first, PointRole::FirstBottom),
                KeyPoint::at(&second, PointRole::SecondBottom),
                KeyPoint::at(peak, PointRole::Peak),
            ]),
        )
    }
}

impl PatternDetector for DoubleTopBottomDetector {
    fn name(&self) -> &'static str {
        "DOUBLE_TOP_BOTTOM"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::DoubleTop, PatternKind::DoubleBottom]
    }

    fn min_bars(&self) -> usize {
        2 * self.lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Option<DetectedPattern> {
        let points = detect_extrema(bars, self.lookback.get());
        let peaks = peaks(&points);
        let valleys = valleys(&points);

        self.detect_top(&peaks, &valleys)
            .or_else(|| self.detect_bottom(&peaks, &valleys))
    }
}

// ============================================================
// WEDGE
// ============================================================

/// Rising / Falling Wedge over the trailing window.
///
/// Both boundaries (first-to-last peak, first-to-last valley) must slope the
/// same way; opposite slopes are a triangle and are rejected here. The target
/// assumes a reversal against the wedge's slope. No breakout bar is
/// confirmed: the projection is an assumption, not a prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WedgeDetector {
    pub lookback: Period,
    pub window: Period,
    /// Shortest input considered at all
    pub min_history: Period,
    /// Peaks and valleys each required inside the window
    pub min_touches: Period,
}

impl Default for WedgeDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(helpers::DEFAULT_LOOKBACK),
            window: Period::new_const(helpers::WEDGE_WINDOW),
            min_history: Period::new_const(helpers::WEDGE_MIN_HISTORY),
            min_touches: Period::new_const(helpers::WEDGE_MIN_TOUCHES),
        }
    }
}

impl PatternDetector for WedgeDetector {
    fn name(&self) -> &'static str {
        "WEDGE"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::RisingWedge, PatternKind::FallingWedge]
    }

    fn min_bars(&self) -> usize {
        self.min_history.get()
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Option<DetectedPattern> {
        if bars.len() < self.min_history.get() {
            return None;
        }
        let points = detect_extrema_in_window(bars, self.window.get(), self.lookback.get());
        let peaks = peaks(&points);
        let valleys = valleys(&points);
        let touches = self.min_touches.get();
        if peaks.len() < touches || valleys.len() < touches {
            return None;
        }

        let upper = Line::through(&peaks)?;
        let lower = Line::through(&valleys)?;
        let kind = if upper.slope > 0.0 && lower.slope > 0.0 {
            PatternKind::RisingWedge
        } else if upper.slope < 0.0 && lower.slope < 0.0 {
            PatternKind::FallingWedge
        } else {
            trace!(
                upper = upper.slope,
                lower = lower.slope,
                "wedge rejected: boundaries do not slope the same way"
            );
            return None;
        };

        let (first_peak, last_peak) = (peaks[0], peaks[peaks.len() - 1]);
        let (first_valley, last_valley) = (valleys[0], valleys[valleys.len() - 1]);
        let current = bars[bars.len() - 1].close();
        let pattern_height = first_peak.price - first_valley.price;

        let (target, stop_loss) = match kind {
            PatternKind::RisingWedge => (current - pattern_height, last_peak.price),
            _ => (current + pattern_height, last_valley.price),
        };

        let start = first_peak.index.min(first_valley.index);
        debug!(?kind, start, target, "wedge detected");
        Some(
            DetectedPattern::new(
                kind,
                start,
                bars.len() - 1,
                PatternData::Wedge {
                    upper_slope: upper.slope,
                    lower_slope: lower.slope,
                },
            )
            .scored(helpers::WEDGE_RELIABILITY, helpers::WEDGE_COMPLETION)
            .levels(target, stop_loss)
            .key_points(peaks.iter().chain(valleys.iter()).map(KeyPoint::from).collect())
            .trendlines(vec![
                Trendline::between(&first_peak, &last_peak),
                Trendline::between(&first_valley, &last_valley),
            ]),
        )
    }

    fn validate_config(&self) -> Result<()> {
        check_window("wedge", self.window.get(), self.lookback.get())?;
        if self.min_touches.get() < 2 {
            return Err(PatternError::InvalidConfig(
                "wedge: min_touches must be at least 2 to draw a boundary".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "lookback",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 10.0, 1.0),
        description: "Half-width of the peak/valley window",
    },
    ParamMeta {
        name: "shoulder_tolerance",
        param_type: ParamType::Ratio,
        default: 0.05,
        range: (0.01, 0.1, 0.01),
        description: "Maximum relative shoulder height difference",
    },
    ParamMeta {
        name: "clamp_reliability",
        param_type: ParamType::Flag,
        default: 0.0,
        range: (0.0, 1.0, 1.0),
        description: "Clamp reliability into 0..=100",
    },
];

static DOUBLE_TOP_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "lookback",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 10.0, 1.0),
        description: "Half-width of the peak/valley window",
    },
    ParamMeta {
        name: "tolerance",
        param_type: ParamType::Ratio,
        default: 0.03,
        range: (0.01, 0.05, 0.01),
        description: "Maximum relative difference between the two tops/bottoms",
    },
    ParamMeta {
        name: "stop_buffer",
        param_type: ParamType::Ratio,
        default: 0.02,
        range: (0.0, 0.05, 0.01),
        description: "Stop distance beyond the extreme top/bottom",
    },
    ParamMeta {
        name: "clamp_reliability",
        param_type: ParamType::Flag,
        default: 0.0,
        range: (0.0, 1.0, 1.0),
        description: "Clamp reliability into 0..=100",
    },
];

static WEDGE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "lookback",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 7.0, 1.0),
        description: "Half-width of the peak/valley window",
    },
    ParamMeta {
        name: "window",
        param_type: ParamType::Period,
        default: 25.0,
        range: (20.0, 40.0, 5.0),
        description: "Trailing bars searched for the wedge",
    },
    ParamMeta {
        name: "min_history",
        param_type: ParamType::Period,
        default: 20.0,
        range: (15.0, 30.0, 5.0),
        description: "Minimum input length",
    },
    ParamMeta {
        name: "min_touches",
        param_type: ParamType::Period,
        default: 3.0,
        range: (2.0, 4.0, 1.0),
        description: "Peaks and valleys required on each boundary",
    },
];

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, "lookback", helpers::DEFAULT_LOOKBACK)?,
            shoulder_tolerance: get_ratio(
                params,
                "shoulder_tolerance",
                helpers::SHOULDER_TOLERANCE,
            )?,
            clamp_reliability: get_flag(params, "clamp_reliability", false),
        })
    }

    fn detector_name() -> &'static str {
        "HEAD_AND_SHOULDERS"
    }
}

impl ParameterizedDetector for DoubleTopBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_TOP_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, "lookback", helpers::DEFAULT_LOOKBACK)?,
            tolerance: get_ratio(params, "tolerance", helpers::DOUBLE_TOLERANCE)?,
            stop_buffer: get_ratio(params, "stop_buffer", helpers::DOUBLE_STOP_BUFFER)?,
            clamp_reliability: get_flag(params, "clamp_reliability", false),
        })
    }

    fn detector_name() -> &'static str {
        "DOUBLE_TOP_BOTTOM"
    }
}

impl ParameterizedDetector for WedgeDetector {
    fn param_meta() -> &'static [ParamMeta] {
        WEDGE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            lookback: get_period(params, "lookback", helpers::DEFAULT_LOOKBACK)?,
            window: get_period(params, "window", helpers::WEDGE_WINDOW)?,
            min_history: get_period(params, "min_history", helpers::WEDGE_MIN_HISTORY)?,
            min_touches: get_period(params, "min_touches", helpers::WEDGE_MIN_TOUCHES)?,
        };
        PatternDetector::validate_config(&detector)?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "WEDGE"
    }
}

// ============================================================
// TESTS
// ============================================================
