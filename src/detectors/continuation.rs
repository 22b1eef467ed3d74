//! Continuation chart pattern detectors
//!
//! Ascending / Descending / Symmetric Triangle, Cup & Handle, Bull / Bear Flag.
//! None of these wait for a breakout bar: targets project the move the shape
//! implies, they do not confirm it happened.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::extrema::{detect_extrema_in_window, peaks, valleys};
use super::helpers::{self, check_window, clamp_percent, highest_high, lowest_low, Line};
use crate::{
    params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
    DetectedPattern, KeyPoint, PatternData, PatternDetector, PatternError, PatternKind, Period,
    PointRole, Ratio, Result, Trendline, OHLCV,
};

impl_with_defaults!(TriangleDetector, CupAndHandleDetector, FlagDetector);

// ============================================================
// TRIANGLE
// ============================================================

/// Triangle over the trailing window.
///
/// Boundaries run from the first to the last peak (valley) in the window.
/// A flat top over a rising floor is ascending, a falling top over a flat
/// floor is descending, anything else is symmetric. Completion is how far
/// the last bar sits toward the boundaries' intersection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleDetector {
    pub lookback: Period,
    pub window: Period,
    pub min_history: Period,
    /// |slope| below this counts as flat
    pub flat_slope: Ratio,
    /// Symmetric stop distance from the current close
    pub stop_buffer: Ratio,
}

impl Default for TriangleDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(helpers::DEFAULT_LOOKBACK),
            window: Period::new_const(helpers::TRIANGLE_WINDOW),
            min_history: Period::new_const(helpers::TRIANGLE_MIN_HISTORY),
            flat_slope: Ratio::new_const(helpers::FLAT_SLOPE),
            stop_buffer: Ratio::new_const(helpers::TRIANGLE_STOP_BUFFER),
        }
    }
}

impl TriangleDetector {
    fn classify(&self, upper: &Line, lower: &Line) -> PatternKind {
        let flat = self.flat_slope.get();
        if upper.slope.abs() < flat && lower.slope > flat {
            PatternKind::AscendingTriangle
        } else if upper.slope < -flat && lower.slope.abs() < flat {
            PatternKind::DescendingTriangle
        } else {
            PatternKind::SymmetricTriangle
        }
    }
}

impl PatternDetector for TriangleDetector {
    fn name(&self) -> &'static str {
        "TRIANGLE"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[
            PatternKind::AscendingTriangle,
            PatternKind::DescendingTriangle,
            PatternKind::SymmetricTriangle,
        ]
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
        if peaks.len() < 2 || valleys.len() < 2 {
            return None;
        }

        let upper = Line::through(&peaks)?;
        let lower = Line::through(&valleys)?;
        let convergence_index = upper.intersection_x(&lower);
        let kind = self.classify(&upper, &lower);

        let (first_peak, last_peak) = (peaks[0], peaks[peaks.len() - 1]);
        let (first_valley, last_valley) = (valleys[0], valleys[valleys.len() - 1]);
        let last = bars.len() - 1;
        let current = bars[last].close();
        let pattern_height = first_peak.price - first_valley.price;

        let (target, stop_loss) = match kind {
            PatternKind::AscendingTriangle => (current + pattern_height, last_valley.price),
            PatternKind::DescendingTriangle => (current - pattern_height, last_peak.price),
            _ => {
                let target = if upper.slope > 0.0 {
                    current + pattern_height
                } else {
                    current - pattern_height
                };
                let buffer = self.stop_buffer.get();
                let stop = if target > current {
                    current * (1.0 - buffer)
                } else {
                    current * (1.0 + buffer)
                };
                (target, stop)
            },
        };

        let reliability = match kind {
            PatternKind::SymmetricTriangle => helpers::SYMMETRIC_TRIANGLE_RELIABILITY,
            _ => helpers::DIRECTIONAL_TRIANGLE_RELIABILITY,
        };
        let completion = clamp_percent(last as f64 / convergence_index * 100.0);

        debug!(?kind, convergence_index, completion, "triangle detected");
        Some(
            DetectedPattern::new(
                kind,
                first_peak.index.min(first_valley.index),
                last,
                PatternData::Triangle {
                    convergence_index,
                    upper_slope: upper.slope,
                    lower_slope: lower.slope,
                },
            )
            .scored(reliability, completion)
            .levels(target, stop_loss)
            .key_points(peaks.iter().chain(valleys.iter()).map(KeyPoint::from).collect())
            .trendlines(vec![
                Trendline::between(&first_peak, &last_peak),
                Trendline::between(&first_valley, &last_valley),
            ]),
        )
    }

    fn validate_config(&self) -> Result<()> {
        check_window("triangle", self.window.get(), self.lookback.get())
    }
}

// ============================================================
// CUP & HANDLE
// ============================================================

/// Cup & Handle over the trailing window.
///
/// The cup bottom is the lowest valley. Both rims are the first closes more
/// than `rim_rise` above that bottom: the left rim searched from the window
/// start, the right rim from the bottom onward. Everything from the right rim
/// to the last bar is the handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CupAndHandleDetector {
    pub lookback: Period,
    pub window: Period,
    pub min_history: Period,
    pub rim_rise: Ratio,
    /// Minimum bars between the two rims
    pub min_cup_width: Period,
    pub min_handle_bars: Period,
    /// Maximum handle depth as a fraction of cup height
    pub max_handle_depth: Ratio,
}

impl Default for CupAndHandleDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(helpers::DEFAULT_LOOKBACK),
            window: Period::new_const(helpers::CUP_WINDOW),
            min_history: Period::new_const(helpers::CUP_MIN_HISTORY),
            rim_rise: Ratio::new_const(helpers::CUP_RIM_RISE),
            min_cup_width: Period::new_const(helpers::CUP_MIN_WIDTH),
            min_handle_bars: Period::new_const(helpers::HANDLE_MIN_BARS),
            max_handle_depth: Ratio::new_const(helpers::HANDLE_MAX_DEPTH),
        }
    }
}

impl PatternDetector for CupAndHandleDetector {
    fn name(&self) -> &'static str {
        "CUP_AND_HANDLE"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::CupAndHandle]
    }

    fn min_bars(&self) -> usize {
        self.min_history.get()
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Option<DetectedPattern> {
        if bars.len() < self.min_history.get() {
            return None;
        }
        let offset = bars.len().saturating_sub(self.window.get());
        let points = detect_extrema_in_window(bars, self.window.get(), self.lookback.get());
        let bottom = valleys(&points)
            .into_iter()
            .reduce(|min, v| if v.price < min.price { v } else { min })?;

        let rim = bottom.price * (1.0 + self.rim_rise.get());
        let Some(cup_start) = bars[offset..].iter().position(|b| b.close() > rim) else {
            trace!(bottom = bottom.price, "cup & handle rejected: no left rim");
            return None;
        };
        let cup_start = offset + cup_start;
        let Some(cup_end) = bars[bottom.index..].iter().position(|b| b.close() > rim) else {
            trace!(bottom = bottom.price, "cup & handle rejected: no right rim");
            return None;
        };
        let cup_end = bottom.index + cup_end;

        if cup_end - cup_start < self.min_cup_width.get() {
            trace!(cup_start, cup_end, "cup & handle rejected: cup too narrow");
            return None;
        }

        let handle = &bars[cup_end..];
        if handle.len() < self.min_handle_bars.get() {
            trace!(handle = handle.len(), "cup & handle rejected: handle too short");
            return None;
        }
        let handle_bottom = lowest_low(handle)?;

        let start_close = bars[cup_start].close();
        let end_close = bars[cup_end].close();
        let cup_height = start_close - bottom.price;
        let handle_depth = end_close - handle_bottom;
        if handle_depth > cup_height * self.max_handle_depth.get() {
            trace!(handle_depth, cup_height, "cup & handle rejected: handle too deep");
            return None;
        }

        debug!(cup_start, cup_end, cup_height, "cup & handle detected");
        Some(
            DetectedPattern::new(
                PatternKind::CupAndHandle,
                cup_start,
                bars.len() - 1,
                PatternData::CupAndHandle {
                    cup_height,
                    handle_depth,
                },
            )
            .scored(
                helpers::CUP_AND_HANDLE_RELIABILITY,
                helpers::CUP_AND_HANDLE_COMPLETION,
            )
            .levels(end_close + cup_height, handle_bottom)
            .key_points(vec![
                KeyPoint::new(cup_start, start_close, PointRole::CupStart),
                KeyPoint::at(&bottom, PointRole::CupBottom),
                KeyPoint::new(cup_end, end_close, PointRole::CupEnd),
            ]),
        )
    }

    fn validate_config(&self) -> Result<()> {
        check_window("cup & handle", self.window.get(), self.lookback.get())
    }
}

// ============================================================
// FLAG
// ============================================================

/// Bull / Bear Flag on the most recent bars.
///
/// The pole is the `pole_bars` bars immediately before the final `flag_bars`
/// bars. The pole must move at least `min_pole_move`; the flag may drift by
/// at most `max_flag_retrace` of the pole's percentage move. The pole's
/// direction decides bull vs bear.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagDetector {
    pub pole_bars: Period,
    pub flag_bars: Period,
    pub min_pole_move: Ratio,
    pub max_flag_retrace: Ratio,
}

impl Default for FlagDetector {
    fn default() -> Self {
        Self {
            pole_bars: Period::new_const(helpers::FLAG_POLE_BARS),
            flag_bars: Period::new_const(helpers::FLAG_BARS),
            min_pole_move: Ratio::new_const(helpers::FLAG_MIN_POLE_MOVE),
            max_flag_retrace: Ratio::new_const(helpers::FLAG_MAX_RETRACE),
        }
    }
}

impl PatternDetector for FlagDetector {
    fn name(&self) -> &'static str {
        "FLAG"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::BullishFlag, PatternKind::BearishFlag]
    }

    fn min_bars(&self) -> usize {
        self.pole_bars.get() + self.flag_bars.get()
    }

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Option<DetectedPattern> {
        let len = bars.len();
        if len < self.min_bars() {
            return None;
        }
        let flag_start = len - self.flag_bars.get();
        let pole_start = flag_start - self.pole_bars.get();
        let pole = &bars[pole_start..flag_start];
        let flag = &bars[flag_start..];

        let (pole_first, pole_last) = (pole.first()?.close(), pole.last()?.close());
        let pole_move = pole_last - pole_first;
        let pole_percent_move = pole_move.abs() / pole_first;
        // Negated so a NaN move is rejected too
        if !(pole_percent_move >= self.min_pole_move.get()) {
            trace!(pole_percent_move, "flag rejected: pole too weak");
            return None;
        }

        let (flag_first, flag_last) = (flag.first()?.close(), flag.last()?.close());
        let flag_move = flag_last - flag_first;
        let flag_percent_move = flag_move.abs() / flag_first;
        if !(flag_percent_move <= pole_percent_move * self.max_flag_retrace.get()) {
            trace!(flag_percent_move, "flag rejected: flag retraces too far");
            return None;
        }

        let bullish = pole_move > 0.0;
        let (kind, stop_loss) = if bullish {
            (PatternKind::BullishFlag, lowest_low(flag)?)
        } else {
            (PatternKind::BearishFlag, highest_high(flag)?)
        };

        debug!(?kind, pole_move, flag_move, "flag detected");
        Some(
            DetectedPattern::new(
                kind,
                pole_start,
                len - 1,
                PatternData::Flag {
                    pole_move,
                    flag_move,
                    pole_percent_move,
                    flag_percent_move,
                },
            )
            .scored(helpers::FLAG_RELIABILITY, helpers::FLAG_COMPLETION)
            .levels(flag_last + pole_move, stop_loss)
            .key_points(vec![
                KeyPoint::new(pole_start, pole_first, PointRole::PoleStart),
                KeyPoint::new(flag_start - 1, pole_last, PointRole::PoleEnd),
                KeyPoint::new(len - 1, flag_last, PointRole::FlagEnd),
            ]),
        )
    }

    fn validate_config(&self) -> Result<()> {
        if self.pole_bars.get() < 2 || self.flag_bars.get() < 2 {
            return Err(PatternError::InvalidConfig(
                "flag: pole and flag need at least 2 bars each".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "lookback",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 10.0, 1.0),
        description: "Half-width of the peak/valley window",
    },
    ParamMeta {
        name: "window",
        param_type: ParamType::Period,
        default: 30.0,
        range: (20.0, 50.0, 5.0),
        description: "Trailing bars searched for the triangle",
    },
    ParamMeta {
        name: "min_history",
        param_type: ParamType::Period,
        default: 20.0,
        range: (15.0, 30.0, 5.0),
        description: "Minimum input length",
    },
    ParamMeta {
        name: "flat_slope",
        param_type: ParamType::Ratio,
        default: 0.001,
        range: (0.0005, 0.005, 0.0005),
        description: "Boundary slope treated as flat",
    },
    ParamMeta {
        name: "stop_buffer",
        param_type: ParamType::Ratio,
        default: 0.02,
        range: (0.0, 0.05, 0.01),
        description: "Symmetric triangle stop distance from the close",
    },
];

static CUP_AND_HANDLE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "lookback",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 10.0, 1.0),
        description: "Half-width of the peak/valley window",
    },
    ParamMeta {
        name: "window",
        param_type: ParamType::Period,
        default: 40.0,
        range: (30.0, 60.0, 5.0),
        description: "Trailing bars searched for the cup",
    },
    ParamMeta {
        name: "min_history",
        param_type: ParamType::Period,
        default: 30.0,
        range: (20.0, 40.0, 5.0),
        description: "Minimum input length",
    },
    ParamMeta {
        name: "rim_rise",
        param_type: ParamType::Ratio,
        default: 0.1,
        range: (0.05, 0.2, 0.05),
        description: "Rim close must exceed the bottom by this fraction",
    },
    ParamMeta {
        name: "min_cup_width",
        param_type: ParamType::Period,
        default: 10.0,
        range: (5.0, 20.0, 5.0),
        description: "Minimum bars between the rims",
    },
    ParamMeta {
        name: "min_handle_bars",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 10.0, 1.0),
        description: "Minimum handle length",
    },
    ParamMeta {
        name: "max_handle_depth",
        param_type: ParamType::Ratio,
        default: 0.5,
        range: (0.3, 0.6, 0.1),
        description: "Maximum handle depth relative to cup height",
    },
];

static FLAG_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "pole_bars",
        param_type: ParamType::Period,
        default: 7.0,
        range: (5.0, 10.0, 1.0),
        description: "Bars forming the pole",
    },
    ParamMeta {
        name: "flag_bars",
        param_type: ParamType::Period,
        default: 8.0,
        range: (5.0, 12.0, 1.0),
        description: "Bars forming the flag",
    },
    ParamMeta {
        name: "min_pole_move",
        param_type: ParamType::Ratio,
        default: 0.05,
        range: (0.03, 0.1, 0.01),
        description: "Minimum relative pole move",
    },
    ParamMeta {
        name: "max_flag_retrace",
        param_type: ParamType::Ratio,
        default: 0.3,
        range: (0.2, 0.5, 0.1),
        description: "Maximum flag move relative to the pole move",
    },
];

impl ParameterizedDetector for TriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            lookback: get_period(params, "lookback", helpers::DEFAULT_LOOKBACK)?,
            window: get_period(params, "window", helpers::TRIANGLE_WINDOW)?,
            min_history: get_period(params, "min_history", helpers::TRIANGLE_MIN_HISTORY)?,
            flat_slope: get_ratio(params, "flat_slope", helpers::FLAT_SLOPE)?,
            stop_buffer: get_ratio(params, "stop_buffer", helpers::TRIANGLE_STOP_BUFFER)?,
        };
        PatternDetector::validate_config(&detector)?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "TRIANGLE"
    }
}

impl ParameterizedDetector for CupAndHandleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        CUP_AND_HANDLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            lookback: get_period(params, "lookback", helpers::DEFAULT_LOOKBACK)?,
            window: get_period(params, "window", helpers::CUP_WINDOW)?,
            min_history: get_period(params, "min_history", helpers::CUP_MIN_HISTORY)?,
            rim_rise: get_ratio(params, "rim_rise", helpers::CUP_RIM_RISE)?,
            min_cup_width: get_period(params, "min_cup_width", helpers::CUP_MIN_WIDTH)?,
            min_handle_bars: get_period(params, "min_handle_bars", helpers::HANDLE_MIN_BARS)?,
            max_handle_depth: get_ratio(params, "max_handle_depth", helpers::HANDLE_MAX_DEPTH)?,
        };
        PatternDetector::validate_config(&detector)?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "CUP_AND_HANDLE"
    }
}

impl ParameterizedDetector for FlagDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FLAG_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            pole_bars: get_period(params, "pole_bars", helpers::FLAG_POLE_BARS)?,
            flag_bars: get_period(params, "flag_bars", helpers::FLAG_BARS)?,
            min_pole_move: get_ratio(params, "min_pole_move", helpers::FLAG_MIN_POLE_MOVE)?,
            max_flag_retrace: get_ratio(params, "max_flag_retrace", helpers::FLAG_MAX_RETRACE)?,
        };
        PatternDetector::validate_config(&detector)?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "FLAG"
    }
}

// ============================================================
// TESTS
// ============================================================
