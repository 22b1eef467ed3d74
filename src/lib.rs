//! # chartpat - Chart Pattern Detector
//!
//! Detection of classical multi-week chart formations (Head & Shoulders,
//! Double Top/Bottom, Triangles, Cup & Handle, Flags, Wedges) in OHLCV series.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartpat::prelude::*;
//!
//! // Any type implementing OHLCV can be scanned; `Bar` is provided
//! let bars: Vec<Bar> = (0..60)
//!     .map(|i| {
//!         let c = 100.0 + (i as f64 * 0.3).sin() * 5.0;
//!         Bar::new(i, c, c + 1.0, c - 1.0, c, 1000.0)
//!     })
//!     .collect();
//!
//! // All six recognizers, ranked by reliability
//! let patterns = detect_all_patterns(&bars);
//!
//! // Or a configured engine
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .min_reliability(70.0)
//!     .build()
//!     .unwrap();
//! let strong = engine.scan(&bars);
//! assert!(strong.len() <= patterns.len());
//! ```

pub mod detectors;
pub mod outcome;
pub mod params;

pub use detectors::extrema::{detect_extrema, detect_extrema_in_window, ExtremumKind, ExtremumPoint};

pub mod prelude {
    pub use crate::{
        // Detectors
        detectors::*,
        // Entry point
        detect_all_patterns,
        detect_extrema,
        detect_extrema_in_window,
        // Outcome tracking
        outcome::{evaluate_outcome, is_active, Outcome},
        // Parameters
        params::{
            builtin_param_meta, builtin_with_params, get_flag, get_period, get_ratio, ParamMeta,
            ParamType, ParameterizedDetector,
        },
        // Parallel
        scan_parallel,
        // Types
        Bar,
        // Engine
        BuiltinDetector,
        DetectedPattern,
        Direction,
        // Core traits
        DynPatternDetector,
        EngineBuilder,
        ExtremumKind,
        ExtremumPoint,
        KeyPoint,
        PatternData,
        PatternDetector,
        PatternEngine,
        // Errors
        PatternError,
        PatternKind,
        Period,
        PointRole,
        Ratio,
        Result,
        ScanResult,
        TrendPoint,
        Trendline,
        OHLCV,
    };
}

use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised while configuring detectors.
///
/// Detection itself never fails: a recognizer whose preconditions are not met
/// simply reports no pattern.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (*self).timestamp()
    }
}

/// Plain OHLCV bar for callers without their own bar type
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.time)
    }
}

// ============================================================
// DETECTED PATTERN - result of detection
// ============================================================

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Formation reported by a recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternKind {
    HeadAndShoulders,
    DoubleTop,
    DoubleBottom,
    AscendingTriangle,
    DescendingTriangle,
    SymmetricTriangle,
    CupAndHandle,
    BullishFlag,
    BearishFlag,
    RisingWedge,
    FallingWedge,
}

impl PatternKind {
    pub const ALL: [PatternKind; 11] = [
        PatternKind::HeadAndShoulders,
        PatternKind::DoubleTop,
        PatternKind::DoubleBottom,
        PatternKind::AscendingTriangle,
        PatternKind::DescendingTriangle,
        PatternKind::SymmetricTriangle,
        PatternKind::CupAndHandle,
        PatternKind::BullishFlag,
        PatternKind::BearishFlag,
        PatternKind::RisingWedge,
        PatternKind::FallingWedge,
    ];

    /// Stable string identifier
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders => "HEAD_AND_SHOULDERS",
            PatternKind::DoubleTop => "DOUBLE_TOP",
            PatternKind::DoubleBottom => "DOUBLE_BOTTOM",
            PatternKind::AscendingTriangle => "ASCENDING_TRIANGLE",
            PatternKind::DescendingTriangle => "DESCENDING_TRIANGLE",
            PatternKind::SymmetricTriangle => "SYMMETRIC_TRIANGLE",
            PatternKind::CupAndHandle => "CUP_AND_HANDLE",
            PatternKind::BullishFlag => "BULLISH_FLAG",
            PatternKind::BearishFlag => "BEARISH_FLAG",
            PatternKind::RisingWedge => "RISING_WEDGE",
            PatternKind::FallingWedge => "FALLING_WEDGE",
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders => "Head and Shoulders",
            PatternKind::DoubleTop => "Double Top",
            PatternKind::DoubleBottom => "Double Bottom",
            PatternKind::AscendingTriangle => "Ascending Triangle",
            PatternKind::DescendingTriangle => "Descending Triangle",
            PatternKind::SymmetricTriangle => "Symmetric Triangle",
            PatternKind::CupAndHandle => "Cup and Handle",
            PatternKind::BullishFlag => "Bullish Flag",
            PatternKind::BearishFlag => "Bearish Flag",
            PatternKind::RisingWedge => "Rising Wedge",
            PatternKind::FallingWedge => "Falling Wedge",
        }
    }

    /// Returns the typical/expected direction of this pattern.
    ///
    /// `None` for the symmetric triangle, whose bias depends on the slope of
    /// its upper boundary.
    pub fn typical_direction(self) -> Option<Direction> {
        match self {
            PatternKind::DoubleBottom
            | PatternKind::AscendingTriangle
            | PatternKind::CupAndHandle
            | PatternKind::BullishFlag
            | PatternKind::FallingWedge => Some(Direction::Bullish),
            PatternKind::HeadAndShoulders
            | PatternKind::DoubleTop
            | PatternKind::DescendingTriangle
            | PatternKind::BearishFlag
            | PatternKind::RisingWedge => Some(Direction::Bearish),
            PatternKind::SymmetricTriangle => None,
        }
    }

    /// Reversal formations project against the preceding move
    pub fn is_reversal(self) -> bool {
        matches!(
            self,
            PatternKind::HeadAndShoulders
                | PatternKind::DoubleTop
                | PatternKind::DoubleBottom
                | PatternKind::RisingWedge
                | PatternKind::FallingWedge
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders => {
                "Bearish reversal. A sharp decline is expected on a neckline breakdown"
            }
            PatternKind::DoubleTop => {
                "Bearish reversal. A decline is expected on a support breakdown"
            }
            PatternKind::DoubleBottom => {
                "Bullish reversal. A rally is expected on a resistance breakout"
            }
            PatternKind::AscendingTriangle => "Ascending triangle. Awaiting breakout",
            PatternKind::DescendingTriangle => "Descending triangle. Awaiting breakout",
            PatternKind::SymmetricTriangle => "Symmetric triangle. Awaiting breakout",
            PatternKind::CupAndHandle => {
                "Strong bullish continuation. A sharp rally is expected on a handle breakout"
            }
            PatternKind::BullishFlag => "Bullish continuation. The uptrend is expected to resume",
            PatternKind::BearishFlag => "Bearish continuation. The downtrend is expected to resume",
            PatternKind::RisingWedge => "Rising wedge. A bearish reversal is expected",
            PatternKind::FallingWedge => "Falling wedge. A bullish reversal is expected",
        }
    }

    pub fn time_to_target(self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders | PatternKind::CupAndHandle => "5-10 days",
            PatternKind::DoubleTop
            | PatternKind::DoubleBottom
            | PatternKind::RisingWedge
            | PatternKind::FallingWedge => "3-7 days",
            PatternKind::AscendingTriangle
            | PatternKind::DescendingTriangle
            | PatternKind::SymmetricTriangle => "2-5 days",
            PatternKind::BullishFlag | PatternKind::BearishFlag => "1-3 days",
        }
    }

    pub fn action(self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders => "Sell / enter short",
            PatternKind::DoubleTop | PatternKind::DescendingTriangle | PatternKind::RisingWedge => {
                "Prepare to sell"
            }
            PatternKind::DoubleBottom
            | PatternKind::AscendingTriangle
            | PatternKind::FallingWedge => "Prepare to buy",
            PatternKind::SymmetricTriangle => "Wait for breakout",
            PatternKind::CupAndHandle => "Buy aggressively",
            PatternKind::BullishFlag => "Add to long",
            PatternKind::BearishFlag => "Add to short",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural role of a key point within a formation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointRole {
    LeftShoulder,
    Head,
    RightShoulder,
    FirstTop,
    SecondTop,
    FirstBottom,
    SecondBottom,
    Peak,
    Valley,
    CupStart,
    CupBottom,
    CupEnd,
    PoleStart,
    PoleEnd,
    FlagEnd,
}

/// Structurally significant bar within a detected pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub index: usize,
    pub price: f64,
    pub role: PointRole,
}

impl KeyPoint {
    pub fn new(index: usize, price: f64, role: PointRole) -> Self {
        Self { index, price, role }
    }

    /// Tag an extremum with a role
    pub fn at(point: &ExtremumPoint, role: PointRole) -> Self {
        Self::new(point.index, point.price, role)
    }
}

impl From<&ExtremumPoint> for KeyPoint {
    fn from(point: &ExtremumPoint) -> Self {
        let role = match point.kind {
            ExtremumKind::Peak => PointRole::Peak,
            ExtremumKind::Valley => PointRole::Valley,
        };
        Self::at(point, role)
    }
}

/// End of a trendline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub index: usize,
    pub price: f64,
}

/// Straight segment drawn between two extrema (necklines, boundaries)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trendline {
    pub start: TrendPoint,
    pub end: TrendPoint,
}

impl Trendline {
    pub fn between(start: &ExtremumPoint, end: &ExtremumPoint) -> Self {
        Self {
            start: TrendPoint {
                index: start.index,
                price: start.price,
            },
            end: TrendPoint {
                index: end.index,
                price: end.price,
            },
        }
    }

    /// Price change per bar along the segment
    pub fn slope(&self) -> f64 {
        let run = self.end.index as f64 - self.start.index as f64;
        (self.end.price - self.start.price) / run
    }
}

/// Measurements specific to each formation's shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PatternData {
    HeadAndShoulders {
        neckline: f64,
        pattern_height: f64,
    },
    /// Shared by double tops and double bottoms
    Double {
        resistance: f64,
        support: f64,
    },
    Triangle {
        /// Absolute bar index where the two boundaries meet
        convergence_index: f64,
        upper_slope: f64,
        lower_slope: f64,
    },
    CupAndHandle {
        cup_height: f64,
        handle_depth: f64,
    },
    Flag {
        pole_move: f64,
        flag_move: f64,
        pole_percent_move: f64,
        flag_percent_move: f64,
    },
    Wedge {
        upper_slope: f64,
        lower_slope: f64,
    },
}

/// A detected chart formation.
///
/// Indices are absolute positions in the scanned bar slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPattern {
    pub pattern: PatternKind,
    pub start_index: usize,
    pub end_index: usize,
    /// Heuristic confidence, nominally 0..=100 (see the individual detectors)
    pub reliability: f64,
    /// How far the formation has developed, 0..=100
    pub completion: f64,
    /// Projected price on breakout/breakdown
    pub target: f64,
    /// Protective exit level
    pub stop_loss: f64,
    pub key_points: Vec<KeyPoint>,
    pub trendlines: Vec<Trendline>,
    pub data: PatternData,
    pub description: &'static str,
    pub time_to_target: &'static str,
    pub action: &'static str,
}

impl DetectedPattern {
    /// Pattern skeleton with the kind's descriptive strings filled in
    pub(crate) fn new(
        pattern: PatternKind,
        start_index: usize,
        end_index: usize,
        data: PatternData,
    ) -> Self {
        Self {
            pattern,
            start_index,
            end_index,
            reliability: 0.0,
            completion: 0.0,
            target: 0.0,
            stop_loss: 0.0,
            key_points: Vec::new(),
            trendlines: Vec::new(),
            data,
            description: pattern.description(),
            time_to_target: pattern.time_to_target(),
            action: pattern.action(),
        }
    }

    pub(crate) fn scored(mut self, reliability: f64, completion: f64) -> Self {
        self.reliability = reliability;
        self.completion = completion;
        self
    }

    pub(crate) fn levels(mut self, target: f64, stop_loss: f64) -> Self {
        self.target = target;
        self.stop_loss = stop_loss;
        self
    }

    pub(crate) fn key_points(mut self, key_points: Vec<KeyPoint>) -> Self {
        self.key_points = key_points;
        self
    }

    pub(crate) fn trendlines(mut self, trendlines: Vec<Trendline>) -> Self {
        self.trendlines = trendlines;
        self
    }

    /// Expected direction of the move toward `target`.
    ///
    /// Symmetric triangles resolve by where the target sits relative to the stop.
    pub fn direction(&self) -> Direction {
        self.pattern.typical_direction().unwrap_or_else(|| {
            if self.target > self.stop_loss {
                Direction::Bullish
            } else if self.target < self.stop_loss {
                Direction::Bearish
            } else {
                Direction::Neutral
            }
        })
    }

    /// Number of bars the formation spans
    #[inline]
    pub fn span(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Sort by descending reliability. Stable, so ties keep detector order.
pub(crate) fn rank(patterns: &mut [DetectedPattern]) {
    patterns.sort_by(|a, b| b.reliability.total_cmp(&a.reliability));
}

// ============================================================
// PATTERN DETECTOR TRAITS
// ============================================================

/// Generic pattern detector trait - for concrete types
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every kind this detector can report
    fn kinds(&self) -> &'static [PatternKind];

    /// Shortest input that can possibly produce a pattern
    fn min_bars(&self) -> usize;

    fn detect<T: OHLCV>(&self, bars: &[T]) -> Option<DetectedPattern>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe pattern detector trait - for custom detectors
pub trait DynPatternDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn kinds(&self) -> &'static [PatternKind];
    fn min_bars(&self) -> usize;
    fn detect(&self, bars: &[&dyn OHLCV]) -> Option<DetectedPattern>;
    fn validate_config(&self) -> Result<()>;
}

impl<D: PatternDetector> DynPatternDetector for D {
    fn name(&self) -> &'static str {
        PatternDetector::name(self)
    }

    fn kinds(&self) -> &'static [PatternKind] {
        PatternDetector::kinds(self)
    }

    fn min_bars(&self) -> usize {
        PatternDetector::min_bars(self)
    }

    fn detect(&self, bars: &[&dyn OHLCV]) -> Option<DetectedPattern> {
        PatternDetector::detect(self, bars)
    }

    fn validate_config(&self) -> Result<()> {
        PatternDetector::validate_config(self)
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(&self, bars: &[T]) -> Option<DetectedPattern> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(d) => PatternDetector::name(d)),*
                }
            }

            #[inline]
            pub fn kinds(&self) -> &'static [PatternKind] {
                match self {
                    $(Self::$variant(d) => PatternDetector::kinds(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }

        $(
            impl From<$detector> for BuiltinDetector {
                fn from(d: $detector) -> Self {
                    Self::$variant(d)
                }
            }
        )*
    };
}

// Declaration order is the tie-break order of the ranking
define_builtin_detectors! {
    HeadAndShoulders(HeadAndShouldersDetector),
    DoubleTopBottom(DoubleTopBottomDetector),
    Triangle(TriangleDetector),
    CupAndHandle(CupAndHandleDetector),
    Flag(FlagDetector),
    Wedge(WedgeDetector),
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl BuiltinDetector {
    /// Every builtin detector with default thresholds, in ranking order
    pub fn all_defaults() -> [BuiltinDetector; 6] {
        builtin_defaults![
            HeadAndShoulders,
            DoubleTopBottom,
            Triangle,
            CupAndHandle,
            Flag,
            Wedge,
        ]
    }
}

/// Run every recognizer with default thresholds and rank the results by
/// descending reliability.
///
/// Overlapping formations are all reported; ranking is the only
/// disambiguation.
pub fn detect_all_patterns<T: OHLCV>(bars: &[T]) -> Vec<DetectedPattern> {
    let mut patterns: Vec<DetectedPattern> = BuiltinDetector::all_defaults()
        .iter()
        .filter_map(|d| d.detect(bars))
        .collect();
    rank(&mut patterns);
    debug!(
        bars = bars.len(),
        patterns = patterns.len(),
        "chart pattern scan complete"
    );
    patterns
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub min_reliability: Option<f64>,
    pub pattern_filter: Option<Vec<PatternKind>>,
}

/// Main pattern detection engine
pub struct PatternEngine {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    config: EngineConfig,
}

impl PatternEngine {
    /// Run every detector on the calling thread and rank the results.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<DetectedPattern> {
        let mut results: Vec<DetectedPattern> = self
            .builtin
            .iter()
            .filter(|d| self.should_run(d.kinds(), d.min_bars(), bars.len()))
            .filter_map(|d| d.detect(bars))
            .collect();

        results.extend(self.scan_custom(bars));
        self.finish(results, bars.len())
    }

    /// Like [`scan`](Self::scan), but builtin detectors are dispatched on the
    /// rayon pool. Custom detectors still run on the calling thread.
    pub fn scan_par<T: OHLCV + Sync>(&self, bars: &[T]) -> Vec<DetectedPattern> {
        let mut results: Vec<DetectedPattern> = self
            .builtin
            .par_iter()
            .filter(|d| self.should_run(d.kinds(), d.min_bars(), bars.len()))
            .filter_map(|d| d.detect(bars))
            .collect();

        results.extend(self.scan_custom(bars));
        self.finish(results, bars.len())
    }

    /// Number of registered detectors, builtin and custom
    pub fn detector_count(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn scan_custom<T: OHLCV>(&self, bars: &[T]) -> Vec<DetectedPattern> {
        if self.custom.is_empty() {
            return Vec::new();
        }
        let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
        self.custom
            .iter()
            .filter(|d| self.should_run(d.kinds(), d.min_bars(), bars.len()))
            .filter_map(|d| d.detect(&bar_refs))
            .collect()
    }

    fn should_run(&self, kinds: &[PatternKind], min_bars: usize, len: usize) -> bool {
        if len < min_bars {
            return false;
        }
        match self.config.pattern_filter {
            Some(ref filter) => kinds.iter().any(|k| filter.contains(k)),
            None => true,
        }
    }

    fn should_include(&self, m: &DetectedPattern) -> bool {
        if let Some(min) = self.config.min_reliability {
            if m.reliability < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&m.pattern) {
                return false;
            }
        }
        true
    }

    fn finish(&self, results: Vec<DetectedPattern>, len: usize) -> Vec<DetectedPattern> {
        let mut results: Vec<DetectedPattern> =
            results.into_iter().filter(|m| self.should_include(m)).collect();
        rank(&mut results);
        debug!(bars = len, patterns = results.len(), "chart pattern scan complete");
        results
    }

    fn validate(&self) -> Result<()> {
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        if let Some(min) = self.config.min_reliability {
            if !min.is_finite() {
                return Err(PatternError::InvalidValue(
                    "min_reliability must be finite",
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PatternEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternEngine")
            .field("builtin", &self.builtin)
            .field("custom", &self.custom.len())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
#[derive(Default)]
pub struct EngineBuilder {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all builtin detectors with default configurations
    pub fn with_all_defaults(mut self) -> Self {
        self.builtin.extend(BuiltinDetector::all_defaults());
        self
    }

    /// Add reversal detectors with defaults (Head & Shoulders, Double Top/Bottom, Wedge)
    pub fn with_reversal_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![HeadAndShoulders, DoubleTopBottom, Wedge]);
        self
    }

    /// Add continuation detectors with defaults (Triangle, Cup & Handle, Flag)
    pub fn with_continuation_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![Triangle, CupAndHandle, Flag]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (slow path)
    pub fn add_custom<D: DynPatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Drop patterns below this reliability
    pub fn min_reliability(mut self, reliability: f64) -> Self {
        self.config.min_reliability = Some(reliability);
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.pattern_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        let engine = PatternEngine {
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub patterns: Vec<DetectedPattern>,
}

/// Parallel scanning of multiple instruments
pub fn scan_parallel<'a, T, I>(engine: &PatternEngine, instruments: I) -> Vec<ScanResult>
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    instruments
        .into_par_iter()
        .map(|(symbol, bars)| ScanResult {
            symbol: symbol.to_string(),
            patterns: engine.scan(bars),
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::new(i as i64, 100.0, 101.0, 99.0, 100.0, 1000.0))
            .collect()
    }

    /// Bars with a close series and a fixed half-range
    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64, c, c + 0.5, c - 0.5, c, 1000.0))
            .collect()
    }

    /// 15 flat bars, a +10% pole over 7 bars, then an 8-bar drift
    fn bull_flag_bars() -> Vec<Bar> {
        let mut closes = vec![100.0; 15];
        closes.extend([100.0, 102.0, 104.0, 106.0, 107.0, 108.0, 110.0]);
        closes.extend([110.0, 109.8, 109.6, 109.5, 109.4, 109.3, 109.2, 109.0]);
        bars_from_closes(&closes)
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_bar_timestamp() {
        let bar = Bar::new(1_700_000_000, 1.0, 2.0, 0.5, 1.5, 10.0);
        assert_eq!(bar.timestamp(), Some(1_700_000_000));
        let dyn_bar: &dyn OHLCV = &bar;
        assert_eq!(OHLCV::close(&dyn_bar), 1.5);
    }

    #[test]
    fn test_kind_directions() {
        for kind in PatternKind::ALL {
            match kind.typical_direction() {
                Some(Direction::Neutral) => panic!("{kind} has no neutral bias"),
                None => assert_eq!(kind, PatternKind::SymmetricTriangle),
                Some(_) => {}
            }
        }
        assert!(PatternKind::RisingWedge.is_reversal());
        assert!(!PatternKind::BullishFlag.is_reversal());
        assert_eq!(PatternKind::CupAndHandle.as_str(), "CUP_AND_HANDLE");
        assert_eq!(PatternKind::DoubleTop.to_string(), "Double Top");
    }

    #[test]
    fn test_symmetric_triangle_direction_follows_target() {
        let data = PatternData::Triangle {
            convergence_index: 50.0,
            upper_slope: 0.1,
            lower_slope: 0.2,
        };
        let up =
            DetectedPattern::new(PatternKind::SymmetricTriangle, 0, 10, data).levels(110.0, 98.0);
        let down =
            DetectedPattern::new(PatternKind::SymmetricTriangle, 0, 10, data).levels(90.0, 102.0);
        let flat =
            DetectedPattern::new(PatternKind::SymmetricTriangle, 0, 10, data).levels(100.0, 100.0);
        assert!(up.direction().is_bullish());
        assert!(down.direction().is_bearish());
        assert_eq!(flat.direction(), Direction::Neutral);
        assert!(!flat.direction().is_bullish() && !flat.direction().is_bearish());
        assert_eq!(up.span(), 11);
    }

    #[test]
    fn test_rank_is_stable_descending() {
        let data = PatternData::Wedge {
            upper_slope: 1.0,
            lower_slope: 1.0,
        };
        let mut patterns = vec![
            DetectedPattern::new(PatternKind::RisingWedge, 0, 1, data).scored(68.0, 80.0),
            DetectedPattern::new(PatternKind::BullishFlag, 0, 1, data).scored(72.0, 85.0),
            DetectedPattern::new(PatternKind::FallingWedge, 0, 1, data).scored(68.0, 80.0),
        ];
        rank(&mut patterns);
        assert_eq!(patterns[0].pattern, PatternKind::BullishFlag);
        assert_eq!(patterns[1].pattern, PatternKind::RisingWedge);
        assert_eq!(patterns[2].pattern, PatternKind::FallingWedge);
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().with_all_defaults().build();
        assert!(engine.is_ok());
        assert_eq!(engine.unwrap().detector_count(), 6);
    }

    #[test]
    fn test_group_defaults() {
        let reversal = EngineBuilder::new().with_reversal_defaults().build().unwrap();
        let continuation = EngineBuilder::new()
            .with_continuation_defaults()
            .build()
            .unwrap();
        assert_eq!(reversal.builtin.len(), 3);
        assert_eq!(continuation.builtin.len(), 3);
    }

    #[test]
    fn test_empty_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars: Vec<Bar> = vec![];
        assert!(engine.scan(&bars).is_empty());
        assert!(detect_all_patterns(&bars).is_empty());
    }

    #[test]
    fn test_flat_market_has_no_patterns() {
        assert!(detect_all_patterns(&flat_bars(120)).is_empty());
    }

    #[test]
    fn test_flag_through_engine() {
        let engine = EngineBuilder::new()
            .add(BuiltinDetector::Flag(FlagDetector::with_defaults()))
            .build()
            .unwrap();
        let patterns = engine.scan(&bull_flag_bars());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, PatternKind::BullishFlag);
    }

    #[test]
    fn test_min_reliability_filter() {
        let engine = EngineBuilder::new()
            .add(BuiltinDetector::Flag(FlagDetector::with_defaults()))
            .min_reliability(72.5)
            .build()
            .unwrap();
        assert!(engine.scan(&bull_flag_bars()).is_empty());
    }

    #[test]
    fn test_pattern_filter() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .only_patterns([PatternKind::BearishFlag])
            .build()
            .unwrap();
        assert!(engine.scan(&bull_flag_bars()).is_empty());
    }

    #[test]
    fn test_add_checked_rejects_bad_config() {
        let detector = WedgeDetector {
            window: Period::new_const(8),
            ..WedgeDetector::default()
        };
        assert!(EngineBuilder::new()
            .add_checked(BuiltinDetector::Wedge(detector.clone()))
            .is_err());
        assert!(EngineBuilder::new()
            .add(BuiltinDetector::Wedge(detector))
            .build()
            .is_err());
    }

    #[test]
    fn test_non_finite_min_reliability_rejected() {
        assert!(EngineBuilder::new()
            .with_all_defaults()
            .min_reliability(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn test_scan_par_matches_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars = bull_flag_bars();
        assert_eq!(engine.scan(&bars), engine.scan_par(&bars));
    }

    #[test]
    fn test_parallel_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

        let bars1 = bull_flag_bars();
        let bars2 = flat_bars(40);

        let instruments: Vec<(&str, &[Bar])> = vec![("AAPL", &bars1), ("GOOGL", &bars2)];

        let results = scan_parallel(&engine, instruments);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].symbol, "AAPL");
        assert!(!results[0].patterns.is_empty());
        assert!(results[1].patterns.is_empty());
    }
}
