//! Parameter metadata for chart pattern detectors
//!
//! Every builtin recognizer exposes its thresholds as named parameters, enabling:
//! - Grid search over thresholds
//! - Parameter documentation
//! - Building detectors from flat key/value configuration
//!
//! # Example
//!
//! ```rust
//! use chartpat::params::{ParamMeta, ParamType, ParameterizedDetector};
//! use chartpat::prelude::*;
//!
//! // Get parameter metadata for a detector
//! let params = FlagDetector::param_meta();
//! for param in params {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{
  detectors::{
    CupAndHandleDetector, DoubleTopBottomDetector, FlagDetector, HeadAndShouldersDetector,
    TriangleDetector, WedgeDetector,
  },
  BuiltinDetector, PatternError, Period, Ratio, Result,
};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value in 0.0..=1.0
  Ratio,
  /// Period value (positive integer bar count)
  Period,
  /// On/off switch, encoded as 0.0 or 1.0
  Flag,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "shoulder_tolerance")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Create a new ParamMeta for an on/off switch
  pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
    let default = if default { 1.0 } else { 0.0 };
    Self { name, param_type: ParamType::Flag, default, range: (0.0, 1.0, 1.0), description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    if step <= 0.0 {
      return values;
    }
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Flag => {
        if value != 0.0 && value != 1.0 {
          return Err(PatternError::InvalidValue("Flag must be 0 or 1"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for detectors that support parameterization
///
/// Implementing this trait enables:
/// - Discovery of available parameters
/// - Creation of detectors with custom parameter values
/// - Grid search optimization
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a detector with parameters from a HashMap
  ///
  /// Missing parameters use their default values. Combinations the detector
  /// cannot run with (e.g. a window narrower than the extrema lookback) are
  /// rejected.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Name the detector is registered under (matches `PatternDetector::name`)
  fn detector_name() -> &'static str;
}

/// Parameter metadata of every builtin detector, keyed by detector name
pub fn builtin_param_meta() -> [(&'static str, &'static [ParamMeta]); 6] {
  [
    (HeadAndShouldersDetector::detector_name(), HeadAndShouldersDetector::param_meta()),
    (DoubleTopBottomDetector::detector_name(), DoubleTopBottomDetector::param_meta()),
    (TriangleDetector::detector_name(), TriangleDetector::param_meta()),
    (CupAndHandleDetector::detector_name(), CupAndHandleDetector::param_meta()),
    (FlagDetector::detector_name(), FlagDetector::param_meta()),
    (WedgeDetector::detector_name(), WedgeDetector::param_meta()),
  ]
}

/// Build a builtin detector by name from flat key/value parameters
pub fn builtin_with_params(name: &str, params: &HashMap<&str, f64>) -> Result<BuiltinDetector> {
  let detector = match name {
    "HEAD_AND_SHOULDERS" => HeadAndShouldersDetector::with_params(params)?.into(),
    "DOUBLE_TOP_BOTTOM" => DoubleTopBottomDetector::with_params(params)?.into(),
    "TRIANGLE" => TriangleDetector::with_params(params)?.into(),
    "CUP_AND_HANDLE" => CupAndHandleDetector::with_params(params)?.into(),
    "FLAG" => FlagDetector::with_params(params)?.into(),
    "WEDGE" => WedgeDetector::with_params(params)?.into(),
    other => return Err(PatternError::InvalidConfig(format!("unknown detector: {other}"))),
  };
  Ok(detector)
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

/// Helper to get a switch from params; any non-zero value is on
pub fn get_flag(params: &HashMap<&str, f64>, key: &str, default: bool) -> bool {
  params.get(key).map_or(default, |v| *v != 0.0)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("tolerance", 0.03, (0.01, 0.05, 0.01), "Test ratio parameter");

    assert_eq!(meta.name, "tolerance");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, 0.03);
  }

  #[test]
  fn test_param_meta_flag() {
    let meta = ParamMeta::flag("clamp_reliability", true, "Test flag");
    assert_eq!(meta.param_type, ParamType::Flag);
    assert_eq!(meta.default, 1.0);
    assert!(meta.validate(0.0).is_ok());
    assert!(meta.validate(0.5).is_err());
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < f64::EPSILON);
    assert!((grid[1] - 0.5).abs() < f64::EPSILON);
    assert!((grid[2] - 0.7).abs() < f64::EPSILON);
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("window", 30.0, (20.0, 40.0, 5.0), "Test");

    assert!(meta.validate(30.0).is_ok());
    assert!(meta.validate(20.0).is_ok());
    assert!(meta.validate(40.0).is_ok());
    assert!(meta.validate(25.5).is_err());
    assert!(meta.validate(15.0).is_err());
    assert!(meta.validate(45.0).is_err());
  }

  #[test]
  fn test_get_helpers() {
    let mut params = HashMap::new();
    params.insert("ratio", 0.8);
    params.insert("period", 20.0);
    params.insert("flag", 1.0);

    assert!((get_ratio(&params, "ratio", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "missing", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    assert_eq!(get_period(&params, "period", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "missing", 14).unwrap().get(), 14);
    assert!(get_flag(&params, "flag", false));
    assert!(!get_flag(&params, "missing", false));

    params.insert("ratio", 1.5);
    assert!(get_ratio(&params, "ratio", 0.5).is_err());
  }

  #[test]
  fn test_defaults_match_metadata() {
    for (name, metas) in builtin_param_meta() {
      for meta in metas {
        assert!(meta.validate(meta.default).is_ok(), "{name}.{} default out of range", meta.name);
      }
      let d = builtin_with_params(name, &HashMap::new()).unwrap();
      assert_eq!(d.name(), name);
    }
  }

  #[test]
  fn test_builtin_with_params_unknown() {
    assert!(matches!(
      builtin_with_params("PENNANT", &HashMap::new()),
      Err(PatternError::InvalidConfig(_))
    ));
  }
}
