//! Chart pattern detectors
//!
//! Each recognizer inspects a bar series and reports at most one pattern.
//!
//! # Pattern Categories
//!
//! - **Reversal**: Head & Shoulders, Double Top / Bottom, Rising / Falling Wedge
//! - **Continuation**: Ascending / Descending / Symmetric Triangle, Cup & Handle, Bull / Bear Flag
//!
//! All of them build on the peak/valley classification in [`extrema`].

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod continuation;
pub mod extrema;
pub mod reversal;

// Re-export all detectors for convenience
pub use continuation::*;
pub use extrema::{peaks, valleys};
pub use helpers::*;
pub use reversal::*;
