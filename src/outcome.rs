//! Outcome tracking for detected patterns
//!
//! Given the bars that followed a detection, decide whether the pattern's
//! target or its stop was reached first. Stateless: callers feed the bars
//! after `end_index` themselves.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{DetectedPattern, Direction, OHLCV};

/// Resolution of a pattern against subsequent price action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// Target reached before the stop
    Success,
    /// Stop reached before the target
    Failure,
    /// Neither level touched yet
    Pending,
}

/// Whether `bar` reaches the target or the stop, target first
fn touch<T: OHLCV>(pattern: &DetectedPattern, direction: Direction, bar: &T) -> Option<Outcome> {
    let (hit_target, hit_stop) = if direction.is_bullish() {
        (bar.high() >= pattern.target, bar.low() <= pattern.stop_loss)
    } else if direction.is_bearish() {
        (bar.low() <= pattern.target, bar.high() >= pattern.stop_loss)
    } else {
        return None;
    };

    if hit_target {
        Some(Outcome::Success)
    } else if hit_stop {
        Some(Outcome::Failure)
    } else {
        None
    }
}

/// Walk `subsequent` bars in order; the first bar touching a level decides.
///
/// A bar spanning both levels counts as a success. Patterns without a
/// direction never resolve.
pub fn evaluate_outcome<T: OHLCV>(pattern: &DetectedPattern, subsequent: &[T]) -> Outcome {
    let direction = pattern.direction();
    let outcome = subsequent
        .iter()
        .find_map(|bar| touch(pattern, direction, bar))
        .unwrap_or(Outcome::Pending);
    trace!(
        kind = ?pattern.pattern,
        ?outcome,
        bars = subsequent.len(),
        "pattern outcome evaluated"
    );
    outcome
}

/// True while `latest` has touched neither the target nor the stop
pub fn is_active<T: OHLCV>(pattern: &DetectedPattern, latest: &T) -> bool {
    touch(pattern, pattern.direction(), latest).is_none()
}
