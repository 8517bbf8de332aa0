//! Step selection
//!
//! Bucket widths come from a fixed ascending ladder rather than being computed
//! freely, so repeated queries over slightly different windows land on the
//! same round bucket boundaries.

use crate::error::{AggregationError, Result};
use greenhouse_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Default ceiling on the number of rows a query should return
pub const DEFAULT_TARGET_POINTS: u32 = 300;

const MINUTE: i64 = 60_000;
const HOUR: i64 = 60 * MINUTE;

/// Default ladder: 1m, 5m, 15m, 30m, 1h, 3h, 6h, 12h, 1d (milliseconds)
pub const DEFAULT_STEPS: [i64; 9] = [
    MINUTE,
    5 * MINUTE,
    15 * MINUTE,
    30 * MINUTE,
    HOUR,
    3 * HOUR,
    6 * HOUR,
    12 * HOUR,
    24 * HOUR,
];

/// An ascending ladder of allowed bucket widths in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct StepLadder {
    steps: Vec<i64>,
}

impl StepLadder {
    /// Build a ladder. Steps must be positive and strictly ascending.
    pub fn new(steps: Vec<i64>) -> Result<Self> {
        if steps.is_empty() {
            return Err(AggregationError::InvalidLadder("ladder is empty".to_string()));
        }
        if let Some(bad) = steps.iter().find(|&&s| s <= 0) {
            return Err(AggregationError::InvalidLadder(format!(
                "step {} is not positive",
                bad
            )));
        }
        if steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AggregationError::InvalidLadder(
                "steps must be strictly ascending".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    /// Pick the bucket width for `[from, to]`
    ///
    /// Returns the smallest step `>= (to - from) / target_points`, or the
    /// largest step when none qualifies (the row count may then exceed
    /// `target_points`). `to <= from` yields the smallest step; a
    /// `target_points` of 0 is treated as 1.
    pub fn pick(&self, from: Timestamp, to: Timestamp, target_points: u32) -> i64 {
        if to <= from {
            return self.smallest();
        }

        let raw = to.saturating_sub(from) / i64::from(target_points.max(1));
        self.steps
            .iter()
            .copied()
            .find(|&step| step >= raw)
            .unwrap_or_else(|| self.largest())
    }

    /// Finest step on the ladder
    pub fn smallest(&self) -> i64 {
        self.steps[0]
    }

    /// Coarsest step on the ladder
    pub fn largest(&self) -> i64 {
        self.steps[self.steps.len() - 1]
    }

    /// All steps, ascending
    pub fn steps(&self) -> &[i64] {
        &self.steps
    }

    /// Whether `step` is one of the ladder's entries
    pub fn contains(&self, step: i64) -> bool {
        self.steps.binary_search(&step).is_ok()
    }
}

impl Default for StepLadder {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.to_vec(),
        }
    }
}

impl TryFrom<Vec<i64>> for StepLadder {
    type Error = AggregationError;

    fn try_from(steps: Vec<i64>) -> Result<Self> {
        Self::new(steps)
    }
}

impl From<StepLadder> for Vec<i64> {
    fn from(ladder: StepLadder) -> Self {
        ladder.steps
    }
}

/// Pick a step from the default ladder
pub fn pick_step(from: Timestamp, to: Timestamp, target_points: u32) -> i64 {
    StepLadder::default().pick(from, to, target_points)
}
