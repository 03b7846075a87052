//! Confidence bounds shared by entities and relations
//!
//! Every stored confidence lives in `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
//! Out-of-range inputs are clamped rather than rejected, and the clamp is
//! reported back so callers can audit it.

use serde::{Deserialize, Serialize};

/// Lowest confidence a stored entity or relation may carry
pub const MIN_CONFIDENCE: f32 = 0.1;

/// Highest confidence a stored entity or relation may carry
pub const MAX_CONFIDENCE: f32 = 1.0;

/// A confidence value after applying the storage bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedConfidence {
    /// The value that will be stored
    pub value: f32,
    /// Whether the requested value fell outside the bounds
    pub clamped: bool,
}

/// Clamp a raw confidence into the storage bounds
///
/// NaN collapses to the floor and is always reported as clamped.
pub fn bound_confidence(raw: f32) -> BoundedConfidence {
    if raw.is_nan() {
        return BoundedConfidence {
            value: MIN_CONFIDENCE,
            clamped: true,
        };
    }

    let value = raw.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
    BoundedConfidence {
        value,
        clamped: value != raw,
    }
}

/// Before/after record of a confidence mutation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceChange {
    pub old_confidence: f32,
    pub new_confidence: f32,
    /// The requested value was outside `[0.1, 1.0]` and got clamped
    pub clamped: bool,
}

impl ConfidenceChange {
    /// Signed difference actually applied
    pub fn delta(&self) -> f32 {
        self.new_confidence - self.old_confidence
    }
}
