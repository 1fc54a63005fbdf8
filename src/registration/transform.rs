use serde::{Deserialize, Serialize};

use crate::errors::{ScenefitError, ScenefitResult};

/// Committed program-to-screen mapping: `screen = origin + program * scale`.
///
/// Scale is the externally pre-calibrated constant for the engine's
/// lifetime; only the origin is ever solved for. Origins are whole pixels,
/// since sub-pixel precision is meaningless for a synthesized click.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub scale: f32,
    pub origin: (i32, i32),
}

impl ViewTransform {
    pub fn new(scale: f32, origin: (i32, i32)) -> Self {
        Self { scale, origin }
    }

    pub fn program_to_screen(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (self.origin.0 as f32 + x * self.scale).round() as i32,
            (self.origin.1 as f32 + y * self.scale).round() as i32,
        )
    }

    pub fn screen_to_program(&self, px: i32, py: i32) -> ScenefitResult<(f32, f32)> {
        if self.scale.abs() <= f32::EPSILON {
            return Err(ScenefitError::Config("view transform has zero scale".into()));
        }
        Ok((
            (px as f32 - self.origin.0 as f32) / self.scale,
            (py as f32 - self.origin.1 as f32) / self.scale,
        ))
    }
}

/// Which strategy produced a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStrategy {
    OriginVoting,
    RelativeAnchorsUnique,
    RelativeAnchorsAny,
    SingleAnchor,
}

impl FitStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            FitStrategy::OriginVoting => "origin_translation_voting",
            FitStrategy::RelativeAnchorsUnique => "relative_anchor_unique",
            FitStrategy::RelativeAnchorsAny => "relative_anchor_any",
            FitStrategy::SingleAnchor => "single_anchor",
        }
    }
}

impl std::fmt::Display for FitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One (model node, detection) correspondence that supports a candidate.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub title: String,
    pub node_id: String,
    pub model_pos: (f32, f32),
    pub expected: (f32, f32),
    pub detected: (f32, f32),
    pub error: (f32, f32),
}

/// An unvalidated transform plus provenance. Never becomes the committed
/// `ViewTransform` until the ordinary-node validator accepts it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub transform: ViewTransform,
    pub strategy: FitStrategy,
    /// Correspondences that supported the strategy's own scoring.
    pub matched: usize,
    /// Comparable correspondences the strategy saw in total.
    pub total: usize,
}

/// Outcome of a committed registration attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub strategy: FitStrategy,
    pub transform: ViewTransform,
    pub matched: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_program_and_screen() {
        let tf = ViewTransform::new(1.0, (500, 300));
        assert_eq!(tf.program_to_screen(100.0, -50.0), (600, 250));
        let (x, y) = tf.screen_to_program(600, 250).unwrap();
        assert_eq!((x, y), (100.0, -50.0));
    }

    #[test]
    fn zero_scale_is_an_error_not_a_nan() {
        let tf = ViewTransform::new(0.0, (0, 0));
        assert!(tf.screen_to_program(10, 10).is_err());
    }
}
