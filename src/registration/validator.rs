//! Ordinary-node cross-validation.
//!
//! The single gate every candidate passes before commit, regardless of which
//! strategy produced it or how confident that strategy's internal scoring
//! was. It re-checks the transform against titles that were not necessarily
//! central to producing it: every model node under every shared title is
//! projected through the candidate and matched greedily against the nearest
//! unused detection within tolerance.

use std::collections::HashSet;

use crate::config::RegistrationConfig;
use crate::registration::mapping::MappingData;
use crate::registration::transform::{MatchRecord, ViewTransform};

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub matched: usize,
    pub required: usize,
    pub matches: Vec<MatchRecord>,
}

impl ValidationOutcome {
    pub fn accepted(&self) -> bool {
        self.matched >= self.required
    }
}

pub fn validate_candidate(
    mapping: &MappingData,
    transform: &ViewTransform,
    cfg: &RegistrationConfig,
) -> ValidationOutcome {
    let scale = transform.scale;
    let origin = (transform.origin.0 as f32, transform.origin.1 as f32);
    let base = cfg.position_thresholds(scale);
    let tol = (
        base.0 * cfg.validation.tolerance_multiplier,
        base.1 * cfg.validation.tolerance_multiplier,
    );

    let mut matches = Vec::new();
    for title in &mapping.shared_titles {
        let models = mapping.model_nodes(title);
        let detections = mapping.detections(title);
        if models.is_empty() || detections.is_empty() {
            continue;
        }
        let mut used_detections: HashSet<usize> = HashSet::new();
        for node in models {
            let expected_x = origin.0 + node.pos.0 * scale;
            let expected_y = origin.1 + node.pos.1 * scale;
            let mut best: Option<(f32, usize, (f32, f32), (f32, f32))> = None;
            for (index, detection) in detections.iter().enumerate() {
                if used_detections.contains(&index) {
                    continue;
                }
                let (left, top) = detection.bbox.top_left();
                let dx = (left - expected_x).abs();
                let dy = (top - expected_y).abs();
                if dx > tol.0 || dy > tol.1 {
                    continue;
                }
                let err = dx + dy;
                if best.map_or(true, |(best_err, ..)| err < best_err) {
                    best = Some((err, index, (left, top), (dx, dy)));
                }
            }
            if let Some((_, index, detected, error)) = best {
                used_detections.insert(index);
                matches.push(MatchRecord {
                    title: title.clone(),
                    node_id: node.id.clone(),
                    model_pos: node.pos,
                    expected: (expected_x, expected_y),
                    detected,
                    error,
                });
            }
        }
    }

    let outcome = ValidationOutcome {
        matched: matches.len(),
        required: cfg.validation.min_matches,
        matches,
    };
    tracing::debug!(
        matched = outcome.matched,
        required = outcome.required,
        accepted = outcome.accepted(),
        "ordinary node validation"
    );
    outcome
}
