//! Single-anchor fallback: last resort when neither voting nor relative
//! alignment can run, e.g. a first-ever calibration with only a node or two
//! visible. One correspondence plus the known node dimensions is enough to
//! place the origin; the independent validator still decides acceptance.

use crate::config::RegistrationConfig;
use crate::registration::mapping::MappingData;
use crate::registration::transform::{Candidate, FitStrategy, ViewTransform};

pub fn try_single_anchor(mapping: &MappingData, cfg: &RegistrationConfig) -> Option<Candidate> {
    let mut candidate_titles: Vec<&String> = mapping
        .shared_titles
        .iter()
        .filter(|title| {
            !mapping.model_nodes(title).is_empty() && !mapping.detections(title).is_empty()
        })
        .collect();
    if candidate_titles.is_empty() {
        tracing::debug!("single anchor: no shared titles");
        return None;
    }

    // Most identity-confident first: unique on both sides beats everything,
    // then the fewest combined occurrences.
    candidate_titles.sort_by_key(|title| {
        let models = mapping.model_nodes(title).len();
        let detections = mapping.detections(title).len();
        let uniqueness_rank = if models == 1 && detections == 1 { 0 } else { 1 };
        (uniqueness_rank, models + detections)
    });

    let anchor_title = candidate_titles[0];
    let anchor_node = mapping.model_nodes(anchor_title).first()?;
    let anchor_detection = mapping.detections(anchor_title).first()?;
    let bbox = anchor_detection.bbox;

    if bbox.width <= 0.0 || bbox.height <= 0.0 {
        tracing::debug!(title = %anchor_title, "single anchor: degenerate bounding box");
        return None;
    }
    let scale_x = bbox.width / cfg.canvas.node_width_px;
    let scale_y = bbox.height / cfg.canvas.node_height_px;
    let estimated_scale = (scale_x + scale_y) * 0.5;
    if estimated_scale <= 1e-6 {
        tracing::debug!(title = %anchor_title, "single anchor: estimated scale too small");
        return None;
    }

    // Environment health check only; the committed scale stays fixed and
    // the validator has the final word.
    let fixed = cfg.canvas.fixed_scale;
    if (estimated_scale - fixed).abs() >= cfg.canvas.scale_warn_deviation {
        tracing::warn!(
            estimated_scale,
            fixed_scale = fixed,
            "single anchor: estimated scale far from the fixed constant; \
             check system DPI and editor zoom level"
        );
    }

    let origin_x = bbox.x - anchor_node.pos.0 * fixed;
    let origin_y = bbox.y - anchor_node.pos.1 * fixed;

    tracing::debug!(
        title = %anchor_title,
        estimated_scale,
        origin_x,
        origin_y,
        "single anchor: mapping established"
    );

    Some(Candidate {
        transform: ViewTransform::new(fixed, (origin_x.round() as i32, origin_y.round() as i32)),
        strategy: FitStrategy::SingleAnchor,
        matched: 1,
        total: 1,
    })
}
