//! Relative anchor alignment, the structural fallback strategy.
//!
//! Instead of repeated-title voting, pick one anchor node, relate it to its
//! nearest logical neighbors, and read per-axis scale ratios out of the
//! detected geometry. Ratios are accepted incrementally against the running
//! median, so a single wrong neighbor-detection pairing cannot poison the
//! estimate. The measured scale is only a self-consistency check: the
//! committed transform always carries the externally fixed scale.

use std::collections::HashMap;

use crate::config::RegistrationConfig;
use crate::graph::ModelNode;
use crate::registration::geometry::{
    detection_anchors_by_title, flatten_model_nodes, model_centroid,
};
use crate::registration::mapping::MappingData;
use crate::registration::transform::{
    Candidate, FitStrategy, MatchRecord, ViewTransform,
};

struct AnchorCandidate<'a> {
    title: &'a str,
    model: &'a ModelNode,
    dist2: f32,
}

struct SupportEval {
    matched: usize,
    total: usize,
    ratio: f32,
    matches: Vec<MatchRecord>,
}

struct BestChoice {
    scale_x: f32,
    scale_y: f32,
    offset: (f32, f32),
    support: SupportEval,
    anchor_title: String,
}

fn median(samples: &[f32]) -> f32 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) * 0.5
    }
}

fn is_ratio_consistent(value: f32, samples: &[f32], tolerance: f32) -> bool {
    if samples.is_empty() {
        return true;
    }
    let reference = median(samples);
    let max_reference = reference.abs().max(0.01);
    (value - reference).abs() <= tolerance * max_reference
}

fn collect_neighbors<'a>(
    anchor: &ModelNode,
    all_nodes: &'a [(String, ModelNode)],
    anchors_by_title: &HashMap<String, Vec<(f32, f32)>>,
    max_neighbors: usize,
) -> Vec<&'a (String, ModelNode)> {
    let mut neighbors: Vec<(f32, &(String, ModelNode))> = Vec::new();
    for entry in all_nodes {
        let (title, node) = entry;
        if node.id == anchor.id {
            continue;
        }
        if !anchors_by_title.contains_key(title) {
            continue;
        }
        let dx = node.pos.0 - anchor.pos.0;
        let dy = node.pos.1 - anchor.pos.1;
        let dist2 = dx * dx + dy * dy;
        if dist2 <= 0.1 {
            continue;
        }
        neighbors.push((dist2, entry));
    }
    neighbors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    neighbors
        .into_iter()
        .take(max_neighbors)
        .map(|(_, entry)| entry)
        .collect()
}

/// Per-axis scale ratios implied by one neighbor, against the anchor's
/// chosen detection. Returns the first neighbor detection whose ratios agree
/// with the running medians; axes with a too-small program delta are skipped.
fn neighbor_ratios(
    anchor: &ModelNode,
    neighbor: &ModelNode,
    neighbor_title: &str,
    anchors_by_title: &HashMap<String, Vec<(f32, f32)>>,
    anchor_point: (f32, f32),
    scale_x_samples: &[f32],
    scale_y_samples: &[f32],
    cfg: &RegistrationConfig,
) -> Option<(Option<f32>, Option<f32>)> {
    let detections = anchors_by_title.get(neighbor_title)?;
    let dx_prog = neighbor.pos.0 - anchor.pos.0;
    let dy_prog = neighbor.pos.1 - anchor.pos.1;
    let min_delta = cfg.anchors.min_program_delta;
    if dx_prog.abs() < min_delta && dy_prog.abs() < min_delta {
        return None;
    }

    for &(det_x, det_y) in detections {
        if det_x == anchor_point.0 && det_y == anchor_point.1 {
            continue;
        }
        let ratio_x = (dx_prog.abs() >= min_delta)
            .then(|| (det_x - anchor_point.0) / dx_prog)
            .filter(|r| r.is_finite());
        let ratio_y = (dy_prog.abs() >= min_delta)
            .then(|| (det_y - anchor_point.1) / dy_prog)
            .filter(|r| r.is_finite());
        if ratio_x.is_none() && ratio_y.is_none() {
            continue;
        }
        let tolerance = cfg.anchors.ratio_tolerance;
        if let Some(rx) = ratio_x {
            if !is_ratio_consistent(rx, scale_x_samples, tolerance) {
                continue;
            }
        }
        if let Some(ry) = ratio_y {
            if !is_ratio_consistent(ry, scale_y_samples, tolerance) {
                continue;
            }
        }
        return Some((ratio_x, ratio_y));
    }
    None
}

/// Combines accepted per-axis samples into one scale estimate, rejecting
/// anisotropic results: a pan-only transform must scale both axes equally.
fn scale_from_samples(
    scale_x_samples: &[f32],
    scale_y_samples: &[f32],
    cfg: &RegistrationConfig,
) -> Option<(f32, f32)> {
    let scale_x = (!scale_x_samples.is_empty()).then(|| median(scale_x_samples));
    let scale_y = (!scale_y_samples.is_empty()).then(|| median(scale_y_samples));
    let (scale_x, scale_y) = match (scale_x, scale_y) {
        (None, None) => return None,
        (Some(x), None) => (x, x),
        (None, Some(y)) => (y, y),
        (Some(x), Some(y)) => (x, y),
    };
    if scale_x.abs() <= 1e-6 || scale_y.abs() <= 1e-6 {
        return None;
    }
    let anisotropy = (scale_x - scale_y).abs() / ((scale_x.abs() + scale_y.abs()) * 0.5).max(1e-6);
    if anisotropy > cfg.anchors.max_anisotropy {
        tracing::debug!(
            scale_x,
            scale_y,
            anisotropy,
            "relative anchors: axis scales disagree, rejecting anchor"
        );
        return None;
    }
    Some((scale_x, scale_y))
}

fn evaluate_support(
    mapping: &MappingData,
    anchors_by_title: &HashMap<String, Vec<(f32, f32)>>,
    scale: (f32, f32),
    offset: (f32, f32),
    cfg: &RegistrationConfig,
) -> SupportEval {
    let avg_scale = ((scale.0.abs() + scale.1.abs()) * 0.5).max(1e-6);
    let base = cfg.position_thresholds(avg_scale);
    let tol = (
        base.0 * cfg.anchors.support_tolerance_multiplier,
        base.1 * cfg.anchors.support_tolerance_multiplier,
    );

    let mut matched = 0usize;
    let mut total = 0usize;
    let mut matches = Vec::new();
    for title in &mapping.shared_titles {
        let models = mapping.model_nodes(title);
        let detections = match anchors_by_title.get(title) {
            Some(d) if !d.is_empty() && !models.is_empty() => d,
            _ => continue,
        };
        total += detections.len();
        let mut used: Vec<&str> = Vec::new();
        for &(det_x, det_y) in detections {
            let mut best: Option<(f32, &ModelNode, (f32, f32), (f32, f32))> = None;
            for node in models {
                if used.contains(&node.id.as_str()) {
                    continue;
                }
                let expected_x = scale.0 * node.pos.0 + offset.0;
                let expected_y = scale.1 * node.pos.1 + offset.1;
                let dx = (det_x - expected_x).abs();
                let dy = (det_y - expected_y).abs();
                if dx <= tol.0 && dy <= tol.1 {
                    let err = dx + dy;
                    if best.map_or(true, |(best_err, ..)| err < best_err) {
                        best = Some((err, node, (expected_x, expected_y), (dx, dy)));
                    }
                }
            }
            if let Some((_, node, expected, error)) = best {
                matched += 1;
                used.push(node.id.as_str());
                matches.push(MatchRecord {
                    title: title.clone(),
                    node_id: node.id.clone(),
                    model_pos: node.pos,
                    expected,
                    detected: (det_x, det_y),
                    error,
                });
            }
        }
    }
    let ratio = if total > 0 {
        matched as f32 / total as f32
    } else {
        0.0
    };
    SupportEval {
        matched,
        total,
        ratio,
        matches,
    }
}

/// Attempts to align via one anchor node and its logical neighborhood.
/// `prefer_unique` restricts anchors to titles unique on both sides; the
/// orchestrator runs unique-preferred first, then any-title.
pub fn try_relative_anchors(
    mapping: &MappingData,
    prefer_unique: bool,
    cfg: &RegistrationConfig,
) -> Option<Candidate> {
    let anchors_by_title = detection_anchors_by_title(mapping);
    if anchors_by_title.is_empty() {
        tracing::debug!("relative anchors: no detections under shared titles");
        return None;
    }
    let all_nodes = flatten_model_nodes(mapping);
    if all_nodes.is_empty() {
        tracing::debug!("relative anchors: no model nodes under shared titles");
        return None;
    }
    let centroid = model_centroid(mapping);

    let mut anchor_candidates: Vec<AnchorCandidate> = Vec::new();
    for title in &mapping.shared_titles {
        let models = mapping.model_nodes(title);
        let detections = match anchors_by_title.get(title.as_str()) {
            Some(d) if !d.is_empty() && !models.is_empty() => d,
            _ => continue,
        };
        let is_unique = models.len() == 1 && detections.len() == 1;
        if prefer_unique && !is_unique {
            continue;
        }
        for model in models {
            let dx = model.pos.0 - centroid.0;
            let dy = model.pos.1 - centroid.1;
            anchor_candidates.push(AnchorCandidate {
                title,
                model,
                dist2: dx * dx + dy * dy,
            });
        }
    }
    if anchor_candidates.is_empty() {
        tracing::debug!(prefer_unique, "relative anchors: no anchor candidates");
        return None;
    }
    anchor_candidates
        .sort_by(|a, b| a.dist2.partial_cmp(&b.dist2).unwrap_or(std::cmp::Ordering::Equal));

    let min_matches = cfg.anchors.min_matches;
    let early_exit = (min_matches + 1).max(3);
    let mut best: Option<BestChoice> = None;

    for candidate in &anchor_candidates {
        let neighbors =
            collect_neighbors(candidate.model, &all_nodes, &anchors_by_title, cfg.anchors.max_neighbors);
        if neighbors.is_empty() {
            continue;
        }
        let anchor_detections = &anchors_by_title[candidate.title];
        for &anchor_point in anchor_detections {
            let mut scale_x_samples: Vec<f32> = Vec::new();
            let mut scale_y_samples: Vec<f32> = Vec::new();
            let mut matched_neighbors = 0usize;
            for (neighbor_title, neighbor) in neighbors.iter().map(|entry| (&entry.0, &entry.1)) {
                let Some((ratio_x, ratio_y)) = neighbor_ratios(
                    candidate.model,
                    neighbor,
                    neighbor_title,
                    &anchors_by_title,
                    anchor_point,
                    &scale_x_samples,
                    &scale_y_samples,
                    cfg,
                ) else {
                    continue;
                };
                if let Some(rx) = ratio_x {
                    scale_x_samples.push(rx);
                }
                if let Some(ry) = ratio_y {
                    scale_y_samples.push(ry);
                }
                matched_neighbors += 1;
                if matched_neighbors >= cfg.anchors.max_neighbors {
                    break;
                }
            }
            if matched_neighbors < min_matches {
                continue;
            }
            let Some((scale_x, scale_y)) = scale_from_samples(&scale_x_samples, &scale_y_samples, cfg)
            else {
                continue;
            };
            let offset = (
                anchor_point.0 - scale_x * candidate.model.pos.0,
                anchor_point.1 - scale_y * candidate.model.pos.1,
            );
            let support = evaluate_support(mapping, &anchors_by_title, (scale_x, scale_y), offset, cfg);
            if support.matched < min_matches {
                continue;
            }
            let is_better = best.as_ref().map_or(true, |current| {
                support.matched > current.support.matched
                    || (support.matched == current.support.matched
                        && support.ratio > current.support.ratio)
            });
            if is_better {
                let strong_enough = support.matched >= early_exit;
                best = Some(BestChoice {
                    scale_x,
                    scale_y,
                    offset,
                    support,
                    anchor_title: candidate.title.to_string(),
                });
                if strong_enough {
                    break;
                }
            }
        }
        if best.is_some() {
            break;
        }
    }

    let choice = best?;

    // Committing: the scale stays the fixed constant; the locally measured
    // scale only validated self-consistency. The origin is re-derived from
    // the median of per-match offsets at the fixed scale so a single noisy
    // anchor pair cannot bias the committed translation.
    let fixed = cfg.canvas.fixed_scale;
    let mut origin = (choice.offset.0.round(), choice.offset.1.round());
    if !choice.support.matches.is_empty() {
        let xs: Vec<f32> = choice
            .support
            .matches
            .iter()
            .map(|m| m.detected.0 - m.model_pos.0 * fixed)
            .collect();
        let ys: Vec<f32> = choice
            .support
            .matches
            .iter()
            .map(|m| m.detected.1 - m.model_pos.1 * fixed)
            .collect();
        origin = (median(&xs).round(), median(&ys).round());
    }

    tracing::debug!(
        anchor = %choice.anchor_title,
        matched = choice.support.matched,
        total = choice.support.total,
        support_ratio = choice.support.ratio,
        scale_x = choice.scale_x,
        scale_y = choice.scale_y,
        origin_x = origin.0,
        origin_y = origin.1,
        "relative anchors: alignment found"
    );

    Some(Candidate {
        transform: ViewTransform::new(fixed, (origin.0 as i32, origin.1 as i32)),
        strategy: if prefer_unique {
            FitStrategy::RelativeAnchorsUnique
        } else {
            FitStrategy::RelativeAnchorsAny
        },
        matched: choice.support.matched,
        total: choice.support.total,
    })
}
