//! Origin translation voting, the primary registration strategy.
//!
//! Under the fixed scale, every (model node, detection) pair sharing a title
//! implies one translation sample `detection.topLeft - node.pos * scale`.
//! True correspondences all imply the same translation, so grid-binning the
//! samples and reading off the heaviest bins surfaces the real origin even
//! when most pairings are wrong.

use std::collections::{HashMap, HashSet};

use crate::config::RegistrationConfig;
use crate::perception::types::Rect;
use crate::registration::mapping::MappingData;
use crate::registration::transform::{Candidate, FitStrategy, ViewTransform};

/// One translation hypothesis read out of a bin: centroid plus vote count.
#[derive(Debug, Clone, Copy)]
struct OriginBin {
    origin: (f32, f32),
    votes: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CandidateScore {
    pub(crate) matched: usize,
    pub(crate) total: usize,
    pub(crate) missing: usize,
    pub(crate) score: f32,
}

fn generate_origin_samples(mapping: &MappingData, cfg: &RegistrationConfig) -> Vec<(f32, f32)> {
    let scale = cfg.canvas.fixed_scale;
    let mut samples = Vec::new();
    for title in mapping.shared_titles.iter().take(cfg.voting.max_titles) {
        let models = mapping.model_nodes(title);
        let detections = mapping.detections(title);
        for node in models.iter().take(cfg.voting.max_pairs_per_title) {
            for detection in detections.iter().take(cfg.voting.max_pairs_per_title) {
                let (left, top) = detection.bbox.top_left();
                samples.push((left - node.pos.0 * scale, top - node.pos.1 * scale));
            }
        }
    }
    samples
}

fn cluster_origin_samples(samples: &[(f32, f32)], cfg: &RegistrationConfig) -> Vec<OriginBin> {
    if samples.is_empty() {
        return Vec::new();
    }

    struct Bucket {
        count: usize,
        sum_x: f32,
        sum_y: f32,
    }

    let bin_w = cfg.voting.bin_size_x;
    let bin_h = cfg.voting.bin_size_y;
    let mut bins: HashMap<(i64, i64), Bucket> = HashMap::new();
    for &(x, y) in samples {
        let key = ((x / bin_w).floor() as i64, (y / bin_h).floor() as i64);
        let bucket = bins.entry(key).or_insert(Bucket {
            count: 0,
            sum_x: 0.0,
            sum_y: 0.0,
        });
        bucket.count += 1;
        bucket.sum_x += x;
        bucket.sum_y += y;
    }

    // Hash iteration order is per-instance random; sorting on (count, key)
    // keeps the truncation and downstream tie-breaks stable across runs.
    let mut sorted: Vec<((i64, i64), Bucket)> = bins.into_iter().collect();
    sorted.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));
    sorted.truncate(cfg.voting.max_candidates);

    sorted
        .into_iter()
        .filter(|(_, bucket)| bucket.count > 0)
        .map(|(_, bucket)| OriginBin {
            origin: (
                bucket.sum_x / bucket.count as f32,
                bucket.sum_y / bucket.count as f32,
            ),
            votes: bucket.count,
        })
        .collect()
}

/// Scores one candidate origin: how many detections it explains via greedy
/// 1:1 assignment within tolerance, minus a penalty for model nodes the
/// origin would place inside the canvas but which nothing detected. A
/// correct origin must explain the visible graph, not merely coincide with
/// a few boxes.
pub(crate) fn evaluate_origin_candidate(
    mapping: &MappingData,
    origin: (f32, f32),
    canvas: Option<&Rect>,
    tolerance: (f32, f32),
    cfg: &RegistrationConfig,
) -> CandidateScore {
    let scale = cfg.canvas.fixed_scale;
    let mut matched = 0usize;
    let mut total = 0usize;
    let mut missing = 0usize;

    for title in &mapping.shared_titles {
        let models = mapping.model_nodes(title);
        let detections = mapping.detections(title);
        let models = &models[..models.len().min(cfg.voting.max_eval_per_title)];
        let detections = &detections[..detections.len().min(cfg.voting.max_eval_per_title)];
        total += detections.len();

        let mut used_models: HashSet<&str> = HashSet::new();
        for detection in detections {
            let (left, top) = detection.bbox.top_left();
            let mut best: Option<(f32, &str)> = None;
            for node in models {
                if used_models.contains(node.id.as_str()) {
                    continue;
                }
                let expected_x = origin.0 + node.pos.0 * scale;
                let expected_y = origin.1 + node.pos.1 * scale;
                let dx = (left - expected_x).abs();
                let dy = (top - expected_y).abs();
                if dx > tolerance.0 || dy > tolerance.1 {
                    continue;
                }
                let err = dx + dy;
                if best.map_or(true, |(best_err, _)| err < best_err) {
                    best = Some((err, node.id.as_str()));
                }
            }
            if let Some((_, node_id)) = best {
                used_models.insert(node_id);
                matched += 1;
            }
        }

        if let Some(region) = canvas {
            for node in models {
                if used_models.contains(node.id.as_str()) {
                    continue;
                }
                let expected_x = origin.0 + node.pos.0 * scale;
                let expected_y = origin.1 + node.pos.1 * scale;
                if region.contains(expected_x, expected_y) {
                    missing += 1;
                }
            }
        }
    }

    let score = matched as f32 - missing as f32 * cfg.voting.missing_penalty;
    CandidateScore {
        matched,
        total,
        missing,
        score,
    }
}

/// Attempts to recover the origin by translation voting. Pure: reads the
/// mapping, writes nothing; the orchestrator commits (or discards) the
/// returned candidate.
pub fn try_origin_voting(
    mapping: &MappingData,
    canvas: Option<&Rect>,
    cfg: &RegistrationConfig,
) -> Option<Candidate> {
    let samples = generate_origin_samples(mapping, cfg);
    if samples.is_empty() {
        tracing::debug!("origin voting: no samples (no shared titles or no detections)");
        return None;
    }
    tracing::debug!(samples = samples.len(), "origin voting: clustering samples");

    let candidate_bins = cluster_origin_samples(&samples, cfg);
    if candidate_bins.is_empty() {
        tracing::debug!("origin voting: clustering produced no candidate bins");
        return None;
    }

    let base = cfg.position_thresholds(cfg.canvas.fixed_scale);
    let tolerance = (
        base.0 * cfg.voting.tolerance_multiplier,
        base.1 * cfg.voting.tolerance_multiplier,
    );

    let mut best: Option<(CandidateScore, OriginBin)> = None;
    for (index, bin) in candidate_bins.iter().enumerate() {
        let score = evaluate_origin_candidate(mapping, bin.origin, canvas, tolerance, cfg);
        tracing::debug!(
            candidate = index + 1,
            origin_x = bin.origin.0,
            origin_y = bin.origin.1,
            votes = bin.votes,
            matched = score.matched,
            missing = score.missing,
            score = score.score,
            "origin voting: candidate evaluated"
        );
        // Score ties go to the heavier bin, then to the earlier one in the
        // stable candidate order, so repeated runs commit the same origin.
        let is_better = best.map_or(true, |(best_score, best_bin)| {
            score.score > best_score.score
                || (score.score == best_score.score && bin.votes > best_bin.votes)
        });
        if is_better {
            best = Some((score, *bin));
        }
    }

    let (score, bin) = best?;
    let origin = bin.origin;
    if score.matched < cfg.voting.min_inliers {
        tracing::debug!(
            matched = score.matched,
            required = cfg.voting.min_inliers,
            "origin voting: best candidate below inlier floor"
        );
        return None;
    }

    Some(Candidate {
        transform: ViewTransform::new(
            cfg.canvas.fixed_scale,
            (origin.0.round() as i32, origin.1.round() as i32),
        ),
        strategy: FitStrategy::OriginVoting,
        matched: score.matched,
        total: score.total,
    })
}
