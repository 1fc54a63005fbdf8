//! Per-node position drift, harvested after a transform is accepted.
//!
//! Drift is the small program-space discrepancy between a node's nominal
//! position and where it was actually re-detected. Downstream placement
//! heuristics (e.g. where to drop a newly created node) consume it; the
//! registration strategies themselves never do. Entries are only valid for
//! the view-state token they were recorded under.

use std::collections::HashMap;

use crate::registration::transform::MatchRecord;

#[derive(Debug, Clone, Default)]
pub struct DriftCache {
    deltas: HashMap<String, (f32, f32)>,
    token: u64,
}

impl DriftCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.deltas.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Records drift from the match set that supported a committed
    /// transform. Pixel deltas are converted back to program units through
    /// the per-axis scale; sub-millipixel deltas are noise and skipped.
    pub fn record(&mut self, matches: &[MatchRecord], scale: (f32, f32), token: u64) {
        let safe_sx = if scale.0.abs() > 1e-6 { scale.0 } else { 1.0 };
        let safe_sy = if scale.1.abs() > 1e-6 { scale.1 } else { 1.0 };
        for record in matches {
            if record.node_id.is_empty() {
                continue;
            }
            let editor_dx = record.detected.0 - record.expected.0;
            let editor_dy = record.detected.1 - record.expected.1;
            let prog_dx = editor_dx / safe_sx;
            let prog_dy = editor_dy / safe_sy;
            if prog_dx.abs() < 1e-3 && prog_dy.abs() < 1e-3 {
                continue;
            }
            self.deltas.insert(record.node_id.clone(), (prog_dx, prog_dy));
        }
        self.token = token;
    }

    /// Looks up a node's drift, valid only for the current view token.
    pub fn get(&self, node_id: &str, token: u64) -> Option<(f32, f32)> {
        if self.token != token {
            return None;
        }
        self.deltas.get(node_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(node_id: &str, expected: (f32, f32), detected: (f32, f32)) -> MatchRecord {
        MatchRecord {
            title: "Add".into(),
            node_id: node_id.into(),
            model_pos: (0.0, 0.0),
            expected,
            detected,
            error: (
                (detected.0 - expected.0).abs(),
                (detected.1 - expected.1).abs(),
            ),
        }
    }

    #[test]
    fn converts_pixel_deltas_to_program_units() {
        let mut cache = DriftCache::new();
        cache.record(
            &[record_at("n1", (500.0, 300.0), (506.0, 297.0))],
            (2.0, 2.0),
            7,
        );
        assert_eq!(cache.get("n1", 7), Some((3.0, -1.5)));
    }

    #[test]
    fn stale_token_hides_entries() {
        let mut cache = DriftCache::new();
        cache.record(&[record_at("n1", (0.0, 0.0), (4.0, 0.0))], (1.0, 1.0), 1);
        assert!(cache.get("n1", 2).is_none());
        assert_eq!(cache.get("n1", 1), Some((4.0, 0.0)));
    }

    #[test]
    fn negligible_deltas_are_skipped() {
        let mut cache = DriftCache::new();
        cache.record(
            &[record_at("n1", (100.0, 100.0), (100.0005, 100.0))],
            (1.0, 1.0),
            0,
        );
        assert!(cache.is_empty());
    }
}
