//! Strategy orchestration and the engine's single-owner state.
//!
//! One registration attempt runs capture → detect → mapping → strategy
//! chain → validation → commit, synchronously and to completion. Strategies
//! are pure functions over the mapping, so a failed attempt cannot leak
//! partial writes: the committed transform is only touched at the one commit
//! point, or explicitly cleared when every strategy is exhausted.

use crate::config::RegistrationConfig;
use crate::errors::{ScenefitError, ScenefitResult};
use crate::graph::GraphModel;
use crate::perception::traits::{ElementDetector, ScreenCapture};
use crate::perception::types::{Detection, Frame};
use crate::registration::drift::DriftCache;
use crate::registration::mapping::build_mapping_data;
use crate::registration::origin_voting::try_origin_voting;
use crate::registration::relative_anchors::try_relative_anchors;
use crate::registration::single_anchor::try_single_anchor;
use crate::registration::transform::{FitReport, FitStrategy, ViewTransform};
use crate::registration::validator::validate_candidate;

#[derive(Debug, Clone, Copy)]
pub struct RegistrationOptions {
    /// When false, only the primary voting strategy may run; the degraded
    /// fallbacks are skipped entirely.
    pub allow_degraded_fallback: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            allow_degraded_fallback: true,
        }
    }
}

struct StrategySpec {
    strategy: FitStrategy,
    allow_when_degraded: bool,
}

/// Fixed priority order: decreasing robustness.
const STRATEGY_CHAIN: [StrategySpec; 4] = [
    StrategySpec {
        strategy: FitStrategy::OriginVoting,
        allow_when_degraded: false,
    },
    StrategySpec {
        strategy: FitStrategy::RelativeAnchorsUnique,
        allow_when_degraded: true,
    },
    StrategySpec {
        strategy: FitStrategy::RelativeAnchorsAny,
        allow_when_degraded: true,
    },
    StrategySpec {
        strategy: FitStrategy::SingleAnchor,
        allow_when_degraded: true,
    },
];

/// Detection snapshot kept from the last successful attempt, so downstream
/// steps can reuse it while the viewport is unchanged.
pub struct LastRecognition {
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub strategy: FitStrategy,
    pub view_token: u64,
}

pub struct RegistrationEngine<C, D> {
    capture: C,
    detector: D,
    config: RegistrationConfig,
    transform: Option<ViewTransform>,
    drift: DriftCache,
    view_token: u64,
    last: Option<LastRecognition>,
}

impl<C: ScreenCapture, D: ElementDetector> RegistrationEngine<C, D> {
    pub fn new(capture: C, detector: D, config: RegistrationConfig) -> Self {
        Self {
            capture,
            detector,
            config,
            transform: None,
            drift: DriftCache::new(),
            view_token: 0,
            last: None,
        }
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// The committed transform, if any attempt has succeeded since the last
    /// invalidation.
    pub fn transform(&self) -> Option<&ViewTransform> {
        self.transform.as_ref()
    }

    pub fn view_token(&self) -> u64 {
        self.view_token
    }

    pub fn last_recognition(&self) -> Option<&LastRecognition> {
        self.last.as_ref()
    }

    /// Program-space drift recorded for a node at the last commit. Only
    /// valid while the viewport is unchanged.
    pub fn drift_of(&self, node_id: &str) -> Option<(f32, f32)> {
        self.drift.get(node_id, self.view_token)
    }

    pub fn program_to_screen(&self, x: f32, y: f32) -> ScenefitResult<(i32, i32)> {
        let transform = self.transform.as_ref().ok_or(ScenefitError::NotCalibrated)?;
        Ok(transform.program_to_screen(x, y))
    }

    pub fn screen_to_program(&self, px: i32, py: i32) -> ScenefitResult<(f32, f32)> {
        let transform = self.transform.as_ref().ok_or(ScenefitError::NotCalibrated)?;
        transform.screen_to_program(px, py)
    }

    /// Must be called whenever the external canvas is panned, zoomed or the
    /// window resized: the old transform and drift data describe a viewport
    /// that no longer exists.
    pub fn viewport_changed(&mut self) {
        self.view_token += 1;
        self.transform = None;
        self.drift.clear();
        self.last = None;
        tracing::debug!(view_token = self.view_token, "viewport changed; mapping invalidated");
    }

    /// Clears every residue of previous attempts for a clean run from the
    /// root step.
    pub fn reset_mapping_state(&mut self) {
        self.transform = None;
        self.drift.clear();
        self.last = None;
        tracing::debug!("mapping state reset");
    }

    pub fn verify_and_update(&mut self, graph: &GraphModel) -> ScenefitResult<FitReport> {
        self.verify_and_update_with(graph, RegistrationOptions::default())
    }

    /// Runs one full registration attempt and commits the first candidate
    /// that survives ordinary-node validation. On exhaustion the previous
    /// transform is explicitly dropped: a stale mapping must never be
    /// trusted for a click.
    pub fn verify_and_update_with(
        &mut self,
        graph: &GraphModel,
        options: RegistrationOptions,
    ) -> ScenefitResult<FitReport> {
        let frame = self.capture.capture_window()?;
        let detections = self.detector.detect_elements(&frame)?;
        let mapping = build_mapping_data(graph, &detections);
        let canvas = self.capture.canvas_rect(&frame);

        tracing::info!(
            model_nodes = graph.len(),
            detections = detections.len(),
            shared_titles = mapping.shared_titles.len(),
            "registration attempt"
        );

        for spec in &STRATEGY_CHAIN {
            if spec.allow_when_degraded && !options.allow_degraded_fallback {
                continue;
            }
            let candidate = match spec.strategy {
                FitStrategy::OriginVoting => {
                    try_origin_voting(&mapping, canvas.as_ref(), &self.config)
                }
                FitStrategy::RelativeAnchorsUnique => {
                    try_relative_anchors(&mapping, true, &self.config)
                }
                FitStrategy::RelativeAnchorsAny => {
                    try_relative_anchors(&mapping, false, &self.config)
                }
                FitStrategy::SingleAnchor => try_single_anchor(&mapping, &self.config),
            };
            let Some(candidate) = candidate else {
                tracing::debug!(strategy = %spec.strategy, "strategy produced no candidate");
                continue;
            };

            let outcome = validate_candidate(&mapping, &candidate.transform, &self.config);
            if !outcome.accepted() {
                tracing::debug!(
                    strategy = %candidate.strategy,
                    matched = outcome.matched,
                    required = outcome.required,
                    "candidate rejected by ordinary-node validation; trying next strategy"
                );
                continue;
            }

            // Single commit point. Everything above was read-only.
            let transform = candidate.transform;
            self.transform = Some(transform);
            self.drift.clear();
            self.drift
                .record(&outcome.matches, (transform.scale, transform.scale), self.view_token);
            self.last = Some(LastRecognition {
                frame,
                detections,
                strategy: candidate.strategy,
                view_token: self.view_token,
            });

            tracing::info!(
                strategy = %candidate.strategy,
                scale = transform.scale,
                origin_x = transform.origin.0,
                origin_y = transform.origin.1,
                matched = outcome.matched,
                "view mapping committed"
            );
            return Ok(FitReport {
                strategy: candidate.strategy,
                transform,
                matched: candidate.matched,
                total: candidate.total,
            });
        }

        // Exhausted. The old transform, if any, is no longer trustworthy.
        self.transform = None;
        self.drift.clear();
        self.last = None;
        let hint = if mapping.shared_titles.is_empty() {
            "no title appears in both the graph model and the screen; check that the right graph is open"
        } else {
            "pan the viewport to reveal more nodes, or adjust the zoom level"
        };
        tracing::warn!(hint, "every registration strategy failed");
        Err(ScenefitError::RegistrationFailed { hint: hint.into() })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::errors::ScenefitError;
    use crate::graph::ModelNode;
    use crate::perception::types::Rect;
    use crate::registration::testutil::{init_test_logging, scene, SceneSpec, StubCapture, StubDetector};

    /// Detector whose detections the test can swap between attempts.
    struct SwappableDetector {
        detections: Rc<RefCell<Vec<Detection>>>,
    }

    impl ElementDetector for SwappableDetector {
        fn detect_elements(&mut self, _frame: &Frame) -> ScenefitResult<Vec<Detection>> {
            Ok(self.detections.borrow().clone())
        }
    }

    /// Capture that errors on demand, leaving any committed state untouched.
    struct FlakyCapture {
        inner: StubCapture,
        fail_next: Rc<RefCell<bool>>,
    }

    impl ScreenCapture for FlakyCapture {
        fn capture_window(&mut self) -> ScenefitResult<Frame> {
            if *self.fail_next.borrow() {
                return Err(ScenefitError::Capture("window lost".into()));
            }
            self.inner.capture_window()
        }

        fn canvas_rect(&self, frame: &Frame) -> Option<Rect> {
            self.inner.canvas_rect(frame)
        }
    }

    fn engine_for(
        detections: Vec<Detection>,
    ) -> RegistrationEngine<StubCapture, StubDetector> {
        init_test_logging();
        RegistrationEngine::new(
            StubCapture::new(),
            StubDetector { detections },
            RegistrationConfig::default(),
        )
    }

    #[test]
    fn commits_voting_fit_for_a_rich_scene() {
        let (graph, detections) = scene(&SceneSpec::default());
        let mut engine = engine_for(detections);

        let report = engine.verify_and_update(&graph).expect("fit should commit");
        assert_eq!(report.strategy, FitStrategy::OriginVoting);
        assert_eq!(report.transform.origin, (500, 300));
        assert_eq!(engine.transform(), Some(&report.transform));
        assert_eq!(engine.program_to_screen(100.0, 0.0).unwrap(), (600, 300));
    }

    #[test]
    fn three_node_scene_falls_through_to_single_anchor() {
        let graph = GraphModel::new(vec![
            ModelNode::new("a", "A", 0.0, 0.0),
            ModelNode::new("b", "B", 100.0, 0.0),
            ModelNode::new("c", "C", 0.0, 100.0),
        ]);
        let detections = vec![
            Detection::new("A", Rect::new(500.0, 300.0, 180.0, 44.0)),
            Detection::new("B", Rect::new(600.0, 300.0, 180.0, 44.0)),
            Detection::new("C", Rect::new(500.0, 400.0, 180.0, 44.0)),
        ];
        let mut engine = engine_for(detections);

        let report = engine.verify_and_update(&graph).expect("fit should commit");
        assert_eq!(report.strategy, FitStrategy::SingleAnchor);
        assert_eq!(report.transform.origin, (500, 300));
    }

    #[test]
    fn zero_shared_titles_fails_and_invalidates() {
        let (graph, detections) = scene(&SceneSpec::default());
        let shared = Rc::new(RefCell::new(detections));
        let mut engine = RegistrationEngine::new(
            StubCapture::new(),
            SwappableDetector {
                detections: shared.clone(),
            },
            RegistrationConfig::default(),
        );

        engine.verify_and_update(&graph).expect("first fit should commit");
        assert!(engine.transform().is_some());

        *shared.borrow_mut() = vec![Detection::new(
            "Nothing Like It",
            Rect::new(10.0, 10.0, 180.0, 44.0),
        )];
        let err = engine.verify_and_update(&graph).unwrap_err();
        assert!(matches!(err, ScenefitError::RegistrationFailed { .. }));
        // The stale transform must not survive an outright failure.
        assert!(engine.transform().is_none());
        assert!(matches!(
            engine.program_to_screen(0.0, 0.0),
            Err(ScenefitError::NotCalibrated)
        ));
    }

    #[test]
    fn repeated_attempts_on_an_unchanged_frame_agree() {
        let (graph, detections) = scene(&SceneSpec {
            jitter: 2.0,
            noise_detections: 3,
            ..SceneSpec::default()
        });
        let mut engine = engine_for(detections);

        let first = engine.verify_and_update(&graph).expect("first fit");
        let second = engine.verify_and_update(&graph).expect("second fit");
        assert_eq!(first.transform, second.transform);
        assert_eq!(first.strategy, second.strategy);
    }

    #[test]
    fn failed_capture_leaves_committed_state_untouched() {
        let (graph, detections) = scene(&SceneSpec::default());
        let fail_next = Rc::new(RefCell::new(false));
        let mut engine = RegistrationEngine::new(
            FlakyCapture {
                inner: StubCapture::new(),
                fail_next: fail_next.clone(),
            },
            StubDetector { detections },
            RegistrationConfig::default(),
        );

        let report = engine.verify_and_update(&graph).expect("fit should commit");

        *fail_next.borrow_mut() = true;
        let err = engine.verify_and_update(&graph).unwrap_err();
        assert!(matches!(err, ScenefitError::Capture(_)));
        // The attempt never completed, so the prior commit stands untouched.
        assert_eq!(engine.transform(), Some(&report.transform));
    }

    #[test]
    fn viewport_change_invalidates_transform_and_drift() {
        let (graph, detections) = scene(&SceneSpec {
            jitter: 3.0,
            ..SceneSpec::default()
        });
        let mut engine = engine_for(detections);
        engine.verify_and_update(&graph).expect("fit should commit");
        assert!(engine.transform().is_some());

        engine.viewport_changed();
        assert!(engine.transform().is_none());
        assert!(engine.drift_of("n1").is_none());
        assert!(engine.last_recognition().is_none());
    }

    #[test]
    fn reset_clears_committed_state_without_bumping_the_token() {
        let (graph, detections) = scene(&SceneSpec::default());
        let mut engine = engine_for(detections);
        engine.verify_and_update(&graph).expect("fit should commit");
        let token = engine.view_token();

        engine.reset_mapping_state();
        assert!(engine.transform().is_none());
        assert!(engine.last_recognition().is_none());
        assert_eq!(engine.view_token(), token);
    }

    #[test]
    fn drift_is_recorded_for_jittered_nodes() {
        let (graph, detections) = scene(&SceneSpec {
            jitter: 5.0,
            ..SceneSpec::default()
        });
        let mut engine = engine_for(detections);
        engine.verify_and_update(&graph).expect("fit should commit");

        // With jitter the committed origin cannot cancel every node's
        // offset, so at least one node carries measurable drift.
        let any_drift = graph
            .nodes()
            .iter()
            .any(|node| engine.drift_of(&node.id).is_some());
        assert!(any_drift, "expected drift entries after a jittered fit");
    }

    #[test]
    fn degraded_fallback_can_be_disabled() {
        // Three nodes: voting cannot reach its inlier floor, and with the
        // fallbacks disabled the attempt must fail outright.
        let graph = GraphModel::new(vec![
            ModelNode::new("a", "A", 0.0, 0.0),
            ModelNode::new("b", "B", 100.0, 0.0),
            ModelNode::new("c", "C", 0.0, 100.0),
        ]);
        let detections = vec![
            Detection::new("A", Rect::new(500.0, 300.0, 180.0, 44.0)),
            Detection::new("B", Rect::new(600.0, 300.0, 180.0, 44.0)),
            Detection::new("C", Rect::new(500.0, 400.0, 180.0, 44.0)),
        ];
        let mut engine = engine_for(detections);

        let err = engine
            .verify_and_update_with(
                &graph,
                RegistrationOptions {
                    allow_degraded_fallback: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ScenefitError::RegistrationFailed { .. }));
    }

    #[test]
    fn last_recognition_snapshot_is_kept_on_success() {
        let (graph, detections) = scene(&SceneSpec::default());
        let expected_count = detections.len();
        let mut engine = engine_for(detections);
        engine.verify_and_update(&graph).expect("fit should commit");

        let last = engine.last_recognition().expect("snapshot should be cached");
        assert_eq!(last.strategy, FitStrategy::OriginVoting);
        assert_eq!(last.detections.len(), expected_count);
        assert_eq!(last.view_token, engine.view_token());
    }
}
