//! Synthetic scenes for strategy and engine tests: a graph laid out on a
//! grid plus detections generated by applying a known transform, optional
//! bounded jitter, and unrelated noise boxes.

use crate::errors::ScenefitResult;
use crate::graph::{GraphModel, ModelNode};
use crate::perception::traits::{ElementDetector, ScreenCapture};
use crate::perception::types::{Detection, Frame, Rect};

pub(crate) struct SceneSpec {
    pub origin: (f32, f32),
    pub scale: f32,
    pub titles: Vec<&'static str>,
    /// Maximum absolute per-axis pixel jitter applied to each detection.
    pub jitter: f32,
    /// Extra detections with shared titles at unrelated positions.
    pub noise_detections: usize,
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            origin: (500.0, 300.0),
            scale: 1.0,
            titles: vec!["Add", "Print", "Branch", "Delay", "Timer", "Sequence"],
            jitter: 0.0,
            noise_detections: 0,
        }
    }
}

/// Deterministic pseudo-random stream so tests are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f32) / (u32::MAX >> 1) as f32
    }

    fn in_range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }
}

/// Installs a fmt subscriber once per process so `RUST_LOG` surfaces engine
/// logs during test runs.
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) const NODE_W: f32 = 180.0;
pub(crate) const NODE_H: f32 = 44.0;

/// Grid position of the i-th node: three columns, spacing wider than a node.
pub(crate) fn grid_pos(index: usize) -> (f32, f32) {
    (((index % 3) as f32) * 240.0, ((index / 3) as f32) * 120.0)
}

pub(crate) fn scene(spec: &SceneSpec) -> (GraphModel, Vec<Detection>) {
    let mut rng = Lcg(0x5ce0_f17u64);
    let mut nodes = Vec::new();
    let mut detections = Vec::new();

    for (i, title) in spec.titles.iter().enumerate() {
        let pos = grid_pos(i);
        nodes.push(ModelNode::new(format!("n{}", i + 1), *title, pos.0, pos.1));

        let jx = if spec.jitter > 0.0 {
            rng.in_range(-spec.jitter, spec.jitter)
        } else {
            0.0
        };
        let jy = if spec.jitter > 0.0 {
            rng.in_range(-spec.jitter, spec.jitter)
        } else {
            0.0
        };
        detections.push(Detection::new(
            *title,
            Rect::new(
                spec.origin.0 + pos.0 * spec.scale + jx,
                spec.origin.1 + pos.1 * spec.scale + jy,
                NODE_W * spec.scale,
                NODE_H * spec.scale,
            ),
        ));
    }

    for i in 0..spec.noise_detections {
        let title = spec.titles[i % spec.titles.len()];
        detections.push(Detection::new(
            title,
            Rect::new(
                rng.in_range(1200.0, 1900.0),
                rng.in_range(700.0, 1050.0),
                NODE_W * spec.scale,
                NODE_H * spec.scale,
            ),
        ));
    }

    (GraphModel::new(nodes), detections)
}

pub(crate) struct StubCapture {
    pub canvas: Option<Rect>,
}

impl StubCapture {
    pub fn new() -> Self {
        Self {
            canvas: Some(Rect::new(0.0, 0.0, 1920.0, 1080.0)),
        }
    }
}

impl ScreenCapture for StubCapture {
    fn capture_window(&mut self) -> ScenefitResult<Frame> {
        Ok(Frame::new(image::RgbaImage::new(8, 8), 1.0))
    }

    fn canvas_rect(&self, _frame: &Frame) -> Option<Rect> {
        self.canvas
    }
}

pub(crate) struct StubDetector {
    pub detections: Vec<Detection>,
}

impl ElementDetector for StubDetector {
    fn detect_elements(&mut self, _frame: &Frame) -> ScenefitResult<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}
