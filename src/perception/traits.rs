use crate::errors::ScenefitResult;
use crate::perception::types::{Detection, Frame, Rect};

/// Window capture collaborator. The target process is a black box; a fresh
/// screenshot is the only read-back channel the engine has.
pub trait ScreenCapture {
    fn capture_window(&mut self) -> ScenefitResult<Frame>;

    /// Pixel rect of the graph canvas inside the frame, if the capture layer
    /// knows it. Used to estimate which model nodes should be on screen.
    fn canvas_rect(&self, frame: &Frame) -> Option<Rect>;
}

/// Visual detector collaborator: turns a frame into titled bounding boxes.
/// Bounding boxes are anchored at the top-left corner, matching the graph
/// model's position convention.
pub trait ElementDetector {
    fn detect_elements(&mut self, frame: &Frame) -> ScenefitResult<Vec<Detection>>;
}
