use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Anchor point of the rectangle. Always the top-left corner, to match
    /// the program-coordinate convention of the graph model bit-for-bit;
    /// using the center instead would silently bias every estimate.
    pub fn top_left(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }
}

/// One visually detected element: extracted title text plus the pixel
/// bounding box it was found at.
///
/// Detections are produced fresh per capture and carry no identity across
/// frames; correspondence to model nodes is re-derived on every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub title: String,
    pub bbox: Rect,
    pub confidence: f32,
}

impl Detection {
    pub fn new(title: impl Into<String>, bbox: Rect) -> Self {
        Self {
            title: title.into(),
            bbox,
            confidence: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub physical_width: u32,
    pub physical_height: u32,
    pub scale_factor: f64,
}

/// A captured window frame handed to the detector.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: image::RgbaImage,
    pub meta: FrameMeta,
}

impl Frame {
    pub fn new(image: image::RgbaImage, scale_factor: f64) -> Self {
        let meta = FrameMeta {
            physical_width: image.width(),
            physical_height: image.height(),
            scale_factor,
        };
        Self { image, meta }
    }
}
