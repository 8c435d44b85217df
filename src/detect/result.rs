use serde::{Deserialize, Serialize};

/// Label reported for class ids outside the label set.
pub const UNKNOWN_CLASS_NAME: &str = "unknown";

/// One detected object.
///
/// Box coordinates are in pixels of the image passed to `detect`, with
/// `(x, y)` the top-left corner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectionResult {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn intersection_area(&self, other: &DetectionResult) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0.0;
        }
        (right - left) * (bottom - top)
    }

    pub fn iou(&self, other: &DetectionResult) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}
