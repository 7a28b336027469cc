use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Axis-aligned bounding box in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Build the inclusive box spanning `min..=max` on both axes
    pub fn from_extremes(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    /// True when the box lies entirely inside a `width` x `height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Geometric features of one surviving contour
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Position in contour traversal order (or in the synthesized list)
    pub index: usize,
    pub bounding_box: BoundingBox,
    pub area: f64,
    pub perimeter: f64,
    pub aspect_ratio: f64,
    /// Placeholder geometry produced when real extraction failed
    pub synthetic: bool,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.bounding_box.width
    }

    pub fn height(&self) -> u32 {
        self.bounding_box.height
    }

    /// Area rounded to whole pixels, as reported on detected objects
    pub fn rounded_area(&self) -> u32 {
        self.area.round().max(0.0) as u32
    }
}

/// Where a detected object came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Contour,
    Demo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub id: String,
    pub label: String,
    /// Fraction in `[0, 1]`; render with [`DetectedObject::confidence_percent`]
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<u32>,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
}

impl DetectedObject {
    /// Confidence as a percentage string with `decimals` fractional digits
    pub fn confidence_percent(&self, decimals: usize) -> String {
        format!("{:.*}%", decimals, self.confidence as f64 * 100.0)
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind == ObjectKind::Demo
    }
}

/// Outcome of one detection call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub objects: Vec<DetectedObject>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub processing_time_ms: f64,
    pub total_objects: usize,
    /// Set when contour extraction failed and demo regions were synthesized
    #[serde(default)]
    pub synthetic: bool,
}

impl DetectionResult {
    pub fn new(
        objects: Vec<DetectedObject>,
        timestamp: OffsetDateTime,
        processing_time_ms: f64,
        synthetic: bool,
    ) -> Self {
        let total_objects = objects.len();
        Self {
            objects,
            timestamp,
            processing_time_ms,
            total_objects,
            synthetic,
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
