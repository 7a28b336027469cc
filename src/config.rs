//! Detection settings.
//!
//! Settings are plain values: a session takes one [`Arc`] snapshot per run and
//! updates replace the whole value through [`SettingsStore::replace`].

use crate::error::{Result, VisionError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Vision provider selector.
///
/// Only the contour path is implemented; the other providers are accepted so
/// existing settings files load without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionProvider {
    #[default]
    Opencv,
    Tensorflow,
    Google,
    Roboflow,
    Clarifai,
}

/// Size used for frames when the source does not dictate one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Thresholding and area bounds for contour extraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContourParams {
    /// Global binarization threshold on the 0-255 luma scale
    pub threshold: u8,
    pub min_area: f64,
    pub max_area: f64,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            threshold: 127,
            min_area: 500.0,
            max_area: 50_000.0,
        }
    }
}

impl ContourParams {
    pub fn accepts_area(&self, area: f64) -> bool {
        area >= self.min_area && area <= self.max_area
    }
}

/// Calibration constants of the shape rules, evaluated in field order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifierRules {
    pub square_min_aspect: f64,
    pub square_max_aspect: f64,
    /// Squares must be strictly larger than this
    pub square_min_area: f64,
    pub square_confidence: f32,
    /// Wider than this counts as a rectangle
    pub rectangle_wide_aspect: f64,
    /// Taller than this (aspect below it) counts as a rectangle
    pub rectangle_tall_aspect: f64,
    pub rectangle_confidence: f32,
    pub fallback_confidence: f32,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            square_min_aspect: 0.8,
            square_max_aspect: 1.2,
            square_min_area: 1000.0,
            square_confidence: 0.8,
            rectangle_wide_aspect: 1.5,
            rectangle_tall_aspect: 0.6,
            rectangle_confidence: 0.7,
            fallback_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectionSettings {
    /// Objects below this confidence are dropped from results
    pub confidence_threshold: f32,
    pub vision_provider: VisionProvider,
    /// Model name for learned providers; unused by the contour path
    pub model_type: String,
    /// Labels to keep; empty keeps every label
    pub enabled_classes: Vec<String>,
    pub camera_enabled: bool,
    /// Target rate of periodic detection
    pub fps: u32,
    pub frame_size: FrameSize,
    pub contour: ContourParams,
    pub classifier: ClassifierRules,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.0,
            vision_provider: VisionProvider::default(),
            model_type: "yolov5".to_string(),
            enabled_classes: Vec::new(),
            camera_enabled: true,
            fps: 30,
            frame_size: FrameSize::default(),
            contour: ContourParams::default(),
            classifier: ClassifierRules::default(),
        }
    }
}

impl DetectionSettings {
    /// Load settings from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(VisionError::Config(
                "confidenceThreshold must be between 0 and 1".to_string(),
            ));
        }

        if self.fps == 0 || self.fps > 120 {
            return Err(VisionError::Config(
                "fps must be between 1 and 120".to_string(),
            ));
        }

        if self.frame_size.width == 0 || self.frame_size.height == 0 {
            return Err(VisionError::Config("frameSize must be non-zero".to_string()));
        }

        let contour = &self.contour;
        if contour.min_area < 0.0 || contour.min_area > contour.max_area {
            return Err(VisionError::Config(format!(
                "contour area bounds are inverted or negative: {}..={}",
                contour.min_area, contour.max_area
            )));
        }

        let rules = &self.classifier;
        if rules.square_min_aspect > rules.square_max_aspect {
            return Err(VisionError::Config(
                "squareMinAspect must not exceed squareMaxAspect".to_string(),
            ));
        }
        for confidence in [
            rules.square_confidence,
            rules.rectangle_confidence,
            rules.fallback_confidence,
        ] {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(VisionError::Config(
                    "classifier confidences must be between 0 and 1".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Tick period derived from `fps`
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.fps.max(1) as u64)
    }

    /// Whether objects with this label and confidence make it into a result
    pub fn keeps(&self, label: &str, confidence: f32) -> bool {
        let class_enabled = self.enabled_classes.is_empty()
            || self.enabled_classes.iter().any(|c| c == label);
        class_enabled && confidence >= self.confidence_threshold
    }
}

/// Shared holder of the current settings.
///
/// Readers get an immutable snapshot; writers swap the whole value.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    current: Arc<RwLock<Arc<DetectionSettings>>>,
}

impl SettingsStore {
    pub fn new(settings: DetectionSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        })
    }

    pub fn snapshot(&self) -> Arc<DetectionSettings> {
        self.current.read().clone()
    }

    /// Validate and install `settings`, returning the previous value
    pub fn replace(&self, settings: DetectionSettings) -> Result<Arc<DetectionSettings>> {
        settings.validate()?;
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(settings));
        Ok(previous)
    }
}
