use crate::config::ClassifierRules;
use crate::models::Region;
use rand::Rng;

pub const SQUARE: &str = "square";
pub const RECTANGLE: &str = "rectangle";
pub const OBJECT: &str = "object";
pub const DEMO_OBJECT: &str = "demo-object";

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: &'static str,
    pub confidence: f32,
}

/// Rule-based shape labelling from bounding-box aspect ratio and contour area
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeClassifier {
    rules: ClassifierRules,
}

impl ShapeClassifier {
    pub fn new(rules: ClassifierRules) -> Self {
        Self { rules }
    }

    /// Label a genuine region; first matching rule wins
    pub fn classify(&self, region: &Region) -> Classification {
        let rules = &self.rules;
        let aspect = region.aspect_ratio;

        if (rules.square_min_aspect..=rules.square_max_aspect).contains(&aspect)
            && region.area > rules.square_min_area
        {
            Classification {
                label: SQUARE,
                confidence: rules.square_confidence,
            }
        } else if aspect > rules.rectangle_wide_aspect || aspect < rules.rectangle_tall_aspect {
            Classification {
                label: RECTANGLE,
                confidence: rules.rectangle_confidence,
            }
        } else {
            Classification {
                label: OBJECT,
                confidence: rules.fallback_confidence,
            }
        }
    }

    /// Placeholder label for a synthesized region, with a random confidence in `[0.5, 0.9)`
    pub fn classify_synthetic<R: Rng + ?Sized>(&self, rng: &mut R) -> Classification {
        Classification {
            label: DEMO_OBJECT,
            confidence: rng.gen_range(0.5..0.9),
        }
    }
}
