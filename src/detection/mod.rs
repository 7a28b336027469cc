pub mod preprocessing;
pub mod contours;
pub mod classifier;

use crate::config::ContourParams;
use crate::error::{Result, VisionError};
use crate::frame::Frame;
use crate::models::{BoundingBox, Region};
use contours::{ContourExtractor, ImageprocExtractor};
use image::DynamicImage;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Regions found in one frame
#[derive(Debug, Clone)]
pub struct RegionSet {
    pub regions: Vec<Region>,
    /// Extraction failed and the regions are placeholders
    pub synthetic: bool,
}

/// Frame → grayscale → binary mask → contours → area-filtered regions
#[derive(Clone)]
pub struct ContourDetector {
    params: ContourParams,
    extractor: Arc<dyn ContourExtractor>,
    debug: Option<DebugDump>,
}

impl ContourDetector {
    pub fn new(params: ContourParams) -> Self {
        Self {
            params,
            extractor: Arc::new(ImageprocExtractor),
            debug: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContourExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_debug(mut self, debug: Option<DebugDump>) -> Self {
        self.debug = debug;
        self
    }

    pub fn params(&self) -> &ContourParams {
        &self.params
    }

    /// Detect regions in `frame`.
    ///
    /// Never fails: an extraction fault falls back to synthesized regions.
    pub fn detect(&self, frame: &Frame) -> RegionSet {
        self.detect_with_rng(frame, &mut rand::thread_rng())
    }

    pub fn detect_with_rng<R: Rng + ?Sized>(&self, frame: &Frame, rng: &mut R) -> RegionSet {
        let gray = preprocessing::to_grayscale(frame.image());
        let mask = preprocessing::binarize(&gray, self.params.threshold);

        if let Some(dump) = &self.debug {
            dump.save("00_input", frame.image());
            dump.save("01_grayscale", &DynamicImage::ImageLuma8(gray));
            dump.save("02_binary", &DynamicImage::ImageLuma8(mask.clone()));
        }

        match contours::find_regions(self.extractor.as_ref(), &mask, &self.params) {
            Ok(regions) => {
                debug!(
                    regions = regions.len(),
                    width = frame.width(),
                    height = frame.height(),
                    "Contour detection finished"
                );
                RegionSet {
                    regions,
                    synthetic: false,
                }
            }
            Err(err) => {
                warn!("Contour detection failed, using demo regions: {}", err);
                RegionSet {
                    regions: synthesize_regions(frame.width(), frame.height(), rng),
                    synthetic: true,
                }
            }
        }
    }
}

impl Default for ContourDetector {
    fn default() -> Self {
        Self::new(ContourParams::default())
    }
}

/// Generate 1-5 placeholder regions with plausible geometry inside the frame
pub fn synthesize_regions<R: Rng + ?Sized>(
    frame_width: u32,
    frame_height: u32,
    rng: &mut R,
) -> Vec<Region> {
    let count = rng.gen_range(1..=5);
    (0..count)
        .map(|index| {
            let width = rng.gen_range(50..150).min(frame_width);
            let height = rng.gen_range(50..150).min(frame_height);
            let x = rng.gen_range(0..=(frame_width - width).min(400));
            let y = rng.gen_range(0..=(frame_height - height).min(300));
            let bounding_box = BoundingBox {
                x,
                y,
                width,
                height,
            };
            let area = (width * height) as f64;

            Region {
                index,
                bounding_box,
                area,
                perimeter: 2.0 * (width + height) as f64,
                aspect_ratio: bounding_box.aspect_ratio(),
                synthetic: true,
            }
        })
        .collect()
}

/// Writes intermediate images of each detection into a directory
#[derive(Clone, Debug)]
pub struct DebugDump {
    output_dir: PathBuf,
}

impl DebugDump {
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(VisionError::Config(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    fn save(&self, stage: &str, img: &DynamicImage) {
        let path = self.output_dir.join(format!("{}.png", stage));
        match img.save(&path) {
            Ok(()) => debug!("Debug: saved {}", path.display()),
            Err(e) => warn!("Failed to save debug image {}: {}", path.display(), e),
        }
    }
}
