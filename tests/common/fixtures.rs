use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use shapescan::detection::contours::{ContourExtractor, ImageprocExtractor, TracedContour};
use shapescan::{DetectionSession, DetectionSettings, Frame, RuntimeGate, SettingsStore, VisionError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Black RGB canvas with white filled rectangles given as (x, y, width, height)
pub fn canvas_with_rects(width: u32, height: u32, rects: &[(i32, i32, u32, u32)]) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    for &(x, y, w, h) in rects {
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), WHITE);
    }
    img
}

pub fn frame_with_rects(width: u32, height: u32, rects: &[(i32, i32, u32, u32)]) -> Frame {
    Frame::new(DynamicImage::ImageRgb8(canvas_with_rects(width, height, rects)))
        .expect("Failed to build test frame")
}

/// Saves an image to a temporary PNG that is removed when dropped
pub fn save_temp_png(img: &RgbImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

pub fn ready_session() -> DetectionSession {
    DetectionSession::new(RuntimeGate::ready(), SettingsStore::default())
}

pub fn session_with(settings: DetectionSettings) -> DetectionSession {
    let store = SettingsStore::new(settings).expect("Invalid test settings");
    DetectionSession::new(RuntimeGate::ready(), store)
}

/// Extractor that always faults, forcing the demo fallback
pub struct FailingExtractor;

impl ContourExtractor for FailingExtractor {
    fn extract(&self, _mask: &GrayImage) -> Result<Vec<TracedContour>, VisionError> {
        Err(VisionError::ContourExtraction("simulated fault".to_string()))
    }
}

/// Real extraction that takes at least `delay` and records peak concurrency
pub struct SlowExtractor {
    pub delay: Duration,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl SlowExtractor {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

impl ContourExtractor for SlowExtractor {
    fn extract(&self, mask: &GrayImage) -> Result<Vec<TracedContour>, VisionError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        std::thread::sleep(self.delay);
        let contours = ImageprocExtractor.extract(mask);

        self.active.fetch_sub(1, Ordering::SeqCst);
        contours
    }
}
