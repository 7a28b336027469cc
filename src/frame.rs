//! Frame acquisition.
//!
//! The detector only needs a [`Frame`]; where it comes from is behind
//! [`FrameSource`]. Camera lifecycle stays with the caller: a capture loop
//! publishes into a [`LatestFrameSlot`] and detection reads the newest frame.

use crate::config::FrameSize;
use crate::error::{Result, VisionError};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbaImage};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable decoded image with non-zero dimensions
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<DynamicImage>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::NoFrameAvailable);
        }
        Ok(Self {
            image: Arc::new(image),
        })
    }

    /// Wrap a raw RGBA buffer as delivered by most camera APIs
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let buffer = RgbaImage::from_raw(width, height, pixels)
            .ok_or(VisionError::NoFrameAvailable)?;
        Self::new(DynamicImage::ImageRgba8(buffer))
    }

    /// Decode an image file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|source| VisionError::Decode {
                path: path.display().to_string(),
                source,
            })?;
        Self::new(image)
    }

    /// Resample to `size`, ignoring aspect ratio like a canvas draw would
    pub fn resized(&self, size: FrameSize) -> Result<Self> {
        if self.width() == size.width && self.height() == size.height {
            return Ok(self.clone());
        }
        Self::new(self.image.resize_exact(size.width, size.height, FilterType::Triangle))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Supplier of the frame to analyse next
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Result<Frame>;

    /// Drop whatever the source holds; called when a periodic loop stops
    fn release(&self) {}
}

/// A single decoded still image
pub struct StillImageSource {
    frame: Frame,
}

impl StillImageSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn open(path: impl AsRef<Path>, size: Option<FrameSize>) -> Result<Self> {
        let frame = Frame::open(path)?;
        let frame = match size {
            Some(size) => frame.resized(size)?,
            None => frame,
        };
        Ok(Self { frame })
    }
}

impl FrameSource for StillImageSource {
    fn current_frame(&self) -> Result<Frame> {
        Ok(self.frame.clone())
    }
}

/// Re-reads an image file on every request, e.g. snapshots written by a grabber
pub struct SnapshotFileSource {
    path: PathBuf,
    size: Option<FrameSize>,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: FrameSize) -> Self {
        self.size = Some(size);
        self
    }
}

impl FrameSource for SnapshotFileSource {
    fn current_frame(&self) -> Result<Frame> {
        if !self.path.exists() {
            return Err(VisionError::NoFrameAvailable);
        }
        let frame = Frame::open(&self.path)?;
        match self.size {
            Some(size) => frame.resized(size),
            None => Ok(frame),
        }
    }
}

/// Holds the newest frame published by a live feed
#[derive(Default)]
pub struct LatestFrameSlot {
    latest: Mutex<Option<Frame>>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame with a newer one
    pub fn publish(&self, frame: Frame) {
        *self.latest.lock() = Some(frame);
    }

    pub fn has_frame(&self) -> bool {
        self.latest.lock().is_some()
    }
}

impl FrameSource for LatestFrameSlot {
    fn current_frame(&self) -> Result<Frame> {
        self.latest.lock().clone().ok_or(VisionError::NoFrameAvailable)
    }

    fn release(&self) {
        self.latest.lock().take();
    }
}
