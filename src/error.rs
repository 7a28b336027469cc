use thiserror::Error;

/// Errors surfaced by the detection library.
///
/// Contour extraction faults are recovered inside the detector and never
/// reach a session caller; they only appear here so extractors can report them.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("vision runtime is not ready")]
    LibraryNotReady,

    #[error("vision runtime did not load after {attempts} attempts")]
    LibraryLoadTimeout { attempts: u32 },

    #[error("no frame available")]
    NoFrameAvailable,

    #[error("contour extraction failed: {0}")]
    ContourExtraction(String),

    #[error("a detection run is already in flight on this session")]
    Busy,

    #[error("camera is disabled in settings")]
    CameraDisabled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to decode image {path}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("detection worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;
