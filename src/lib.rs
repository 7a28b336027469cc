pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod models;
pub mod runtime;
pub mod session;

pub use config::{DetectionSettings, SettingsStore, VisionProvider};
pub use detection::ContourDetector;
pub use detection::classifier::ShapeClassifier;
pub use error::VisionError;
pub use frame::{Frame, FrameSource, LatestFrameSlot, SnapshotFileSource, StillImageSource};
pub use models::{BoundingBox, DetectedObject, DetectionResult, ObjectKind, Region};
pub use runtime::{BuiltinBackend, GatePolicy, RuntimeGate, RuntimeStatus};
pub use session::{CancelToken, DetectionSession, PeriodicHandle, TickOutcome, TickReport};
