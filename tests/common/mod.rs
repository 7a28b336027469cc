#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from shapescan for tests
pub use shapescan::{
    BoundingBox, DetectedObject, DetectionResult, DetectionSession, DetectionSettings, Frame,
    FrameSource, LatestFrameSlot, ObjectKind, RuntimeGate, SettingsStore, TickOutcome,
    VisionError,
};
