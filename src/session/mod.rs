//! The capture session: camera lifecycle, dwell-driven auto-capture, and the
//! human confirm/retake step.

pub mod controller;
pub mod dwell;
mod encode;
mod loop_worker;
pub mod state;

pub use controller::CaptureSession;
pub use dwell::{DwellCounter, DwellProgress};
pub use state::{
    ActionVariant, CaptureState, CapturedArtifact, SessionOptions, SessionSnapshot, Stage,
};
