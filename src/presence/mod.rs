//! Per-frame presence validation: does this frame show a single,
//! adequately-lit, adequately-sized, unobstructed human face?
//!
//! This is a liveness/presence heuristic, not identity matching. The
//! validator is a pure function of its input so it can be unit-tested with
//! fixture frames, and it reports one rejection at a time in a fixed
//! priority order so repeated guidance stays stable for the user.

pub mod heuristic;
mod region;

pub use heuristic::{HeuristicConfig, HeuristicPresenceValidator};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::camera::Frame;

/// Why a frame was rejected. `Display` is the user-facing guidance string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameRejection {
    NoFace,
    MultipleFaces,
    TooFar,
    TooClose,
    TooDark,
    TooBright,
    FaceObstructed,
    /// The dwell run showed no perceptual change at all — a printed photo or
    /// frozen feed. Raised by the capture loop, not by per-frame validation.
    StaticScene,
}

impl FrameRejection {
    pub fn guidance(self) -> &'static str {
        match self {
            FrameRejection::NoFace => "Position your face in the oval",
            FrameRejection::MultipleFaces => "Only one person allowed in frame",
            FrameRejection::TooFar => "Move closer",
            FrameRejection::TooClose => "Move back",
            FrameRejection::TooDark => "Too dark — adjust lighting",
            FrameRejection::TooBright => "Too bright — adjust lighting",
            FrameRejection::FaceObstructed => "No mask or hat allowed",
            FrameRejection::StaticScene => "Camera feed looks frozen — move slightly",
        }
    }

    /// Stable key for per-reason counters.
    pub fn key(self) -> &'static str {
        match self {
            FrameRejection::NoFace => "noFace",
            FrameRejection::MultipleFaces => "multipleFaces",
            FrameRejection::TooFar => "tooFar",
            FrameRejection::TooClose => "tooClose",
            FrameRejection::TooDark => "tooDark",
            FrameRejection::TooBright => "tooBright",
            FrameRejection::FaceObstructed => "faceObstructed",
            FrameRejection::StaticScene => "staticScene",
        }
    }
}

impl fmt::Display for FrameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.guidance())
    }
}

/// Verdict for one frame. At most one rejection reason at a time: the first
/// failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameValidation {
    pub is_valid: bool,
    pub rejection: Option<FrameRejection>,
}

impl FrameValidation {
    pub fn pass() -> Self {
        Self {
            is_valid: true,
            rejection: None,
        }
    }

    pub fn fail(rejection: FrameRejection) -> Self {
        Self {
            is_valid: false,
            rejection: Some(rejection),
        }
    }
}

/// Pluggable per-frame presence check.
///
/// Contract: deterministic, side-effect-free, and bounded — it must return
/// well before the next poll tick. The capture loop skips ticks rather than
/// queueing them if an implementation overruns.
pub trait FramePresenceValidator: Send + Sync {
    fn validate(&self, frame: &Frame) -> FrameValidation;
}
