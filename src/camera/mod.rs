//! Camera seam: device acquisition and live frame access.
//!
//! The session never talks to hardware directly; it drives a
//! [`CameraDevice`] implementation, which keeps the state machine testable
//! against simulated devices (see [`crate::sim`]).

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::CameraError;

/// Front- vs rear-facing camera selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    Front,
    Rear,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Front => FacingMode::Rear,
            FacingMode::Rear => FacingMode::Front,
        }
    }
}

/// A single bitmap sampled from the live stream. Transient: frames are
/// validated and dropped; only the final encoded artifact survives.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub grabbed_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            grabbed_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Camera hardware seam.
#[allow(async_fn_in_trait)]
pub trait CameraDevice: Send + Sync {
    type Stream: CameraStream + 'static;

    /// Acquire a stream for the given facing mode. Permission and hardware
    /// failures surface as [`CameraError`]; the caller decides whether to
    /// present a retry affordance.
    async fn open(&self, facing: FacingMode) -> Result<Self::Stream, CameraError>;
}

/// An open video stream.
///
/// `stop` must be idempotent, and implementations are expected to release
/// the underlying device on drop as well, so no exit path can leak it.
pub trait CameraStream: Send {
    /// Grab the most recent frame. Non-blocking: the stream produces frames
    /// continuously and this returns the latest one.
    fn grab(&mut self) -> Result<Frame, CameraError>;

    /// Release the underlying device. Safe to call more than once.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}
