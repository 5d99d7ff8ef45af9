use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::camera::FacingMode;
use crate::error::CameraError;
use crate::geofence::{GeofenceResult, WorkSite};
use crate::metrics::SessionMetrics;

/// Cosmetic styling of the action button. Purely presentational; a closed
/// enum so exhaustiveness is checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionVariant {
    Default,
    Destructive,
    Success,
    Warning,
}

/// What the orchestrator passes in to run one attendance capture.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Text on the confirm button, e.g. "Clock In".
    pub action_label: String,
    pub action_variant: ActionVariant,
    /// Site the requester must be physically present at.
    pub site: WorkSite,
    /// Shown once verified, for operator reassurance in multi-subject flows.
    pub person_name: Option<String>,
}

/// The verified photo handed to the orchestrator on confirm.
///
/// Exists iff the session is `Captured` (it lives inside that variant);
/// retake discards it, confirm moves it out by value.
#[derive(Debug, Clone)]
pub struct CapturedArtifact {
    /// JPEG bytes, quality per [`crate::CaptureConfig::jpeg_quality`].
    pub image_jpeg: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    pub facing: FacingMode,
}

/// The session's state machine value. Owned exclusively by the
/// [`CaptureSession`](super::CaptureSession); no other component mutates it.
#[derive(Debug, Clone)]
pub enum CaptureState {
    AwaitingLocation,
    LocationDenied(GeofenceResult),
    /// Camera acquisition failed; the error carries the user-facing message.
    CameraUnavailable(CameraError),
    Scanning { dwell: u32 },
    /// Threshold reached; the terminal frame is being encoded.
    Detecting,
    Captured(CapturedArtifact),
    Submitting,
    Cancelled,
}

impl CaptureState {
    pub fn stage(&self) -> Stage {
        match self {
            CaptureState::AwaitingLocation => Stage::AwaitingLocation,
            CaptureState::LocationDenied(_) => Stage::LocationDenied,
            CaptureState::CameraUnavailable(_) => Stage::CameraUnavailable,
            CaptureState::Scanning { .. } => Stage::Scanning,
            CaptureState::Detecting => Stage::Detecting,
            CaptureState::Captured(_) => Stage::Captured,
            CaptureState::Submitting => Stage::Submitting,
            CaptureState::Cancelled => Stage::Cancelled,
        }
    }

    pub fn name(&self) -> &'static str {
        self.stage().name()
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Submitting | CaptureState::Cancelled)
    }
}

/// Flat, serializable discriminant of [`CaptureState`] for UI consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    AwaitingLocation,
    LocationDenied,
    CameraUnavailable,
    Scanning,
    Detecting,
    Captured,
    Submitting,
    Cancelled,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::AwaitingLocation => "awaiting location",
            Stage::LocationDenied => "location denied",
            Stage::CameraUnavailable => "camera unavailable",
            Stage::Scanning => "scanning",
            Stage::Detecting => "detecting",
            Stage::Captured => "captured",
            Stage::Submitting => "submitting",
            Stage::Cancelled => "cancelled",
        }
    }
}

/// UI-facing projection of the session, published on the watch channel after
/// every transition. Carries artifact metadata, never the blob itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub stage: Stage,
    pub action_label: String,
    pub action_variant: ActionVariant,
    /// Present only once the location gate has verified.
    pub person_name: Option<String>,
    pub facing: FacingMode,
    pub dwell: u32,
    pub dwell_threshold: u32,
    /// Guidance or remediation text for the current state, if any.
    pub guidance: Option<String>,
    /// Display text of the most recent geofence check.
    pub location: Option<String>,
    /// Animation counter for the scan indicator; cosmetic only.
    pub scan_cycle: u32,
    pub artifact_bytes: Option<usize>,
    pub captured_at: Option<DateTime<Utc>>,
    pub metrics: SessionMetrics,
}
