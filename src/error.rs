use thiserror::Error;

/// Failure to acquire a device coordinate.
///
/// Every variant is recoverable: the UI keeps a "Retry" affordance and the
/// session re-runs the location gate on demand.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied — enable location services and retry")]
    PermissionDenied,
    #[error("current position unavailable — retry in a moment")]
    PositionUnavailable,
    #[error("timed out waiting for a position fix — retry")]
    Timeout,
}

/// Failure to acquire or read a camera stream.
///
/// A verified photo is a policy requirement, so there is no "skip photo"
/// fallback; acquisition failures block the session until retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied — allow camera access to continue")]
    PermissionDenied,
    #[error("no camera device available")]
    NoDevice,
    #[error("camera stream failed: {0}")]
    StreamFailed(String),
}

/// API-level session errors. Flow outcomes (denied location, failed camera
/// acquisition) are states, not errors; this type only covers calling an
/// operation from a state that does not permit it, plus passthroughs.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{op} is not valid while the session is {state}")]
    InvalidState {
        op: &'static str,
        state: &'static str,
    },
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Location(#[from] LocationError),
}
