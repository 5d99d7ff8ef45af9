//! Location gate: is the requester physically at a registered work site?

pub mod distance;
pub mod validator;

pub use distance::distance_m;
pub use validator::GeofenceValidator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LocationError;

/// Smallest radius a site may be registered with, in meters.
pub const MIN_SITE_RADIUS_M: f64 = 10.0;

/// A device-reported position. Produced by a [`LocationProvider`]; acquisition
/// failure is always an error, never a null coordinate treated as valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A registered work site: circular geofence around a center point.
/// Registered out-of-band; immutable for the duration of a capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSite {
    pub id: String,
    pub name: String,
    pub center: Coordinate,
    pub radius_m: f64,
}

impl WorkSite {
    /// Radii below [`MIN_SITE_RADIUS_M`] are clamped up; GPS jitter makes a
    /// tighter fence unusable in practice.
    pub fn new(id: impl Into<String>, name: impl Into<String>, center: Coordinate, radius_m: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            center,
            radius_m: radius_m.max(MIN_SITE_RADIUS_M),
        }
    }
}

/// Outcome of a presence check. Drives whether the camera may start at all.
#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceResult {
    /// Measured distance is within the site radius (inclusive).
    Verified { distance_m: f64 },
    /// Physically present somewhere else; carries the measured distance so
    /// the UI can show how far off the requester is.
    OutOfRange { distance_m: f64, radius_m: f64 },
    /// No usable coordinate; the reason maps to actionable UI text.
    Unavailable(LocationError),
}

impl GeofenceResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, GeofenceResult::Verified { .. })
    }
}

impl fmt::Display for GeofenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeofenceResult::Verified { distance_m } => {
                write!(f, "Within site range ({distance_m:.0} m from center)")
            }
            GeofenceResult::OutOfRange {
                distance_m,
                radius_m,
            } => write!(
                f,
                "You are {distance_m:.0} m away; must be within {radius_m:.0} m"
            ),
            GeofenceResult::Unavailable(err) => write!(f, "{err}"),
        }
    }
}

/// Device geolocation seam. Implementations must be genuinely async: the
/// validator wraps acquisition in a timeout, which cannot preempt a call
/// that blocks the thread.
#[allow(async_fn_in_trait)]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, LocationError>;
}
