//! Geofence-gated, presence-verified attendance photo capture.
//!
//! An attendance action (clock-in, clock-out, break) may only produce a
//! record once two gates pass: the device is inside the registered work
//! site's geofence, and a live, unobstructed human face has been
//! continuously present in front of the camera for an unbroken dwell run.
//! The pipeline then freezes the terminal frame for a human confirm/retake
//! step and hands the confirmed JPEG artifact back to the caller, which owns
//! persistence.
//!
//! Hardware is abstracted behind [`CameraDevice`] and [`LocationProvider`];
//! [`sim`] provides deterministic in-memory implementations, so the whole
//! state machine runs under plain `tokio` tests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use clockface::{
//!     ActionVariant, CaptureConfig, CaptureSession, Coordinate, FacingMode,
//!     HeuristicPresenceValidator, SessionOptions, WorkSite,
//! };
//! use clockface::sim::{frames, SimCamera, SimLocator};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let site = WorkSite::new("yard-1", "North Yard", Coordinate::new(40.44, -79.99), 75.0);
//! let options = SessionOptions {
//!     action_label: "Clock In".into(),
//!     action_variant: ActionVariant::Success,
//!     site,
//!     person_name: Some("J. Rivera".into()),
//! };
//! let mut session = CaptureSession::new(
//!     options,
//!     CaptureConfig::default(),
//!     SimCamera::cycling(vec![frames::face(), frames::face_shifted(36)]),
//!     SimLocator::fixed(Coordinate::new(40.44, -79.99)),
//!     Arc::new(HeuristicPresenceValidator::default()),
//! );
//! session.start(FacingMode::Front).await?;
//! let mut events = session.subscribe();
//! while events.changed().await.is_ok() {
//!     if events.borrow().stage == clockface::Stage::Captured {
//!         break;
//!     }
//! }
//! let artifact = session.confirm().await?;
//! # let _ = artifact;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod config;
pub mod error;
pub mod geofence;
pub mod metrics;
pub mod presence;
pub mod session;
pub mod sim;

pub use camera::{CameraDevice, CameraStream, FacingMode, Frame};
pub use config::CaptureConfig;
pub use error::{CameraError, LocationError, SessionError};
pub use geofence::{Coordinate, GeofenceResult, GeofenceValidator, LocationProvider, WorkSite};
pub use metrics::SessionMetrics;
pub use presence::{
    FramePresenceValidator, FrameRejection, FrameValidation, HeuristicConfig,
    HeuristicPresenceValidator,
};
pub use session::{
    ActionVariant, CaptureSession, CaptureState, CapturedArtifact, SessionOptions,
    SessionSnapshot, Stage,
};
