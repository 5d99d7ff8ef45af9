use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::dwell::DwellCounter;
use super::loop_worker::{detection_loop, progress_loop};
use super::state::{
    CaptureState, CapturedArtifact, SessionOptions, SessionSnapshot, Stage,
};
use crate::camera::{CameraDevice, CameraStream, FacingMode};
use crate::config::CaptureConfig;
use crate::error::SessionError;
use crate::geofence::{GeofenceResult, GeofenceValidator, LocationProvider};
use crate::metrics::SessionMetrics;
use crate::presence::{FramePresenceValidator, FrameRejection};

/// Immutable per-session identity, shared with the spawned loops.
pub(crate) struct SessionContext {
    pub(crate) id: String,
    pub(crate) options: SessionOptions,
}

/// Mutable state shared between the session and its loops. The session is
/// the only component with API access; the loops are the only other readers
/// and go through the same mutex.
pub(crate) struct SessionShared<S: CameraStream> {
    pub(crate) state: CaptureState,
    pub(crate) stream: Option<S>,
    pub(crate) dwell: DwellCounter,
    pub(crate) last_rejection: Option<FrameRejection>,
    pub(crate) last_geofence: Option<GeofenceResult>,
    pub(crate) scan_cycle: u32,
    pub(crate) facing: FacingMode,
    pub(crate) metrics: SessionMetrics,
}

struct LoopTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LoopTask {
    /// Cancel and join, so no loop callback can fire after this returns.
    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

/// One attendance capture, from location gate to confirmed photo.
///
/// Owns the camera stream and the dwell counter exclusively; every exit path
/// (confirm, cancel, drop, switch, error) releases the stream. Construct one
/// per attendance action — geofence verification is never reused across
/// actions.
pub struct CaptureSession<C: CameraDevice, L: LocationProvider> {
    ctx: Arc<SessionContext>,
    config: CaptureConfig,
    camera: C,
    geofence: GeofenceValidator<L>,
    validator: Arc<dyn FramePresenceValidator>,
    shared: Arc<Mutex<SessionShared<C::Stream>>>,
    events: watch::Sender<SessionSnapshot>,
    detection: Option<LoopTask>,
    progress: Option<LoopTask>,
}

impl<C: CameraDevice, L: LocationProvider> CaptureSession<C, L> {
    pub fn new(
        options: SessionOptions,
        config: CaptureConfig,
        camera: C,
        locator: L,
        validator: Arc<dyn FramePresenceValidator>,
    ) -> Self {
        let ctx = Arc::new(SessionContext {
            id: Uuid::new_v4().to_string(),
            options,
        });
        let geofence = GeofenceValidator::new(locator, config.location_timeout());
        let shared = SessionShared {
            state: CaptureState::AwaitingLocation,
            stream: None,
            dwell: DwellCounter::new(config.dwell_threshold),
            last_rejection: None,
            last_geofence: None,
            scan_cycle: 0,
            facing: FacingMode::Front,
            metrics: SessionMetrics::default(),
        };
        let (events, _) = watch::channel(build_snapshot(&ctx, &shared));

        Self {
            ctx,
            config,
            camera,
            geofence,
            validator,
            shared: Arc::new(Mutex::new(shared)),
            events,
            detection: None,
            progress: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.ctx.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.ctx.options
    }

    /// Receiver for state snapshots; one is published after every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.events.borrow().clone()
    }

    pub async fn stage(&self) -> Stage {
        self.shared.lock().await.state.stage()
    }

    pub async fn metrics(&self) -> SessionMetrics {
        self.shared.lock().await.metrics.clone()
    }

    /// Run the location gate and, only if it verifies, start the camera and
    /// the detection loop. The camera is never live for an unverified user.
    pub async fn start(&mut self, facing: FacingMode) -> Result<Stage, SessionError> {
        {
            let mut guard = self.shared.lock().await;
            match guard.state {
                CaptureState::AwaitingLocation => {}
                ref other => {
                    return Err(SessionError::InvalidState {
                        op: "start",
                        state: other.name(),
                    })
                }
            }
            guard.facing = facing;
        }
        self.run_location_gate().await
    }

    /// Re-run coordinate acquisition after the user fixed whatever denied it.
    pub async fn retry_location(&mut self) -> Result<Stage, SessionError> {
        {
            let mut guard = self.shared.lock().await;
            match guard.state {
                CaptureState::LocationDenied(_) => {}
                ref other => {
                    return Err(SessionError::InvalidState {
                        op: "retry location",
                        state: other.name(),
                    })
                }
            }
            guard.state = CaptureState::AwaitingLocation;
            publish(&self.ctx, &guard, &self.events);
        }
        self.run_location_gate().await
    }

    /// Re-attempt camera acquisition after a failure.
    pub async fn retry_camera(&mut self) -> Result<Stage, SessionError> {
        {
            let guard = self.shared.lock().await;
            match guard.state {
                CaptureState::CameraUnavailable(_) => {}
                ref other => {
                    return Err(SessionError::InvalidState {
                        op: "retry camera",
                        state: other.name(),
                    })
                }
            }
        }
        self.begin_scanning().await
    }

    /// Toggle front/rear. Quiesces the old detection loop and stops the old
    /// stream before acquiring the new one; accumulated dwell progress does
    /// not survive a camera switch.
    pub async fn switch_facing(&mut self) -> Result<Stage, SessionError> {
        {
            let guard = self.shared.lock().await;
            match guard.state {
                CaptureState::Scanning { .. } | CaptureState::CameraUnavailable(_) => {}
                ref other => {
                    return Err(SessionError::InvalidState {
                        op: "switch facing",
                        state: other.name(),
                    })
                }
            }
        }
        self.quiesce_detection().await;
        {
            let mut guard = self.shared.lock().await;
            // A capture that landed while we were quiescing wins the race;
            // the frozen review screen stays up.
            if matches!(guard.state, CaptureState::Captured(_)) {
                return Ok(Stage::Captured);
            }
            let next = guard.facing.toggled();
            guard.facing = next;
            guard.dwell.reset();
        }
        self.begin_scanning().await
    }

    /// Discard the captured artifact and scan again. Resumes on the existing
    /// stream when it is still live, otherwise re-acquires the camera.
    pub async fn retake(&mut self) -> Result<Stage, SessionError> {
        self.quiesce_detection().await;
        let resume_on_live_stream = {
            let mut guard = self.shared.lock().await;
            match guard.state {
                CaptureState::Captured(_) => {}
                ref other => {
                    return Err(SessionError::InvalidState {
                        op: "retake",
                        state: other.name(),
                    })
                }
            }
            // Drop the artifact now; a new one can only exist after a fresh
            // threshold run.
            guard.state = CaptureState::Scanning { dwell: 0 };
            guard.dwell.reset();
            guard.last_rejection = None;
            let live = guard.stream.as_ref().map(CameraStream::is_live).unwrap_or(false);
            if live {
                publish(&self.ctx, &guard, &self.events);
            }
            live
        };

        if resume_on_live_stream {
            self.spawn_loops();
            Ok(Stage::Scanning)
        } else {
            info!("stream lost during review; re-acquiring camera");
            self.begin_scanning().await
        }
    }

    /// Hand the artifact to the caller by value. The only normal exit that
    /// yields a usable result; the camera is released before returning.
    pub async fn confirm(&mut self) -> Result<CapturedArtifact, SessionError> {
        self.quiesce_detection().await;
        let artifact = {
            let mut guard = self.shared.lock().await;
            let prev = std::mem::replace(&mut guard.state, CaptureState::Submitting);
            let artifact = match prev {
                CaptureState::Captured(artifact) => artifact,
                other => {
                    let state = other.name();
                    guard.state = other;
                    return Err(SessionError::InvalidState {
                        op: "confirm",
                        state,
                    });
                }
            };
            if let Some(mut stream) = guard.stream.take() {
                stream.stop();
            }
            info!(
                "capture confirmed for '{}' ({} bytes)",
                self.ctx.options.action_label,
                artifact.image_jpeg.len()
            );
            publish(&self.ctx, &guard, &self.events);
            artifact
        };
        self.stop_progress().await;
        Ok(artifact)
    }

    /// Tear the session down: stop both loops, release the camera, discard
    /// any artifact. Safe and idempotent from every state; when this
    /// returns, no validator or encoder callback can fire.
    pub async fn cancel(&mut self) {
        self.quiesce_detection().await;
        self.stop_progress().await;

        let mut guard = self.shared.lock().await;
        if let Some(mut stream) = guard.stream.take() {
            stream.stop();
        }
        if !guard.state.is_terminal() {
            info!("session cancelled while {}", guard.state.name());
            guard.state = CaptureState::Cancelled;
            publish(&self.ctx, &guard, &self.events);
        }
    }

    async fn run_location_gate(&mut self) -> Result<Stage, SessionError> {
        info!("verifying presence at site '{}'", self.ctx.options.site.id);
        let result = self.geofence.check_presence(&self.ctx.options.site).await;
        {
            let mut guard = self.shared.lock().await;
            guard.last_geofence = Some(result.clone());
            if !result.is_verified() {
                info!("location gate failed: {result}");
                guard.state = CaptureState::LocationDenied(result);
                publish(&self.ctx, &guard, &self.events);
                return Ok(Stage::LocationDenied);
            }
        }
        // Verified; only now may the camera start.
        self.begin_scanning().await
    }

    /// Stop any previous stream, acquire one for the current facing mode and
    /// enter `Scanning` with fresh loops. On acquisition failure the session
    /// presents the error and schedules nothing.
    async fn begin_scanning(&mut self) -> Result<Stage, SessionError> {
        self.quiesce_detection().await;

        let facing = {
            let mut guard = self.shared.lock().await;
            if let Some(mut old) = guard.stream.take() {
                old.stop();
            }
            guard.facing
        };

        match self.camera.open(facing).await {
            Ok(stream) => {
                {
                    let mut guard = self.shared.lock().await;
                    guard.stream = Some(stream);
                    guard.dwell.reset();
                    guard.last_rejection = None;
                    guard.state = CaptureState::Scanning { dwell: 0 };
                    if guard.metrics.scanning_started_at.is_none() {
                        guard.metrics.scanning_started_at = Some(Utc::now());
                    }
                    publish(&self.ctx, &guard, &self.events);
                }
                self.spawn_loops();
                Ok(Stage::Scanning)
            }
            Err(err) => {
                warn!("camera acquisition failed: {err}");
                let mut guard = self.shared.lock().await;
                guard.state = CaptureState::CameraUnavailable(err);
                publish(&self.ctx, &guard, &self.events);
                Ok(Stage::CameraUnavailable)
            }
        }
    }

    fn spawn_loops(&mut self) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(detection_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.validator),
            self.config.clone(),
            Arc::clone(&self.ctx),
            self.events.clone(),
            cancel.clone(),
        ));
        self.detection = Some(LoopTask { cancel, handle });

        if self.progress.is_none() {
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(progress_loop(
                Arc::clone(&self.shared),
                Arc::clone(&self.ctx),
                self.events.clone(),
                cancel.clone(),
                self.config.progress_tick(),
            ));
            self.progress = Some(LoopTask { cancel, handle });
        }
    }

    /// Cancel-and-join the detection loop so the old timer is fully quiet
    /// before state moves on. Two detection loops must never overlap.
    async fn quiesce_detection(&mut self) {
        if let Some(task) = self.detection.take() {
            task.stop().await;
        }
    }

    async fn stop_progress(&mut self) {
        if let Some(task) = self.progress.take() {
            task.stop().await;
        }
    }
}

impl<C: CameraDevice, L: LocationProvider> Drop for CaptureSession<C, L> {
    fn drop(&mut self) {
        if let Some(task) = &self.detection {
            task.cancel.cancel();
        }
        if let Some(task) = &self.progress {
            task.cancel.cancel();
        }
        // Best-effort synchronous release; if a loop holds the lock right
        // now, the stream is released when the loop task drops its handle.
        if let Ok(mut guard) = self.shared.try_lock() {
            if let Some(mut stream) = guard.stream.take() {
                stream.stop();
            }
        }
    }
}

/// Project the shared state into the serializable snapshot the UI consumes.
pub(crate) fn build_snapshot<S: CameraStream>(
    ctx: &SessionContext,
    shared: &SessionShared<S>,
) -> SessionSnapshot {
    let verified = shared
        .last_geofence
        .as_ref()
        .map(GeofenceResult::is_verified)
        .unwrap_or(false);

    let guidance = match &shared.state {
        CaptureState::LocationDenied(result) => Some(result.to_string()),
        CaptureState::CameraUnavailable(err) => Some(err.to_string()),
        CaptureState::Scanning { .. } => {
            shared.last_rejection.map(|r| r.guidance().to_string())
        }
        _ => None,
    };

    let (artifact_bytes, captured_at) = match &shared.state {
        CaptureState::Captured(artifact) => {
            (Some(artifact.image_jpeg.len()), Some(artifact.captured_at))
        }
        _ => (None, None),
    };

    SessionSnapshot {
        session_id: ctx.id.clone(),
        stage: shared.state.stage(),
        action_label: ctx.options.action_label.clone(),
        action_variant: ctx.options.action_variant,
        person_name: if verified {
            ctx.options.person_name.clone()
        } else {
            None
        },
        facing: shared.facing,
        dwell: shared.dwell.count(),
        dwell_threshold: shared.dwell.threshold(),
        guidance,
        location: shared.last_geofence.as_ref().map(|r| r.to_string()),
        scan_cycle: shared.scan_cycle,
        artifact_bytes,
        captured_at,
        metrics: shared.metrics.clone(),
    }
}

pub(crate) fn publish<S: CameraStream>(
    ctx: &SessionContext,
    shared: &SessionShared<S>,
    events: &watch::Sender<SessionSnapshot>,
) {
    events.send_replace(build_snapshot(ctx, shared));
}
