//! End-to-end session tests against simulated devices.

use std::sync::Arc;
use std::time::Duration;

use clockface::sim::{frames, ScriptedValidator, SimCamera, SimLocator};
use clockface::{
    ActionVariant, CameraError, CaptureConfig, CaptureSession, Coordinate, FacingMode,
    FramePresenceValidator, FrameRejection, FrameValidation, HeuristicPresenceValidator,
    LocationError, SessionError, SessionOptions, SessionSnapshot, Stage, WorkSite,
};
use tokio::sync::watch;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn center() -> Coordinate {
    Coordinate::new(40.4406, -79.9959)
}

/// Walk north from the site center by roughly `meters`.
fn north_of(meters: f64) -> Coordinate {
    let d_lat = (meters / 6_371_008.8).to_degrees();
    Coordinate::new(center().latitude + d_lat, center().longitude)
}

fn options() -> SessionOptions {
    SessionOptions {
        action_label: "Clock In".into(),
        action_variant: ActionVariant::Success,
        site: WorkSite::new("yard-1", "North Yard", center(), 50.0),
        person_name: Some("J. Rivera".into()),
    }
}

fn fast_config() -> CaptureConfig {
    CaptureConfig {
        tick_interval_ms: 5,
        progress_tick_ms: 3,
        location_timeout_secs: 1,
        ..CaptureConfig::default()
    }
}

fn always_valid() -> Arc<dyn FramePresenceValidator> {
    Arc::new(ScriptedValidator::then_valid(Vec::new()))
}

async fn wait_for_stage(events: &mut watch::Receiver<SessionSnapshot>, stage: Stage) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if events.borrow_and_update().stage == stage {
                return;
            }
            events.changed().await.expect("event channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for stage {stage:?}"));
}

#[tokio::test]
async fn happy_path_captures_and_confirms() {
    init_logs();
    let camera = SimCamera::cycling(vec![frames::face(), frames::face_shifted(36)]);
    let mut session = CaptureSession::new(
        options(),
        fast_config(),
        camera.clone(),
        SimLocator::fixed(center()),
        Arc::new(HeuristicPresenceValidator::default()),
    );

    let stage = session.start(FacingMode::Front).await.unwrap();
    assert_eq!(stage, Stage::Scanning);
    assert_eq!(camera.live_streams(), 1);
    // person name appears once the location gate verified
    assert_eq!(session.snapshot().person_name.as_deref(), Some("J. Rivera"));

    let mut events = session.subscribe();
    wait_for_stage(&mut events, Stage::Captured).await;

    let snapshot = session.snapshot();
    assert!(snapshot.artifact_bytes.unwrap() > 500);
    assert!(snapshot.captured_at.is_some());
    assert!(snapshot.scan_cycle > 0, "progress ticker never ran");
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"actionLabel\":\"Clock In\""));

    let artifact = session.confirm().await.unwrap();
    assert_eq!(&artifact.image_jpeg[..2], &[0xFF, 0xD8]);
    assert_eq!(artifact.facing, FacingMode::Front);
    assert_eq!(session.stage().await, Stage::Submitting);
    assert_eq!(camera.live_streams(), 0, "confirm must release the camera");
}

#[tokio::test]
async fn one_invalid_frame_discards_the_whole_run() {
    init_logs();
    // 9 valid, 1 invalid, then valid forever: capture fires at processed
    // tick 20, not tick 9.
    let mut steps = vec![FrameValidation::pass(); 9];
    steps.push(FrameValidation::fail(FrameRejection::NoFace));
    let validator = Arc::new(ScriptedValidator::then_valid(steps));

    let camera = SimCamera::cycling(vec![frames::face()]);
    let config = CaptureConfig {
        scene_motion_check: false,
        ..fast_config()
    };
    let mut session = CaptureSession::new(
        options(),
        config,
        camera,
        SimLocator::fixed(center()),
        validator,
    );

    session.start(FacingMode::Front).await.unwrap();
    let mut events = session.subscribe();
    wait_for_stage(&mut events, Stage::Captured).await;

    let metrics = session.metrics().await;
    assert_eq!(metrics.ticks, 20);
    assert_eq!(metrics.valid_frames, 19);
    assert_eq!(metrics.dwell_resets, 1);
    assert_eq!(metrics.rejections["noFace"], 1);
}

#[tokio::test]
async fn out_of_range_device_never_starts_the_camera() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let mut session = CaptureSession::new(
        options(),
        fast_config(),
        camera.clone(),
        SimLocator::fixed(north_of(51.0)),
        always_valid(),
    );

    let stage = session.start(FacingMode::Front).await.unwrap();
    assert_eq!(stage, Stage::LocationDenied);
    assert_eq!(camera.open_count(), 0, "camera must not start out of range");

    let snapshot = session.snapshot();
    let guidance = snapshot.guidance.unwrap();
    assert!(guidance.contains("51 m away"), "got {guidance:?}");
    assert!(guidance.contains("within 50 m"), "got {guidance:?}");
    assert!(snapshot.person_name.is_none());
    assert_eq!(session.metrics().await.ticks, 0);
}

#[tokio::test]
async fn location_retry_recovers_without_a_new_session() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let locator = SimLocator::script(vec![
        Err(LocationError::PermissionDenied),
        Ok(center()),
    ]);
    let mut session = CaptureSession::new(
        options(),
        fast_config(),
        camera.clone(),
        locator,
        always_valid(),
    );

    assert_eq!(
        session.start(FacingMode::Front).await.unwrap(),
        Stage::LocationDenied
    );
    let guidance = session.snapshot().guidance.unwrap();
    assert!(guidance.contains("permission"), "got {guidance:?}");

    assert_eq!(session.retry_location().await.unwrap(), Stage::Scanning);
    assert_eq!(camera.open_count(), 1);
    session.cancel().await;
}

#[tokio::test]
async fn camera_permission_denied_presents_error_without_scheduling_a_loop() {
    let camera = SimCamera::failing(CameraError::PermissionDenied);
    let mut session = CaptureSession::new(
        options(),
        fast_config(),
        camera.clone(),
        SimLocator::fixed(center()),
        always_valid(),
    );

    let stage = session.start(FacingMode::Front).await.unwrap();
    assert_eq!(stage, Stage::CameraUnavailable);
    let guidance = session.snapshot().guidance.unwrap();
    assert!(guidance.contains("permission denied"), "got {guidance:?}");

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(session.metrics().await.ticks, 0, "no dwell loop may run");

    session.cancel().await;
    assert_eq!(session.stage().await, Stage::Cancelled);
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn switch_facing_resets_dwell_and_swaps_the_stream() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let config = CaptureConfig {
        dwell_threshold: 100_000,
        scene_motion_check: false,
        ..fast_config()
    };
    let mut session = CaptureSession::new(
        options(),
        config,
        camera.clone(),
        SimLocator::fixed(center()),
        always_valid(),
    );

    session.start(FacingMode::Front).await.unwrap();
    let mut events = session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if events.borrow_and_update().dwell >= 3 {
                return;
            }
            events.changed().await.unwrap();
        }
    })
    .await
    .expect("dwell never accumulated");

    assert_eq!(session.switch_facing().await.unwrap(), Stage::Scanning);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.dwell, 0, "switching cameras must reset dwell");
    assert_eq!(snapshot.facing, FacingMode::Rear);
    assert_eq!(camera.open_count(), 2);
    assert_eq!(camera.live_streams(), 1, "old stream must be stopped first");

    session.cancel().await;
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn retake_discards_the_artifact_and_recaptures() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let config = CaptureConfig {
        dwell_threshold: 3,
        scene_motion_check: false,
        ..fast_config()
    };
    let mut session = CaptureSession::new(
        options(),
        config,
        camera.clone(),
        SimLocator::fixed(center()),
        always_valid(),
    );

    session.start(FacingMode::Front).await.unwrap();
    let mut events = session.subscribe();
    wait_for_stage(&mut events, Stage::Captured).await;
    assert!(session.snapshot().artifact_bytes.is_some());

    // capture keeps the stream live for review, so retake resumes on it
    assert_eq!(camera.live_streams(), 1);
    assert_eq!(session.retake().await.unwrap(), Stage::Scanning);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.dwell, 0);
    assert!(snapshot.artifact_bytes.is_none(), "retake must discard");
    assert_eq!(camera.open_count(), 1, "live stream is reused");

    wait_for_stage(&mut events, Stage::Captured).await;
    let artifact = session.confirm().await.unwrap();
    assert!(!artifact.image_jpeg.is_empty());
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn cancel_is_idempotent_and_releases_the_stream() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let config = CaptureConfig {
        dwell_threshold: 100_000,
        ..fast_config()
    };
    let mut session = CaptureSession::new(
        options(),
        config,
        camera.clone(),
        SimLocator::fixed(center()),
        always_valid(),
    );

    session.start(FacingMode::Front).await.unwrap();
    assert_eq!(camera.live_streams(), 1);

    session.cancel().await;
    assert_eq!(session.stage().await, Stage::Cancelled);
    assert_eq!(camera.live_streams(), 0);

    session.cancel().await;
    assert_eq!(session.stage().await, Stage::Cancelled);
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn cancel_during_review_discards_the_artifact() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let config = CaptureConfig {
        dwell_threshold: 2,
        scene_motion_check: false,
        ..fast_config()
    };
    let mut session = CaptureSession::new(
        options(),
        config,
        camera.clone(),
        SimLocator::fixed(center()),
        always_valid(),
    );

    session.start(FacingMode::Front).await.unwrap();
    let mut events = session.subscribe();
    wait_for_stage(&mut events, Stage::Captured).await;

    session.cancel().await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.stage, Stage::Cancelled);
    assert!(snapshot.artifact_bytes.is_none());
    assert_eq!(camera.live_streams(), 0);

    // the artifact is gone for good
    assert!(matches!(
        session.confirm().await,
        Err(SessionError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn static_scene_never_captures() {
    init_logs();
    // Identical frames every tick: the dwell threshold keeps being reached
    // and keeps being discarded by the scene-motion gate.
    let camera = SimCamera::cycling(vec![frames::face()]);
    let config = CaptureConfig {
        dwell_threshold: 3,
        tick_interval_ms: 3,
        ..fast_config()
    };
    let mut session = CaptureSession::new(
        options(),
        config,
        camera,
        SimLocator::fixed(center()),
        Arc::new(HeuristicPresenceValidator::default()),
    );

    session.start(FacingMode::Front).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(session.stage().await, Stage::Scanning);
    let metrics = session.metrics().await;
    assert!(metrics.rejections["staticScene"] >= 1);
    assert!(metrics.dwell_resets >= 1);
    session.cancel().await;
}

#[tokio::test]
async fn dropping_the_session_releases_the_stream() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let config = CaptureConfig {
        dwell_threshold: 100_000,
        ..fast_config()
    };
    let mut session = CaptureSession::new(
        options(),
        config,
        camera.clone(),
        SimLocator::fixed(center()),
        always_valid(),
    );

    session.start(FacingMode::Front).await.unwrap();
    assert_eq!(camera.live_streams(), 1);

    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(camera.live_streams(), 0, "teardown must release the stream");
}

#[tokio::test]
async fn operations_refuse_states_that_do_not_permit_them() {
    let camera = SimCamera::cycling(vec![frames::face()]);
    let mut session = CaptureSession::new(
        options(),
        fast_config(),
        camera,
        SimLocator::fixed(center()),
        always_valid(),
    );

    assert!(matches!(
        session.confirm().await,
        Err(SessionError::InvalidState { op: "confirm", .. })
    ));
    assert!(matches!(
        session.retake().await,
        Err(SessionError::InvalidState { op: "retake", .. })
    ));
    assert!(matches!(
        session.retry_location().await,
        Err(SessionError::InvalidState { .. })
    ));

    session.start(FacingMode::Front).await.unwrap();
    assert!(matches!(
        session.start(FacingMode::Front).await,
        Err(SessionError::InvalidState { op: "start", .. })
    ));
    session.cancel().await;
}
