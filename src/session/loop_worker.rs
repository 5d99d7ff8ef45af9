use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use log::{debug, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::controller::{publish, SessionContext, SessionShared};
use super::dwell::DwellProgress;
use super::encode::encode_jpeg;
use super::state::{CaptureState, CapturedArtifact, SessionSnapshot};
use crate::camera::{CameraStream, Frame};
use crate::config::CaptureConfig;
use crate::presence::{FramePresenceValidator, FrameRejection};

/// Perceptual-hash displacement across one dwell run.
///
/// A live subject always drifts a little between ticks; a printed photo or a
/// frozen feed hashes identically frame after frame. Cleared whenever the
/// dwell run resets, so the displacement always describes the current
/// unbroken run.
#[derive(Default)]
pub(crate) struct SceneMotion {
    baseline: Option<ImageHash>,
    max_bits: u32,
    samples: u32,
}

impl SceneMotion {
    fn observe(&mut self, frame: &Frame) {
        let hash = hash_frame(frame);
        self.samples += 1;
        match &self.baseline {
            Some(baseline) => self.max_bits = self.max_bits.max(baseline.dist(&hash)),
            None => self.baseline = Some(hash),
        }
    }

    fn displacement_bits(&self) -> u32 {
        self.max_bits
    }

    /// Displacement needs at least one frame pair; shorter runs pass
    /// through undetermined.
    fn determined(&self) -> bool {
        self.samples >= 2
    }

    fn clear(&mut self) {
        self.baseline = None;
        self.max_bits = 0;
        self.samples = 0;
    }
}

fn hash_frame(frame: &Frame) -> ImageHash {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();
    hasher.hash_image(&image::DynamicImage::ImageRgb8(frame.image.clone()))
}

/// The auto-capture poll loop. Runs only while the session is `Scanning`;
/// exits on cancellation, on capture, or when the stream is gone. Overrun
/// ticks are skipped, never queued.
pub(crate) async fn detection_loop<S: CameraStream>(
    shared: Arc<Mutex<SessionShared<S>>>,
    validator: Arc<dyn FramePresenceValidator>,
    config: CaptureConfig,
    ctx: Arc<SessionContext>,
    events: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut motion = SceneMotion::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("detection loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                let keep_going =
                    run_tick(&shared, validator.as_ref(), &config, &ctx, &events, &mut motion)
                        .await;
                if !keep_going {
                    debug!("detection loop finished");
                    break;
                }
            }
        }
    }
}

/// One validation tick. Returns false when the loop should stop.
async fn run_tick<S: CameraStream>(
    shared: &Mutex<SessionShared<S>>,
    validator: &dyn FramePresenceValidator,
    config: &CaptureConfig,
    ctx: &SessionContext,
    events: &watch::Sender<SessionSnapshot>,
    motion: &mut SceneMotion,
) -> bool {
    let mut guard = shared.lock().await;
    let session = &mut *guard;
    if !matches!(session.state, CaptureState::Scanning { .. }) {
        return false;
    }

    let grabbed = match session.stream.as_mut() {
        None => {
            warn!("detection tick with no stream");
            return false;
        }
        Some(stream) => stream.grab(),
    };
    session.metrics.ticks += 1;

    let frame = match grabbed {
        Ok(frame) => frame,
        Err(err) => {
            warn!("frame grab failed: {err}");
            session.metrics.grab_failures += 1;
            reset_run(session, motion, None);
            publish(ctx, session, events);
            return true;
        }
    };

    let verdict = validator.validate(&frame);
    if !verdict.is_valid {
        let rejection = verdict.rejection.unwrap_or(FrameRejection::NoFace);
        reset_run(session, motion, Some(rejection));
        publish(ctx, session, events);
        return true;
    }

    session.metrics.valid_frames += 1;
    if config.scene_motion_check {
        motion.observe(&frame);
    }

    match session.dwell.record_valid() {
        DwellProgress::Counting(dwell) => {
            session.last_rejection = None;
            session.state = CaptureState::Scanning { dwell };
            publish(ctx, session, events);
            true
        }
        DwellProgress::ThresholdReached => {
            session.state = CaptureState::Detecting;
            publish(ctx, session, events);

            if config.scene_motion_check
                && motion.determined()
                && motion.displacement_bits() < config.min_scene_motion_bits
            {
                info!(
                    "dwell run discarded: no scene motion across {} frames",
                    session.dwell.threshold()
                );
                reset_run(session, motion, Some(FrameRejection::StaticScene));
                publish(ctx, session, events);
                return true;
            }

            let encode_started = Instant::now();
            match encode_jpeg(&frame, config.jpeg_quality) {
                Ok(image_jpeg) => {
                    session.metrics.encode_ms =
                        Some(encode_started.elapsed().as_millis() as u64);
                    if let Some(started) = session.metrics.scanning_started_at {
                        session.metrics.time_to_capture_ms =
                            Some((Utc::now() - started).num_milliseconds().max(0) as u64);
                    }
                    info!(
                        "auto-capture fired after {} consecutive valid frames ({} bytes)",
                        session.dwell.threshold(),
                        image_jpeg.len()
                    );
                    session.state = CaptureState::Captured(CapturedArtifact {
                        image_jpeg,
                        captured_at: frame.grabbed_at,
                        facing: session.facing,
                    });
                    publish(ctx, session, events);
                    false
                }
                Err(err) => {
                    // Not a session failure: discard the run and keep scanning.
                    warn!("terminal frame encode failed: {err}");
                    reset_run(session, motion, None);
                    publish(ctx, session, events);
                    true
                }
            }
        }
    }
}

fn reset_run<S: CameraStream>(
    shared: &mut SessionShared<S>,
    motion: &mut SceneMotion,
    rejection: Option<FrameRejection>,
) {
    if shared.dwell.count() > 0 {
        shared.metrics.dwell_resets += 1;
    }
    shared.dwell.reset();
    motion.clear();
    if let Some(rejection) = rejection {
        shared.metrics.record_rejection(rejection);
    }
    shared.last_rejection = rejection;
    shared.state = CaptureState::Scanning { dwell: 0 };
}

/// Cosmetic scan-indicator ticker. Independent of the validation timer: it
/// only bumps the snapshot's animation counter and never touches the dwell
/// counter. Exits on cancellation or when the session reaches a terminal
/// state.
pub(crate) async fn progress_loop<S: CameraStream>(
    shared: Arc<Mutex<SessionShared<S>>>,
    ctx: Arc<SessionContext>,
    events: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut guard = shared.lock().await;
                if guard.state.is_terminal() {
                    break;
                }
                if matches!(guard.state, CaptureState::Scanning { .. }) {
                    guard.scan_cycle = guard.scan_cycle.wrapping_add(1);
                    publish(&ctx, &guard, &events);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::frames;

    #[test]
    fn identical_frames_show_no_displacement() {
        let mut motion = SceneMotion::default();
        let frame = Frame::new(frames::face());
        for _ in 0..5 {
            motion.observe(&frame);
        }
        assert_eq!(motion.displacement_bits(), 0);
    }

    #[test]
    fn a_shifted_face_shows_displacement() {
        let mut motion = SceneMotion::default();
        motion.observe(&Frame::new(frames::face()));
        motion.observe(&Frame::new(frames::face_shifted(36)));
        assert!(motion.displacement_bits() >= 1);
    }

    #[test]
    fn clear_discards_the_baseline() {
        let mut motion = SceneMotion::default();
        motion.observe(&Frame::new(frames::face()));
        motion.observe(&Frame::new(frames::face_shifted(36)));
        motion.clear();
        assert_eq!(motion.displacement_bits(), 0);
        motion.observe(&Frame::new(frames::face_shifted(36)));
        assert_eq!(motion.displacement_bits(), 0);
    }

    #[test]
    fn single_frame_runs_are_undetermined() {
        let mut motion = SceneMotion::default();
        assert!(!motion.determined());
        motion.observe(&Frame::new(frames::face()));
        assert!(!motion.determined());
        motion.observe(&Frame::new(frames::face()));
        assert!(motion.determined());
    }
}
