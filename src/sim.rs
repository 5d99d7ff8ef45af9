//! Deterministic in-memory devices for tests and development.
//!
//! Real deployments wire the session to platform camera/geolocation
//! backends; everything here drives the exact same seams with scripted
//! behavior so the state machine can be exercised without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;

use crate::camera::{CameraDevice, CameraStream, FacingMode, Frame};
use crate::error::{CameraError, LocationError};
use crate::geofence::{Coordinate, LocationProvider};
use crate::presence::{FramePresenceValidator, FrameValidation};

/// Scripted geolocation. Pops scripted fixes in order, then keeps repeating
/// the last one, so a retry after a scripted failure can recover.
pub struct SimLocator {
    state: Mutex<LocatorState>,
    stall: bool,
}

struct LocatorState {
    script: VecDeque<Result<Coordinate, LocationError>>,
    last: Option<Result<Coordinate, LocationError>>,
}

impl SimLocator {
    pub fn fixed(position: Coordinate) -> Self {
        Self::script(vec![Ok(position)])
    }

    pub fn failing(err: LocationError) -> Self {
        Self::script(vec![Err(err)])
    }

    pub fn script(steps: Vec<Result<Coordinate, LocationError>>) -> Self {
        Self {
            state: Mutex::new(LocatorState {
                script: steps.into(),
                last: None,
            }),
            stall: false,
        }
    }

    /// Never resolves; exercises the acquisition timeout.
    pub fn stalled() -> Self {
        Self {
            state: Mutex::new(LocatorState {
                script: VecDeque::new(),
                last: None,
            }),
            stall: true,
        }
    }
}

impl LocationProvider for SimLocator {
    async fn current_position(&self) -> Result<Coordinate, LocationError> {
        if self.stall {
            return std::future::pending().await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(next) = state.script.pop_front() {
            state.last = Some(next.clone());
            return next;
        }
        state
            .last
            .clone()
            .unwrap_or(Err(LocationError::PositionUnavailable))
    }
}

/// Scripted camera. Streams cycle through a fixed set of frames; the device
/// tracks how many streams were opened and how many are still live, which is
/// what the resource-release tests observe.
#[derive(Clone)]
pub struct SimCamera {
    inner: Arc<CameraInner>,
}

struct CameraInner {
    frames: Vec<RgbImage>,
    fail_open: Option<CameraError>,
    open_count: AtomicUsize,
    live_streams: Arc<AtomicUsize>,
}

impl SimCamera {
    /// A camera whose streams cycle through `frames` forever.
    pub fn cycling(frames: Vec<RgbImage>) -> Self {
        Self {
            inner: Arc::new(CameraInner {
                frames,
                fail_open: None,
                open_count: AtomicUsize::new(0),
                live_streams: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// A camera that refuses every acquisition with `err`.
    pub fn failing(err: CameraError) -> Self {
        Self {
            inner: Arc::new(CameraInner {
                frames: Vec::new(),
                fail_open: Some(err),
                open_count: AtomicUsize::new(0),
                live_streams: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Number of acquisition attempts, successful or not.
    pub fn open_count(&self) -> usize {
        self.inner.open_count.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet stopped. Zero means every track released.
    pub fn live_streams(&self) -> usize {
        self.inner.live_streams.load(Ordering::SeqCst)
    }
}

impl CameraDevice for SimCamera {
    type Stream = SimStream;

    async fn open(&self, facing: FacingMode) -> Result<SimStream, CameraError> {
        self.inner.open_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.inner.fail_open {
            return Err(err.clone());
        }
        self.inner.live_streams.fetch_add(1, Ordering::SeqCst);
        Ok(SimStream {
            frames: self.inner.frames.clone(),
            cursor: 0,
            live: true,
            registry: Arc::clone(&self.inner.live_streams),
            facing,
        })
    }
}

#[derive(Debug)]
pub struct SimStream {
    frames: Vec<RgbImage>,
    cursor: usize,
    live: bool,
    registry: Arc<AtomicUsize>,
    facing: FacingMode,
}

impl SimStream {
    pub fn facing(&self) -> FacingMode {
        self.facing
    }
}

impl CameraStream for SimStream {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        if !self.live {
            return Err(CameraError::StreamFailed("stream stopped".into()));
        }
        if self.frames.is_empty() {
            return Err(CameraError::StreamFailed("no frames scripted".into()));
        }
        let image = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;
        Ok(Frame::new(image))
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.registry.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Frame validator that plays back a scripted verdict sequence, then repeats
/// a fallback. Lets dwell tests pin the exact valid/invalid pattern without
/// involving image heuristics.
pub struct ScriptedValidator {
    script: Mutex<VecDeque<FrameValidation>>,
    fallback: FrameValidation,
}

impl ScriptedValidator {
    pub fn new(steps: Vec<FrameValidation>, fallback: FrameValidation) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback,
        }
    }

    /// Plays `steps`, then reports every later frame as valid.
    pub fn then_valid(steps: Vec<FrameValidation>) -> Self {
        Self::new(steps, FrameValidation::pass())
    }
}

impl FramePresenceValidator for ScriptedValidator {
    fn validate(&self, _frame: &Frame) -> FrameValidation {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Synthetic fixture frames for the presence heuristics.
///
/// Faces are skin-toned ellipses on a neutral background, drawn at 240x240
/// with a face height of 45% of the frame unless a fixture says otherwise.
pub mod frames {
    use image::{Rgb, RgbImage};

    pub const SIZE: u32 = 240;
    const BG: Rgb<u8> = Rgb([80, 80, 80]);
    const BRIGHT_BG: Rgb<u8> = Rgb([240, 240, 240]);
    const SKIN: Rgb<u8> = Rgb([205, 160, 125]);
    const DARK_SKIN: Rgb<u8> = Rgb([100, 60, 40]);
    const BRIGHT_SKIN: Rgb<u8> = Rgb([250, 225, 205]);
    const MASK: Rgb<u8> = Rgb([50, 50, 200]);
    const CAP: Rgb<u8> = Rgb([40, 40, 40]);
    const GLOVE: Rgb<u8> = Rgb([60, 60, 60]);

    pub fn blank() -> RgbImage {
        RgbImage::from_pixel(SIZE, SIZE, BG)
    }

    fn ellipse(img: &mut RgbImage, cx: f64, cy: f64, semi_h: f64, semi_w: f64, tone: Rgb<u8>) {
        for y in 0..img.height() {
            for x in 0..img.width() {
                let dy = (f64::from(y) - cy) / semi_h;
                let dx = (f64::from(x) - cx) / semi_w;
                if dx * dx + dy * dy <= 1.0 {
                    img.put_pixel(x, y, tone);
                }
            }
        }
    }

    fn rect(img: &mut RgbImage, x0: f64, y0: f64, x1: f64, y1: f64, tone: Rgb<u8>) {
        for y in y0.max(0.0) as u32..(y1 as u32).min(img.height()) {
            for x in x0.max(0.0) as u32..(x1 as u32).min(img.width()) {
                img.put_pixel(x, y, tone);
            }
        }
    }

    /// A single well-framed, well-lit, unobstructed face.
    pub fn face() -> RgbImage {
        face_sized(SIZE, SIZE)
    }

    /// Same geometry at an arbitrary resolution.
    pub fn face_sized(w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(w, h, BG);
        let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
        ellipse(&mut img, cx, cy, 0.225 * f64::from(h), 0.15 * f64::from(w), SKIN);
        img
    }

    /// Face displaced horizontally; pairs with [`face`] to fake micro-motion.
    pub fn face_shifted(dx: i32) -> RgbImage {
        let mut img = blank();
        let c = f64::from(SIZE) / 2.0;
        ellipse(
            &mut img,
            c + f64::from(dx),
            c,
            0.225 * f64::from(SIZE),
            0.15 * f64::from(SIZE),
            SKIN,
        );
        img
    }

    pub fn two_faces() -> RgbImage {
        two_faces_toned(SKIN)
    }

    pub fn two_dark_faces() -> RgbImage {
        two_faces_toned(DARK_SKIN)
    }

    fn two_faces_toned(tone: Rgb<u8>) -> RgbImage {
        let mut img = blank();
        ellipse(&mut img, 60.0, 120.0, 36.0, 24.0, tone);
        ellipse(&mut img, 180.0, 120.0, 36.0, 24.0, tone);
        img
    }

    pub fn tiny_face() -> RgbImage {
        let mut img = blank();
        ellipse(&mut img, 120.0, 120.0, 17.0, 12.0, SKIN);
        img
    }

    pub fn huge_face() -> RgbImage {
        let mut img = blank();
        ellipse(&mut img, 120.0, 120.0, 114.0, 76.0, SKIN);
        img
    }

    pub fn dark_face() -> RgbImage {
        let mut img = blank();
        ellipse(&mut img, 120.0, 120.0, 54.0, 36.0, DARK_SKIN);
        img
    }

    pub fn bright_face() -> RgbImage {
        let mut img = RgbImage::from_pixel(SIZE, SIZE, BRIGHT_BG);
        ellipse(&mut img, 120.0, 120.0, 54.0, 36.0, BRIGHT_SKIN);
        img
    }

    /// Lower 40% of the face covered by a surgical-mask-colored region.
    pub fn masked_face() -> RgbImage {
        let mut img = face();
        for y in 0..SIZE {
            for x in 0..SIZE {
                let dy = (f64::from(y) - 120.0) / 54.0;
                let dx = (f64::from(x) - 120.0) / 36.0;
                if dx * dx + dy * dy <= 1.0 && dy > 0.2 {
                    img.put_pixel(x, y, MASK);
                }
            }
        }
        img
    }

    /// Top 40% of the face covered by a dark cap.
    pub fn capped_face() -> RgbImage {
        let mut img = face();
        for y in 0..SIZE {
            for x in 0..SIZE {
                let dy = (f64::from(y) - 120.0) / 54.0;
                let dx = (f64::from(x) - 120.0) / 36.0;
                if dx * dx + dy * dy <= 1.0 && dy < -0.2 {
                    img.put_pixel(x, y, CAP);
                }
            }
        }
        img
    }

    /// A gloved hand over the mouth and chin: the face box keeps a full-face
    /// outline but loses most of its skin fill.
    pub fn hand_over_mouth_face() -> RgbImage {
        let mut img = face();
        // rows 0.1..0.9 of the lower half-axis, 1.3 half-widths across
        rect(&mut img, 120.0 - 0.65 * 36.0, 120.0 + 0.1 * 54.0, 120.0 + 0.65 * 36.0, 120.0 + 0.9 * 54.0, GLOVE);
        img
    }
}
