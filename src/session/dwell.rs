/// Consecutive-valid-frame counter behind auto-capture.
///
/// The reset policy is strict: any invalid frame discards all accumulated
/// progress. A lenient allow-N-bad-frames window would let momentary spoof
/// artifacts interleave with valid frames and still accumulate dwell time;
/// requiring an unbroken run removes that path.
#[derive(Debug, Clone)]
pub struct DwellCounter {
    count: u32,
    threshold: u32,
}

/// Outcome of recording one valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellProgress {
    Counting(u32),
    ThresholdReached,
}

impl DwellCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_valid(&mut self) -> DwellProgress {
        self.count += 1;
        if self.count >= self.threshold {
            DwellProgress::ThresholdReached
        } else {
            DwellProgress::Counting(self.count)
        }
    }

    /// Unconditional. Called for any invalid frame, on retake, and when the
    /// facing mode switches.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}
