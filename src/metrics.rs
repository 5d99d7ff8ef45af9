use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::presence::FrameRejection;

/// Counters the capture loop keeps about one session. Diagnostic only; none
/// of this feeds back into capture decisions.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    /// Validation ticks processed (skipped ticks are not counted).
    pub ticks: u64,
    pub valid_frames: u64,
    pub rejected_frames: u64,
    /// Times an in-progress dwell run was thrown away.
    pub dwell_resets: u64,
    pub grab_failures: u64,
    /// Per-reason rejection counts, keyed by [`FrameRejection::key`].
    pub rejections: BTreeMap<String, u64>,
    pub scanning_started_at: Option<DateTime<Utc>>,
    pub time_to_capture_ms: Option<u64>,
    pub encode_ms: Option<u64>,
}

impl SessionMetrics {
    pub(crate) fn record_rejection(&mut self, rejection: FrameRejection) {
        self.rejected_frames += 1;
        *self.rejections.entry(rejection.key().to_string()).or_insert(0) += 1;
    }
}
