use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunable parameters of the capture pipeline.
///
/// Defaults match the reference behavior: a 300 ms validation tick and a
/// 10-tick dwell threshold, i.e. roughly three seconds of unbroken face
/// presence before auto-capture fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Poll interval for frame validation, in milliseconds.
    pub tick_interval_ms: u64,

    /// Consecutive valid ticks required before auto-capture fires.
    pub dwell_threshold: u32,

    /// Tick for the cosmetic scan indicator. Independent of the validation
    /// timer; only drives the snapshot's animation counter.
    pub progress_tick_ms: u64,

    /// Timeout applied to a single position fix, in seconds.
    pub location_timeout_secs: u64,

    /// JPEG quality of the captured artifact (1-100).
    pub jpeg_quality: u8,

    /// Reject dwell runs whose frames show no perceptual change (a printed
    /// photo or frozen feed held in front of the lens).
    pub scene_motion_check: bool,

    /// Minimum perceptual-hash displacement (bits) a live run must show.
    pub min_scene_motion_bits: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 300,
            dwell_threshold: 10,
            progress_tick_ms: 100,
            location_timeout_secs: 10,
            jpeg_quality: 90,
            scene_motion_check: true,
            min_scene_motion_bits: 1,
        }
    }
}

impl CaptureConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location_timeout_secs)
    }

    /// Load config from a JSON file, falling back to defaults when the file
    /// does not exist or fails to parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read capture config from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = CaptureConfig::default();
        assert_eq!(config.tick_interval_ms, 300);
        assert_eq!(config.dwell_threshold, 10);
        assert_eq!(config.jpeg_quality, 90);
        assert!(config.scene_motion_check);
    }

    #[test]
    fn json_round_trip() {
        let config = CaptureConfig {
            tick_interval_ms: 50,
            dwell_threshold: 4,
            ..CaptureConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CaptureConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tick_interval_ms, 50);
        assert_eq!(back.dwell_threshold, 4);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let back: CaptureConfig = serde_json::from_str(r#"{"dwellThreshold": 3}"#).unwrap();
        assert_eq!(back.dwell_threshold, 3);
        assert_eq!(back.tick_interval_ms, 300);
    }

    #[test]
    fn load_missing_file_is_default() {
        let path = std::env::temp_dir().join(format!("clockface-{}.json", uuid::Uuid::new_v4()));
        let config = CaptureConfig::load(&path).unwrap();
        assert_eq!(config.dwell_threshold, 10);
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join(format!("clockface-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{"tickIntervalMs": 120}"#).unwrap();
        let config = CaptureConfig::load(&path).unwrap();
        assert_eq!(config.tick_interval_ms, 120);
        let _ = fs::remove_file(&path);
    }
}
