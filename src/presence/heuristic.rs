use image::{imageops, RgbImage};
use log::trace;

use super::region::{find_regions, skin_mask, Region};
use super::{FrameRejection, FrameValidation, FramePresenceValidator};
use crate::camera::Frame;

/// Thresholds for [`HeuristicPresenceValidator`]. All ratios are relative to
/// the downscaled analysis plane, so they hold across camera resolutions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeuristicConfig {
    /// Longest side of the analysis plane the frame is downscaled to before
    /// any per-pixel work. Bounds execution time per tick.
    pub analysis_width: u32,

    /// Minimum blob area, as a fraction of the analysis plane, for a skin
    /// blob to count as a face candidate.
    pub min_region_fraction: f64,

    /// Candidate bounding-box height over plane height below this reads as
    /// "too far"...
    pub min_face_ratio: f64,

    /// ...and above this as "too close".
    pub max_face_ratio: f64,

    /// Acceptable band for mean Rec.601 luma over the candidate's skin
    /// pixels.
    pub min_luma: f64,
    pub max_luma: f64,

    /// A candidate box with height/width below this is vertically truncated:
    /// a mask-style cover over the lower face or a cap over the forehead has
    /// cropped the visible skin short of a full face.
    pub min_face_aspect: f64,

    /// Minimum fraction of the candidate box that is skin. An unobstructed
    /// face fills its box at roughly pi/4; a large occluder inside the box
    /// (hand, scarf, held object) pushes the fill well below that.
    pub min_box_fill: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            analysis_width: 160,
            min_region_fraction: 0.005,
            min_face_ratio: 0.22,
            max_face_ratio: 0.85,
            min_luma: 80.0,
            max_luma: 210.0,
            min_face_aspect: 1.05,
            min_box_fill: 0.65,
        }
    }
}

/// Lightweight presence heuristics over a skin-likelihood mask.
///
/// Checks run in fixed priority order, first failure wins: face count, face
/// size, lighting, occlusion. Pure and deterministic: the same frame always
/// yields the same verdict, so the guidance a user sees is stable across
/// retries.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPresenceValidator {
    config: HeuristicConfig,
}

impl HeuristicPresenceValidator {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }
}

impl FramePresenceValidator for HeuristicPresenceValidator {
    fn validate(&self, frame: &Frame) -> FrameValidation {
        let cfg = &self.config;
        if frame.width() == 0 || frame.height() == 0 {
            return FrameValidation::fail(FrameRejection::NoFace);
        }

        let plane = downscale(&frame.image, cfg.analysis_width);
        let (width, height) = plane.dimensions();
        let mask = skin_mask(&plane);

        let min_area = (cfg.min_region_fraction * f64::from(width) * f64::from(height)) as usize;
        let regions = find_regions(&mask, width, height, min_area.max(1));

        // 1. Exactly one face-like region.
        let region = match regions.len() {
            0 => return FrameValidation::fail(FrameRejection::NoFace),
            1 => &regions[0],
            n => {
                trace!("{n} face candidates in frame");
                return FrameValidation::fail(FrameRejection::MultipleFaces);
            }
        };

        // 2. Size against the frame.
        let height_ratio = f64::from(region.height()) / f64::from(height);
        if height_ratio < cfg.min_face_ratio {
            return FrameValidation::fail(FrameRejection::TooFar);
        }
        if height_ratio > cfg.max_face_ratio {
            return FrameValidation::fail(FrameRejection::TooClose);
        }

        // 3. Lighting over the candidate's skin pixels.
        let luma = mean_skin_luma(&plane, &mask, region);
        if luma < cfg.min_luma {
            return FrameValidation::fail(FrameRejection::TooDark);
        }
        if luma > cfg.max_luma {
            return FrameValidation::fail(FrameRejection::TooBright);
        }

        // 4. Occlusion: a truncated box, or a box with too little skin in it.
        let fill = region.area as f64 / f64::from(region.width() * region.height());
        if region.aspect() < cfg.min_face_aspect || fill < cfg.min_box_fill {
            trace!(
                "occlusion suspected: aspect {:.2}, fill {fill:.2}",
                region.aspect()
            );
            return FrameValidation::fail(FrameRejection::FaceObstructed);
        }

        FrameValidation::pass()
    }
}

fn downscale(img: &RgbImage, analysis_width: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let longest = w.max(h);
    if longest <= analysis_width {
        return img.clone();
    }
    let scale = f64::from(analysis_width) / f64::from(longest);
    let nw = ((f64::from(w) * scale).round() as u32).max(1);
    let nh = ((f64::from(h) * scale).round() as u32).max(1);
    imageops::thumbnail(img, nw, nh)
}

fn mean_skin_luma(plane: &RgbImage, mask: &[bool], region: &Region) -> f64 {
    let width = plane.width() as usize;
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in region.min_y..=region.max_y {
        for x in region.min_x..=region.max_x {
            if mask[y as usize * width + x as usize] {
                let p = plane.get_pixel(x, y).0;
                sum += 0.299 * f64::from(p[0]) + 0.587 * f64::from(p[1]) + 0.114 * f64::from(p[2]);
                count += 1;
            }
        }
    }
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}
