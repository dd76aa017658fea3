//! Strategy B: model-assisted receipt boundary detection.
//!
//! An interactive segmentation model is prompted with single positive points
//! sampled over the photograph. Each point yields a mask; masks are filtered
//! for receipt-plausible size and shape, de-duplicated by IoU, and cropped
//! from the original-resolution photograph.
//!
//! Sample grids are coverage heuristics. Receipts that overlap heavily or
//! are rotated past roughly 45 degrees can be missed.

use std::borrow::Cow;
use std::str::FromStr;

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TillrollError};
use crate::geometry::{BoundingBox, Mask};

use super::{crop_photo, Region, SegmentationConfig};

/// One mask proposed by the model for a point prompt.
#[derive(Debug, Clone)]
pub struct MaskCandidate {
    pub mask: Mask,
    pub iou_score: f32,
}

/// An interactive segmentation model. Returned masks have the dimensions of
/// the image passed in.
pub trait SegmentationModel {
    fn segment_at_point(&self, image: &RgbImage, point: (f32, f32)) -> Result<Vec<MaskCandidate>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// A photograph that may hold several receipts.
    #[default]
    FullPhoto,
    /// A photograph dominated by one receipt.
    SingleReceipt,
}

impl FromStr for BoundaryMode {
    type Err = TillrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full_photo" | "full-photo" => Ok(Self::FullPhoto),
            "single_receipt" | "single-receipt" => Ok(Self::SingleReceipt),
            other => Err(TillrollError::Other(format!("Unknown boundary mode: {other}"))),
        }
    }
}

/// Size, shape and padding limits for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeLimits {
    pub min_area: f32,
    pub max_area: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Crop padding as a fraction of the smaller image dimension.
    pub padding: f32,
}

impl ModeLimits {
    pub fn full_photo() -> Self {
        Self {
            min_area: 0.01,
            max_area: 0.90,
            min_aspect: 0.2,
            max_aspect: 3.0,
            padding: 0.02,
        }
    }

    pub fn single_receipt() -> Self {
        Self {
            min_area: 0.05,
            max_area: 0.60,
            min_aspect: 0.2,
            max_aspect: 2.0,
            padding: 0.10,
        }
    }

    /// Whether a mask is plausibly a receipt.
    pub fn accepts(&self, mask: &Mask) -> bool {
        let area = mask.area_fraction();
        if area < self.min_area || area > self.max_area {
            return false;
        }
        let Some(bbox) = mask.bounding_box() else {
            return false;
        };
        let aspect = bbox.aspect_ratio();
        (self.min_aspect..=self.max_aspect).contains(&aspect)
    }
}

/// Prompt points, in pixels, for a `width` x `height` image.
pub fn sample_points(mode: BoundaryMode, width: u32, height: u32) -> Vec<(f32, f32)> {
    let (w, h) = (width as f32, height as f32);
    match mode {
        BoundaryMode::FullPhoto => {
            let steps = [0.25f32, 0.5, 0.75];
            steps
                .iter()
                .flat_map(|fy| steps.iter().map(move |fx| (fx * w, fy * h)))
                .collect()
        }
        BoundaryMode::SingleReceipt => [(0.5f32, 0.5f32), (0.5, 0.3), (0.5, 0.7), (0.3, 0.5), (0.7, 0.5)]
            .iter()
            .map(|(fx, fy)| (fx * w, fy * h))
            .collect(),
    }
}

/// Keep the best candidate for a point if it clears the confidence floor.
fn best_candidate(candidates: Vec<MaskCandidate>, min_confidence: f32) -> Option<MaskCandidate> {
    candidates
        .into_iter()
        .max_by(|a, b| a.iou_score.total_cmp(&b.iou_score))
        .filter(|c| c.iou_score >= min_confidence)
}

/// Apply size/shape limits, then drop any mask overlapping an earlier kept
/// mask by more than `max_iou`. First kept wins.
pub fn filter_masks(masks: Vec<MaskCandidate>, limits: &ModeLimits, max_iou: f32) -> Vec<MaskCandidate> {
    let mut kept: Vec<MaskCandidate> = Vec::new();
    for candidate in masks {
        if !limits.accepts(&candidate.mask) {
            debug!(
                area = candidate.mask.area_fraction(),
                "mask rejected by size or aspect limits"
            );
            continue;
        }
        if kept.iter().any(|k| k.mask.iou(&candidate.mask) > max_iou) {
            debug!("mask rejected as overlapping an earlier mask");
            continue;
        }
        kept.push(candidate);
    }
    kept
}

fn working_image<'a>(photo: &'a RgbImage, max_dim: u32) -> (Cow<'a, RgbImage>, f32) {
    let longest = photo.width().max(photo.height());
    if longest <= max_dim || longest == 0 {
        return (Cow::Borrowed(photo), 1.0);
    }
    let scale = max_dim as f32 / longest as f32;
    let w = ((photo.width() as f32 * scale).round() as u32).max(1);
    let h = ((photo.height() as f32 * scale).round() as u32).max(1);
    let resized = imageops::resize(photo, w, h, imageops::FilterType::Triangle);
    (Cow::Owned(resized), scale)
}

/// Run Strategy B over one photograph. Points are processed one at a time.
/// Model errors propagate so the caller can fall back to text clustering.
pub fn detect_boundaries(
    photo: &RgbImage,
    model: &dyn SegmentationModel,
    mode: BoundaryMode,
    config: &SegmentationConfig,
) -> Result<Vec<Region>> {
    let (working, scale) = working_image(photo, config.max_model_dimension);
    let limits = config.limits(mode);

    let mut proposals = Vec::new();
    for point in sample_points(mode, working.width(), working.height()) {
        let candidates = model.segment_at_point(&working, point)?;
        match best_candidate(candidates, config.min_mask_confidence) {
            Some(best) => proposals.push(best),
            None => debug!(x = point.0, y = point.1, "no confident mask at sample point"),
        }
    }

    let kept = filter_masks(proposals, &limits, config.mask_dedup_iou);
    let pad = limits.padding * photo.width().min(photo.height()) as f32;
    let mut regions: Vec<Region> = kept
        .into_iter()
        .filter_map(|c| {
            let bbox = c
                .mask
                .bounding_box()?
                .scale(1.0 / scale)
                .padded(pad, photo.width(), photo.height());
            let image = crop_photo(photo, &bbox)?;
            Some(Region {
                bbox,
                mask: Some(c.mask),
                text: None,
                words: Vec::new(),
                image,
                recognition_failed: false,
            })
        })
        .collect();
    regions.sort_by(|a, b| a.bbox.y_min.total_cmp(&b.bbox.y_min));
    Ok(regions)
}
