//! Splits one photograph into receipt regions.
//!
//! Two strategies share one contract: text clustering (always available)
//! and model-assisted boundary detection (needs a [`SharedModel`]). The
//! segmenter never fails; it degrades from Strategy B to Strategy A to a
//! single whole-photo region.

pub mod boundary;
pub mod model;
pub mod text_cluster;

use std::str::FromStr;
use std::sync::Arc;

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TillrollError;
use crate::geometry::{BoundingBox, Mask};
use crate::ocr::{OcrWord, TextRecognizer};

pub use boundary::{BoundaryMode, MaskCandidate, ModeLimits, SegmentationModel};
pub use model::{DynModel, SharedModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategy {
    /// Strategy A: cluster OCR words.
    #[default]
    Text,
    /// Strategy B: model-assisted boundary detection.
    Model,
}

impl SegmentationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Model => "model",
        }
    }
}

impl FromStr for SegmentationStrategy {
    type Err = TillrollError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "model" => Ok(Self::Model),
            other => Err(TillrollError::Other(format!("Unknown segmentation strategy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Words within this fraction of image height share a line.
    pub line_group_fraction: f32,
    /// A vertical gap above this fraction of image height starts a new receipt.
    pub cluster_gap_fraction: f32,
    /// Images larger than this are downscaled before prompting the model.
    pub max_model_dimension: u32,
    pub min_mask_confidence: f32,
    pub mask_dedup_iou: f32,
    pub full_photo: ModeLimits,
    pub single_receipt: ModeLimits,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            line_group_fraction: 0.02,
            cluster_gap_fraction: 0.08,
            max_model_dimension: 1536,
            min_mask_confidence: 0.7,
            mask_dedup_iou: 0.5,
            full_photo: ModeLimits::full_photo(),
            single_receipt: ModeLimits::single_receipt(),
        }
    }
}

impl SegmentationConfig {
    pub fn limits(&self, mode: BoundaryMode) -> ModeLimits {
        match mode {
            BoundaryMode::FullPhoto => self.full_photo,
            BoundaryMode::SingleReceipt => self.single_receipt,
        }
    }
}

/// One candidate receipt inside a photograph. Lives only for the duration
/// of an ingestion pass.
#[derive(Debug, Clone)]
pub struct Region {
    pub bbox: BoundingBox,
    /// Pixel mask, model-assisted mode only.
    pub mask: Option<Mask>,
    /// Recognized text when segmentation already produced it.
    pub text: Option<String>,
    pub words: Vec<OcrWord>,
    /// Original-resolution crop.
    pub image: RgbImage,
    /// Whole-photo recognition already failed; do not try again.
    pub recognition_failed: bool,
}

impl Region {
    fn whole_photo(photo: &RgbImage, text: Option<String>, recognition_failed: bool) -> Self {
        Self {
            bbox: BoundingBox::full(photo.width(), photo.height()),
            mask: None,
            text,
            words: Vec::new(),
            image: photo.clone(),
            recognition_failed,
        }
    }
}

pub(crate) fn crop_photo(photo: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (x, y, w, h) = bbox.to_crop_rect(photo.width(), photo.height())?;
    Some(imageops::crop_imm(photo, x, y, w, h).to_image())
}

pub struct ImageSegmenter<'a> {
    recognizer: &'a dyn TextRecognizer,
    model: Option<Arc<SharedModel>>,
    config: SegmentationConfig,
}

impl<'a> ImageSegmenter<'a> {
    pub fn new(recognizer: &'a dyn TextRecognizer, config: SegmentationConfig) -> Self {
        Self {
            recognizer,
            model: None,
            config,
        }
    }

    pub fn with_model(mut self, model: Arc<SharedModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Segment a photograph into an ordered, non-empty list of regions.
    pub fn segment(&self, photo: &RgbImage, strategy: SegmentationStrategy, mode: BoundaryMode) -> Vec<Region> {
        if strategy == SegmentationStrategy::Model {
            match self.segment_by_model(photo, mode) {
                Some(regions) => return regions,
                None => info!("falling back to text clustering"),
            }
        }
        self.segment_by_text(photo)
    }

    fn segment_by_model(&self, photo: &RgbImage, mode: BoundaryMode) -> Option<Vec<Region>> {
        let Some(shared) = &self.model else {
            warn!("model-assisted segmentation requested but no model is configured");
            return None;
        };
        let result = shared
            .get()
            .and_then(|model| boundary::detect_boundaries(photo, model.as_ref(), mode, &self.config));
        match result {
            Ok(regions) if !regions.is_empty() => {
                debug!(count = regions.len(), "model-assisted segmentation found regions");
                Some(regions)
            }
            Ok(_) => {
                warn!("model-assisted segmentation found no receipt regions");
                None
            }
            Err(e) => {
                warn!(error = %e, "model-assisted segmentation failed");
                None
            }
        }
    }

    /// Strategy A with its whole-photo fallback.
    pub fn segment_by_text(&self, photo: &RgbImage) -> Vec<Region> {
        let ocr = match self.recognizer.recognize(photo) {
            Ok(ocr) => ocr,
            Err(e) => {
                warn!(error = %e, "text recognition failed for photo");
                return vec![Region::whole_photo(photo, None, true)];
            }
        };

        let clusters = text_cluster::cluster_words(&ocr.words, photo.height(), &self.config);
        if clusters.is_empty() {
            debug!("no text clusters, using the whole photo as one region");
            return vec![Region::whole_photo(photo, Some(ocr.full_text), false)];
        }

        clusters
            .into_iter()
            .map(|cluster| {
                let image = crop_photo(photo, &cluster.bbox).unwrap_or_else(|| photo.clone());
                Region {
                    bbox: cluster.bbox,
                    mask: None,
                    text: Some(cluster.text),
                    words: cluster.words,
                    image,
                    recognition_failed: false,
                }
            })
            .collect()
    }
}
