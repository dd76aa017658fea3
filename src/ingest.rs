//! Photograph ingestion: segment, recognize, extract, one region at a time.
//!
//! [`IngestQueue`] is a plain value owned by the caller. Running it yields
//! a stream of [`ProgressEvent`]s; a [`CancelHandle`] taken from the queue
//! stops the run between photos or between regions.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use image::RgbImage;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::categorizer::CategorySuggester;
use crate::error::Result;
use crate::extractor;
use crate::models::Receipt;
use crate::ocr::TextRecognizer;
use crate::segmenter::{BoundaryMode, ImageSegmenter, Region, SegmentationConfig, SegmentationStrategy, SharedModel};

pub struct Photo {
    pub filename: String,
    pub image: RgbImage,
}

impl Photo {
    pub fn new(filename: &str, image: RgbImage) -> Self {
        Self {
            filename: filename.to_string(),
            image,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)?.to_rgb8();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self { filename, image })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub strategy: SegmentationStrategy,
    pub mode: BoundaryMode,
    /// Date given to receipts whose text carries no readable date.
    pub ingested_on: NaiveDate,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            strategy: SegmentationStrategy::default(),
            mode: BoundaryMode::default(),
            ingested_on: chrono::Local::now().date_naive(),
        }
    }
}

/// SHA-256 of a region's pixels, hex encoded.
pub fn image_hash(image: &RgbImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_raw());
    hex::encode(hasher.finalize())
}

/// Turn one segmented region into a receipt. Recognition failures are
/// recovered here: the receipt is built from empty text and flagged.
pub fn receipt_from_region(
    filename: &str,
    region_index: usize,
    region: &Region,
    recognizer: &dyn TextRecognizer,
    suggester: Option<&dyn CategorySuggester>,
    ingested_on: NaiveDate,
) -> Receipt {
    let text = match &region.text {
        Some(text) => Some(text.clone()),
        None if region.recognition_failed => None,
        None => match recognizer.recognize(&region.image) {
            Ok(out) => Some(out.full_text),
            Err(e) => {
                warn!(filename, region_index, error = %e, "text recognition failed for region");
                None
            }
        },
    };
    let text = text.filter(|t| !t.trim().is_empty());
    let raw = text.as_deref().unwrap_or("");

    let fields = extractor::extract(raw);
    let document_type = extractor::classify_document(raw, &fields);
    let mut receipt = Receipt::from_fields(fields, document_type, raw, ingested_on);
    receipt.filename = Some(filename.to_string());
    receipt.region_index = region_index;
    receipt.image_hash = Some(image_hash(&region.image));
    receipt.ocr_failed = text.is_none();

    if let (Some(suggester), Some(vendor)) = (suggester, receipt.vendor.as_deref()) {
        if let Some(s) = suggester.suggest_category(vendor, receipt.amount) {
            debug!(vendor, category = %s.category, confidence = s.confidence, "category suggested");
            receipt.category = Some(s.category);
        }
    }
    receipt
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum ProgressEvent {
    PhotoStarted { index: usize, filename: String, regions: usize },
    ReceiptReady { index: usize, receipt: Box<Receipt> },
    PhotoFinished { index: usize, receipts: usize },
    /// The run stopped early; `remaining` photos were not fully processed.
    Cancelled { remaining: usize },
    Finished { photos: usize, receipts: usize },
}

struct Job {
    photo: Photo,
    recognizer: Box<dyn TextRecognizer>,
}

pub struct IngestQueue {
    jobs: VecDeque<Job>,
    config: SegmentationConfig,
    model: Option<Arc<SharedModel>>,
    suggester: Option<Box<dyn CategorySuggester>>,
    options: IngestOptions,
    cancel: CancelHandle,
}

impl IngestQueue {
    pub fn new(config: SegmentationConfig, options: IngestOptions) -> Self {
        Self {
            jobs: VecDeque::new(),
            config,
            model: None,
            suggester: None,
            options,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_model(mut self, model: Arc<SharedModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_suggester(mut self, suggester: Box<dyn CategorySuggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    /// Queue a photograph with the recognizer that reads it.
    pub fn push(&mut self, photo: Photo, recognizer: Box<dyn TextRecognizer>) {
        self.jobs.push_back(Job { photo, recognizer });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Consume the queue. Photos are processed in submission order, and no
    /// work happens until the iterator is advanced.
    pub fn run(self) -> IngestRun {
        IngestRun {
            queue: self,
            active: None,
            next_index: 0,
            photos_done: 0,
            receipts_done: 0,
            done: false,
        }
    }
}

struct ActivePhoto {
    index: usize,
    filename: String,
    regions: VecDeque<Region>,
    recognizer: Box<dyn TextRecognizer>,
    next_region: usize,
    produced: usize,
}

pub struct IngestRun {
    queue: IngestQueue,
    active: Option<ActivePhoto>,
    next_index: usize,
    photos_done: usize,
    receipts_done: usize,
    done: bool,
}

impl IngestRun {
    fn start_photo(&mut self, job: Job) -> ProgressEvent {
        let index = self.next_index;
        self.next_index += 1;
        let mut segmenter = ImageSegmenter::new(job.recognizer.as_ref(), self.queue.config.clone());
        if let Some(model) = &self.queue.model {
            segmenter = segmenter.with_model(Arc::clone(model));
        }
        let regions: VecDeque<Region> = segmenter
            .segment(&job.photo.image, self.queue.options.strategy, self.queue.options.mode)
            .into();
        info!(filename = %job.photo.filename, regions = regions.len(), "photo segmented");

        let event = ProgressEvent::PhotoStarted {
            index,
            filename: job.photo.filename.clone(),
            regions: regions.len(),
        };
        self.active = Some(ActivePhoto {
            index,
            filename: job.photo.filename,
            regions,
            recognizer: job.recognizer,
            next_region: 0,
            produced: 0,
        });
        event
    }
}

impl Iterator for IngestRun {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }
        if self.queue.cancel.is_cancelled() {
            self.done = true;
            let remaining = self.queue.jobs.len() + usize::from(self.active.is_some());
            info!(remaining, "ingestion cancelled");
            return Some(ProgressEvent::Cancelled { remaining });
        }

        if let Some(active) = self.active.as_mut() {
            if let Some(region) = active.regions.pop_front() {
                let receipt = receipt_from_region(
                    &active.filename,
                    active.next_region,
                    &region,
                    active.recognizer.as_ref(),
                    self.queue.suggester.as_deref(),
                    self.queue.options.ingested_on,
                );
                active.next_region += 1;
                active.produced += 1;
                self.receipts_done += 1;
                return Some(ProgressEvent::ReceiptReady {
                    index: active.index,
                    receipt: Box::new(receipt),
                });
            }
            let event = ProgressEvent::PhotoFinished {
                index: active.index,
                receipts: active.produced,
            };
            self.active = None;
            self.photos_done += 1;
            return Some(event);
        }

        match self.queue.jobs.pop_front() {
            Some(job) => Some(self.start_photo(job)),
            None => {
                self.done = true;
                Some(ProgressEvent::Finished {
                    photos: self.photos_done,
                    receipts: self.receipts_done,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::Suggestion;
    use crate::error::TillrollError;
    use crate::geometry::BoundingBox;
    use crate::models::DocumentType;
    use crate::ocr::{OcrOutput, OcrWord, SidecarRecognizer};

    struct BrokenRecognizer;

    impl TextRecognizer for BrokenRecognizer {
        fn recognize(&self, _image: &RgbImage) -> Result<OcrOutput> {
            Err(TillrollError::Recognition("timeout".into()))
        }
    }

    struct FixedSuggester;

    impl CategorySuggester for FixedSuggester {
        fn suggest_category(&self, _vendor: &str, _amount: Option<f64>) -> Option<Suggestion> {
            Some(Suggestion {
                category: "Supplies".into(),
                confidence: 0.8,
                rule_id: None,
            })
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn options() -> IngestOptions {
        IngestOptions {
            ingested_on: day(),
            ..Default::default()
        }
    }

    fn two_receipts() -> Box<dyn TextRecognizer> {
        let word = |text: &str, y: f32| OcrWord::new(text, BoundingBox::new(10.0, y, 90.0, y + 10.0));
        Box::new(SidecarRecognizer::new(OcrOutput {
            full_text: String::new(),
            words: vec![
                word("WALMART", 10.0),
                word("Total: $20.12", 30.0),
                word("TARGET", 150.0),
                word("Total: $9.99", 170.0),
            ],
        }))
    }

    #[test]
    fn test_recognition_failure_marks_receipt() {
        let region = Region {
            bbox: BoundingBox::full(10, 10),
            mask: None,
            text: None,
            words: Vec::new(),
            image: RgbImage::new(10, 10),
            recognition_failed: false,
        };
        let receipt = receipt_from_region("a.jpg", 0, &region, &BrokenRecognizer, None, day());
        assert!(receipt.ocr_failed);
        assert!(receipt.needs_manual_review());
        assert!(receipt.vendor.is_none());
        assert!(receipt.amount.is_none());
        assert_eq!(receipt.date, day());
        assert!(receipt.date_is_fallback);
        assert_eq!(receipt.document_type, DocumentType::Unknown);
        assert_eq!(receipt.image_hash.as_deref().map(str::len), Some(64));
    }

    #[test]
    fn test_suggester_fills_category() {
        let region = Region {
            bbox: BoundingBox::full(10, 10),
            mask: None,
            text: Some("STAPLES\nTotal: $12.00".into()),
            words: Vec::new(),
            image: RgbImage::new(10, 10),
            recognition_failed: false,
        };
        let receipt = receipt_from_region("b.jpg", 2, &region, &BrokenRecognizer, Some(&FixedSuggester), day());
        assert!(!receipt.ocr_failed);
        assert_eq!(receipt.region_index, 2);
        assert_eq!(receipt.amount, Some(12.0));
        assert_eq!(receipt.category.as_deref(), Some("Supplies"));
    }

    #[test]
    fn test_run_emits_events_in_order() {
        let mut queue = IngestQueue::new(SegmentationConfig::default(), options());
        queue.push(Photo::new("multi.jpg", RgbImage::new(100, 200)), two_receipts());
        queue.push(Photo::new("blank.jpg", RgbImage::new(20, 20)), Box::new(BrokenRecognizer));
        assert_eq!(queue.len(), 2);

        let events: Vec<ProgressEvent> = queue.run().collect();
        assert!(matches!(events[0], ProgressEvent::PhotoStarted { index: 0, regions: 2, .. }));
        match &events[1] {
            ProgressEvent::ReceiptReady { receipt, .. } => {
                assert_eq!(receipt.vendor.as_deref(), Some("Walmart"));
                assert_eq!(receipt.region_index, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[2], ProgressEvent::ReceiptReady { .. }));
        assert!(matches!(events[3], ProgressEvent::PhotoFinished { index: 0, receipts: 2 }));
        assert!(matches!(events[4], ProgressEvent::PhotoStarted { index: 1, regions: 1, .. }));
        match &events[5] {
            ProgressEvent::ReceiptReady { receipt, .. } => assert!(receipt.ocr_failed),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[6], ProgressEvent::PhotoFinished { index: 1, receipts: 1 }));
        assert!(matches!(events[7], ProgressEvent::Finished { photos: 2, receipts: 3 }));
        assert_eq!(events.len(), 8);
    }

    #[test]
    fn test_cancel_stops_between_regions() {
        let mut queue = IngestQueue::new(SegmentationConfig::default(), options());
        queue.push(Photo::new("multi.jpg", RgbImage::new(100, 200)), two_receipts());
        queue.push(Photo::new("next.jpg", RgbImage::new(20, 20)), Box::new(BrokenRecognizer));
        let cancel = queue.cancel_handle();

        let mut run = queue.run();
        assert!(matches!(run.next(), Some(ProgressEvent::PhotoStarted { .. })));
        assert!(matches!(run.next(), Some(ProgressEvent::ReceiptReady { .. })));
        cancel.cancel();
        assert!(matches!(run.next(), Some(ProgressEvent::Cancelled { remaining: 2 })));
        assert!(run.next().is_none());
    }

    #[test]
    fn test_empty_queue_finishes() {
        let queue = IngestQueue::new(SegmentationConfig::default(), options());
        assert!(queue.is_empty());
        let events: Vec<ProgressEvent> = queue.run().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProgressEvent::Finished { photos: 0, receipts: 0 }));
    }
}
