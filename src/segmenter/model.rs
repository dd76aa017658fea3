use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use tracing::info;

use crate::error::Result;

use super::boundary::SegmentationModel;

pub type DynModel = Arc<dyn SegmentationModel + Send + Sync>;

type Loader = dyn Fn() -> Result<DynModel> + Send + Sync;

/// A segmentation model loaded on first use and shared by reference count.
///
/// The first successful [`SharedModel::get`] pays the full weight-load
/// latency; every later call returns the cached handle without blocking.
/// A failed load is not cached, so the next call tries again. Wrap the
/// `SharedModel` itself in an `Arc` to share one load across segmenters.
pub struct SharedModel {
    loader: Box<Loader>,
    cell: OnceCell<DynModel>,
}

impl SharedModel {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<DynModel> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            cell: OnceCell::new(),
        }
    }

    /// A model that is already in memory.
    pub fn preloaded(model: DynModel) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Arc::clone(&model));
        Self {
            loader: Box::new(move || Ok(Arc::clone(&model))),
            cell,
        }
    }

    pub fn get(&self) -> Result<DynModel> {
        self.cell
            .get_or_try_init(|| {
                let started = Instant::now();
                let model = (self.loader)()?;
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "segmentation model loaded");
                Ok(model)
            })
            .map(Arc::clone)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::RgbImage;

    use super::*;
    use crate::error::TillrollError;
    use crate::segmenter::boundary::MaskCandidate;

    struct NullModel;

    impl SegmentationModel for NullModel {
        fn segment_at_point(&self, _image: &RgbImage, _point: (f32, f32)) -> Result<Vec<MaskCandidate>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let shared = SharedModel::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullModel) as DynModel)
        });
        assert!(!shared.is_loaded());
        let a = shared.get().unwrap();
        let b = shared.get().unwrap();
        assert!(shared.is_loaded());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let shared = SharedModel::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TillrollError::Segmentation("weights missing".into()))
            } else {
                Ok(Arc::new(NullModel) as DynModel)
            }
        });
        assert!(shared.get().is_err());
        assert!(!shared.is_loaded());
        assert!(shared.get().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_preloaded_is_loaded() {
        let shared = SharedModel::preloaded(Arc::new(NullModel));
        assert!(shared.is_loaded());
        assert!(shared.get().is_ok());
    }
}
