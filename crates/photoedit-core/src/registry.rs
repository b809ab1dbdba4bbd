//! Id-keyed catalogue of filter instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::face::{ClassifierLoader, FaceDetectionFilter};
use crate::filter::{Filter, FilterCategory};
use crate::pixel_sort::PixelSortFilter;
use crate::tone::{
    ContrastBrightnessFilter, DitheringFilter, GrayscaleFilter, SepiaFilter, TemperatureTintFilter,
    UnsharpMaskFilter,
};
use crate::transform::{AffineFilter, ResizeFilter, RotateFilter};

/// Maps stable filter ids to shared filter instances.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: BTreeMap<&'static str, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// Registry with no filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in filter that needs no external resources.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RotateFilter));
        registry.register(Arc::new(ResizeFilter));
        registry.register(Arc::new(AffineFilter));
        registry.register(Arc::new(ContrastBrightnessFilter));
        registry.register(Arc::new(DitheringFilter));
        registry.register(Arc::new(UnsharpMaskFilter));
        registry.register(Arc::new(TemperatureTintFilter));
        registry.register(Arc::new(GrayscaleFilter));
        registry.register(Arc::new(SepiaFilter));
        registry.register(Arc::new(PixelSortFilter));
        registry
    }

    /// Standard filters plus face detection when both a model path and a loader are available.
    pub fn from_config(config: &EngineConfig, loader: Option<Arc<dyn ClassifierLoader>>) -> Self {
        let mut registry = Self::standard();
        match (&config.cascade_model_path, loader) {
            (Some(path), Some(loader)) => {
                registry.register(Arc::new(
                    FaceDetectionFilter::new(loader, path.clone()).with_params(config.detection),
                ));
            }
            (Some(path), None) => {
                warn!(model = %path.display(), "cascade model configured without a loader; face detection disabled");
            }
            (None, _) => {}
        }
        debug!(filters = registry.len(), "filter registry built");
        registry
    }

    /// Add a filter under its own id.
    ///
    /// # Panics
    ///
    /// Panics if a filter with the same id is already registered.
    pub fn register(&mut self, filter: Arc<dyn Filter>) {
        let id = filter.id();
        let previous = self.filters.insert(id, filter);
        assert!(previous.is_none(), "filter `{id}` registered twice");
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(id)
    }

    /// Look up a filter that must exist.
    ///
    /// # Panics
    ///
    /// Panics on an unknown id.
    pub fn filter(&self, id: &str) -> &Arc<dyn Filter> {
        match self.filters.get(id) {
            Some(filter) => filter,
            None => panic!("unknown filter id `{id}`"),
        }
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.filters.keys().copied()
    }

    pub fn by_category(&self, category: FilterCategory) -> Vec<&Arc<dyn Filter>> {
        self.filters
            .values()
            .filter(|f| f.category() == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelBuffer;
    use crate::face::{CascadeClassifier, ClassifierError, DetectionParams, FaceRect, FACE_ID};
    use crate::filter::FilterCache;
    use crate::executor::{ChunkedExecutor, RunContext};
    use std::path::Path;

    struct NoFaces;

    impl CascadeClassifier for NoFaces {
        fn detect_multi_scale(
            &self,
            _image: &PixelBuffer,
            _params: &DetectionParams,
            _min_window: u32,
        ) -> Result<Vec<FaceRect>, ClassifierError> {
            Ok(Vec::new())
        }
    }

    struct NoFacesLoader;

    impl ClassifierLoader for NoFacesLoader {
        fn load(&self, _model_path: &Path) -> Result<Box<dyn CascadeClassifier>, ClassifierError> {
            Ok(Box::new(NoFaces))
        }
    }

    #[test]
    fn test_standard_registry_ids() {
        let registry = FilterRegistry::standard();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(
            ids,
            vec![
                "affine",
                "contrast-and-brightness",
                "dithering",
                "grayscale",
                "pixel-sorting",
                "resize",
                "rotate",
                "sepia",
                "temp-and-tint",
                "unsharp-masking",
            ]
        );
        assert!(registry.get(FACE_ID).is_none());
    }

    #[test]
    fn test_every_filter_accepts_its_defaults() {
        let registry = FilterRegistry::standard();
        let ctx = RunContext::unstoppable(ChunkedExecutor::new(2));
        let img = PixelBuffer::filled(6, 4, 0xFF80_4020);
        for id in registry.ids() {
            let filter = registry.filter(id);
            assert_eq!(filter.default_settings().filter_id(), id);
            let mut cache = filter.build_cache();
            let out = filter.apply_defaults(&img, &mut cache, &ctx);
            assert!(out.is_ok(), "{id}: {:?}", out.err());
        }
    }

    #[test]
    fn test_categories() {
        let registry = FilterRegistry::standard();
        let crop: Vec<_> = registry
            .by_category(FilterCategory::CropResize)
            .iter()
            .map(|f| f.id())
            .collect();
        assert_eq!(crop, vec!["resize", "rotate"]);
        assert_eq!(registry.by_category(FilterCategory::TriPointTransform).len(), 1);
        assert_eq!(registry.by_category(FilterCategory::ColorCorrection).len(), 7);
        assert!(registry.by_category(FilterCategory::Retouch).is_empty());
    }

    #[test]
    fn test_from_config_with_face_detection() {
        let config = EngineConfig {
            cascade_model_path: Some("cascade.xml".into()),
            ..Default::default()
        };
        let registry = FilterRegistry::from_config(&config, Some(Arc::new(NoFacesLoader)));
        assert_eq!(registry.len(), 11);

        let face = registry.filter(FACE_ID);
        assert_eq!(face.category(), FilterCategory::FaceRecognition);
        let img = PixelBuffer::filled(4, 4, 0xFF00_0000);
        let out = face
            .apply_defaults(
                &img,
                &mut FilterCache::Empty,
                &RunContext::unstoppable(ChunkedExecutor::sequential()),
            )
            .unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_from_config_without_loader() {
        let config = EngineConfig {
            cascade_model_path: Some("cascade.xml".into()),
            ..Default::default()
        };
        let registry = FilterRegistry::from_config(&config, None);
        assert_eq!(registry.len(), FilterRegistry::standard().len());
        assert!(!registry.is_empty());
        assert!(FilterRegistry::new().is_empty());
    }

    #[test]
    #[should_panic(expected = "unknown filter id")]
    fn test_unknown_id_panics() {
        FilterRegistry::standard().filter("vignette");
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_register_panics() {
        let mut registry = FilterRegistry::standard();
        registry.register(Arc::new(SepiaFilter));
    }
}
