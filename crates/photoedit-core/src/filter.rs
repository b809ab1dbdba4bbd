//! The uniform filter contract.
//!
//! Every filter has a stable string id and a category, applies typed settings
//! to a source buffer, and may keep a per-session cache. `apply` never mutates
//! its input; it returns a new buffer.
//!
//! Settings and caches are closed sum types. A filter extracts its own
//! variant and rejects foreign settings with `FilterError::SettingsMismatch`;
//! a foreign cache is simply replaced by a fresh one.

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{FilterError, FilterResult};
use crate::executor::RunContext;
use crate::face::FaceDetectionSettings;
use crate::pixel_sort::{PixelSortSettings, SortMaskCache};
use crate::tone::{
    ContrastBrightnessSettings, DitheringSettings, LightnessCache, TemperatureTintSettings,
    UnsharpMaskSettings,
};
use crate::transform::{AffineSettings, ResizeSettings, RotateSettings};

/// Classification used by selection UIs. Carries no behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterCategory {
    CropResize,
    ColorCorrection,
    FaceRecognition,
    Retouch,
    TriPointTransform,
}

/// Settings for one filter invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "kebab-case")]
pub enum FilterSettings {
    Rotate(RotateSettings),
    Resize(ResizeSettings),
    Affine(AffineSettings),
    ContrastAndBrightness(ContrastBrightnessSettings),
    Dithering(DitheringSettings),
    UnsharpMasking(UnsharpMaskSettings),
    TempAndTint(TemperatureTintSettings),
    Grayscale,
    Sepia,
    PixelSorting(PixelSortSettings),
    FaceRecognition(FaceDetectionSettings),
}

impl FilterSettings {
    /// Id of the filter these settings belong to.
    pub fn filter_id(&self) -> &'static str {
        match self {
            FilterSettings::Rotate(_) => crate::transform::rotation::ROTATE_ID,
            FilterSettings::Resize(_) => crate::transform::resize::RESIZE_ID,
            FilterSettings::Affine(_) => crate::transform::affine::AFFINE_ID,
            FilterSettings::ContrastAndBrightness(_) => crate::tone::contrast::CONTRAST_ID,
            FilterSettings::Dithering(_) => crate::tone::dithering::DITHERING_ID,
            FilterSettings::UnsharpMasking(_) => crate::tone::unsharp::UNSHARP_ID,
            FilterSettings::TempAndTint(_) => crate::tone::temperature::TEMP_TINT_ID,
            FilterSettings::Grayscale => crate::tone::grayscale::GRAYSCALE_ID,
            FilterSettings::Sepia => crate::tone::grayscale::SEPIA_ID,
            FilterSettings::PixelSorting(_) => crate::pixel_sort::PIXEL_SORT_ID,
            FilterSettings::FaceRecognition(_) => crate::face::FACE_ID,
        }
    }

    /// Error for settings handed to the wrong filter.
    pub(crate) fn mismatch(&self, filter: &'static str) -> FilterError {
        FilterError::SettingsMismatch {
            filter,
            got: self.filter_id(),
        }
    }
}

/// Per-session memoized state owned by the caller and passed by reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FilterCache {
    #[default]
    Empty,
    ContrastAndBrightness(LightnessCache),
    PixelSorting(SortMaskCache),
}

/// A pixel-level image transformation.
pub trait Filter: Send + Sync {
    /// Stable id used by the registry.
    fn id(&self) -> &'static str;

    fn category(&self) -> FilterCategory;

    /// Canonical default settings.
    fn default_settings(&self) -> FilterSettings;

    /// Apply `settings` to `image`, returning a new buffer.
    ///
    /// # Errors
    ///
    /// `FilterError::Cancelled` when the context's stop token fires,
    /// `FilterError::SettingsMismatch` for another filter's settings, and
    /// filter-specific failures (e.g. a missing cascade model).
    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer>;

    /// Apply the canonical default settings.
    fn apply_defaults(
        &self,
        image: &PixelBuffer,
        cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        self.apply(image, &self.default_settings(), cache, ctx)
    }

    /// Fresh per-session cache. Stateless filters keep the empty default.
    fn build_cache(&self) -> FilterCache {
        FilterCache::Empty
    }
}
