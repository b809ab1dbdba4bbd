//! Photoedit Core - filter engine
//!
//! This crate provides the pixel filters behind the photo editor: geometric
//! transforms (rotate, resize, three-point affine), tone and color filters,
//! pixel sorting and a face-detection adapter, all sharing one contract and
//! one chunked parallel executor with cooperative cancellation.
//!
//! Filters operate on [`PixelBuffer`], a packed `0xAARRGGBB` raster. An
//! [`EditSession`] drives a selected filter in the background and keeps the
//! latest preview.

pub mod buffer;
pub mod color;
pub mod config;
pub mod error;
pub mod executor;
pub mod face;
pub mod filter;
pub mod photo;
pub mod pixel_sort;
pub mod registry;
pub mod session;
pub mod tone;
pub mod transform;

pub use buffer::{PixelBuffer, TRANSPARENT};
pub use config::EngineConfig;
pub use error::{FilterError, FilterResult};
pub use executor::{CancelToken, ChunkedExecutor, RunContext};
pub use face::{
    CascadeClassifier, ClassifierError, ClassifierLoader, DetectionParams, FaceDetectionFilter,
    FaceDetectionSettings, FaceRect,
};
pub use filter::{Filter, FilterCache, FilterCategory, FilterSettings};
pub use photo::{Photo, PhotoStore, StoreError};
pub use pixel_sort::{PixelSortFilter, PixelSortSettings, SortDirection, SortMaskCache};
pub use registry::FilterRegistry;
pub use session::{EditSession, OperationOutcome};
pub use tone::{
    ContrastBrightnessFilter, ContrastBrightnessSettings, DitheringFilter, DitheringSettings,
    GrayscaleFilter, SepiaFilter, TemperatureTintFilter, TemperatureTintSettings,
    UnsharpMaskFilter, UnsharpMaskSettings,
};
pub use transform::{
    AffineFilter, AffineSettings, NormalizedPoint, ResizeFilter, ResizeSettings, RotateFilter,
    RotateSettings,
};
