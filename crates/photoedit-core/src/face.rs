//! Face detection adapter.
//!
//! Detection itself is delegated to an external pre-trained cascade
//! classifier behind [`CascadeClassifier`]; a [`ClassifierLoader`] turns a
//! model path into a ready classifier. This module only fixes the detection
//! parameters and draws an outline around every returned rectangle on a
//! copy of the source.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::buffer::PixelBuffer;
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const FACE_ID: &str = "face-recognition";

/// Opaque yellow.
pub const OUTLINE_COLOR: u32 = 0xFFFF_FF00;

/// Errors reported by the external classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to load cascade model from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Face detection failed: {0}")]
    Detect(String),
}

/// Axis-aligned detection in pixel coordinates. May extend past the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Multi-scale detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Image pyramid step between scales.
    pub scale_factor: f64,
    /// Overlapping candidates required to keep a detection.
    pub min_neighbors: u32,
    /// Smallest window as a fraction of the shorter image side.
    pub min_size_ratio: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size_ratio: 0.2,
        }
    }
}

impl DetectionParams {
    /// Side of the smallest square window for a `width x height` image.
    pub fn min_window(&self, width: u32, height: u32) -> u32 {
        (self.min_size_ratio * width.min(height) as f64) as u32
    }
}

/// A loaded cascade classifier.
pub trait CascadeClassifier: Send {
    /// Detect objects at every scale, ignoring windows smaller than `min_window` pixels.
    fn detect_multi_scale(
        &self,
        image: &PixelBuffer,
        params: &DetectionParams,
        min_window: u32,
    ) -> Result<Vec<FaceRect>, ClassifierError>;
}

/// Loads a classifier model from disk.
pub trait ClassifierLoader: Send + Sync {
    fn load(&self, model_path: &Path) -> Result<Box<dyn CascadeClassifier>, ClassifierError>;
}

/// Settings for [`FaceDetectionFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionSettings {
    /// Outline thickness beyond the first pixel.
    pub border_width: u32,
}

impl Default for FaceDetectionSettings {
    fn default() -> Self {
        Self { border_width: 5 }
    }
}

impl FaceDetectionSettings {
    pub const BORDER_WIDTH: std::ops::RangeInclusive<u32> = 0..=20;

    pub fn new(border_width: u32) -> Self {
        Self { border_width }
    }

    pub fn clamped(&self) -> Self {
        Self::new(
            self.border_width
                .clamp(*Self::BORDER_WIDTH.start(), *Self::BORDER_WIDTH.end()),
        )
    }
}

/// Outlines detected faces.
///
/// The model is loaded on every invocation; a failed load or detection
/// fails that invocation and is not retried.
#[derive(Clone)]
pub struct FaceDetectionFilter {
    loader: Arc<dyn ClassifierLoader>,
    model_path: PathBuf,
    params: DetectionParams,
}

impl FaceDetectionFilter {
    pub fn new(loader: Arc<dyn ClassifierLoader>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            model_path: model_path.into(),
            params: DetectionParams::default(),
        }
    }

    pub fn with_params(mut self, params: DetectionParams) -> Self {
        self.params = params;
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }
}

impl fmt::Debug for FaceDetectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceDetectionFilter")
            .field("model_path", &self.model_path)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Filter for FaceDetectionFilter {
    fn id(&self) -> &'static str {
        FACE_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::FaceRecognition
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::FaceRecognition(FaceDetectionSettings::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        let FilterSettings::FaceRecognition(requested) = settings else {
            return Err(settings.mismatch(FACE_ID));
        };
        let settings = requested.clamped();
        if settings != *requested {
            warn!(filter = FACE_ID, ?requested, ?settings, "settings clamped");
        }

        ctx.check()?;
        let classifier = self.loader.load(&self.model_path)?;
        ctx.check()?;

        let min_window = self.params.min_window(image.width(), image.height());
        let faces = classifier.detect_multi_scale(image, &self.params, min_window)?;
        debug!(
            filter = FACE_ID,
            width = image.width(),
            height = image.height(),
            min_window,
            faces = faces.len(),
            "faces detected"
        );

        let mut out = image.clone();
        for rect in &faces {
            ctx.check()?;
            draw_outline(&mut out, rect, settings.border_width);
        }
        Ok(out)
    }
}

/// Draw `rect` with edges `border_width + 1` pixels thick, clipped to the buffer.
///
/// The top and left edges grow inward, the bottom and right edges outward.
pub fn draw_outline(image: &mut PixelBuffer, rect: &FaceRect, border_width: u32) {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let (x, y) = (rect.x as i64, rect.y as i64);
    let (rw, rh) = (rect.width as i64, rect.height as i64);
    let border = border_width as i64;

    let mut plot = |px: i64, py: i64| {
        if (0..w).contains(&px) && (0..h).contains(&py) {
            image.set_pixel(px as u32, py as u32, OUTLINE_COLOR);
        }
    };

    for col in x.clamp(0, w)..(x + rw).clamp(0, w) {
        for add in 0..=border {
            plot(col, y + add);
            plot(col, y + rh + add);
        }
    }
    for row in y.clamp(0, h)..(y + rh).clamp(0, h) {
        for add in 0..=border {
            plot(x + add, row);
            plot(x + rw + add, row);
        }
    }
}
