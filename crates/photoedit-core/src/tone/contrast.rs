//! Contrast and brightness in HSV value space.
//!
//! Contrast stretches each pixel's value away from a pivot, brightness
//! shifts it. The pivot is the *modal* lightness of the source: the most
//! populated bucket of a 101-bucket histogram of `max(R, G, B) / 255`.
//! It is computed once per session and kept in a [`LightnessCache`].
//! Hue and saturation pass through untouched, as does alpha.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::buffer::PixelBuffer;
use crate::color::{alpha, max_channel, Hsv};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const CONTRAST_ID: &str = "contrast-and-brightness";

/// Histogram buckets `0..=100`.
const BUCKETS: usize = 101;

/// Settings for [`ContrastBrightnessFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastBrightnessSettings {
    /// Multiplier applied to the distance from the modal lightness.
    pub contrast: f64,
    /// Offset added to the value channel.
    pub brightness: f64,
}

impl Default for ContrastBrightnessSettings {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            brightness: 0.0,
        }
    }
}

impl ContrastBrightnessSettings {
    pub const CONTRAST: std::ops::RangeInclusive<f64> = 0.0..=2.0;
    pub const BRIGHTNESS: std::ops::RangeInclusive<f64> = -1.0..=1.0;

    pub fn new(contrast: f64, brightness: f64) -> Self {
        Self {
            contrast,
            brightness,
        }
    }

    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let clamp = |v: f64, range: &std::ops::RangeInclusive<f64>, fallback: f64| {
            if v.is_nan() {
                fallback
            } else {
                v.clamp(*range.start(), *range.end())
            }
        };
        Self {
            contrast: clamp(self.contrast, &Self::CONTRAST, defaults.contrast),
            brightness: clamp(self.brightness, &Self::BRIGHTNESS, defaults.brightness),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.contrast == 1.0 && self.brightness == 0.0
    }
}

/// Session cache holding the modal lightness once computed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LightnessCache {
    pub modal: Option<f64>,
}

/// Adjusts contrast around the modal lightness and shifts brightness.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContrastBrightnessFilter;

impl Filter for ContrastBrightnessFilter {
    fn id(&self) -> &'static str {
        CONTRAST_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::ColorCorrection
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::ContrastAndBrightness(ContrastBrightnessSettings::default())
    }

    fn build_cache(&self) -> FilterCache {
        FilterCache::ContrastAndBrightness(LightnessCache::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        let FilterSettings::ContrastAndBrightness(requested) = settings else {
            return Err(settings.mismatch(CONTRAST_ID));
        };
        let settings = requested.clamped();
        if settings != *requested {
            warn!(filter = CONTRAST_ID, ?requested, ?settings, "settings clamped");
        }

        let cached = match cache {
            FilterCache::ContrastAndBrightness(lightness) => lightness.modal,
            _ => None,
        };
        let modal = match cached {
            Some(modal) => {
                trace!(filter = CONTRAST_ID, modal, "modal lightness cache hit");
                modal
            }
            None => {
                let modal = modal_lightness(image, ctx)?;
                trace!(filter = CONTRAST_ID, modal, "modal lightness computed");
                *cache = FilterCache::ContrastAndBrightness(LightnessCache { modal: Some(modal) });
                modal
            }
        };

        debug!(
            filter = CONTRAST_ID,
            width = image.width(),
            height = image.height(),
            contrast = settings.contrast,
            brightness = settings.brightness,
            modal,
            "adjusting contrast and brightness"
        );

        if settings.is_identity() {
            ctx.check()?;
            return Ok(image.clone());
        }

        let pixels = ctx.executor().map_pixels(image.pixels(), ctx.stop(), |p| {
            let mut hsv = Hsv::from_argb(p);
            hsv.value = remap_value(hsv.value, modal, settings.contrast, settings.brightness);
            hsv.to_argb(alpha(p))
        })?;

        Ok(PixelBuffer::from_parts(image.width(), image.height(), pixels))
    }
}

/// `clamp01((v - modal) * contrast + modal + brightness)`.
#[inline]
pub fn remap_value(value: f64, modal: f64, contrast: f64, brightness: f64) -> f64 {
    ((value - modal) * contrast + modal + brightness).clamp(0.0, 1.0)
}

/// Most frequent lightness bucket of `image`, as a value in `[0, 1]`.
///
/// Ties resolve to the darker bucket. An empty image reports `0.0`.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn modal_lightness(image: &PixelBuffer, ctx: &RunContext<'_>) -> FilterResult<f64> {
    let pixels = image.pixels();
    let partials = ctx.executor().map_chunks(pixels.len(), ctx.stop(), |range| {
        let mut histogram = [0u64; BUCKETS];
        for &p in &pixels[range] {
            histogram[bucket(p)] += 1;
        }
        histogram
    })?;

    let mut histogram = [0u64; BUCKETS];
    for partial in &partials {
        for (total, count) in histogram.iter_mut().zip(partial.iter()) {
            *total += count;
        }
    }

    let mut best = 0;
    for (i, &count) in histogram.iter().enumerate() {
        if count > histogram[best] {
            best = i;
        }
    }
    Ok(best as f64 / 100.0)
}

#[inline]
fn bucket(pixel: u32) -> usize {
    (max_channel(pixel) as f64 / 255.0 * 100.0).round() as usize
}
