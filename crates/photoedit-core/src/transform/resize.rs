//! Uniform image scaling.
//!
//! Magnification and mild minification (`c > 0.5`) resample the source
//! bilinearly on the new grid. Stronger minification blends two
//! box-downsampled levels that bracket the reduction ratio, mip-map style,
//! so that detail finer than the new grid averages out instead of aliasing.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sample_bilinear;
use crate::buffer::{PixelBuffer, TRANSPARENT};
use crate::color::{alpha, argb, blue, green, red};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const RESIZE_ID: &str = "resize";

/// Coefficients this close to 1 leave the image untouched.
const IDENTITY_EPSILON: f64 = 0.01;

/// At or below this coefficient the trilinear path is used.
const TRILINEAR_THRESHOLD: f64 = 0.5;

/// Settings for [`ResizeFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeSettings {
    /// Scale factor applied to both dimensions.
    pub coefficient: f64,
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self { coefficient: 1.0 }
    }
}

impl ResizeSettings {
    pub const COEFFICIENT: std::ops::RangeInclusive<f64> = 0.05..=4.0;

    pub fn new(coefficient: f64) -> Self {
        Self { coefficient }
    }

    /// The coefficient clamped into [`Self::COEFFICIENT`].
    pub fn clamped(&self) -> f64 {
        if self.coefficient.is_nan() {
            return 1.0;
        }
        self.coefficient
            .clamp(*Self::COEFFICIENT.start(), *Self::COEFFICIENT.end())
    }
}

/// Scales the image by a single coefficient.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizeFilter;

impl Filter for ResizeFilter {
    fn id(&self) -> &'static str {
        RESIZE_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::CropResize
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::Resize(ResizeSettings::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        let FilterSettings::Resize(s) = settings else {
            return Err(settings.mismatch(RESIZE_ID));
        };
        let coefficient = s.clamped();
        if coefficient != s.coefficient {
            warn!(
                filter = RESIZE_ID,
                requested = s.coefficient,
                coefficient,
                "resize coefficient clamped"
            );
        }
        apply_resize(image, coefficient, ctx)
    }
}

/// Scale `image` by `coefficient`.
///
/// # Arguments
///
/// * `image` - The source image
/// * `coefficient` - Scale factor, expected in `ResizeSettings::COEFFICIENT`
/// * `ctx` - Executor and stop token
///
/// # Returns
///
/// A new buffer of `round(w * c) x round(h * c)` (at least 1x1), or a copy
/// of the source when `c` is within 0.01 of 1.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn apply_resize(
    image: &PixelBuffer,
    coefficient: f64,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    if image.is_empty() || (coefficient - 1.0).abs() < IDENTITY_EPSILON {
        ctx.check()?;
        return Ok(image.clone());
    }

    let (width, height) = image.dimensions();
    let new_width = ((width as f64 * coefficient).round() as u32).max(1);
    let new_height = ((height as f64 * coefficient).round() as u32).max(1);

    if coefficient <= TRILINEAR_THRESHOLD {
        debug!(
            filter = RESIZE_ID,
            width, height, new_width, new_height, "trilinear resize"
        );
        trilinear_resize(image, new_width, new_height, ctx)
    } else {
        debug!(
            filter = RESIZE_ID,
            width, height, new_width, new_height, "bilinear resize"
        );
        bilinear_resize(image, new_width, new_height, ctx)
    }
}

/// Position of grid index `i` on a `[0, 1]` axis with `n` samples.
#[inline]
fn grid_fraction(i: usize, n: u32) -> f64 {
    if n <= 1 {
        0.0
    } else {
        i as f64 / (n - 1) as f64
    }
}

fn bilinear_resize(
    image: &PixelBuffer,
    new_width: u32,
    new_height: u32,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let max_x = (image.width() - 1) as f64;
    let max_y = (image.height() - 1) as f64;
    let stride = new_width as usize;

    let pixels = ctx
        .executor()
        .map_indices(stride * new_height as usize, ctx.stop(), |i| {
            let u = grid_fraction(i % stride, new_width) * max_x;
            let v = grid_fraction(i / stride, new_height) * max_y;
            sample_bilinear(image, u, v)
        })?;

    Ok(PixelBuffer::from_parts(new_width, new_height, pixels))
}

fn trilinear_resize(
    image: &PixelBuffer,
    new_width: u32,
    new_height: u32,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let scale = if new_width > 1 {
        (image.width() - 1) as f64 / (new_width - 1) as f64
    } else {
        image.width() as f64
    };
    // Weight of the finer level
    let between = 1.0 - scale.fract();
    let coarse_radius = ((scale.ceil() / 2.0) as u32).max(1);
    let fine_radius = ((scale.floor() / 2.0) as u32).max(1);

    let coarse = box_downsample(image, coarse_radius, ctx)?;
    let fine = if fine_radius == coarse_radius {
        None
    } else {
        Some(box_downsample(image, fine_radius, ctx)?)
    };
    let fine = fine.as_ref().unwrap_or(&coarse);

    let stride = new_width as usize;
    let pixels = ctx
        .executor()
        .map_indices(stride * new_height as usize, ctx.stop(), |i| {
            let u = grid_fraction(i % stride, new_width);
            let v = grid_fraction(i / stride, new_height);
            let a = sample_level(&coarse, u, v);
            let b = sample_level(fine, u, v);
            lerp_color(a, b, between)
        })?;

    Ok(PixelBuffer::from_parts(new_width, new_height, pixels))
}

#[inline]
fn sample_level(level: &PixelBuffer, u: f64, v: f64) -> u32 {
    let x = u * (level.width() - 1) as f64;
    let y = v * (level.height() - 1) as f64;
    sample_bilinear(level, x, y)
}

/// Build a reduction level of `w / radius x h / radius` where every sample
/// is the box average around `(x * radius, y * radius)`.
fn box_downsample(
    image: &PixelBuffer,
    radius: u32,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let level_width = (image.width() / radius).max(1);
    let level_height = (image.height() / radius).max(1);
    let stride = level_width as usize;

    let pixels = ctx
        .executor()
        .map_indices(stride * level_height as usize, ctx.stop(), |i| {
            let x = (i % stride) as i64 * radius as i64;
            let y = (i / stride) as i64 * radius as i64;
            box_average(image, x, y, radius as i64)
        })?;

    Ok(PixelBuffer::from_parts(level_width, level_height, pixels))
}

/// Integer channel average of the `(2r+1)^2` window at `(cx, cy)`.
/// Samples outside the raster are skipped, not zero-padded.
fn box_average(image: &PixelBuffer, cx: i64, cy: i64, radius: i64) -> u32 {
    let mut sums = [0u32; 4];
    let mut count = 0u32;

    for y in cy - radius..=cy + radius {
        for x in cx - radius..=cx + radius {
            if let Some(p) = image.pixel_signed(x, y) {
                sums[0] += alpha(p) as u32;
                sums[1] += red(p) as u32;
                sums[2] += green(p) as u32;
                sums[3] += blue(p) as u32;
                count += 1;
            }
        }
    }

    if count == 0 {
        return TRANSPARENT;
    }
    argb(
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
        (sums[3] / count) as u8,
    )
}

/// Per-channel `a * (1 - t) + b * t`, rounded.
#[inline]
fn lerp_color(a: u32, b: u32, t: f64) -> u32 {
    let mix = |x: u8, y: u8| (x as f64 * (1.0 - t) + y as f64 * t).round().clamp(0.0, 255.0) as u8;
    argb(
        mix(alpha(a), alpha(b)),
        mix(red(a), red(b)),
        mix(green(a), green(b)),
        mix(blue(a), blue(b)),
    )
}
