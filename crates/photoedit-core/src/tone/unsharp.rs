//! Unsharp masking.
//!
//! The source is blurred with a separable Gaussian, and every pixel whose
//! difference from its blurred self exceeds the threshold in any channel
//! gets that difference, scaled by `amount`, added back.
//!
//! The blur runs as two passes over row chunks: horizontal into an `f64`
//! scratch buffer, then vertical fused with the sharpening step. Taps that
//! fall outside the raster are skipped and the remaining weights
//! renormalized, so a flat region stays flat up to the border.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::PixelBuffer;
use crate::color::{alpha, argb, blue, clamp_channel, green, red};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const UNSHARP_ID: &str = "unsharp-masking";

/// Radii at or below this produce the identity kernel.
const MIN_RADIUS: f64 = 0.001;

/// Settings for [`UnsharpMaskFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsharpMaskSettings {
    /// Strength of the added detail.
    pub amount: f64,
    /// Blur radius in pixels, `sigma = radius / 3`.
    pub radius: f64,
    /// Minimum per-channel difference that triggers sharpening.
    pub threshold: f64,
}

impl Default for UnsharpMaskSettings {
    fn default() -> Self {
        Self {
            amount: 1.0,
            radius: 1.0,
            threshold: 128.0,
        }
    }
}

impl UnsharpMaskSettings {
    pub const AMOUNT: std::ops::RangeInclusive<f64> = 0.0..=5.0;
    pub const RADIUS: std::ops::RangeInclusive<f64> = 0.0..=5.0;
    pub const THRESHOLD: std::ops::RangeInclusive<f64> = 0.0..=255.0;

    pub fn new(amount: f64, radius: f64, threshold: f64) -> Self {
        Self {
            amount,
            radius,
            threshold,
        }
    }

    pub fn clamped(&self) -> Self {
        let d = Self::default();
        let clamp = |v: f64, range: std::ops::RangeInclusive<f64>, fallback: f64| {
            if v.is_nan() {
                fallback
            } else {
                v.clamp(*range.start(), *range.end())
            }
        };
        Self {
            amount: clamp(self.amount, Self::AMOUNT, d.amount),
            radius: clamp(self.radius, Self::RADIUS, d.radius),
            threshold: clamp(self.threshold, Self::THRESHOLD, d.threshold),
        }
    }
}

/// Sharpens edges by adding back the difference from a blurred copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsharpMaskFilter;

impl Filter for UnsharpMaskFilter {
    fn id(&self) -> &'static str {
        UNSHARP_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::ColorCorrection
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::UnsharpMasking(UnsharpMaskSettings::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        let FilterSettings::UnsharpMasking(requested) = settings else {
            return Err(settings.mismatch(UNSHARP_ID));
        };
        let settings = requested.clamped();
        if settings != *requested {
            warn!(filter = UNSHARP_ID, ?requested, ?settings, "settings clamped");
        }
        apply_unsharp_mask(image, &settings, ctx)
    }
}

/// Generate a normalized 1D Gaussian kernel of `2 * ceil(radius) + 1` taps.
///
/// # Arguments
/// * `radius` - Blur radius in pixels; the standard deviation is `radius / 3`
///
/// # Returns
/// The identity kernel `[1.0]` for radii at or below 0.001.
pub fn gaussian_kernel_1d(radius: f64) -> Vec<f64> {
    if radius.is_nan() || radius <= MIN_RADIUS {
        return vec![1.0];
    }

    let sigma = radius / 3.0;
    let half = radius.ceil() as i64;

    let mut kernel: Vec<f64> = (-half..=half)
        .map(|i| {
            let x = i as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for v in kernel.iter_mut() {
        *v /= sum;
    }

    kernel
}

/// Weighted RGB average of the kernel taps around `center` that fall inside `0..len`.
#[inline]
fn convolve<F>(kernel: &[f64], center: i64, len: usize, fetch: F) -> [f64; 3]
where
    F: Fn(usize) -> [f64; 3],
{
    let half = (kernel.len() / 2) as i64;
    let mut sum = [0.0f64; 3];
    let mut weight_sum = 0.0;
    for (k, &weight) in kernel.iter().enumerate() {
        let pos = center + k as i64 - half;
        if pos < 0 || pos >= len as i64 {
            continue;
        }
        let rgb = fetch(pos as usize);
        for (s, v) in sum.iter_mut().zip(rgb) {
            *s += v * weight;
        }
        weight_sum += weight;
    }
    if weight_sum > 0.0 {
        for s in sum.iter_mut() {
            *s /= weight_sum;
        }
    }
    sum
}

/// Round half up, matching the rounding of the blurred and scaled differences.
#[inline]
fn round_half_up(v: f64) -> i32 {
    (v + 0.5).floor() as i32
}

/// Apply unsharp masking to `image`.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn apply_unsharp_mask(
    image: &PixelBuffer,
    settings: &UnsharpMaskSettings,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let kernel = gaussian_kernel_1d(settings.radius);
    let (width, height) = image.dimensions();
    debug!(
        filter = UNSHARP_ID,
        width,
        height,
        amount = settings.amount,
        radius = settings.radius,
        threshold = settings.threshold,
        taps = kernel.len(),
        "unsharp masking"
    );

    // Blur of anything with a single-tap kernel is the image itself
    if kernel.len() == 1 || image.is_empty() {
        ctx.check()?;
        return Ok(image.clone());
    }

    let (w, h) = (width as usize, height as usize);
    let src = image.pixels();
    let rgb = |p: u32| [red(p) as f64, green(p) as f64, blue(p) as f64];

    let mut horizontal = vec![[0.0f64; 3]; w * h];
    ctx.executor()
        .for_each_chunk_mut(&mut horizontal, w, ctx.stop(), |first_row, rows| {
            for (r, row) in rows.chunks_mut(w).enumerate() {
                let line = &src[(first_row + r) * w..(first_row + r + 1) * w];
                for (x, out) in row.iter_mut().enumerate() {
                    *out = convolve(&kernel, x as i64, w, |i| rgb(line[i]));
                }
            }
        })?;

    let amount = settings.amount;
    let threshold = settings.threshold;
    let horizontal = &horizontal;
    let pixels = ctx.executor().map_indices(w * h, ctx.stop(), |i| {
        let (x, y) = (i % w, i / w);
        let blurred = convolve(&kernel, y as i64, h, |row| horizontal[row * w + x]);

        let p = src[i];
        let original = [red(p) as i32, green(p) as i32, blue(p) as i32];
        let diff: [i32; 3] =
            std::array::from_fn(|c| original[c] - round_half_up(blurred[c].clamp(0.0, 255.0)));

        if diff.iter().any(|d| d.abs() as f64 > threshold) {
            let sharpen = |c: usize| clamp_channel(original[c] + round_half_up(amount * diff[c] as f64));
            argb(alpha(p), sharpen(0), sharpen(1), sharpen(2))
        } else {
            p
        }
    })?;

    Ok(PixelBuffer::from_parts(width, height, pixels))
}
