//! Sierra error-diffusion dithering.
//!
//! Each channel is quantized to one of `L` evenly spaced levels and the
//! quantization error is pushed onto not-yet-visited neighbors. Every pixel
//! depends on error already diffused from earlier pixels, so the scan is a
//! single raster-order pass and is never split across workers.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::PixelBuffer;
use crate::color::{alpha, argb, blue, green, red};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const DITHERING_ID: &str = "dithering";

/// Sierra kernel, rows `dy = 0..3`, columns `dx = -2..=2`. Sums to 1.
const SIERRA: [[f64; 5]; 3] = [
    [0.0, 0.0, 0.0, 5.0 / 32.0, 3.0 / 32.0],
    [2.0 / 32.0, 4.0 / 32.0, 5.0 / 32.0, 4.0 / 32.0, 2.0 / 32.0],
    [0.0, 2.0 / 32.0, 3.0 / 32.0, 2.0 / 32.0, 0.0],
];

/// Settings for [`DitheringFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DitheringSettings {
    /// Quantization levels per channel.
    pub levels: u32,
    /// Scale applied to diffused error.
    pub error_multiplier: f64,
}

impl Default for DitheringSettings {
    fn default() -> Self {
        Self {
            levels: 8,
            error_multiplier: 1.0,
        }
    }
}

impl DitheringSettings {
    pub const LEVELS: std::ops::RangeInclusive<u32> = 2..=8;
    pub const ERROR_MULTIPLIER: std::ops::RangeInclusive<f64> = 0.0..=2.0;

    pub fn new(levels: u32, error_multiplier: f64) -> Self {
        Self {
            levels,
            error_multiplier,
        }
    }

    pub fn clamped(&self) -> Self {
        let error_multiplier = if self.error_multiplier.is_nan() {
            Self::default().error_multiplier
        } else {
            self.error_multiplier
                .clamp(*Self::ERROR_MULTIPLIER.start(), *Self::ERROR_MULTIPLIER.end())
        };
        Self {
            levels: self.levels.clamp(*Self::LEVELS.start(), *Self::LEVELS.end()),
            error_multiplier,
        }
    }
}

/// Reduces every channel to a few levels while diffusing the error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DitheringFilter;

impl Filter for DitheringFilter {
    fn id(&self) -> &'static str {
        DITHERING_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::ColorCorrection
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::Dithering(DitheringSettings::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        let FilterSettings::Dithering(requested) = settings else {
            return Err(settings.mismatch(DITHERING_ID));
        };
        let settings = requested.clamped();
        if settings != *requested {
            warn!(filter = DITHERING_ID, ?requested, ?settings, "settings clamped");
        }
        apply_dithering(image, &settings, ctx)
    }
}

/// Evenly spaced channel levels: `min(k * step, 255)` for `k` in `0..levels`.
struct Quantizer {
    step: f64,
    max_index: f64,
}

impl Quantizer {
    fn new(levels: u32) -> Self {
        let levels = levels.max(2);
        Self {
            step: (256 / (levels - 1)) as f64,
            max_index: (levels - 1) as f64,
        }
    }

    /// Nearest level to `v`, rounding halves up.
    #[inline]
    fn quantize(&self, v: f64) -> f64 {
        let index = (v / self.step + 0.5).floor().clamp(0.0, self.max_index);
        (index * self.step).min(255.0)
    }
}

/// Dither `image` in a single raster-order pass.
///
/// The stop token is checked once per row.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn apply_dithering(
    image: &PixelBuffer,
    settings: &DitheringSettings,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let (width, height) = image.dimensions();
    debug!(
        filter = DITHERING_ID,
        width,
        height,
        levels = settings.levels,
        error_multiplier = settings.error_multiplier,
        "dithering"
    );

    let quantizer = Quantizer::new(settings.levels);
    let multiplier = settings.error_multiplier;
    let (w, h) = (width as usize, height as usize);
    let src = image.pixels();
    let mut out = Vec::with_capacity(src.len());

    // Accumulated error per channel, one row per kernel row, rolled as the scan advances
    let mut errors = vec![vec![[0.0f64; 3]; w]; SIERRA.len()];

    for y in 0..h {
        ctx.check()?;
        for x in 0..w {
            let p = src[y * w + x];
            let carried = errors[0][x];
            let mut quantized = [0.0f64; 3];
            let mut residual = [0.0f64; 3];
            for (c, value) in [red(p), green(p), blue(p)].into_iter().enumerate() {
                let v = value as f64 - carried[c] * multiplier;
                quantized[c] = quantizer.quantize(v);
                residual[c] = quantized[c] - v;
            }
            out.push(argb(
                alpha(p),
                quantized[0] as u8,
                quantized[1] as u8,
                quantized[2] as u8,
            ));

            for (dy, weights) in SIERRA.iter().enumerate() {
                for (k, &weight) in weights.iter().enumerate() {
                    if weight == 0.0 {
                        continue;
                    }
                    let nx = x as i64 + k as i64 - 2;
                    if nx < 0 || nx >= w as i64 || y + dy >= h {
                        continue;
                    }
                    for (e, r) in errors[dy][nx as usize].iter_mut().zip(residual) {
                        *e += r * weight;
                    }
                }
            }
        }
        errors.rotate_left(1);
        if let Some(last) = errors.last_mut() {
            last.fill([0.0; 3]);
        }
    }

    Ok(PixelBuffer::from_parts(width, height, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CancelToken, ChunkedExecutor};

    fn ctx() -> RunContext<'static> {
        RunContext::unstoppable(ChunkedExecutor::new(4))
    }

    fn level_set(levels: u32) -> Vec<u8> {
        let q = Quantizer::new(levels);
        (0..levels).map(|k| (k as f64 * q.step).min(255.0) as u8).collect()
    }

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let pixels = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| argb(255, (x * 255 / width.max(1)) as u8, (y * 9) as u8, 100))
            })
            .collect();
        PixelBuffer::new(width, height, pixels).unwrap()
    }

    #[test]
    fn test_kernel_sums_to_one() {
        let sum: f64 = SIERRA.iter().flatten().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_level_sets() {
        assert_eq!(level_set(2), vec![0, 255]);
        assert_eq!(level_set(3), vec![0, 128, 255]);
        assert_eq!(level_set(4), vec![0, 85, 170, 255]);
        assert_eq!(level_set(8), vec![0, 36, 72, 108, 144, 180, 216, 252]);
    }

    #[test]
    fn test_quantize_clamps_to_level_range() {
        let q = Quantizer::new(7);
        // 294 would be an eighth level without the index clamp
        assert_eq!(q.quantize(300.0), 252.0);
        assert_eq!(q.quantize(-40.0), 0.0);
        assert_eq!(q.quantize(21.0), 42.0);
        assert_eq!(q.quantize(20.9), 0.0);
    }

    #[test]
    fn test_two_levels_is_black_and_white() {
        let img = gradient(32, 8);
        let out = apply_dithering(&img, &DitheringSettings::new(2, 1.0), &ctx()).unwrap();
        for &p in out.pixels() {
            for c in [red(p), green(p), blue(p)] {
                assert!(c == 0 || c == 255);
            }
        }
    }

    #[test]
    fn test_error_diffusion_preserves_average() {
        // Mid-gray at two levels should come out roughly half white
        let img = PixelBuffer::filled(64, 64, argb(255, 128, 128, 128));
        let out = apply_dithering(&img, &DitheringSettings::new(2, 1.0), &ctx()).unwrap();
        let white = out.pixels().iter().filter(|&&p| red(p) == 255).count();
        let share = white as f64 / out.len() as f64;
        assert!((0.4..0.6).contains(&share), "white share {}", share);
    }

    #[test]
    fn test_zero_multiplier_is_plain_quantization() {
        let img = gradient(20, 5);
        let out = apply_dithering(&img, &DitheringSettings::new(4, 0.0), &ctx()).unwrap();
        let q = Quantizer::new(4);
        for (&src, &dst) in img.pixels().iter().zip(out.pixels()) {
            assert_eq!(red(dst), q.quantize(red(src) as f64) as u8);
        }
    }

    #[test]
    fn test_alpha_preserved() {
        let img = PixelBuffer::filled(5, 5, argb(77, 10, 200, 90));
        let out = apply_dithering(&img, &DitheringSettings::default(), &ctx()).unwrap();
        assert!(out.pixels().iter().all(|&p| alpha(p) == 77));
    }

    #[test]
    fn test_settings_clamped() {
        assert_eq!(
            DitheringSettings::new(1, 9.0).clamped(),
            DitheringSettings::new(2, 2.0)
        );
        assert_eq!(
            DitheringSettings::new(50, f64::NAN).clamped(),
            DitheringSettings::new(8, 1.0)
        );
    }

    #[test]
    fn test_output_independent_of_workers() {
        let img = gradient(17, 13);
        let settings = DitheringSettings::new(3, 1.3);
        let reference =
            apply_dithering(&img, &settings, &RunContext::unstoppable(ChunkedExecutor::new(1))).unwrap();
        let out =
            apply_dithering(&img, &settings, &RunContext::unstoppable(ChunkedExecutor::new(8))).unwrap();
        assert_eq!(out, reference);
    }

    #[test]
    fn test_cancelled_dithering() {
        let token = CancelToken::new();
        token.cancel();
        let ctx = RunContext::new(ChunkedExecutor::new(1), &token);
        let err = apply_dithering(&gradient(4, 4), &DitheringSettings::default(), &ctx).unwrap_err();
        assert!(err.is_cancelled());
    }
}
