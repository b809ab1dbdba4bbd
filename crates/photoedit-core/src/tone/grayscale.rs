//! Grayscale and sepia. Neither has settings.

use tracing::debug;

use crate::buffer::PixelBuffer;
use crate::color::{alpha, argb, blue, clamp_channel, green, luma, red};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const GRAYSCALE_ID: &str = "grayscale";
pub const SEPIA_ID: &str = "sepia";

/// Replace RGB with the truncated luma.
#[inline]
pub fn grayscale_pixel(p: u32) -> u32 {
    let gray = luma(red(p), green(p), blue(p)) as u8;
    argb(alpha(p), gray, gray, gray)
}

/// Luma plus a warm chroma shift derived from the classic sepia matrix.
#[inline]
pub fn sepia_pixel(p: u32) -> u32 {
    let (r, g, b) = (red(p) as f64, green(p) as f64, blue(p) as f64);
    let l = luma(red(p), green(p), blue(p));

    let sr = 0.393 * r + 0.769 * g + 0.189 * b;
    let sg = 0.349 * r + 0.686 * g + 0.168 * b;
    let sb = 0.272 * r + 0.534 * g + 0.131 * b;

    let rg = sr - sg;
    let gb = sg - sb;
    let ar = rg * 0.7 + gb * 0.11;
    let ag = ar - rg;
    let ab = ar - rg - gb;

    argb(
        alpha(p),
        clamp_channel((l + ar) as i32),
        clamp_channel((l + ag) as i32),
        clamp_channel((l + ab) as i32),
    )
}

fn map_image(
    id: &'static str,
    image: &PixelBuffer,
    ctx: &RunContext<'_>,
    f: fn(u32) -> u32,
) -> FilterResult<PixelBuffer> {
    debug!(filter = id, width = image.width(), height = image.height(), "per-pixel map");
    let pixels = ctx.executor().map_pixels(image.pixels(), ctx.stop(), f)?;
    Ok(PixelBuffer::from_parts(image.width(), image.height(), pixels))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleFilter;

impl Filter for GrayscaleFilter {
    fn id(&self) -> &'static str {
        GRAYSCALE_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::ColorCorrection
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::Grayscale
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        match settings {
            FilterSettings::Grayscale => map_image(GRAYSCALE_ID, image, ctx, grayscale_pixel),
            other => Err(other.mismatch(GRAYSCALE_ID)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SepiaFilter;

impl Filter for SepiaFilter {
    fn id(&self) -> &'static str {
        SEPIA_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::ColorCorrection
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::Sepia
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        match settings {
            FilterSettings::Sepia => map_image(SEPIA_ID, image, ctx, sepia_pixel),
            other => Err(other.mismatch(SEPIA_ID)),
        }
    }
}
