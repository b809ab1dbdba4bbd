//! Image rotation with bilinear interpolation onto an expanded canvas.
//!
//! # Algorithm
//!
//! The rotation uses inverse mapping around pixel centers: for each pixel in
//! the output canvas, we calculate which source position it came from and
//! interpolate the four surrounding source pixels.
//!
//! ```text
//! rx = dst_x + 0.5 - dst_cx,  ry = dst_y + 0.5 - dst_cy
//! src_x =  rx * cos(θ) + ry * sin(θ) + src_cx - 0.5
//! src_y = -rx * sin(θ) + ry * cos(θ) + src_cy - 0.5
//! ```
//!
//! Source positions inside `(-1, width) x (-1, height)` are sampled, anything
//! else stays transparent.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sample_bilinear;
use crate::buffer::{PixelBuffer, TRANSPARENT};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const ROTATE_ID: &str = "rotate";

/// Angles closer than this to a multiple of 360 degrees are treated as no rotation.
const ANGLE_EPSILON: f64 = 0.001;

/// Settings for [`RotateFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RotateSettings {
    /// Signed angle in degrees, positive = clockwise.
    pub degrees: f64,
}

impl RotateSettings {
    /// Declared range. Values outside it are wrapped by whole turns.
    pub const DEGREES: std::ops::RangeInclusive<f64> = -90.0..=270.0;

    pub fn new(degrees: f64) -> Self {
        Self { degrees }
    }

    /// The angle wrapped into `[-90, 270)`.
    pub fn effective_degrees(&self) -> f64 {
        if !self.degrees.is_finite() {
            return 0.0;
        }
        let lo = *Self::DEGREES.start();
        (self.degrees - lo).rem_euclid(360.0) + lo
    }
}

/// Rotates the image about its center onto a canvas that fits every corner.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotateFilter;

impl Filter for RotateFilter {
    fn id(&self) -> &'static str {
        ROTATE_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::CropResize
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::Rotate(RotateSettings::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        match settings {
            FilterSettings::Rotate(s) => apply_rotation(image, s.effective_degrees(), ctx),
            other => Err(other.mismatch(ROTATE_ID)),
        }
    }
}

/// Compute the dimensions of the bounding box for a rotated image.
///
/// When an image is rotated, the corners extend beyond the original bounds.
/// This function calculates the minimum bounding box that contains the
/// entire rotated image:
///
/// ```text
/// new_w = round(w * |cos θ| + h * |sin θ|)
/// new_h = round(w * |sin θ| + h * |cos θ|)
/// ```
///
/// Quarter turns are special-cased so they swap or keep dimensions exactly.
pub fn compute_rotated_bounds(width: u32, height: u32, angle_degrees: f64) -> (u32, u32) {
    let angle_normalized = angle_degrees.rem_euclid(360.0);

    // Fast path: no rotation needed (including near-zero and multiples of 360)
    if angle_normalized < ANGLE_EPSILON || 360.0 - angle_normalized < ANGLE_EPSILON {
        return (width, height);
    }

    // Fast path: exact 90/270 degree rotations (swap dimensions)
    if (angle_normalized - 90.0).abs() < ANGLE_EPSILON
        || (angle_normalized - 270.0).abs() < ANGLE_EPSILON
    {
        return (height, width);
    }

    // Fast path: exact 180 degree rotation (same dimensions)
    if (angle_normalized - 180.0).abs() < ANGLE_EPSILON {
        return (width, height);
    }

    let angle_rad = angle_degrees.to_radians();
    let cos = angle_rad.cos().abs();
    let sin = angle_rad.sin().abs();

    let w = width as f64;
    let h = height as f64;

    let new_w = (w * cos + h * sin).round() as u32;
    let new_h = (w * sin + h * cos).round() as u32;

    (new_w.max(1), new_h.max(1))
}

/// Rotate an image about its center.
///
/// The output canvas is expanded to fit the entire rotated image (no
/// clipping). A rotation by a whole number of turns returns an exact copy.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn apply_rotation(
    image: &PixelBuffer,
    angle_degrees: f64,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let turns = angle_degrees.rem_euclid(360.0);
    if image.is_empty() || turns < ANGLE_EPSILON || 360.0 - turns < ANGLE_EPSILON {
        ctx.check()?;
        return Ok(image.clone());
    }

    let (src_w, src_h) = image.dimensions();
    let (dst_w, dst_h) = compute_rotated_bounds(src_w, src_h, angle_degrees);
    debug!(
        filter = ROTATE_ID,
        angle_degrees, src_w, src_h, dst_w, dst_h, "rotating image"
    );

    let angle_rad = angle_degrees.to_radians();
    let cos = angle_rad.cos();
    let sin = angle_rad.sin();

    // Center of source and destination images
    let src_cx = src_w as f64 / 2.0;
    let src_cy = src_h as f64 / 2.0;
    let dst_cx = dst_w as f64 / 2.0;
    let dst_cy = dst_h as f64 / 2.0;

    let (src_wf, src_hf) = (src_w as f64, src_h as f64);
    let stride = dst_w as usize;

    let pixels = ctx.executor().map_indices(stride * dst_h as usize, ctx.stop(), |i| {
        let dst_x = (i % stride) as f64;
        let dst_y = (i / stride) as f64;

        // Translate destination pixel center to origin at canvas center
        let rx = dst_x + 0.5 - dst_cx;
        let ry = dst_y + 0.5 - dst_cy;

        // Apply inverse rotation to find source coordinates
        let src_x = rx * cos + ry * sin + src_cx - 0.5;
        let src_y = -rx * sin + ry * cos + src_cy - 0.5;

        if src_x > -1.0 && src_x < src_wf && src_y > -1.0 && src_y < src_hf {
            sample_bilinear(image, src_x, src_y)
        } else {
            TRANSPARENT
        }
    })?;

    Ok(PixelBuffer::from_parts(dst_w, dst_h, pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{alpha, argb};
    use crate::executor::{CancelToken, ChunkedExecutor};

    /// Create a simple test image with a gradient pattern.
    fn test_image(width: u32, height: u32) -> PixelBuffer {
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = ((x + y) * 8) as u8;
                pixels.push(argb(255, v, v / 2, 255 - v));
            }
        }
        PixelBuffer::new(width, height, pixels).unwrap()
    }

    fn ctx() -> RunContext<'static> {
        RunContext::unstoppable(ChunkedExecutor::new(4))
    }

    #[test]
    fn test_no_rotation_is_identity() {
        let img = test_image(100, 50);
        let result = apply_rotation(&img, 0.0, &ctx()).unwrap();
        assert_eq!(result, img);
    }

    #[test]
    fn test_full_turn_is_identity() {
        let img = test_image(30, 20);
        assert_eq!(apply_rotation(&img, 360.0, &ctx()).unwrap(), img);
        assert_eq!(apply_rotation(&img, -720.0, &ctx()).unwrap(), img);
    }

    #[test]
    fn test_tiny_rotation_fast_path() {
        let img = test_image(100, 50);
        let result = apply_rotation(&img, 0.0001, &ctx()).unwrap();
        assert_eq!(result.dimensions(), (100, 50));
    }

    #[test]
    fn test_90_degree_rotation_bounds() {
        assert_eq!(compute_rotated_bounds(100, 50, 90.0), (50, 100));
    }

    #[test]
    fn test_180_degree_rotation_bounds() {
        assert_eq!(compute_rotated_bounds(100, 50, 180.0), (100, 50));
    }

    #[test]
    fn test_270_degree_rotation_bounds() {
        assert_eq!(compute_rotated_bounds(100, 50, 270.0), (50, 100));
        assert_eq!(compute_rotated_bounds(100, 50, -90.0), (50, 100));
    }

    #[test]
    fn test_45_degree_rotation_bounds() {
        let (w, h) = compute_rotated_bounds(100, 100, 45.0);
        // Diagonal of 100x100 square is ~141.4
        assert!(w > 140 && w < 143, "width was {}", w);
        assert!(h > 140 && h < 143, "height was {}", h);
    }

    #[test]
    fn test_opposite_rotations_same_bounds() {
        assert_eq!(
            compute_rotated_bounds(100, 80, 30.0),
            compute_rotated_bounds(100, 80, -30.0)
        );
    }

    #[test]
    fn test_full_turn_offset_same_bounds() {
        for angle in [-89.0, -30.0, 0.0, 17.5, 45.0, 90.0, 133.0, 200.0, 269.0] {
            assert_eq!(
                compute_rotated_bounds(120, 70, angle),
                compute_rotated_bounds(120, 70, angle + 360.0),
                "angle {}",
                angle
            );
        }
    }

    #[test]
    fn test_bounds_never_zero() {
        for angle in [1.0, 15.0, 45.0, 89.0, 90.0, 135.0, 179.0, 180.0, 270.0, 359.0] {
            let (w, h) = compute_rotated_bounds(10, 10, angle);
            assert!(w > 0, "Width should be > 0 for angle {}", angle);
            assert!(h > 0, "Height should be > 0 for angle {}", angle);
        }
    }

    #[test]
    fn test_quarter_turn_moves_pixels_clockwise() {
        let img = test_image(3, 2);
        let result = apply_rotation(&img, 90.0, &ctx()).unwrap();
        assert_eq!(result.dimensions(), (2, 3));

        // Clockwise: destination (x, y) comes from source (y, h - 1 - x)
        for y in 0..3 {
            for x in 0..2 {
                assert_eq!(
                    result.pixel(x, y),
                    img.pixel(y, 1 - x),
                    "mismatch at ({}, {})",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_rotation_expands_canvas_with_transparent_corners() {
        let img = PixelBuffer::filled(100, 100, argb(255, 50, 60, 70));
        let result = apply_rotation(&img, 45.0, &ctx()).unwrap();

        assert!(result.width() > img.width());
        assert!(result.height() > img.height());
        assert_eq!(result.pixel(0, 0), Some(TRANSPARENT));
        let (cx, cy) = (result.width() / 2, result.height() / 2);
        assert_eq!(result.pixel(cx, cy), Some(argb(255, 50, 60, 70)));
    }

    #[test]
    fn test_small_and_degenerate_images() {
        let one = PixelBuffer::filled(1, 1, argb(255, 128, 128, 128));
        let result = apply_rotation(&one, 45.0, &ctx()).unwrap();
        assert!(result.width() >= 1 && result.height() >= 1);

        let thin = test_image(100, 1);
        let result = apply_rotation(&thin, 45.0, &ctx()).unwrap();
        assert!(result.width() > 0 && result.height() > 0);

        let empty = PixelBuffer::transparent(0, 0);
        assert!(apply_rotation(&empty, 30.0, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_alpha_fades_at_edges() {
        let img = PixelBuffer::filled(20, 20, argb(255, 255, 255, 255));
        let result = apply_rotation(&img, 30.0, &ctx()).unwrap();
        let partial = result
            .pixels()
            .iter()
            .filter(|&&p| alpha(p) > 0 && alpha(p) < 255)
            .count();
        assert!(partial > 0, "edge pixels should be partially transparent");
    }

    #[test]
    fn test_worker_count_does_not_change_output() {
        let img = test_image(37, 23);
        let reference =
            apply_rotation(&img, 33.0, &RunContext::unstoppable(ChunkedExecutor::new(1))).unwrap();
        for workers in [2, 8] {
            let out = apply_rotation(
                &img,
                33.0,
                &RunContext::unstoppable(ChunkedExecutor::new(workers)),
            )
            .unwrap();
            assert_eq!(out, reference);
        }
    }

    #[test]
    fn test_cancelled_rotation() {
        let token = CancelToken::new();
        token.cancel();
        let ctx = RunContext::new(ChunkedExecutor::new(2), &token);
        let err = apply_rotation(&test_image(10, 10), 20.0, &ctx).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_settings_wrap_into_declared_range() {
        assert_eq!(RotateSettings::new(300.0).effective_degrees(), -60.0);
        assert_eq!(RotateSettings::new(-100.0).effective_degrees(), 260.0);
        assert_eq!(RotateSettings::new(45.0).effective_degrees(), 45.0);
        assert_eq!(RotateSettings::new(f64::NAN).effective_degrees(), 0.0);
    }

    #[test]
    fn test_filter_rejects_foreign_settings() {
        let mut cache = FilterCache::Empty;
        let err = RotateFilter
            .apply(&test_image(4, 4), &FilterSettings::Sepia, &mut cache, &ctx())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::FilterError::SettingsMismatch { filter: "rotate", .. }
        ));
    }
}
