//! Geometric transform filters: rotation, resize and three-point affine.
//!
//! All three use inverse mapping: for each destination pixel, compute the
//! source coordinate it came from and bilinearly sample the source there.
//! Destination pixels that map outside the source stay transparent.
//!
//! # Coordinate System
//!
//! - Origin is the top-left corner, y grows downward
//! - Rotation angles are in degrees, positive = clockwise on screen
//! - Affine correspondence points are normalized (0.0 to 1.0)

pub(crate) mod affine;
pub(crate) mod resize;
pub(crate) mod rotation;

pub use affine::{
    apply_affine, AffineFilter, AffineMap, AffineSettings, NormalizedPoint, AFFINE_ID,
};
pub use resize::{apply_resize, ResizeFilter, ResizeSettings, RESIZE_ID};
pub use rotation::{
    apply_rotation, compute_rotated_bounds, RotateFilter, RotateSettings, ROTATE_ID,
};

use crate::buffer::{PixelBuffer, TRANSPARENT};

/// Bilinearly interpolate four neighbors fetched through `fetch`.
///
/// Neighbors for which `fetch` returns `None` contribute transparent black,
/// so edges fade out rather than clamp.
#[inline]
pub(crate) fn bilinear<F>(fetch: F, x: f64, y: f64) -> u32
where
    F: Fn(i64, i64) -> Option<u32>,
{
    let fx = x.floor();
    let fy = y.floor();
    let dx = x - fx;
    let dy = y - fy;
    let (x1, y1) = (fx as i64, fy as i64);

    let c11 = fetch(x1, y1).unwrap_or(TRANSPARENT);
    let c12 = fetch(x1 + 1, y1).unwrap_or(TRANSPARENT);
    let c21 = fetch(x1, y1 + 1).unwrap_or(TRANSPARENT);
    let c22 = fetch(x1 + 1, y1 + 1).unwrap_or(TRANSPARENT);

    let w11 = (1.0 - dx) * (1.0 - dy);
    let w12 = dx * (1.0 - dy);
    let w21 = (1.0 - dx) * dy;
    let w22 = dx * dy;

    let mut out = 0u32;
    for shift in [24u32, 16, 8, 0] {
        let ch = |c: u32| ((c >> shift) & 0xFF) as f64;
        let v = ch(c11) * w11 + ch(c12) * w12 + ch(c21) * w21 + ch(c22) * w22;
        out |= (v.clamp(0.0, 255.0).round() as u32) << shift;
    }
    out
}

/// Bilinear sample of `image` at a fractional source coordinate.
#[inline]
pub(crate) fn sample_bilinear(image: &PixelBuffer, x: f64, y: f64) -> u32 {
    bilinear(|px, py| image.pixel_signed(px, py), x, y)
}
