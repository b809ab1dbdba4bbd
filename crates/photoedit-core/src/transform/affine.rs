//! Three-point affine transform.
//!
//! The user picks three points on the source and three matching points on
//! the target. The six affine coefficients mapping one triangle onto the
//! other are solved in closed form, then the destination canvas is filled by
//! inverse mapping.
//!
//! While fewer than three pairs have been collected, the filter renders a
//! colored marker disc at every collected point instead of transforming.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sample_bilinear;
use crate::buffer::{PixelBuffer, TRANSPARENT};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const AFFINE_ID: &str = "affine";

/// Points collected per side before the transform applies.
pub const MAX_POINTS: usize = 3;

/// Radius of a marker disc in pixels.
pub const MARKER_RADIUS: i64 = 20;

/// Largest output side. Nearly-degenerate triangles can otherwise ask for
/// enormous canvases.
pub const MAX_OUTPUT_SIDE: u32 = 16_384;

/// Largest output area. Larger warps are rendered downscaled to fit.
pub const MAX_OUTPUT_PIXELS: u64 = 64 * 1024 * 1024;

/// Marker colors, cycled over the source points then the target points.
const MARKER_COLORS: [u32; 3] = [0xFFFF_0000, 0xFF00_FF00, 0xFF00_00FF];

/// Below this the correspondence triangle is treated as collinear.
const DEGENERATE_EPSILON: f64 = 1e-6;

/// Rounding slack for canvas extents and source-window tests.
const SNAP_EPSILON: f64 = 1e-6;

/// A point in normalized image coordinates, `(0, 0)` top-left to `(1, 1)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates clamped into `[0, 1]`.
    pub fn clamped(self) -> Self {
        let unit = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self::new(unit(self.x), unit(self.y))
    }
}

/// Settings for [`AffineFilter`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AffineSettings {
    /// Points on the source image, in pick order.
    pub source_points: Vec<NormalizedPoint>,
    /// Matching points on the target, in pick order.
    pub target_points: Vec<NormalizedPoint>,
}

impl AffineSettings {
    pub const COORDINATE: std::ops::RangeInclusive<f64> = 0.0..=1.0;

    pub fn new(source_points: Vec<NormalizedPoint>, target_points: Vec<NormalizedPoint>) -> Self {
        Self {
            source_points,
            target_points,
        }
    }

    /// At most [`MAX_POINTS`] per side, every coordinate clamped.
    pub fn clamped(&self) -> Self {
        let clamp_list = |points: &[NormalizedPoint]| {
            points
                .iter()
                .take(MAX_POINTS)
                .map(|p| p.clamped())
                .collect::<Vec<_>>()
        };
        Self::new(clamp_list(&self.source_points), clamp_list(&self.target_points))
    }

    /// True once both sides hold a full triangle.
    pub fn is_complete(&self) -> bool {
        self.source_points.len() >= MAX_POINTS && self.target_points.len() >= MAX_POINTS
    }
}

/// `x' = a*x + b*y + c`, `y' = d*x + e*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMap {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineMap {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    /// Solve the map taking `src[i]` to `dst[i]` by Cramer's rule.
    ///
    /// Returns `None` if the source triangle is collinear.
    pub fn solve(src: [(f64, f64); 3], dst: [(f64, f64); 3]) -> Option<Self> {
        let [(sx0, sy0), (sx1, sy1), (sx2, sy2)] = src;
        let [(dx0, dy0), (dx1, dy1), (dx2, dy2)] = dst;

        let det = sx0 * (sy1 - sy2) + sx1 * (sy2 - sy0) + sx2 * (sy0 - sy1);
        if det.abs() < DEGENERATE_EPSILON {
            return None;
        }

        // Coefficients for one output axis given its three target values
        let solve_row = |t0: f64, t1: f64, t2: f64| {
            let p = (t0 * (sy1 - sy2) + t1 * (sy2 - sy0) + t2 * (sy0 - sy1)) / det;
            let q = (t0 * (sx2 - sx1) + t1 * (sx0 - sx2) + t2 * (sx1 - sx0)) / det;
            let r = t0 - p * sx0 - q * sy0;
            (p, q, r)
        };

        let (a, b, c) = solve_row(dx0, dx1, dx2);
        let (d, e, f) = solve_row(dy0, dy1, dy2);
        Some(Self { a, b, c, d, e, f })
    }

    /// Inverse map, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let Self { a, b, c, d, e, f } = *self;
        let det = a * e - b * d;
        if det.abs() < DEGENERATE_EPSILON || !det.is_finite() {
            return None;
        }
        Some(Self {
            a: e / det,
            b: -b / det,
            c: (b * f - e * c) / det,
            d: -d / det,
            e: a / det,
            f: (d * c - a * f) / det,
        })
    }

    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

/// Maps a source triangle onto a target triangle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AffineFilter;

impl Filter for AffineFilter {
    fn id(&self) -> &'static str {
        AFFINE_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::TriPointTransform
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::Affine(AffineSettings::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        match settings {
            FilterSettings::Affine(s) => apply_affine(image, s, ctx),
            other => Err(other.mismatch(AFFINE_ID)),
        }
    }
}

/// Apply the three-point transform described by `settings`.
///
/// Incomplete or collinear point sets render marker discs on a copy of the
/// source instead.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn apply_affine(
    image: &PixelBuffer,
    settings: &AffineSettings,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let settings = settings.clamped();
    if image.is_empty() {
        ctx.check()?;
        return Ok(image.clone());
    }

    let (width, height) = image.dimensions();
    let (w, h) = (width as f64, height as f64);
    let to_pixels = |points: &[NormalizedPoint]| -> [(f64, f64); 3] {
        [0, 1, 2].map(|i| (points[i].x * w, points[i].y * h))
    };

    let map = if settings.is_complete() {
        AffineMap::solve(
            to_pixels(&settings.source_points),
            to_pixels(&settings.target_points),
        )
    } else {
        None
    };
    let Some((map, inverse)) = map.and_then(|m| m.inverse().map(|inv| (m, inv))) else {
        if settings.is_complete() {
            debug!(filter = AFFINE_ID, "degenerate triangle, drawing markers");
        }
        ctx.check()?;
        return Ok(draw_markers(image, &settings));
    };

    let canvas = Canvas::covering(&map, w, h);
    debug!(
        filter = AFFINE_ID,
        width,
        height,
        out_width = canvas.width,
        out_height = canvas.height,
        scale = canvas.scale,
        "affine transform"
    );

    let stride = canvas.width as usize;
    let pixels = ctx
        .executor()
        .map_indices(stride * canvas.height as usize, ctx.stop(), |i| {
            let x = (i % stride) as f64 * canvas.scale + canvas.min_x;
            let y = (i / stride) as f64 * canvas.scale + canvas.min_y;
            let (src_x, src_y) = inverse.apply(x, y);
            if src_x > -SNAP_EPSILON && src_x < w && src_y > -SNAP_EPSILON && src_y < h {
                sample_bilinear(image, src_x.max(0.0), src_y.max(0.0))
            } else {
                TRANSPARENT
            }
        })?;

    Ok(PixelBuffer::from_parts(canvas.width, canvas.height, pixels))
}

/// Destination raster covering the warped source.
///
/// Output pixel `(i, j)` sits at `(min_x + i * scale, min_y + j * scale)` in
/// warped space. `scale` is 1 unless the warp exceeds the side or area caps.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Canvas {
    min_x: f64,
    min_y: f64,
    width: u32,
    height: u32,
    scale: f64,
}

impl Canvas {
    fn covering(map: &AffineMap, w: f64, h: f64) -> Self {
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)].map(|(x, y)| map.apply(x, y));
        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
        let (extent_x, extent_y) = (max_x - min_x, max_y - min_y);

        let scale = [
            extent_x / MAX_OUTPUT_SIDE as f64,
            extent_y / MAX_OUTPUT_SIDE as f64,
            (extent_x * extent_y / MAX_OUTPUT_PIXELS as f64).sqrt(),
        ]
        .into_iter()
        .fold(1.0, f64::max);

        let (width, height) = if scale > 1.0 {
            warn!(
                filter = AFFINE_ID,
                extent_x,
                extent_y,
                scale,
                "affine output downscaled to fit"
            );
            // Flooring keeps the area within the cap
            let side = |extent: f64| ((extent / scale).floor() as u32).clamp(1, MAX_OUTPUT_SIDE);
            (side(extent_x), side(extent_y))
        } else {
            let side = |extent: f64| ((extent - SNAP_EPSILON).ceil() as u32).max(1);
            (side(extent_x), side(extent_y))
        };

        Self {
            min_x,
            min_y,
            width,
            height,
            scale,
        }
    }
}

/// Copy of `image` with a disc at every collected point.
fn draw_markers(image: &PixelBuffer, settings: &AffineSettings) -> PixelBuffer {
    let mut out = image.clone();
    let max_x = image.width().saturating_sub(1) as f64;
    let max_y = image.height().saturating_sub(1) as f64;
    let points = settings
        .source_points
        .iter()
        .chain(settings.target_points.iter());

    for (i, point) in points.enumerate() {
        let color = MARKER_COLORS[i % MARKER_COLORS.len()];
        let cx = (point.x * max_x) as i64;
        let cy = (point.y * max_y) as i64;
        for y in cy - MARKER_RADIUS..cy + MARKER_RADIUS {
            for x in cx - MARKER_RADIUS..cx + MARKER_RADIUS {
                let (dx, dy) = (cx - x, cy - y);
                if dx * dx + dy * dy <= MARKER_RADIUS * MARKER_RADIUS && x >= 0 && y >= 0 {
                    out.set_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
    out
}
