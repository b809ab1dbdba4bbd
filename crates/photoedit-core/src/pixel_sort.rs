//! Pixel sorting.
//!
//! Pixels whose value (`max(R, G, B) / 255`) lies inside a threshold range
//! form a mask. Every row (for Left/Right) or column (for Up/Down) is split
//! into maximal runs of masked pixels and each run is sorted by value in
//! place. Unmasked pixels never move.
//!
//! The mask is cached per session together with the threshold it was built
//! for, so changing only the direction reuses it.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::buffer::PixelBuffer;
use crate::color::max_channel;
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const PIXEL_SORT_ID: &str = "pixel-sorting";

/// Direction the bright end of each run points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    /// Columns, brightest at the top.
    #[default]
    Up,
    /// Rows, brightest at the right.
    Right,
    /// Columns, brightest at the bottom.
    Down,
    /// Rows, brightest at the left.
    Left,
}

impl SortDirection {
    fn is_vertical(self) -> bool {
        matches!(self, SortDirection::Up | SortDirection::Down)
    }

    /// Whether values grow along the scan (left to right, top to bottom).
    fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Down | SortDirection::Right)
    }
}

/// Settings for [`PixelSortFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelSortSettings {
    /// Lower bound of the masked value range, inclusive.
    pub threshold_low: f64,
    /// Upper bound of the masked value range, inclusive.
    pub threshold_high: f64,
    pub direction: SortDirection,
}

impl Default for PixelSortSettings {
    fn default() -> Self {
        Self {
            threshold_low: 0.0,
            threshold_high: 1.0,
            direction: SortDirection::Up,
        }
    }
}

impl PixelSortSettings {
    pub const THRESHOLD: std::ops::RangeInclusive<f64> = 0.0..=1.0;

    pub fn new(threshold_low: f64, threshold_high: f64, direction: SortDirection) -> Self {
        Self {
            threshold_low,
            threshold_high,
            direction,
        }
    }

    /// Both bounds clamped into `[0, 1]` and ordered.
    pub fn clamped(&self) -> Self {
        let unit = |v: f64, fallback: f64| if v.is_nan() { fallback } else { v.clamp(0.0, 1.0) };
        let a = unit(self.threshold_low, 0.0);
        let b = unit(self.threshold_high, 1.0);
        Self::new(a.min(b), a.max(b), self.direction)
    }

    pub fn threshold(&self) -> (f64, f64) {
        (self.threshold_low, self.threshold_high)
    }
}

/// A mask plus the threshold it was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMask {
    pub threshold: (f64, f64),
    pub bits: Vec<bool>,
}

/// Session cache for [`PixelSortFilter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortMaskCache {
    pub mask: Option<CachedMask>,
}

impl SortMaskCache {
    fn is_valid_for(&self, threshold: (f64, f64), len: usize) -> bool {
        self.mask
            .as_ref()
            .is_some_and(|m| m.threshold == threshold && m.bits.len() == len && !m.bits.is_empty())
    }
}

/// Sorts runs of in-range pixels along rows or columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelSortFilter;

impl Filter for PixelSortFilter {
    fn id(&self) -> &'static str {
        PIXEL_SORT_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::ColorCorrection
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::PixelSorting(PixelSortSettings::default())
    }

    fn build_cache(&self) -> FilterCache {
        FilterCache::PixelSorting(SortMaskCache::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        let FilterSettings::PixelSorting(requested) = settings else {
            return Err(settings.mismatch(PIXEL_SORT_ID));
        };
        let settings = requested.clamped();
        if settings != *requested {
            warn!(filter = PIXEL_SORT_ID, ?requested, ?settings, "settings clamped");
        }

        let threshold = settings.threshold();
        let reusable = matches!(
            &*cache,
            FilterCache::PixelSorting(c) if c.is_valid_for(threshold, image.len())
        );
        if reusable {
            trace!(filter = PIXEL_SORT_ID, ?threshold, "mask cache hit");
        } else {
            let bits = compute_mask(image, threshold, ctx)?;
            trace!(filter = PIXEL_SORT_ID, ?threshold, "mask recomputed");
            *cache = FilterCache::PixelSorting(SortMaskCache {
                mask: Some(CachedMask { threshold, bits }),
            });
        }

        let mask: &[bool] = match &*cache {
            FilterCache::PixelSorting(SortMaskCache { mask: Some(m) }) => &m.bits,
            _ => &[],
        };
        debug!(
            filter = PIXEL_SORT_ID,
            width = image.width(),
            height = image.height(),
            ?threshold,
            direction = ?settings.direction,
            "sorting pixels"
        );
        sort_pixels(image, mask, settings.direction, ctx)
    }
}

/// Flag every pixel whose value lies in `[low, high]`.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn compute_mask(
    image: &PixelBuffer,
    (low, high): (f64, f64),
    ctx: &RunContext<'_>,
) -> FilterResult<Vec<bool>> {
    let pixels = image.pixels();
    ctx.executor().map_indices(pixels.len(), ctx.stop(), |i| {
        let value = max_channel(pixels[i]) as f64 / 255.0;
        (low..=high).contains(&value)
    })
}

/// Sort every masked run of `image` along `direction`.
///
/// A mask whose length does not match the image is treated as empty.
///
/// # Errors
///
/// Returns `FilterError::Cancelled` if the context is stopped mid-run.
pub fn sort_pixels(
    image: &PixelBuffer,
    mask: &[bool],
    direction: SortDirection,
    ctx: &RunContext<'_>,
) -> FilterResult<PixelBuffer> {
    let (width, height) = image.dimensions();
    if image.is_empty() || mask.len() != image.len() {
        ctx.check()?;
        return Ok(image.clone());
    }
    let ascending = direction.is_ascending();

    if direction.is_vertical() {
        // Columns become rows so each worker owns whole lines
        let (w, h) = (width as usize, height as usize);
        let mut columns = transpose(image.pixels(), w, h);
        let column_mask = transpose(mask, w, h);
        sort_lines(&mut columns, &column_mask, h, ascending, ctx)?;
        Ok(PixelBuffer::from_parts(width, height, transpose(&columns, h, w)))
    } else {
        let mut rows = image.pixels().to_vec();
        sort_lines(&mut rows, mask, width as usize, ascending, ctx)?;
        Ok(PixelBuffer::from_parts(width, height, rows))
    }
}

fn sort_lines(
    data: &mut [u32],
    mask: &[bool],
    line_len: usize,
    ascending: bool,
    ctx: &RunContext<'_>,
) -> FilterResult<()> {
    ctx.executor()
        .for_each_chunk_mut(data, line_len, ctx.stop(), |first_line, lines| {
            let offset = first_line * line_len;
            for (i, line) in lines.chunks_mut(line_len).enumerate() {
                let start = offset + i * line_len;
                sort_runs(line, &mask[start..start + line_len], ascending);
            }
        })
}

/// Sort each maximal run of `true` in `mask` within `line`.
fn sort_runs(line: &mut [u32], mask: &[bool], ascending: bool) {
    let mut x = 0;
    while x < line.len() {
        if !mask[x] {
            x += 1;
            continue;
        }
        let start = x;
        while x < line.len() && mask[x] {
            x += 1;
        }
        let run = &mut line[start..x];
        if ascending {
            run.sort_by_key(|&p| max_channel(p));
        } else {
            run.sort_by_key(|&p| Reverse(max_channel(p)));
        }
    }
}

/// Row-major `w x h` to row-major `h x w`.
fn transpose<T: Copy>(data: &[T], w: usize, h: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(data.len());
    for x in 0..w {
        for y in 0..h {
            out.push(data[y * w + x]);
        }
    }
    out
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::executor::ChunkedExecutor;
    use proptest::prelude::*;

    fn direction_strategy() -> impl Strategy<Value = SortDirection> {
        prop_oneof![
            Just(SortDirection::Up),
            Just(SortDirection::Right),
            Just(SortDirection::Down),
            Just(SortDirection::Left),
        ]
    }

    /// Maximal masked runs as index lists in scan order.
    fn runs(mask: &[bool], w: usize, h: usize, vertical: bool) -> Vec<Vec<usize>> {
        let (lines, len) = if vertical { (w, h) } else { (h, w) };
        let index = |line: usize, pos: usize| if vertical { pos * w + line } else { line * w + pos };
        let mut out = Vec::new();
        for line in 0..lines {
            let mut current = Vec::new();
            for pos in 0..len {
                let i = index(line, pos);
                if mask[i] {
                    current.push(i);
                } else if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            if !current.is_empty() {
                out.push(current);
            }
        }
        out
    }

    proptest! {
        #[test]
        fn prop_runs_keep_multiset_and_become_monotonic(
            (w, h, pixels) in (1usize..10, 1usize..10).prop_flat_map(|(w, h)| {
                (Just(w), Just(h), prop::collection::vec(any::<u32>(), w * h))
            }),
            low in 0.0f64..=1.0,
            high in 0.0f64..=1.0,
            direction in direction_strategy(),
        ) {
            let img = PixelBuffer::new(w as u32, h as u32, pixels).unwrap();
            let settings = PixelSortSettings::new(low, high, direction).clamped();
            let ctx = RunContext::unstoppable(ChunkedExecutor::new(3));
            let mask = compute_mask(&img, settings.threshold(), &ctx).unwrap();
            let out = sort_pixels(&img, &mask, direction, &ctx).unwrap();

            for (i, &m) in mask.iter().enumerate() {
                if !m {
                    prop_assert_eq!(out.pixels()[i], img.pixels()[i]);
                }
            }
            for run in runs(&mask, w, h, direction.is_vertical()) {
                let mut before: Vec<u32> = run.iter().map(|&i| img.pixels()[i]).collect();
                let mut after: Vec<u32> = run.iter().map(|&i| out.pixels()[i]).collect();
                let keys: Vec<u8> = after.iter().map(|&p| max_channel(p)).collect();
                if direction.is_ascending() {
                    prop_assert!(keys.windows(2).all(|k| k[0] <= k[1]));
                } else {
                    prop_assert!(keys.windows(2).all(|k| k[0] >= k[1]));
                }
                before.sort_unstable();
                after.sort_unstable();
                prop_assert_eq!(before, after);
            }
        }
    }
}
