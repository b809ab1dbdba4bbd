//! Packed ARGB pixel buffer, the sole exchange format between filters.
//!
//! Samples are stored row-major as `0xAARRGGBB` words. Filters never mutate
//! their input buffer; they build and return a new one.

use crate::color::{alpha, argb, blue, green, red};
use crate::error::{FilterError, FilterResult};

/// Fully transparent black.
pub const TRANSPARENT: u32 = 0;

/// A fixed-size ARGB8888 raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    /// Create a buffer from packed ARGB samples.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidBuffer` if `pixels.len() != width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> FilterResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(FilterError::InvalidBuffer(format!(
                "expected {} samples for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create a buffer where every sample is `color`.
    pub fn filled(width: u32, height: u32, color: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Create a fully transparent buffer.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self::filled(width, height, TRANSPARENT)
    }

    pub(crate) fn from_parts(width: u32, height: u32, pixels: Vec<u32>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize,
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total number of pixels.
    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Check if this is an empty image.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Row-major packed samples.
    #[inline]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Mutable row-major packed samples. The length is fixed.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    /// Sample at `(x, y)`, or `None` outside the raster.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.pixels[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    /// Sample at signed coordinates, `None` outside the raster.
    #[inline]
    pub(crate) fn pixel_signed(&self, x: i64, y: i64) -> Option<u32> {
        if x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64 {
            Some(self.pixels[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    /// Overwrite the sample at `(x, y)`. Writes outside the raster are ignored.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: u32) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = color;
        }
    }

    /// Copy the `w`x`h` region at `(x, y)` into `dst` (row-major, stride `w`).
    ///
    /// # Errors
    ///
    /// Returns `FilterError::OutOfBounds` if the region leaves the raster, or
    /// `FilterError::InvalidBuffer` if `dst` is shorter than `w * h`.
    pub fn get_pixels(&self, dst: &mut [u32], x: u32, y: u32, w: u32, h: u32) -> FilterResult<()> {
        self.check_region(x, y, w, h, dst.len())?;
        let (w, stride) = (w as usize, self.width as usize);
        for row in 0..h as usize {
            let src_start = (y as usize + row) * stride + x as usize;
            dst[row * w..row * w + w].copy_from_slice(&self.pixels[src_start..src_start + w]);
        }
        Ok(())
    }

    /// Overwrite the `w`x`h` region at `(x, y)` from `src` (row-major, stride `w`).
    ///
    /// # Errors
    ///
    /// Same conditions as [`PixelBuffer::get_pixels`].
    pub fn set_pixels(&mut self, src: &[u32], x: u32, y: u32, w: u32, h: u32) -> FilterResult<()> {
        self.check_region(x, y, w, h, src.len())?;
        let (w, stride) = (w as usize, self.width as usize);
        for row in 0..h as usize {
            let dst_start = (y as usize + row) * stride + x as usize;
            self.pixels[dst_start..dst_start + w].copy_from_slice(&src[row * w..row * w + w]);
        }
        Ok(())
    }

    fn check_region(&self, x: u32, y: u32, w: u32, h: u32, available: usize) -> FilterResult<()> {
        let fits_x = x.checked_add(w).is_some_and(|right| right <= self.width);
        let fits_y = y.checked_add(h).is_some_and(|bottom| bottom <= self.height);
        if !fits_x || !fits_y {
            return Err(FilterError::OutOfBounds {
                x,
                y,
                width: w,
                height: h,
                buffer_width: self.width,
                buffer_height: self.height,
            });
        }
        let needed = w as usize * h as usize;
        if available < needed {
            return Err(FilterError::InvalidBuffer(format!(
                "region needs {} samples, slice holds {}",
                needed, available
            )));
        }
        Ok(())
    }

    /// Create a buffer from an `image::RgbaImage`.
    pub fn from_rgba_image(img: &image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let pixels = img
            .pixels()
            .map(|p| argb(p[3], p[0], p[1], p[2]))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Convert to an `image::RgbaImage` for encoding or further processing.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let mut raw = Vec::with_capacity(self.pixels.len() * 4);
        for &p in &self.pixels {
            raw.extend_from_slice(&[red(p), green(p), blue(p), alpha(p)]);
        }
        image::RgbaImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| image::RgbaImage::new(self.width, self.height))
    }
}
