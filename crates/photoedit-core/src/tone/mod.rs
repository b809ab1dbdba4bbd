//! Tone and color filters.
//!
//! - Contrast and brightness around the modal lightness of the source
//! - Error-diffusion dithering to a fixed number of levels
//! - Unsharp masking
//! - Temperature and tint offsets
//! - Grayscale and sepia
//!
//! Everything except dithering is per-pixel (or per-neighborhood) work run
//! through the chunked executor. Dithering is a strict raster-order scan.

pub(crate) mod contrast;
pub(crate) mod dithering;
pub(crate) mod grayscale;
pub(crate) mod temperature;
pub(crate) mod unsharp;

pub use contrast::{
    modal_lightness, remap_value, ContrastBrightnessFilter, ContrastBrightnessSettings,
    LightnessCache, CONTRAST_ID,
};
pub use dithering::{apply_dithering, DitheringFilter, DitheringSettings, DITHERING_ID};
pub use grayscale::{
    grayscale_pixel, sepia_pixel, GrayscaleFilter, SepiaFilter, GRAYSCALE_ID, SEPIA_ID,
};
pub use temperature::{TemperatureTintFilter, TemperatureTintSettings, TEMP_TINT_ID};
pub use unsharp::{
    apply_unsharp_mask, gaussian_kernel_1d, UnsharpMaskFilter, UnsharpMaskSettings, UNSHARP_ID,
};
