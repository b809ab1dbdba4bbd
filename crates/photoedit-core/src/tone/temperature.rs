//! Temperature and tint as additive channel offsets.
//!
//! Warmer shifts red up and blue down, a positive tint shifts green up and
//! blue down. Offsets are `255 * setting`, truncated toward zero.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::PixelBuffer;
use crate::color::{alpha, argb, blue, clamp_channel, green, red};
use crate::error::FilterResult;
use crate::executor::RunContext;
use crate::filter::{Filter, FilterCache, FilterCategory, FilterSettings};

pub const TEMP_TINT_ID: &str = "temp-and-tint";

/// Settings for [`TemperatureTintFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureTintSettings {
    pub temperature: f64,
    pub tint: f64,
}

impl TemperatureTintSettings {
    pub const TEMPERATURE: std::ops::RangeInclusive<f64> = -1.0..=1.0;
    pub const TINT: std::ops::RangeInclusive<f64> = -1.0..=1.0;

    pub fn new(temperature: f64, tint: f64) -> Self {
        Self { temperature, tint }
    }

    pub fn clamped(&self) -> Self {
        let unit = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        Self::new(unit(self.temperature), unit(self.tint))
    }

    /// Per-channel `(red, green, blue)` offsets.
    fn offsets(&self) -> (i32, i32, i32) {
        let scaled = |v: f64| (255.0 * v) as i32;
        let red = scaled(self.temperature);
        let green = scaled(self.tint);
        let blue = scaled(-self.temperature) + scaled(-self.tint);
        (red, green, blue)
    }
}

/// Shifts white balance along the blue-yellow and green-magenta axes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemperatureTintFilter;

impl Filter for TemperatureTintFilter {
    fn id(&self) -> &'static str {
        TEMP_TINT_ID
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::ColorCorrection
    }

    fn default_settings(&self) -> FilterSettings {
        FilterSettings::TempAndTint(TemperatureTintSettings::default())
    }

    fn apply(
        &self,
        image: &PixelBuffer,
        settings: &FilterSettings,
        _cache: &mut FilterCache,
        ctx: &RunContext<'_>,
    ) -> FilterResult<PixelBuffer> {
        let FilterSettings::TempAndTint(requested) = settings else {
            return Err(settings.mismatch(TEMP_TINT_ID));
        };
        let settings = requested.clamped();
        if settings != *requested {
            warn!(filter = TEMP_TINT_ID, ?requested, ?settings, "settings clamped");
        }

        let (dr, dg, db) = settings.offsets();
        debug!(
            filter = TEMP_TINT_ID,
            width = image.width(),
            height = image.height(),
            dr,
            dg,
            db,
            "shifting temperature and tint"
        );

        let pixels = ctx.executor().map_pixels(image.pixels(), ctx.stop(), |p| {
            argb(
                alpha(p),
                clamp_channel(red(p) as i32 + dr),
                clamp_channel(green(p) as i32 + dg),
                clamp_channel(blue(p) as i32 + db),
            )
        })?;

        Ok(PixelBuffer::from_parts(image.width(), image.height(), pixels))
    }
}
