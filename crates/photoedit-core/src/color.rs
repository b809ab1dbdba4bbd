//! Packed ARGB channel access and color-space helpers.
//!
//! Shared by the tone filters (HSV value remapping, luma) and the structural
//! filters (per-pixel value used for masking and sorting).

/// Luma weight for the red channel.
pub const LUMA_R: f64 = 0.3;

/// Luma weight for the green channel.
pub const LUMA_G: f64 = 0.59;

/// Luma weight for the blue channel.
pub const LUMA_B: f64 = 0.11;

/// Pack channels into a `0xAARRGGBB` word.
#[inline]
pub fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

#[inline]
pub fn alpha(color: u32) -> u8 {
    (color >> 24) as u8
}

#[inline]
pub fn red(color: u32) -> u8 {
    (color >> 16) as u8
}

#[inline]
pub fn green(color: u32) -> u8 {
    (color >> 8) as u8
}

#[inline]
pub fn blue(color: u32) -> u8 {
    color as u8
}

/// Clamp an integer channel result to `0..=255`.
#[inline]
pub fn clamp_channel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// HSV value of a pixel as a raw channel: `max(R, G, B)`.
#[inline]
pub fn max_channel(color: u32) -> u8 {
    red(color).max(green(color)).max(blue(color))
}

/// Luma using the `0.3 / 0.59 / 0.11` weights.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f64 {
    LUMA_R * r as f64 + LUMA_G * g as f64 + LUMA_B * b as f64
}

/// Hue, saturation and value, with hue in degrees `[0, 360)` and the rest in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

impl Hsv {
    /// Convert the RGB channels of a packed pixel to HSV. Alpha is ignored.
    pub fn from_argb(color: u32) -> Self {
        let r = red(color) as f64 / 255.0;
        let g = green(color) as f64 / 255.0;
        let b = blue(color) as f64 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let mut hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta)
        } else if max == g {
            60.0 * ((b - r) / delta) + 120.0
        } else {
            60.0 * ((r - g) / delta) + 240.0
        };
        if hue < 0.0 {
            hue += 360.0;
        }

        let saturation = if max == 0.0 { 0.0 } else { 1.0 - min / max };

        Self {
            hue,
            saturation,
            value: max,
        }
    }

    /// Convert back to a packed pixel carrying the given alpha.
    pub fn to_argb(self, alpha: u8) -> u32 {
        let h1 = self.hue / 60.0;
        let c = self.value * self.saturation;
        let x = c * (1.0 - ((h1 % 2.0) - 1.0).abs());
        let m = self.value - c;

        let (r, g, b) = match h1.floor() as i32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        argb(
            alpha,
            unit_to_channel(r + m),
            unit_to_channel(g + m),
            unit_to_channel(b + m),
        )
    }
}

/// Map `[0, 1]` to a rounded channel value.
#[inline]
pub fn unit_to_channel(v: f64) -> u8 {
    (v * 255.0).clamp(0.0, 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let c = argb(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c, 0x1234_5678);
        assert_eq!(alpha(c), 0x12);
        assert_eq!(red(c), 0x34);
        assert_eq!(green(c), 0x56);
        assert_eq!(blue(c), 0x78);
    }

    #[test]
    fn test_luma_weights_sum_to_one() {
        assert!((LUMA_R + LUMA_G + LUMA_B - 1.0).abs() < 1e-12);
        assert!((luma(255, 255, 255) - 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_channel() {
        assert_eq!(max_channel(argb(0, 10, 200, 30)), 200);
        assert_eq!(max_channel(argb(255, 0, 0, 0)), 0);
    }

    #[test]
    fn test_hsv_primaries() {
        let red_hsv = Hsv::from_argb(argb(255, 255, 0, 0));
        assert_eq!(red_hsv.hue, 0.0);
        assert_eq!(red_hsv.saturation, 1.0);
        assert_eq!(red_hsv.value, 1.0);

        let green_hsv = Hsv::from_argb(argb(255, 0, 255, 0));
        assert!((green_hsv.hue - 120.0).abs() < 1e-9);

        let blue_hsv = Hsv::from_argb(argb(255, 0, 0, 255));
        assert!((blue_hsv.hue - 240.0).abs() < 1e-9);

        let magenta = Hsv::from_argb(argb(255, 255, 0, 128));
        assert!(magenta.hue > 300.0 && magenta.hue < 360.0);
    }

    #[test]
    fn test_hsv_gray_has_no_saturation() {
        let hsv = Hsv::from_argb(argb(255, 100, 100, 100));
        assert_eq!(hsv.saturation, 0.0);
        assert_eq!(hsv.hue, 0.0);
    }

    #[test]
    fn test_hsv_round_trip_preserves_color() {
        for &c in &[
            argb(255, 12, 200, 99),
            argb(128, 255, 255, 0),
            argb(0, 1, 2, 3),
            argb(255, 250, 10, 240),
            argb(255, 0, 0, 0),
            argb(7, 77, 177, 255),
        ] {
            let back = Hsv::from_argb(c).to_argb(alpha(c));
            assert_eq!(back, c, "round trip of {:08x}", c);
        }
    }
}
