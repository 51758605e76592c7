//! Conversions entre espaces colorimétriques pour l'interpolation des gradients.

use serde::{Deserialize, Serialize};

/// Espace dans lequel on interpole entre deux couleurs de la palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// Interpolation directe des composantes sRGB (défaut).
    #[default]
    Rgb,
    /// Interpolation en lumière linéaire, reconvertie en sRGB.
    Linear,
    /// Interpolation HSB (teinte par le plus court chemin).
    Hsb,
}

impl ColorSpace {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "rgb" | "srgb" => Some(ColorSpace::Rgb),
            "linear" | "linear-rgb" => Some(ColorSpace::Linear),
            "hsb" | "hsv" => Some(ColorSpace::Hsb),
            _ => None,
        }
    }

    /// Interpole entre `a` et `b` (t dans [0, 1]).
    pub fn interpolate(self, a: [u8; 3], b: [u8; 3], t: f64) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        match self {
            ColorSpace::Rgb => {
                let lerp = |u: u8, v: u8| -> u8 {
                    let u = u as f64;
                    let v = v as f64;
                    (u + t * (v - u)).round().clamp(0.0, 255.0) as u8
                };
                [lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2])]
            }
            ColorSpace::Linear => {
                let lerp = |u: u8, v: u8| -> u8 {
                    let u = srgb_to_linear(u as f64 / 255.0);
                    let v = srgb_to_linear(v as f64 / 255.0);
                    (linear_to_srgb(u + t * (v - u)) * 255.0).round().clamp(0.0, 255.0) as u8
                };
                [lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2])]
            }
            ColorSpace::Hsb => {
                let h = interpolate_hsb(rgb_to_hsb(a), rgb_to_hsb(b), t);
                hsb_to_rgb(h)
            }
        }
    }
}

/// Espace colorimétrique HSB/HSV (Teinte, Saturation, Brillance/Valeur)
#[derive(Clone, Copy, Debug)]
pub struct Hsb {
    pub h: f64, // Teinte [0, 360]
    pub s: f64, // Saturation [0, 1]
    pub b: f64, // Brillance/Valeur [0, 1]
}

/// Convertit RGB vers HSB/HSV
pub fn rgb_to_hsb(rgb: [u8; 3]) -> Hsb {
    let r_f = rgb[0] as f64 / 255.0;
    let g_f = rgb[1] as f64 / 255.0;
    let b_f = rgb[2] as f64 / 255.0;

    let max = r_f.max(g_f.max(b_f));
    let min = r_f.min(g_f.min(b_f));
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r_f {
        60.0 * (((g_f - b_f) / delta) % 6.0)
    } else if max == g_f {
        60.0 * (((b_f - r_f) / delta) + 2.0)
    } else {
        60.0 * (((r_f - g_f) / delta) + 4.0)
    };

    let h = if h < 0.0 { h + 360.0 } else { h };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    Hsb { h, s, b: max }
}

/// Convertit HSB/HSV vers RGB
pub fn hsb_to_rgb(hsb: Hsb) -> [u8; 3] {
    let h = hsb.h.rem_euclid(360.0);
    let c = hsb.b * hsb.s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = hsb.b - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    [
        ((r + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((g + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((b + m) * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Interpolation HSB, teinte par le plus court arc.
pub fn interpolate_hsb(a: Hsb, b: Hsb, t: f64) -> Hsb {
    let mut dh = b.h - a.h;
    if dh > 180.0 {
        dh -= 360.0;
    } else if dh < -180.0 {
        dh += 360.0;
    }
    Hsb {
        h: (a.h + t * dh).rem_euclid(360.0),
        s: a.s + t * (b.s - a.s),
        b: a.b + t * (b.b - a.b),
    }
}

pub fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_preserved() {
        let a = [13, 8, 135];
        let b = [240, 230, 50];
        for space in [ColorSpace::Rgb, ColorSpace::Linear, ColorSpace::Hsb] {
            assert_eq!(space.interpolate(a, b, 0.0), a, "{space:?}");
            assert_eq!(space.interpolate(a, b, 1.0), b, "{space:?}");
        }
    }

    #[test]
    fn test_linear_midpoint_is_brighter() {
        let mid_rgb = ColorSpace::Rgb.interpolate([0, 0, 0], [255, 255, 255], 0.5);
        let mid_lin = ColorSpace::Linear.interpolate([0, 0, 0], [255, 255, 255], 0.5);
        assert!(mid_lin[0] > mid_rgb[0]);
    }

    #[test]
    fn test_hsb_roundtrip() {
        for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [128, 64, 200]] {
            assert_eq!(hsb_to_rgb(rgb_to_hsb(rgb)), rgb);
        }
    }

    #[test]
    fn test_color_space_names() {
        assert_eq!(ColorSpace::from_name("SRGB"), Some(ColorSpace::Rgb));
        assert_eq!(ColorSpace::from_name("hsv"), Some(ColorSpace::Hsb));
        assert_eq!(ColorSpace::from_name("cmyk"), None);
    }
}
