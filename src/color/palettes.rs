//! Palettes: liste ordonnée de couleurs hexadécimales + continuité.
//!
//! Une palette est rééchantillonnée en table de correspondance (LUT) de
//! taille fixe, consommée telle quelle par le shader (texture 1-D) et par la
//! colorisation CPU. Les deux chemins lisent la LUT avec la même
//! interpolation, voir [`sample_lut`].

use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::color::color_models::ColorSpace;
use crate::fractal::formulas::EscapeValue;
use crate::fractal::lyapunov::{normalize_lyapunov, LYAPUNOV_SENTINEL};
use crate::fractal::types::DEFAULT_PALETTE;
use crate::fractal::FractalType;

/// Résolution par défaut de la LUT.
pub const LUT_SIZE: usize = 256;
/// Nombre d'itérations couvertes par un tour de palette cyclique.
pub const COLOR_CYCLE_LENGTH: f64 = 32.0;

/// Comportement aux extrémités de la palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Continuity {
    /// Bornée: les positions hors [0, 1] sont ramenées aux bords.
    #[default]
    Linear,
    /// La dernière couleur rejoint la première.
    Cyclic,
}

impl Continuity {
    pub fn is_cyclic(self) -> bool {
        matches!(self, Continuity::Cyclic)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorPalette {
    pub id: String,
    pub name: String,
    /// Couleurs `#RRGGBB`, dans l'ordre.
    pub colors: Vec<String>,
    pub continuity: Continuity,
}

impl ColorPalette {
    /// Couleurs décodées; les entrées illisibles sont ignorées.
    pub fn rgb_colors(&self) -> Vec<[u8; 3]> {
        self.colors.iter().filter_map(|c| parse_hex_color(c)).collect()
    }
}

/// Parse `#RRGGBB` (le `#` est optionnel). Exactement six chiffres hexadécimaux.
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let s = s.trim();
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// `generateGradient(colors, n)`: interpolation linéaire sRGB, bords bornés.
pub fn generate_gradient(colors: &[[u8; 3]], n: usize) -> Vec<[u8; 3]> {
    generate_gradient_with(colors, n, Continuity::Linear, ColorSpace::Rgb)
}

/// Rééchantillonne `colors` en exactement `n` entrées.
///
/// La première entrée vaut toujours `colors[0]`. Une liste vide donne un
/// résultat vide; une seule couleur donne `n` copies de cette couleur.
/// En mode cyclique l'entrée `i` est à la position `i / n` et la dernière
/// couleur est interpolée vers la première; en mode linéaire la position
/// est `i / (n - 1)` et la dernière entrée vaut la dernière couleur.
pub fn generate_gradient_with(
    colors: &[[u8; 3]],
    n: usize,
    continuity: Continuity,
    space: ColorSpace,
) -> Vec<[u8; 3]> {
    if colors.is_empty() || n == 0 {
        return Vec::new();
    }
    if colors.len() == 1 {
        return vec![colors[0]; n];
    }

    let k = colors.len();
    (0..n)
        .map(|i| {
            let (idx, frac, next) = match continuity {
                Continuity::Linear => {
                    let t = if n == 1 { 0.0 } else { i as f64 / (n - 1) as f64 };
                    let pos = t * (k - 1) as f64;
                    let idx = (pos.floor() as usize).min(k - 1);
                    (idx, pos - idx as f64, (idx + 1).min(k - 1))
                }
                Continuity::Cyclic => {
                    let pos = i as f64 / n as f64 * k as f64;
                    let idx = (pos.floor() as usize) % k;
                    (idx, pos - pos.floor(), (idx + 1) % k)
                }
            };
            if frac == 0.0 {
                colors[idx]
            } else {
                space.interpolate(colors[idx], colors[next], frac)
            }
        })
        .collect()
}

/// LUT RGBA (`steps * 4` octets, alpha opaque) pour la palette.
pub fn build_lut(palette: &ColorPalette, steps: usize, space: ColorSpace) -> Vec<u8> {
    let gradient = generate_gradient_with(&palette.rgb_colors(), steps, palette.continuity, space);
    let mut rgba = Vec::with_capacity(gradient.len() * 4);
    for [r, g, b] in gradient {
        rgba.extend_from_slice(&[r, g, b, 255]);
    }
    rgba
}

/// Lit la LUT RGBA à la position `t` dans [0, 1], avec interpolation entre
/// entrées voisines. Même arithmétique que le fragment shader.
pub fn sample_lut(lut: &[u8], t: f64, continuity: Continuity) -> [u8; 3] {
    let n = lut.len() / 4;
    if n == 0 {
        return [0, 0, 0];
    }
    let entry = |i: usize| [lut[i * 4], lut[i * 4 + 1], lut[i * 4 + 2]];
    let (i0, i1, frac) = match continuity {
        Continuity::Linear => {
            let x = t.clamp(0.0, 1.0) * (n - 1) as f64;
            let i0 = (x.floor() as usize).min(n - 1);
            (i0, (i0 + 1).min(n - 1), x - i0 as f64)
        }
        Continuity::Cyclic => {
            let x = t.rem_euclid(1.0) * n as f64;
            let i0 = (x.floor() as usize) % n;
            (i0, (i0 + 1) % n, x - x.floor())
        }
    };
    ColorSpace::Rgb.interpolate(entry(i0), entry(i1), frac)
}

/// Position dans la palette d'une valeur d'évaluation; `None` = noir.
///
/// - échappé, palette linéaire: `v / max` borné
/// - échappé, palette cyclique: un tour toutes les [`COLOR_CYCLE_LENGTH`] itérations
/// - Newton: `(racine + i/max) / 3`, une bande par racine
/// - Lyapunov: exposant normalisé, noir pour la sentinelle
pub fn palette_position(value: EscapeValue, max_iterations: u32, continuity: Continuity) -> Option<f64> {
    let max = max_iterations.max(1) as f64;
    match value {
        EscapeValue::Interior => None,
        EscapeValue::Escaped(v) => Some(escaped_position(v, max, continuity)),
        EscapeValue::Converged { root, iterations } => {
            Some(((root as f64 + iterations as f64 / max) / 3.0).clamp(0.0, 1.0))
        }
        EscapeValue::Lyapunov(l) if l <= LYAPUNOV_SENTINEL => None,
        EscapeValue::Lyapunov(l) => Some(normalize_lyapunov(l)),
    }
}

/// Même chose à partir d'une valeur déjà aplatie par le worker.
///
/// Un pixel multi-échantillonné peut mélanger intérieur et extérieur: seule
/// une moyenne égale à `max` (tous les sous-pixels intérieurs) donne du noir.
pub fn field_position(
    value: f32,
    fractal_type: FractalType,
    max_iterations: u32,
    continuity: Continuity,
) -> Option<f64> {
    let v = value as f64;
    let max = max_iterations.max(1) as f64;
    if !v.is_finite() {
        return None;
    }
    match fractal_type {
        FractalType::Lyapunov if v <= LYAPUNOV_SENTINEL => None,
        FractalType::Lyapunov => Some(normalize_lyapunov(v)),
        _ if v >= max => None,
        FractalType::Newton => Some((v / max).clamp(0.0, 1.0)),
        _ => Some(escaped_position(v, max, continuity)),
    }
}

fn escaped_position(v: f64, max: f64, continuity: Continuity) -> f64 {
    match continuity {
        Continuity::Linear => (v / max).clamp(0.0, 1.0),
        Continuity::Cyclic => (v / COLOR_CYCLE_LENGTH).rem_euclid(1.0),
    }
}

fn builtin(id: &str, name: &str, colors: &[&str], continuity: Continuity) -> ColorPalette {
    ColorPalette {
        id: id.to_string(),
        name: name.to_string(),
        colors: colors.iter().map(|c| c.to_string()).collect(),
        continuity,
    }
}

static BUILTIN_PALETTES: Lazy<Vec<ColorPalette>> = Lazy::new(|| {
    vec![
        builtin(
            "classic",
            "Classic",
            &["#000764", "#206bcb", "#edffff", "#ffaa00", "#000200"],
            Continuity::Cyclic,
        ),
        builtin("fire", "Fire", &["#000000", "#ff0000", "#ffff00", "#ffffff"], Continuity::Linear),
        builtin("ocean", "Ocean", &["#000000", "#0000ff", "#00ffff", "#ffffff"], Continuity::Linear),
        builtin("forest", "Forest", &["#000000", "#00b400", "#c8ff00", "#ffffff"], Continuity::Linear),
        builtin("violet", "Violet", &["#000000", "#8000c8", "#ff64ff", "#ffffff"], Continuity::Linear),
        builtin(
            "rainbow",
            "Rainbow",
            &["#ff0000", "#ffa500", "#ffff00", "#00ff00", "#00ffff", "#0000ff", "#b400ff"],
            Continuity::Cyclic,
        ),
        builtin(
            "sunset",
            "Sunset",
            &["#000000", "#ff8c00", "#ff0000", "#ff00c8", "#3700ff"],
            Continuity::Linear,
        ),
        builtin("plasma", "Plasma", &["#0d0887", "#7e03a8", "#f05764", "#f0e632"], Continuity::Linear),
        builtin("ice", "Ice", &["#ffffff", "#96e6ff", "#1e5ac8", "#050a1e"], Continuity::Linear),
        builtin(
            "cosmic",
            "Cosmic",
            &[
                "#000000", "#000033", "#004d40", "#40e0d0", "#c8dcf0", "#ffffe0", "#ffd700", "#ffa500",
                "#8b0000",
            ],
            Continuity::Cyclic,
        ),
    ]
});

/// Source des palettes: les palettes intégrées plus les palettes utilisateur.
#[derive(Clone, Debug)]
pub struct PaletteStore {
    palettes: Vec<ColorPalette>,
}

impl Default for PaletteStore {
    fn default() -> Self {
        Self { palettes: BUILTIN_PALETTES.clone() }
    }
}

impl PaletteStore {
    pub fn get(&self, id: &str) -> Option<&ColorPalette> {
        self.palettes.iter().find(|p| p.id == id)
    }

    /// Palette demandée, ou la palette par défaut si l'id est inconnu.
    pub fn resolve(&self, id: &str) -> &ColorPalette {
        if let Some(p) = self.get(id) {
            return p;
        }
        warn!("Palette inconnue '{}', repli sur '{}'", id, DEFAULT_PALETTE);
        self.get(DEFAULT_PALETTE).unwrap_or(&BUILTIN_PALETTES[0])
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.palettes.iter().map(|p| p.id.as_str())
    }

    /// Ajoute (ou remplace) une palette utilisateur.
    ///
    /// Les couleurs qui ne sont pas `#RRGGBB` sont retirées silencieusement
    /// (un avertissement est journalisé). Sans aucune couleur valide, la
    /// palette est refusée.
    pub fn add_custom<S: AsRef<str>>(
        &mut self,
        id: &str,
        name: &str,
        colors: &[S],
        continuity: Continuity,
    ) -> Option<&ColorPalette> {
        let mut kept = Vec::with_capacity(colors.len());
        for c in colors {
            match parse_hex_color(c.as_ref()) {
                Some(rgb) => kept.push(to_hex(rgb)),
                None => warn!("Palette '{}': couleur ignorée '{}'", id, c.as_ref()),
            }
        }
        if kept.is_empty() {
            warn!("Palette '{}' refusée: aucune couleur valide", id);
            return None;
        }

        let palette = ColorPalette {
            id: id.to_string(),
            name: name.to_string(),
            colors: kept,
            continuity,
        };
        let idx = match self.palettes.iter().position(|p| p.id == id) {
            Some(idx) => {
                self.palettes[idx] = palette;
                idx
            }
            None => {
                self.palettes.push(palette);
                self.palettes.len() - 1
            }
        };
        self.palettes.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 3] = [255, 0, 0];
    const BLUE: [u8; 3] = [0, 0, 255];

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff8c00"), Some([255, 140, 0]));
        assert_eq!(parse_hex_color("FF8C00"), Some([255, 140, 0]));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
        assert_eq!(parse_hex_color("#ff8c000"), None);
        assert_eq!(parse_hex_color("#ééé"), None);
    }

    #[test]
    fn test_gradient_length_and_first_entry() {
        for n in [1, 2, 7, 256] {
            let g = generate_gradient(&[RED, BLUE], n);
            assert_eq!(g.len(), n);
            assert_eq!(g[0], RED);
        }
        let g = generate_gradient(&[RED, BLUE], 256);
        assert_eq!(g[255], BLUE);
    }

    #[test]
    fn test_gradient_single_and_empty() {
        assert_eq!(generate_gradient(&[RED], 4), vec![RED; 4]);
        assert!(generate_gradient(&[], 16).is_empty());
    }

    #[test]
    fn test_gradient_interpolates_linearly() {
        let g = generate_gradient(&[[0, 0, 0], [200, 100, 50]], 3);
        assert_eq!(g[1], [100, 50, 25]);
    }

    #[test]
    fn test_cyclic_gradient_wraps() {
        let g = generate_gradient_with(&[RED, BLUE], 4, Continuity::Cyclic, ColorSpace::Rgb);
        assert_eq!(g[0], RED);
        assert_eq!(g[2], BLUE);
        // Entre BLUE et RED (retour au début).
        assert_eq!(g[3], [128, 0, 128]);
    }

    #[test]
    fn test_builtin_palettes_parse() {
        let store = PaletteStore::default();
        for id in ["fire", "ocean", "forest", "violet", "rainbow", "sunset", "plasma", "ice", "cosmic", "classic"] {
            let p = store.get(id).unwrap_or_else(|| panic!("missing {id}"));
            assert_eq!(p.rgb_colors().len(), p.colors.len(), "{id}");
            assert_eq!(build_lut(p, LUT_SIZE, ColorSpace::Rgb).len(), LUT_SIZE * 4);
        }
    }

    #[test]
    fn test_resolve_unknown_falls_back() {
        let store = PaletteStore::default();
        assert_eq!(store.resolve("does-not-exist").id, DEFAULT_PALETTE);
    }

    #[test]
    fn test_custom_palette_drops_malformed() {
        let mut store = PaletteStore::default();
        let p = store
            .add_custom("mine", "Mine", &["#112233", "nope", "#44556", "AABBCC"], Continuity::Linear)
            .cloned();
        let p = p.expect("palette registered");
        assert_eq!(p.colors, vec!["#112233".to_string(), "#aabbcc".to_string()]);
        assert!(store.add_custom("empty", "Empty", &["bad"], Continuity::Linear).is_none());
        assert!(store.get("empty").is_none());
    }

    #[test]
    fn test_sample_lut_matches_entries() {
        let palette = builtin("t", "T", &["#000000", "#ffffff"], Continuity::Linear);
        let lut = build_lut(&palette, 256, ColorSpace::Rgb);
        assert_eq!(sample_lut(&lut, 0.0, Continuity::Linear), [0, 0, 0]);
        assert_eq!(sample_lut(&lut, 1.0, Continuity::Linear), [255, 255, 255]);
        assert_eq!(sample_lut(&lut, 2.0, Continuity::Linear), [255, 255, 255]);
    }

    #[test]
    fn test_palette_position() {
        assert_eq!(palette_position(EscapeValue::Interior, 100, Continuity::Linear), None);
        assert_eq!(palette_position(EscapeValue::Escaped(50.0), 100, Continuity::Linear), Some(0.5));
        assert_eq!(palette_position(EscapeValue::Escaped(48.0), 100, Continuity::Cyclic), Some(0.5));
        assert_eq!(
            palette_position(EscapeValue::Lyapunov(LYAPUNOV_SENTINEL), 100, Continuity::Linear),
            None
        );
        let band = palette_position(EscapeValue::Converged { root: 1, iterations: 0 }, 100, Continuity::Linear);
        assert_eq!(band, Some(1.0 / 3.0));
    }

    #[test]
    fn test_field_position_agrees_with_escape_value() {
        let max = 100;
        let values = [
            (FractalType::Mandelbrot, EscapeValue::Escaped(12.5)),
            (FractalType::Mandelbrot, EscapeValue::Interior),
            (FractalType::Newton, EscapeValue::Converged { root: 2, iterations: 7 }),
            (FractalType::Lyapunov, EscapeValue::Lyapunov(-0.7)),
            (FractalType::Lyapunov, EscapeValue::Lyapunov(LYAPUNOV_SENTINEL)),
        ];
        for (t, v) in values {
            let a = palette_position(v, max, Continuity::Linear);
            let b = field_position(v.to_field_value(max), t, max, Continuity::Linear);
            match (a, b) {
                (None, None) => {}
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-5, "{t:?} {v:?}: {a} vs {b}"),
                other => panic!("{t:?} {v:?}: {other:?}"),
            }
        }
    }
}
