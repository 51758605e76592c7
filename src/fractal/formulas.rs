//! Formules escape-time et pilote d'itération commun.
//!
//! Chaque variante fournit une fonction de pas `f(z, c, z_prev) -> z_next`;
//! [`FractalType::evaluate`] est l'unique point de dispatch. Newton et
//! Lyapunov ont leur propre boucle (critère de convergence, état scalaire).

use num_complex::Complex;
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::fractal::complex::{
    absolute, add, cast, conjugate, divide, is_finite, magnitude, magnitude_squared, multiply,
    scale, square,
};
use crate::fractal::lyapunov::lyapunov_exponent;
use crate::fractal::{FractalParams, FractalType};

/// Coefficient du terme mémoire de Phoenix.
pub const PHOENIX_P: f64 = 0.5667;
/// Seuil de pas de Newton en dessous duquel on considère la racine atteinte.
pub const NEWTON_TOLERANCE: f64 = 1e-4;
/// Racines de z³ - 1.
pub const NEWTON_ROOTS: [(f64, f64); 3] = [
    (1.0, 0.0),
    (-0.5, 0.866_025_403_784_438_6),
    (-0.5, -0.866_025_403_784_438_6),
];
/// Germe réel de la variante Lambda.
pub const LAMBDA_SEED: f64 = 0.5;

/// Résultat de l'évaluation d'un point.
///
/// L'exposant de Lyapunov est un réel (souvent négatif), pas un nombre
/// d'itérations: il garde sa propre variante pour que la coloration ne le
/// confonde jamais avec un compte d'échappement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EscapeValue {
    /// Échappé; compte lissé (ou entier en précision basse).
    Escaped(f64),
    /// N'a pas échappé en `max_iterations`.
    Interior,
    /// Newton: indice de la racine atteinte et nombre de pas.
    Converged { root: usize, iterations: u32 },
    /// Lyapunov: exposant moyen, ou [`crate::fractal::lyapunov::LYAPUNOV_SENTINEL`].
    Lyapunov(f64),
}

impl EscapeValue {
    /// Aplatit la valeur dans le canal unique du contrat du worker.
    ///
    /// - échappé: compte lissé
    /// - intérieur: `max_iterations`
    /// - Newton: `(racine + i/max) / 3 * max`, trois bandes normalisées
    /// - Lyapunov: l'exposant brut
    pub fn to_field_value(self, max_iterations: u32) -> f32 {
        let max = max_iterations.max(1) as f64;
        let v = match self {
            EscapeValue::Escaped(v) => v,
            EscapeValue::Interior => max,
            EscapeValue::Converged { root, iterations } => {
                return newton_band_value(root, iterations as f64, max_iterations);
            }
            EscapeValue::Lyapunov(l) => l,
        };
        v as f32
    }

    pub fn is_interior(self) -> bool {
        matches!(self, EscapeValue::Interior)
    }
}

/// Valeur de champ d'un point Newton: la bande `root` de largeur `max / 3`,
/// décalée par le nombre de pas (éventuellement moyen).
pub fn newton_band_value(root: usize, iterations: f64, max_iterations: u32) -> f32 {
    let max = max_iterations.max(1) as f64;
    ((root as f64 + iterations / max) / 3.0 * max) as f32
}

/// Paramètres d'itération convertis dans la précision de calcul.
#[derive(Clone, Copy, Debug)]
pub struct IterationConfig<T> {
    pub max_iterations: u32,
    pub escape_radius_sq: T,
    pub smooth: bool,
    pub julia_constant: Complex<T>,
}

impl<T: Float> IterationConfig<T> {
    pub fn from_params(params: &FractalParams) -> Self {
        let r = T::from(params.escape_radius).unwrap_or_else(T::one);
        Self {
            max_iterations: params.max_iterations,
            escape_radius_sq: r * r,
            smooth: params.precision.smooth_coloring(),
            julia_constant: cast(params.effective_julia_constant()),
        }
    }
}

/// `i + 1 - log2(log2(m) * 0.5)`: compte d'échappement continu.
///
/// `m` est |z|² au moment de l'échappement. Une magnitude non finie (dépassement)
/// renvoie le compte entier.
pub fn smooth_iteration_count(i: u32, m: f64) -> f64 {
    if !m.is_finite() {
        return i as f64;
    }
    i as f64 + 1.0 - (m.log2() * 0.5).log2()
}

/// Pilote escape-time partagé.
///
/// `step(z, z_prev)` calcule l'itéré suivant; `z_prev` vaut 0 au départ.
/// Une magnitude NaN ou infinie compte comme un échappement immédiat.
pub fn escape_time<T, F>(seed: Complex<T>, cfg: &IterationConfig<T>, mut step: F) -> EscapeValue
where
    T: Float,
    F: FnMut(Complex<T>, Complex<T>) -> Complex<T>,
{
    let mut z = seed;
    let mut z_prev = Complex::new(T::zero(), T::zero());
    for i in 0..cfg.max_iterations {
        let m = magnitude_squared(z);
        // `!(m <= r²)` attrape aussi NaN.
        if !(m <= cfg.escape_radius_sq) {
            let m = m.to_f64().unwrap_or(f64::INFINITY);
            return if cfg.smooth {
                EscapeValue::Escaped(smooth_iteration_count(i, m))
            } else {
                EscapeValue::Escaped(i as f64)
            };
        }
        let next = step(z, z_prev);
        z_prev = z;
        z = next;
    }
    EscapeValue::Interior
}

/// Newton pour z³ - 1 = 0. S'arrête quand le pas devient inférieur à
/// [`NEWTON_TOLERANCE`] et classe le point selon la racine la plus proche.
pub fn newton<T: Float>(sample: Complex<T>, cfg: &IterationConfig<T>) -> EscapeValue {
    let one = Complex::new(T::one(), T::zero());
    let three = T::from(3.0).unwrap_or_else(T::one);
    let tol = T::from(NEWTON_TOLERANCE).unwrap_or_else(T::epsilon);
    let tol_sq = tol * tol;

    let mut z = sample;
    for i in 0..cfg.max_iterations {
        let z2 = square(z);
        let denom = scale(z2, three);
        if magnitude_squared(denom) == T::zero() {
            return EscapeValue::Interior;
        }
        let numer = multiply(z2, z) - one;
        let delta = divide(numer, denom);
        z = z - delta;
        if !is_finite(z) {
            return EscapeValue::Interior;
        }
        if magnitude_squared(delta) < tol_sq {
            return EscapeValue::Converged {
                root: nearest_root(z.re.to_f64().unwrap_or(0.0), z.im.to_f64().unwrap_or(0.0)),
                iterations: i,
            };
        }
    }
    EscapeValue::Interior
}

/// Indice de la racine de z³ - 1 la plus proche.
pub fn nearest_root(re: f64, im: f64) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (idx, (rr, ri)) in NEWTON_ROOTS.iter().enumerate() {
        let d = (re - rr) * (re - rr) + (im - ri) * (im - ri);
        if d < best_d {
            best_d = d;
            best = idx;
        }
    }
    best
}

impl FractalType {
    /// Germe z₀ de la variante pour un point échantillonné.
    pub fn seed<T: Float>(self, sample: Complex<T>) -> Complex<T> {
        match self {
            FractalType::Julia | FractalType::Newton => sample,
            FractalType::Lambda => Complex::new(T::from(LAMBDA_SEED).unwrap_or_else(T::zero), T::zero()),
            _ => Complex::new(T::zero(), T::zero()),
        }
    }

    /// Évalue un point du plan complexe (déjà passé par le mappeur de coordonnées).
    pub fn evaluate<T: Float>(self, sample: Complex<T>, cfg: &IterationConfig<T>) -> EscapeValue {
        let seed = self.seed(sample);
        match self {
            FractalType::Mandelbrot => escape_time(seed, cfg, |z, _| add(square(z), sample)),
            FractalType::Julia => {
                let c = cfg.julia_constant;
                escape_time(seed, cfg, |z, _| add(square(z), c))
            }
            FractalType::BurningShip => {
                // L'axe imaginaire est inversé pour que le « navire » soit à l'endroit.
                let c = conjugate(sample);
                escape_time(seed, cfg, |z, _| add(square(absolute(z)), c))
            }
            FractalType::Tricorn => escape_time(seed, cfg, |z, _| add(square(conjugate(z)), sample)),
            FractalType::Celtic => escape_time(seed, cfg, |z, _| {
                let w = square(z);
                add(Complex::new(w.re.abs(), w.im), sample)
            }),
            FractalType::Perpendicular => escape_time(seed, cfg, |z, _| add(absolute(z), sample)),
            FractalType::Heart => escape_time(seed, cfg, |z, _| {
                add(scale(square(z), magnitude(z)), sample)
            }),
            FractalType::Phoenix => {
                let p = T::from(PHOENIX_P).unwrap_or_else(T::zero);
                escape_time(seed, cfg, |z, z_prev| add(add(square(z), sample), scale(z_prev, p)))
            }
            FractalType::Lambda => {
                let one = Complex::new(T::one(), T::zero());
                escape_time(seed, cfg, |z, _| multiply(multiply(sample, z), one - z))
            }
            FractalType::Newton => newton(sample, cfg),
            FractalType::Lyapunov => lyapunov_exponent(sample.re, sample.im, cfg.max_iterations),
        }
    }
}
