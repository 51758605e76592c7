use std::sync::atomic::{AtomicBool, Ordering};

use num_complex::Complex;
use num_traits::Float;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::fractal::formulas::newton_band_value;
use crate::fractal::lyapunov::LYAPUNOV_SENTINEL;
use crate::fractal::{EscapeValue, FractalParams, FractalType, IterationConfig, PrecisionTier};
use crate::perf::lod::sample_grid;
use crate::render::viewport::Viewport;

/// Rectangle de pixels écran (origine en haut à gauche).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn full(viewport: &Viewport) -> Self {
        Self { x: 0, y: 0, width: viewport.width, height: viewport.height }
    }

    /// Intersection avec la surface du viewport.
    pub fn clamped_to(&self, viewport: &Viewport) -> Self {
        let x = self.x.min(viewport.width);
        let y = self.y.min(viewport.height);
        Self {
            x,
            y,
            width: self.width.min(viewport.width - x),
            height: self.height.min(viewport.height - y),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Champ de valeurs d'itération, ligne par ligne depuis le haut.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub values: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl Field {
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.values.get(row as usize * self.width as usize + col as usize).copied()
    }
}

/// Sous-échantillons d'un pixel, regroupés par classe.
///
/// Les comptes d'échappement se moyennent directement. Un point Newton
/// garde la racine majoritaire et la moyenne des pas de cette seule racine;
/// les exposants de Lyapunov se moyennent sans la sentinelle.
#[derive(Debug, Default)]
struct PixelSamples {
    count: u32,
    escape_total: f64,
    /// (échantillons, somme des pas) par racine.
    roots: [(u32, f64); 3],
    exponents: u32,
    exponent_total: f64,
}

impl PixelSamples {
    fn add(&mut self, value: EscapeValue, max_iterations: u32) {
        self.count += 1;
        match value {
            EscapeValue::Converged { root, iterations } => {
                if let Some(slot) = self.roots.get_mut(root) {
                    slot.0 += 1;
                    slot.1 += iterations as f64;
                }
            }
            EscapeValue::Lyapunov(l) => {
                if l.is_finite() && l != LYAPUNOV_SENTINEL {
                    self.exponents += 1;
                    self.exponent_total += l;
                }
            }
            other => self.escape_total += other.to_field_value(max_iterations) as f64,
        }
    }

    fn value(&self, variant: FractalType, max_iterations: u32) -> f32 {
        let count = self.count.max(1);
        match variant {
            FractalType::Newton => {
                let (root, (hits, steps)) = self
                    .roots
                    .iter()
                    .enumerate()
                    .fold((0, (0, 0.0)), |best, (i, slot)| if slot.0 > best.1 .0 { (i, *slot) } else { best });
                let converged: u32 = self.roots.iter().map(|slot| slot.0).sum();
                if hits == 0 || count - converged > hits {
                    EscapeValue::Interior.to_field_value(max_iterations)
                } else {
                    newton_band_value(root, steps / hits as f64, max_iterations)
                }
            }
            FractalType::Lyapunov => {
                if self.exponents == 0 {
                    LYAPUNOV_SENTINEL as f32
                } else {
                    (self.exponent_total / self.exponents as f64) as f32
                }
            }
            _ => (self.escape_total / count as f64) as f32,
        }
    }
}

/// Valeur aplatie d'un pixel à partir de ses `n x n` sous-échantillons.
fn evaluate_pixel<T: Float>(
    variant: FractalType,
    cfg: &IterationConfig<T>,
    viewport: &Viewport,
    col: u32,
    row: u32,
    grid: u32,
) -> f32 {
    let mut samples = PixelSamples::default();
    for sy in 0..grid {
        for sx in 0..grid {
            let c = viewport.sample_position(col, row, sx, sy, grid);
            let sample = Complex::new(
                T::from(c.re).unwrap_or_else(T::nan),
                T::from(c.im).unwrap_or_else(T::nan),
            );
            samples.add(variant.evaluate(sample, cfg), cfg.max_iterations);
        }
    }
    samples.value(variant, cfg.max_iterations)
}

fn fill_rows<T: Float + Send + Sync>(
    variant: FractalType,
    cfg: IterationConfig<T>,
    viewport: &Viewport,
    region: Region,
    grid: u32,
    values: &mut [f32],
    cancel: Option<&AtomicBool>,
) -> bool {
    let width = region.width as usize;
    values.par_chunks_mut(width).enumerate().for_each(|(j, row)| {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return;
        }
        let screen_row = region.y + j as u32;
        for (i, value) in row.iter_mut().enumerate() {
            *value = evaluate_pixel(variant, &cfg, viewport, region.x + i as u32, screen_row, grid);
        }
    });
    !cancel.is_some_and(|c| c.load(Ordering::Relaxed))
}

/// Calcule le champ d'une région, en parallèle par lignes.
///
/// La précision des paramètres choisit l'arithmétique: f64 pour `High`,
/// f32 sinon.
pub fn compute_field(
    variant: FractalType,
    params: &FractalParams,
    viewport: &Viewport,
    region: Region,
    samples_per_pixel: u32,
) -> Field {
    compute_field_inner(variant, params, viewport, region, samples_per_pixel, None).unwrap_or(Field {
        values: Vec::new(),
        width: 0,
        height: 0,
    })
}

/// Version annulable de [`compute_field`]. Renvoie `None` si annulé.
pub fn compute_field_cancellable(
    variant: FractalType,
    params: &FractalParams,
    viewport: &Viewport,
    region: Region,
    samples_per_pixel: u32,
    cancel: &AtomicBool,
) -> Option<Field> {
    compute_field_inner(variant, params, viewport, region, samples_per_pixel, Some(cancel))
}

fn compute_field_inner(
    variant: FractalType,
    params: &FractalParams,
    viewport: &Viewport,
    region: Region,
    samples_per_pixel: u32,
    cancel: Option<&AtomicBool>,
) -> Option<Field> {
    let region = region.clamped_to(viewport);
    let mut values = vec![0.0f32; region.pixel_count()];
    if values.is_empty() {
        return Some(Field { values, width: region.width, height: region.height });
    }

    let grid = sample_grid(samples_per_pixel);
    let complete = match params.precision {
        PrecisionTier::High => {
            let cfg: IterationConfig<f64> = IterationConfig::from_params(params);
            fill_rows(variant, cfg, viewport, region, grid, &mut values, cancel)
        }
        PrecisionTier::Medium | PrecisionTier::Low => {
            let cfg: IterationConfig<f32> = IterationConfig::from_params(params);
            fill_rows(variant, cfg, viewport, region, grid, &mut values, cancel)
        }
    };

    complete.then_some(Field { values, width: region.width, height: region.height })
}
