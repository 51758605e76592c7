//! Niveaux de détail: compromis itérations / échantillonnage / précision.

use serde::{Deserialize, Serialize};

use crate::fractal::{FractalParams, PrecisionTier};
use crate::perf::monitor::PerformanceMetrics;

/// fps au-delà desquels on remonte d'un niveau de qualité.
pub const RAISE_FPS: f64 = 65.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTier {
    /// Plafond d'itérations (jamais un plancher).
    pub max_iterations: u32,
    pub samples_per_pixel: u32,
    pub precision: PrecisionTier,
}

impl QualityTier {
    pub const fn new(max_iterations: u32, samples_per_pixel: u32, precision: PrecisionTier) -> Self {
        Self { max_iterations, samples_per_pixel, precision }
    }

    pub fn sample_grid(&self) -> u32 {
        sample_grid(self.samples_per_pixel)
    }
}

/// Côté de la grille de sous-échantillons: `round(sqrt(spp))`, au moins 1.
pub fn sample_grid(samples_per_pixel: u32) -> u32 {
    (samples_per_pixel.max(1) as f64).sqrt().round().max(1.0) as u32
}

/// Niveaux du plus coûteux au moins coûteux, et seuils de zoom croissants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub tiers: Vec<QualityTier>,
    pub zoom_thresholds: Vec<f64>,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                QualityTier::new(1000, 4, PrecisionTier::High),
                QualityTier::new(1000, 1, PrecisionTier::High),
                QualityTier::new(500, 1, PrecisionTier::High),
                QualityTier::new(100, 1, PrecisionTier::Medium),
                QualityTier::new(50, 1, PrecisionTier::Low),
            ],
            zoom_thresholds: vec![1.0, 10.0, 100.0, 1000.0],
        }
    }
}

impl LodConfig {
    /// Configuration utilisable: niveaux non vides, plafonds ≥ 1, seuils
    /// finis et triés.
    pub fn sanitized(&self) -> LodConfig {
        let mut tiers: Vec<QualityTier> = self
            .tiers
            .iter()
            .map(|t| QualityTier {
                max_iterations: t.max_iterations.max(1),
                samples_per_pixel: t.samples_per_pixel.max(1),
                precision: t.precision,
            })
            .collect();
        if tiers.is_empty() {
            tiers = LodConfig::default().tiers;
        }
        let mut zoom_thresholds: Vec<f64> =
            self.zoom_thresholds.iter().copied().filter(|z| z.is_finite()).collect();
        zoom_thresholds.sort_by(|a, b| a.total_cmp(b));
        LodConfig { tiers, zoom_thresholds }
    }
}

/// Réglages effectivement utilisés pour une frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSettings {
    pub tier: usize,
    /// Paramètres avec le plafond d'itérations et la précision du niveau appliqués.
    pub params: FractalParams,
    pub samples_per_pixel: u32,
}

impl FrameSettings {
    /// Réglages sans plafond ni multi-échantillonnage.
    pub fn unconstrained(params: &FractalParams) -> Self {
        Self { tier: 0, params: params.clone(), samples_per_pixel: 1 }
    }

    pub fn sample_grid(&self) -> u32 {
        sample_grid(self.samples_per_pixel)
    }
}

#[derive(Clone, Debug)]
pub struct LodController {
    config: LodConfig,
    current: Option<usize>,
}

impl Default for LodController {
    fn default() -> Self {
        Self::new(LodConfig::default())
    }
}

impl LodController {
    pub fn new(config: LodConfig) -> Self {
        Self { config: config.sanitized(), current: None }
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn tier_count(&self) -> usize {
        self.config.tiers.len()
    }

    pub fn tier(&self, index: usize) -> &QualityTier {
        let last = self.config.tiers.len() - 1;
        &self.config.tiers[index.min(last)]
    }

    pub fn current_tier(&self) -> Option<usize> {
        self.current
    }

    /// Niveau de base: nombre de seuils franchis par le zoom.
    pub fn baseline_tier(&self, zoom: f64) -> usize {
        let crossed = self.config.zoom_thresholds.iter().filter(|t| zoom >= **t).count();
        crossed.min(self.tier_count() - 1)
    }

    /// Niveau de base ajusté d'un cran selon les performances mesurées.
    pub fn recommended_tier(&self, zoom: f64, metrics: &PerformanceMetrics) -> usize {
        let base = self.baseline_tier(zoom);
        let last = self.tier_count() - 1;
        if !metrics.is_acceptable() && base < last {
            base + 1
        } else if metrics.fps > RAISE_FPS && base > 0 {
            base - 1
        } else {
            base
        }
    }

    /// Comme [`LodController::recommended_tier`], mais jamais plus d'un cran
    /// d'écart avec le niveau retenu à l'appel précédent.
    pub fn update(&mut self, zoom: f64, metrics: &PerformanceMetrics) -> usize {
        let target = self.recommended_tier(zoom, metrics);
        let next = match self.current {
            Some(cur) => target.clamp(cur.saturating_sub(1), cur + 1),
            None => target,
        };
        self.current = Some(next);
        next
    }

    /// Applique le niveau aux paramètres demandés.
    pub fn apply(&self, params: &FractalParams, tier_index: usize) -> FrameSettings {
        let tier = self.tier(tier_index);
        let mut effective = params.clone();
        effective.max_iterations = params.max_iterations.min(tier.max_iterations);
        effective.precision = params.precision.min_quality(tier.precision);
        FrameSettings {
            tier: tier_index.min(self.tier_count() - 1),
            params: effective,
            samples_per_pixel: tier.samples_per_pixel,
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(fps: f64, frame_ms: f64) -> PerformanceMetrics {
        PerformanceMetrics { fps, frame_time_ms: frame_ms, ..PerformanceMetrics::default() }
    }

    #[test]
    fn test_baseline_follows_thresholds() {
        let lod = LodController::default();
        assert_eq!(lod.baseline_tier(0.5), 0);
        assert_eq!(lod.baseline_tier(1.0), 1);
        assert_eq!(lod.baseline_tier(4.0), 1);
        assert_eq!(lod.baseline_tier(50.0), 2);
        assert_eq!(lod.baseline_tier(500.0), 3);
        assert_eq!(lod.baseline_tier(1e6), 4);
    }

    #[test]
    fn test_adjusts_by_one_tier() {
        let lod = LodController::default();
        assert_eq!(lod.recommended_tier(4.0, &metrics(60.0, 16.0)), 1);
        assert_eq!(lod.recommended_tier(4.0, &metrics(30.0, 33.0)), 2);
        assert_eq!(lod.recommended_tier(4.0, &metrics(120.0, 8.0)), 0);
        // Aux bornes de la liste.
        assert_eq!(lod.recommended_tier(0.5, &metrics(120.0, 8.0)), 0);
        assert_eq!(lod.recommended_tier(1e6, &metrics(10.0, 100.0)), 4);
    }

    #[test]
    fn test_degrading_fps_moves_one_tier_per_call() {
        let mut lod = LodController::default();
        let mut prev = lod.update(4.0, &metrics(120.0, 8.0));
        for fps in [90.0, 70.0, 59.0, 57.0, 40.0, 20.0, 5.0, 1.0] {
            let next = lod.update(4.0, &metrics(fps, 1000.0 / fps));
            assert!(next <= prev + 1, "{prev} -> {next} at {fps} fps");
            assert!(next < lod.tier_count());
            prev = next;
        }
        // Zoom très large puis retour: toujours un cran à la fois.
        let mut prev = lod.update(1e6, &metrics(10.0, 100.0));
        for _ in 0..10 {
            let next = lod.update(0.5, &metrics(200.0, 5.0));
            assert!(prev.abs_diff(next) <= 1);
            prev = next;
        }
        assert_eq!(prev, 0);
    }

    #[test]
    fn test_iteration_cap_is_a_ceiling() {
        let lod = LodController::default();
        let params = FractalParams { max_iterations: 100, ..FractalParams::default() };
        // Niveau 2: plafond 500, les 100 demandées restent 100.
        assert_eq!(lod.apply(&params, 2).params.max_iterations, 100);
        let params = FractalParams { max_iterations: 1000, ..FractalParams::default() };
        let settings = lod.apply(&params, 4);
        assert_eq!(settings.params.max_iterations, 50);
        assert_eq!(settings.params.precision, PrecisionTier::Low);
        assert_eq!(settings.samples_per_pixel, 1);
        assert_eq!(lod.apply(&params, 0).samples_per_pixel, 4);
    }

    #[test]
    fn test_requested_precision_never_raised() {
        let lod = LodController::default();
        let params = FractalParams { precision: PrecisionTier::Low, ..FractalParams::default() };
        assert_eq!(lod.apply(&params, 0).params.precision, PrecisionTier::Low);
    }

    #[test]
    fn test_sanitized_config() {
        let cfg = LodConfig { tiers: vec![], zoom_thresholds: vec![100.0, f64::NAN, 1.0] }.sanitized();
        assert_eq!(cfg.tiers, LodConfig::default().tiers);
        assert_eq!(cfg.zoom_thresholds, vec![1.0, 100.0]);
    }

    #[test]
    fn test_sample_grid() {
        assert_eq!(QualityTier::new(100, 4, PrecisionTier::High).sample_grid(), 2);
        assert_eq!(QualityTier::new(100, 1, PrecisionTier::High).sample_grid(), 1);
        assert_eq!(QualityTier::new(100, 0, PrecisionTier::High).sample_grid(), 1);
        assert_eq!(QualityTier::new(100, 9, PrecisionTier::High).sample_grid(), 3);
    }
}
