use num_complex::Complex64;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::fractal::{FractalParams, FractalType, PrecisionTier};

/// Signet de navigation: centre + zoom + surcharges optionnelles.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InterestingLocation {
    pub name: &'static str,
    pub center: Complex64,
    pub zoom: f64,
    pub max_iterations: Option<u32>,
    pub julia_constant: Option<Complex64>,
}

impl InterestingLocation {
    const fn at(name: &'static str, re: f64, im: f64, zoom: f64) -> Self {
        Self { name, center: Complex64::new(re, im), zoom, max_iterations: None, julia_constant: None }
    }

    const fn iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    const fn julia(mut self, re: f64, im: f64) -> Self {
        self.julia_constant = Some(Complex64::new(re, im));
        self
    }

    /// Applique le signet et revalide.
    pub fn apply(&self, params: &FractalParams) -> FractalParams {
        let mut next = params.clone();
        next.center = self.center;
        next.zoom = self.zoom;
        if let Some(n) = self.max_iterations {
            next.max_iterations = n;
        }
        if let Some(c) = self.julia_constant {
            next.julia_constant = Some(c);
        }
        next.validate()
    }
}

/// Définition statique d'une variante. Construite une seule fois.
#[derive(Clone, Debug, Serialize)]
pub struct FractalDefinition {
    pub fractal_type: FractalType,
    pub name: &'static str,
    pub description: &'static str,
    pub defaults: FractalParams,
    pub locations: Vec<InterestingLocation>,
}

/// Construit les paramètres par défaut du type.
pub fn default_params_for_type(fractal_type: FractalType) -> FractalParams {
    // Valeurs communes
    let mut params = FractalParams {
        fractal_type,
        escape_radius: 2.0,
        max_iterations: 100,
        center: Complex64::new(0.0, 0.0),
        zoom: 4.0,
        palette: "classic".to_string(),
        precision: PrecisionTier::High,
        julia_constant: None,
    };

    match fractal_type {
        FractalType::Mandelbrot => {
            params.center = Complex64::new(-0.5, 0.0);
        }
        FractalType::Julia => {
            params.zoom = 3.5;
            params.julia_constant = Some(Complex64::new(-0.7269, 0.1889));
            params.palette = "ocean".to_string();
        }
        FractalType::BurningShip => {
            params.center = Complex64::new(-0.5, -0.5);
            params.palette = "fire".to_string();
        }
        FractalType::Tricorn => {
            params.center = Complex64::new(-0.3, 0.0);
            params.palette = "violet".to_string();
        }
        FractalType::Celtic => {
            params.center = Complex64::new(-0.5, 0.0);
            params.palette = "forest".to_string();
        }
        FractalType::Perpendicular => {
            params.escape_radius = 4.0;
            params.center = Complex64::new(-0.5, 0.0);
            params.palette = "sunset".to_string();
        }
        FractalType::Heart => {
            params.escape_radius = 4.0;
            params.center = Complex64::new(0.0, 0.0);
            params.zoom = 3.0;
            params.palette = "sunset".to_string();
        }
        FractalType::Phoenix => {
            params.zoom = 3.0;
            params.palette = "plasma".to_string();
        }
        FractalType::Lambda => {
            params.center = Complex64::new(1.0, 0.0);
            params.zoom = 6.0;
            params.palette = "ice".to_string();
        }
        FractalType::Newton => {
            params.zoom = 3.0;
            params.max_iterations = 50;
            params.palette = "rainbow".to_string();
        }
        FractalType::Lyapunov => {
            // Domaine [2, 4] x [2, 4] du plan (a, b).
            params.center = Complex64::new(3.0, 3.0);
            params.zoom = 2.0;
            params.palette = "cosmic".to_string();
        }
    }

    params
}

fn build_definition(fractal_type: FractalType) -> FractalDefinition {
    let (description, locations) = match fractal_type {
        FractalType::Mandelbrot => (
            "z² + c, z₀ = 0, c = point du plan",
            vec![
                InterestingLocation::at("Vue d'ensemble", -0.5, 0.0, 4.0),
                InterestingLocation::at("Vallée des hippocampes", -0.745, 0.113, 0.1).iterations(500),
                InterestingLocation::at("Vallée des éléphants", 0.282, 0.01, 0.1).iterations(500),
                InterestingLocation::at("Mini Mandelbrot", -1.7687, 0.0017, 0.1).iterations(1000),
            ],
        ),
        FractalType::Julia => (
            "z² + c, z₀ = point du plan, c = constante de Julia",
            vec![
                InterestingLocation::at("Défaut", 0.0, 0.0, 3.5).julia(-0.7269, 0.1889),
                InterestingLocation::at("Dendrite", 0.0, 0.0, 3.5).julia(0.0, 1.0),
                InterestingLocation::at("Lapin de Douady", 0.0, 0.0, 3.0).julia(-0.123, 0.745),
                InterestingLocation::at("San Marco", 0.0, 0.0, 4.0).julia(-0.75, 0.0),
            ],
        ),
        FractalType::BurningShip => (
            "(|Re z| + i|Im z|)² + c, axe imaginaire inversé",
            vec![
                InterestingLocation::at("Navire", -0.5, -0.5, 4.0),
                InterestingLocation::at("Armada", -1.762, -0.028, 0.1).iterations(500),
            ],
        ),
        FractalType::Tricorn => (
            "conj(z)² + c",
            vec![
                InterestingLocation::at("Vue d'ensemble", -0.3, 0.0, 4.0),
                InterestingLocation::at("Corne", -1.3, 0.0, 0.5),
            ],
        ),
        FractalType::Celtic => (
            "|Re(z²)| + i·Im(z²) + c",
            vec![InterestingLocation::at("Vue d'ensemble", -0.5, 0.0, 4.0)],
        ),
        FractalType::Perpendicular => (
            "|Re z| + i|Im z| + c",
            vec![InterestingLocation::at("Vue d'ensemble", -0.5, 0.0, 4.0)],
        ),
        FractalType::Heart => (
            "z²·|z| + c",
            vec![
                InterestingLocation::at("Cœur", 0.0, 0.0, 3.0),
                InterestingLocation::at("Lobe", -0.6, 0.0, 0.8),
            ],
        ),
        FractalType::Phoenix => (
            "z² + c + p·z_prev, p = 0.5667",
            vec![
                InterestingLocation::at("Vue d'ensemble", 0.0, 0.0, 3.0),
                InterestingLocation::at("Aile", -0.45, 0.35, 0.5).iterations(500),
            ],
        ),
        FractalType::Lambda => (
            "λ·z·(1 - z), z₀ = 0.5, λ = point du plan",
            vec![
                InterestingLocation::at("Vue d'ensemble", 1.0, 0.0, 6.0),
                InterestingLocation::at("Bourgeon", 3.0, 0.0, 1.0),
            ],
        ),
        FractalType::Newton => (
            "Méthode de Newton sur z³ - 1, couleur = racine atteinte",
            vec![
                InterestingLocation::at("Bassins", 0.0, 0.0, 3.0),
                InterestingLocation::at("Jonction", -0.5, 0.0, 0.5),
            ],
        ),
        FractalType::Lyapunov => (
            "Exposant de la carte logistique, r alterne entre a et b",
            vec![
                InterestingLocation::at("Standard (Swallow)", 3.0, 3.0, 2.0),
                InterestingLocation::at("Zircon City", 2.95, 3.7, 0.6),
                InterestingLocation::at("Jellyfish", 3.7, 3.7, 0.6),
                InterestingLocation::at("Spaceship", 3.7, 3.7, 0.4).iterations(500),
            ],
        ),
    };

    FractalDefinition {
        fractal_type,
        name: fractal_type.name(),
        description,
        defaults: default_params_for_type(fractal_type),
        locations,
    }
}

static DEFINITIONS: Lazy<Vec<FractalDefinition>> =
    Lazy::new(|| FractalType::all().iter().map(|t| build_definition(*t)).collect());

/// Définition mise en cache pour la variante.
pub fn definition(fractal_type: FractalType) -> &'static FractalDefinition {
    let idx = FractalType::all()
        .iter()
        .position(|t| *t == fractal_type)
        .unwrap_or(0);
    &DEFINITIONS[idx]
}

pub fn all_definitions() -> &'static [FractalDefinition] {
    &DEFINITIONS
}

/// Preset nommé de la liste globale (les cinq premiers sont liés aux touches 1 à 5).
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub params: FractalParams,
}

static PRESETS: Lazy<Vec<Preset>> = Lazy::new(|| {
    [
        FractalType::Mandelbrot,
        FractalType::Julia,
        FractalType::BurningShip,
        FractalType::Newton,
        FractalType::Phoenix,
        FractalType::Tricorn,
        FractalType::Celtic,
        FractalType::Perpendicular,
        FractalType::Heart,
        FractalType::Lambda,
        FractalType::Lyapunov,
    ]
    .iter()
    .map(|t| Preset { name: t.name(), params: default_params_for_type(*t) })
    .collect()
});

pub fn presets() -> &'static [Preset] {
    &PRESETS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        for def in all_definitions() {
            assert!(def.defaults.is_valid(), "{} defaults invalid", def.name);
            assert_eq!(def.defaults.fractal_type, def.fractal_type);
            assert!(!def.locations.is_empty());
        }
    }

    #[test]
    fn test_definition_lookup() {
        for t in FractalType::all() {
            assert_eq!(definition(*t).fractal_type, *t);
        }
    }

    #[test]
    fn test_escape_radius_defaults() {
        assert_eq!(definition(FractalType::Perpendicular).defaults.escape_radius, 4.0);
        assert_eq!(definition(FractalType::Heart).defaults.escape_radius, 4.0);
        assert_eq!(definition(FractalType::Mandelbrot).defaults.escape_radius, 2.0);
    }

    #[test]
    fn test_location_apply_revalidates() {
        let loc = &definition(FractalType::Julia).locations[1];
        let p = loc.apply(&definition(FractalType::Julia).defaults);
        assert_eq!(p.julia_constant, Some(Complex64::new(0.0, 1.0)));
        assert!(p.is_valid());
    }

    #[test]
    fn test_presets_cover_all_types() {
        assert_eq!(presets().len(), FractalType::all().len());
        assert_eq!(presets()[0].params.fractal_type, FractalType::Mandelbrot);
        for preset in presets() {
            assert!(preset.params.is_valid());
        }
    }
}
