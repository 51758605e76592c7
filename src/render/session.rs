//! État partagé d'une session: paramètres courants, taille de surface,
//! éditions en attente.
//!
//! Toute mise à jour remplace l'objet [`FractalParams`] en entier, toujours
//! revalidé; un lecteur voit soit l'ancien objet soit le nouveau.

use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::fractal::{default_params_for_type, definition, presets, FractalParams, ParamEdit};
use crate::perf::Debouncer;
use crate::render::viewport::Viewport;

/// Événements reçus de la couche d'entrée (gestes, clavier, formulaires).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InputEvent {
    /// Glisser, en pixels écran (y vers le bas).
    Pan { dx: f64, dy: f64 },
    /// Facteur > 1 rapproche. Ancre en pixels écran, centre de la surface
    /// par défaut.
    Zoom { factor: f64, anchor: Option<(f64, f64)> },
    SelectPreset { index: usize },
    GoToLocation { index: usize },
    /// Édition d'un champ. Appliquée après un délai de silence.
    Edit { edit: ParamEdit },
    ResetToPreset,
    Resize { width: u32, height: u32 },
}

#[derive(Debug)]
pub struct Session {
    params: FractalParams,
    width: u32,
    height: u32,
    preset: Option<usize>,
    edits: Debouncer<FractalParams>,
    revision: u64,
}

impl Session {
    pub fn new(params: &FractalParams, width: u32, height: u32, debounce: Duration) -> Self {
        Self {
            params: params.validate(),
            width: width.max(1),
            height: height.max(1),
            preset: None,
            edits: Debouncer::new(debounce),
            revision: 0,
        }
    }

    /// Session ouverte sur le preset `index` (le premier si hors limites).
    pub fn from_preset(index: usize, width: u32, height: u32, debounce: Duration) -> Self {
        let index = if index < presets().len() { index } else { 0 };
        let mut session = Self::new(&presets()[index].params, width, height, debounce);
        session.preset = Some(index);
        session
    }

    pub fn params(&self) -> &FractalParams {
        &self.params
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::from_params(&self.params, self.width, self.height)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn current_preset(&self) -> Option<usize> {
        self.preset
    }

    /// Incrémenté à chaque remplacement effectif des paramètres.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_pending_edits(&self) -> bool {
        self.edits.is_pending()
    }

    fn replace(&mut self, next: FractalParams) -> bool {
        let next = next.validate();
        if next == self.params {
            return false;
        }
        self.params = next;
        self.revision += 1;
        true
    }

    /// Applique les éditions en attente immédiatement.
    pub fn flush_edits(&mut self) -> bool {
        match self.edits.flush() {
            Some(next) => self.replace(next),
            None => false,
        }
    }

    /// Applique les éditions en attente si le délai de silence est écoulé.
    /// À appeler entre deux ticks.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.edits.poll(now) {
            Some(next) => {
                debug!("Committing debounced edit");
                self.replace(next)
            }
            None => false,
        }
    }

    /// Traite un événement. Renvoie `true` si les paramètres ont changé.
    pub fn handle(&mut self, event: &InputEvent, now: Instant) -> bool {
        match event {
            InputEvent::Edit { edit } => {
                let base = self.edits.cancel().unwrap_or_else(|| self.params.clone());
                self.edits.schedule(base.with_edit(edit), now);
                false
            }
            InputEvent::Pan { dx, dy } => {
                let flushed = self.flush_edits();
                let viewport = self.viewport().pan(*dx, *dy);
                self.apply_viewport(viewport) || flushed
            }
            InputEvent::Zoom { factor, anchor } => {
                let flushed = self.flush_edits();
                let current = self.viewport();
                let viewport = match anchor {
                    Some((x, y)) => {
                        let (px, py) = current.from_screen(*x, *y);
                        current.zoom_at_point(*factor, px, py)
                    }
                    None => current.zoom_centered(*factor),
                };
                self.apply_viewport(viewport) || flushed
            }
            InputEvent::SelectPreset { index } => {
                let Some(preset) = presets().get(*index) else {
                    warn!("No preset #{index}, ignoring");
                    return false;
                };
                self.edits.cancel();
                self.preset = Some(*index);
                self.replace(preset.params.clone())
            }
            InputEvent::GoToLocation { index } => {
                let flushed = self.flush_edits();
                let def = definition(self.params.fractal_type);
                let Some(location) = def.locations.get(*index) else {
                    warn!("No location #{index} for {}, ignoring", def.name);
                    return flushed;
                };
                debug!("Going to {} / {}", def.name, location.name);
                let next = location.apply(&self.params);
                self.replace(next) || flushed
            }
            InputEvent::ResetToPreset => {
                self.edits.cancel();
                let next = match self.preset.and_then(|i| presets().get(i)) {
                    Some(preset) => preset.params.clone(),
                    None => default_params_for_type(self.params.fractal_type),
                };
                self.replace(next)
            }
            InputEvent::Resize { width, height } => {
                self.width = (*width).max(1);
                self.height = (*height).max(1);
                false
            }
        }
    }

    fn apply_viewport(&mut self, viewport: Viewport) -> bool {
        let next = FractalParams { center: viewport.center, zoom: viewport.zoom, ..self.params.clone() };
        self.replace(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractal::FractalType;
    use num_complex::Complex64;

    const DEBOUNCE: Duration = Duration::from_millis(50);

    fn session() -> Session {
        Session::new(&FractalParams::default(), 200, 100, DEBOUNCE)
    }

    #[test]
    fn test_new_validates() {
        let bad = FractalParams { zoom: -1.0, max_iterations: 37, ..FractalParams::default() };
        let s = Session::new(&bad, 10, 10, DEBOUNCE);
        assert!(s.params().is_valid());
        assert_eq!(s.params().zoom, 4.0);
        assert_eq!(s.params().max_iterations, 100);
    }

    #[test]
    fn test_pan_moves_center() {
        let mut s = session();
        let now = Instant::now();
        assert!(s.handle(&InputEvent::Pan { dx: 10.0, dy: 0.0 }, now));
        // 10 px * (4 / 100) * 2 vers la droite: le centre recule.
        assert!((s.params().center.re - (-0.5 - 0.8)).abs() < 1e-12);
        assert_eq!(s.revision(), 1);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut s = session();
        let now = Instant::now();
        let before = s.viewport();
        let anchor = (150.0, 20.0);
        let (px, py) = before.from_screen(anchor.0, anchor.1);
        let target = before.pixel_to_complex(px, py);

        assert!(s.handle(&InputEvent::Zoom { factor: 2.0, anchor: Some(anchor) }, now));
        assert_eq!(s.params().zoom, 2.0);
        let after = s.viewport().pixel_to_complex(px, py);
        assert!((after - target).norm() < 1e-12);
    }

    #[test]
    fn test_zoom_without_anchor_keeps_center() {
        let mut s = session();
        s.handle(&InputEvent::Zoom { factor: 0.5, anchor: None }, Instant::now());
        assert_eq!(s.params().zoom, 8.0);
        assert!((s.params().center - Complex64::new(-0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_edits_are_debounced() {
        let mut s = session();
        let t0 = Instant::now();
        for (i, n) in [50u32, 500, 1000].iter().enumerate() {
            let edit = ParamEdit::MaxIterations(*n);
            assert!(!s.handle(&InputEvent::Edit { edit }, t0 + Duration::from_millis(10 * i as u64)));
        }
        s.handle(&InputEvent::Edit { edit: ParamEdit::EscapeRadius(4.0) }, t0 + Duration::from_millis(30));
        assert_eq!(s.params().max_iterations, 100);

        assert!(!s.poll(t0 + Duration::from_millis(60)));
        assert!(s.poll(t0 + Duration::from_millis(80)));
        assert_eq!(s.params().max_iterations, 1000);
        assert_eq!(s.params().escape_radius, 4.0);
        assert_eq!(s.revision(), 1);
    }

    #[test]
    fn test_invalid_edit_substitutes_default() {
        let mut s = session();
        let now = Instant::now();
        s.handle(&InputEvent::Edit { edit: ParamEdit::Zoom(f64::NAN) }, now);
        s.handle(&InputEvent::Edit { edit: ParamEdit::EscapeRadius(4.0) }, now);
        s.flush_edits();
        assert_eq!(s.params().zoom, 4.0);
        assert_eq!(s.params().escape_radius, 4.0);
    }

    #[test]
    fn test_pan_commits_pending_edits() {
        let mut s = session();
        let now = Instant::now();
        s.handle(&InputEvent::Edit { edit: ParamEdit::MaxIterations(500) }, now);
        s.handle(&InputEvent::Pan { dx: 1.0, dy: 1.0 }, now);
        assert!(!s.has_pending_edits());
        assert_eq!(s.params().max_iterations, 500);
    }

    #[test]
    fn test_presets_and_reset() {
        let mut s = session();
        let now = Instant::now();
        assert!(s.handle(&InputEvent::SelectPreset { index: 1 }, now));
        assert_eq!(s.params().fractal_type, FractalType::Julia);
        assert_eq!(s.current_preset(), Some(1));

        s.handle(&InputEvent::Zoom { factor: 4.0, anchor: None }, now);
        assert!(s.handle(&InputEvent::ResetToPreset, now));
        assert_eq!(*s.params(), presets()[1].params.validate());

        assert!(!s.handle(&InputEvent::SelectPreset { index: 99 }, now));
        assert_eq!(s.current_preset(), Some(1));
    }

    #[test]
    fn test_reset_without_preset_uses_variant_defaults() {
        let params = FractalParams { fractal_type: FractalType::Heart, zoom: 1.0, ..FractalParams::default() };
        let mut s = Session::new(&params, 10, 10, DEBOUNCE);
        s.handle(&InputEvent::ResetToPreset, Instant::now());
        assert_eq!(*s.params(), default_params_for_type(FractalType::Heart).validate());
    }

    #[test]
    fn test_go_to_location() {
        let mut s = session();
        let location = definition(FractalType::Mandelbrot).locations[0].clone();
        s.handle(&InputEvent::GoToLocation { index: 0 }, Instant::now());
        assert_eq!(s.params().center, location.center);
        assert!(s.params().is_valid());
        assert!(!s.handle(&InputEvent::GoToLocation { index: 999 }, Instant::now()));
    }

    #[test]
    fn test_resize_changes_viewport_only() {
        let mut s = session();
        assert!(!s.handle(&InputEvent::Resize { width: 0, height: 300 }, Instant::now()));
        assert_eq!(s.size(), (1, 300));
        assert_eq!(s.viewport().height, 300);
        assert_eq!(s.revision(), 0);
    }

    #[test]
    fn test_event_json_shape() {
        let e: InputEvent = serde_json::from_str(r#"{"event":"zoom","factor":2.0,"anchor":[10.0,20.0]}"#).unwrap();
        assert_eq!(e, InputEvent::Zoom { factor: 2.0, anchor: Some((10.0, 20.0)) });
    }
}
