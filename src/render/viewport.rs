//! Passage espace écran <-> plan complexe.
//!
//! Convention des pixels du mappeur: `px` croît vers la droite, `py` croît
//! vers le haut (origine en bas à gauche, comme le `gl_FragCoord` des shaders).
//! Les coordonnées écran (y vers le bas) passent par [`Viewport::from_screen`].
//! Le zoom est l'étendue verticale visible; l'étendue horizontale vaut
//! `zoom * aspect`.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::fractal::types::{ZOOM_MAX, ZOOM_MIN};
use crate::fractal::FractalParams;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub center: Complex64,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, center: Complex64, zoom: f64) -> Self {
        Self { width, height, center, zoom }
    }

    /// Viewport courant d'une surface `width x height` pour ces paramètres.
    pub fn from_params(params: &FractalParams, width: u32, height: u32) -> Self {
        Self::new(width, height, params.center, params.zoom)
    }

    /// Largeur / hauteur. 1 pour une surface dégénérée.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        self.width as f64 / self.height as f64
    }

    fn dims(&self) -> (f64, f64) {
        (self.width.max(1) as f64, self.height.max(1) as f64)
    }

    /// Pixel (coordonnées du mappeur) -> point du plan complexe.
    pub fn pixel_to_complex(&self, px: f64, py: f64) -> Complex64 {
        let (w, h) = self.dims();
        let x = (px / w - 0.5) * self.aspect_ratio() * self.zoom;
        let y = (py / h - 0.5) * self.zoom;
        Complex64::new(x + self.center.re, y + self.center.im)
    }

    /// Inverse de [`Viewport::pixel_to_complex`].
    pub fn complex_to_pixel(&self, c: Complex64) -> (f64, f64) {
        let (w, h) = self.dims();
        let px = ((c.re - self.center.re) / (self.aspect_ratio() * self.zoom) + 0.5) * w;
        let py = ((c.im - self.center.im) / self.zoom + 0.5) * h;
        (px, py)
    }

    /// Convertit une position écran (y vers le bas) en pixel du mappeur.
    pub fn from_screen(&self, x: f64, y: f64) -> (f64, f64) {
        (x, self.height as f64 - y)
    }

    /// Déplacement écran (pixels, y vers le bas) -> déplacement dans le plan.
    pub fn screen_delta_to_complex_delta(&self, dx: f64, dy: f64) -> Complex64 {
        let min_dim = self.width.min(self.height).max(1) as f64;
        let scale = self.zoom / min_dim;
        Complex64::new(dx * scale * self.aspect_ratio(), -dy * scale)
    }

    /// Glisser de `(dx, dy)` pixels écran: le contenu suit le pointeur.
    pub fn pan(&self, dx: f64, dy: f64) -> Viewport {
        let delta = self.screen_delta_to_complex_delta(dx, dy);
        Viewport { center: self.center - delta, ..*self }
    }

    /// Zoom de facteur `factor` (> 1 rapproche) ancré au pixel `(px, py)`.
    ///
    /// Le point du plan sous l'ancre est identique avant et après. Le zoom
    /// résultant reste dans [`ZOOM_MIN`, `ZOOM_MAX`]; le centre est calculé
    /// avec la valeur bornée.
    pub fn zoom_at_point(&self, factor: f64, px: f64, py: f64) -> Viewport {
        if !factor.is_finite() || factor <= 0.0 {
            return *self;
        }
        let before = self.pixel_to_complex(px, py);
        let zoomed = Viewport { zoom: (self.zoom / factor).clamp(ZOOM_MIN, ZOOM_MAX), ..*self };
        let after = zoomed.pixel_to_complex(px, py);
        Viewport { center: zoomed.center + (before - after), ..zoomed }
    }

    /// Zoom ancré au centre de la surface.
    pub fn zoom_centered(&self, factor: f64) -> Viewport {
        self.zoom_at_point(factor, self.width as f64 * 0.5, self.height as f64 * 0.5)
    }

    pub fn resized(&self, width: u32, height: u32) -> Viewport {
        Viewport { width, height, ..*self }
    }

    /// Coordonnée du centre du sous-échantillon `(sx, sy)` d'une grille `n x n`
    /// dans la ligne écran `row` (0 = haut) et la colonne `col`.
    pub fn sample_position(&self, col: u32, row: u32, sx: u32, sy: u32, n: u32) -> Complex64 {
        let n = n.max(1) as f64;
        let px = col as f64 + (sx as f64 + 0.5) / n;
        let py = self.height as f64 - (row as f64 + (sy as f64 + 0.5) / n);
        self.pixel_to_complex(px, py)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(800, 600, Complex64::new(-0.5, 0.25), 3.0)
    }

    fn close(a: Complex64, b: Complex64, tol: f64) -> bool {
        (a - b).norm() <= tol
    }

    #[test]
    fn test_center_pixel_maps_to_center() {
        let v = viewport();
        assert!(close(v.pixel_to_complex(400.0, 300.0), v.center, 1e-12));
    }

    #[test]
    fn test_pixel_roundtrip() {
        let v = viewport();
        for (px, py) in [(0.0, 0.0), (799.5, 0.5), (123.25, 456.75), (800.0, 600.0)] {
            let (x, y) = v.complex_to_pixel(v.pixel_to_complex(px, py));
            assert!((x - px).abs() < 1e-9 && (y - py).abs() < 1e-9, "({px}, {py}) -> ({x}, {y})");
        }
    }

    #[test]
    fn test_axes_scale_with_zoom_and_aspect() {
        let v = viewport();
        let left = v.pixel_to_complex(0.0, 300.0);
        let right = v.pixel_to_complex(800.0, 300.0);
        assert!(((right.re - left.re) - 3.0 * 800.0 / 600.0).abs() < 1e-12);
        let bottom = v.pixel_to_complex(400.0, 0.0);
        let top = v.pixel_to_complex(400.0, 600.0);
        assert!(((top.im - bottom.im) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zoom_at_point_keeps_anchor() {
        let v = viewport();
        for (factor, px, py) in [(2.0, 10.0, 20.0), (0.5, 700.0, 550.0), (1.1, 400.0, 300.0), (8.0, 0.0, 600.0)] {
            let z = v.zoom_at_point(factor, px, py);
            assert!(
                close(z.pixel_to_complex(px, py), v.pixel_to_complex(px, py), 1e-12),
                "factor {factor} at ({px}, {py})"
            );
        }
    }

    #[test]
    fn test_zoom_at_point_clamped() {
        let v = Viewport::new(100, 100, Complex64::new(0.0, 0.0), ZOOM_MIN);
        let z = v.zoom_at_point(10.0, 10.0, 10.0);
        assert_eq!(z.zoom, ZOOM_MIN);
        assert!(close(z.pixel_to_complex(10.0, 10.0), v.pixel_to_complex(10.0, 10.0), 1e-12));
        assert_eq!(v.zoom_at_point(f64::NAN, 1.0, 1.0), v);
    }

    #[test]
    fn test_screen_delta_flips_y() {
        let v = Viewport::new(400, 400, Complex64::new(0.0, 0.0), 4.0);
        let d = v.screen_delta_to_complex_delta(10.0, 10.0);
        assert!((d.re - 0.1).abs() < 1e-12);
        assert!((d.im + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_pan_moves_content_with_pointer() {
        let v = Viewport::new(400, 400, Complex64::new(0.0, 0.0), 4.0);
        // Glisser vers la droite: le point qui était sous le pointeur le suit.
        let grabbed = v.pixel_to_complex(200.0, 200.0);
        let panned = v.pan(40.0, 0.0);
        assert!(close(panned.pixel_to_complex(240.0, 200.0), grabbed, 1e-12));
        // Glisser vers le bas (y écran croissant) descend le contenu.
        let panned = v.pan(0.0, 40.0);
        assert!(close(panned.pixel_to_complex(200.0, 160.0), grabbed, 1e-12));
    }

    #[test]
    fn test_sample_position_top_left() {
        let v = Viewport::new(64, 64, Complex64::new(-0.5, 0.0), 4.0);
        let c = v.sample_position(0, 0, 0, 0, 1);
        assert!(close(c, Complex64::new(-2.46875, 1.96875), 1e-12));
    }
}
