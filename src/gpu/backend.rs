//! Interface entre le gestionnaire de programmes et l'API graphique.

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::error::Result;
use crate::fractal::{FractalType, PrecisionTier};

/// Un programme par couple (variante, précision).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ProgramKey {
    pub variant: FractalType,
    pub precision: PrecisionTier,
}

impl ProgramKey {
    pub fn new(variant: FractalType, precision: PrecisionTier) -> Self {
        Self { variant, precision }
    }

    pub fn label(&self) -> String {
        format!("fractal-{}-{}", self.variant.id(), self.precision.name())
    }
}

/// Uniforms d'une frame. Même disposition que `struct Uniforms` côté WGSL.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub center: [f32; 2],
    pub julia: [f32; 2],
    pub zoom: f32,
    pub escape_radius: f32,
    pub max_iterations: u32,
    /// Côté de la grille de sous-échantillons (1 = pas de multi-échantillonnage).
    pub sample_grid: u32,
    /// Secondes écoulées depuis le début de la session.
    pub time: f32,
    pub palette_cyclic: u32,
}

/// Quad plein écran en triangle strip.
pub const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

/// Opérations GPU dont le gestionnaire a besoin.
///
/// Les objets renvoyés appartiennent à l'appelant, qui les libère
/// explicitement via les méthodes `destroy_*`. Après une perte de contexte
/// ils sont simplement abandonnés.
pub trait GpuBackend {
    type Program;
    type Palette;
    type Geometry;

    fn compile_program(&mut self, key: ProgramKey, source: &str) -> Result<Self::Program>;
    /// Texture 1-D RGBA8, une entrée par groupe de 4 octets.
    fn create_palette_texture(&mut self, rgba: &[u8]) -> Result<Self::Palette>;
    fn create_geometry(&mut self) -> Result<Self::Geometry>;
    /// Réalloue les ressources dépendant de la taille de surface.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;
    fn draw(
        &mut self,
        program: &Self::Program,
        palette: &Self::Palette,
        geometry: &Self::Geometry,
        uniforms: &FrameUniforms,
    ) -> Result<()>;

    fn destroy_program(&mut self, program: Self::Program);
    fn destroy_palette_texture(&mut self, palette: Self::Palette);
    fn destroy_geometry(&mut self, geometry: Self::Geometry);

    /// Vrai quand la plateforme a invalidé le contexte.
    fn is_context_lost(&self) -> bool;
    /// Réacquiert un contexte neuf; les anciens objets sont invalides.
    fn restore_context(&mut self) -> Result<()>;

    /// Octets alloués côté GPU (estimation).
    fn memory_estimate(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_matches_wgsl() {
        // vec2 x3 (24) + f32 x2 (8) + u32 x2 (8) + f32 + u32 (8)
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 48);
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
    }

    #[test]
    fn test_program_label() {
        let key = ProgramKey::new(FractalType::BurningShip, PrecisionTier::Low);
        assert_eq!(key.label(), "fractal-burning-ship-low");
    }
}
