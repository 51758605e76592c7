//! Backend d'enregistrement pour les tests du gestionnaire et de la boucle.

use std::collections::HashSet;

use crate::error::{RenderError, Result};
use crate::fractal::FractalType;
use crate::gpu::backend::{FrameUniforms, GpuBackend, ProgramKey};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Compile(ProgramKey),
    CreatePalette(usize),
    CreateGeometry,
    Resize(u32, u32),
    Draw { program: ProgramKey, uniforms: FrameUniforms },
    Destroy(&'static str),
    RestoreContext,
}

#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    pub fail_variants: HashSet<FractalType>,
    pub lost: bool,
}

impl RecordingBackend {
    pub fn lose_context(&mut self) {
        self.lost = true;
    }

    pub fn compile_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Compile(_))).count()
    }

    pub fn draws(&self) -> Vec<FrameUniforms> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw { uniforms, .. } => Some(*uniforms),
                _ => None,
            })
            .collect()
    }
}

impl GpuBackend for RecordingBackend {
    type Program = ProgramKey;
    type Palette = usize;
    type Geometry = ();

    fn compile_program(&mut self, key: ProgramKey, _source: &str) -> Result<ProgramKey> {
        self.calls.push(Call::Compile(key));
        if self.fail_variants.contains(&key.variant) {
            return Err(RenderError::ProgramCompilationFailed {
                variant: key.variant,
                precision: key.precision,
                diagnostics: "injected failure".to_string(),
            });
        }
        Ok(key)
    }

    fn create_palette_texture(&mut self, rgba: &[u8]) -> Result<usize> {
        self.calls.push(Call::CreatePalette(rgba.len() / 4));
        Ok(rgba.len() / 4)
    }

    fn create_geometry(&mut self) -> Result<()> {
        self.calls.push(Call::CreateGeometry);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.calls.push(Call::Resize(width, height));
        Ok(())
    }

    fn draw(&mut self, program: &ProgramKey, _palette: &usize, _geometry: &(), uniforms: &FrameUniforms) -> Result<()> {
        if self.lost {
            return Err(RenderError::ContextLost);
        }
        self.calls.push(Call::Draw { program: *program, uniforms: *uniforms });
        Ok(())
    }

    fn destroy_program(&mut self, _program: ProgramKey) {
        self.calls.push(Call::Destroy("program"));
    }

    fn destroy_palette_texture(&mut self, _palette: usize) {
        self.calls.push(Call::Destroy("palette"));
    }

    fn destroy_geometry(&mut self, _geometry: ()) {
        self.calls.push(Call::Destroy("geometry"));
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn restore_context(&mut self) -> Result<()> {
        self.lost = false;
        self.calls.push(Call::RestoreContext);
        Ok(())
    }
}
