//! Gestionnaire des programmes GPU.
//!
//! Machine à états `Uninitialized -> Ready -> (ContextLost -> Ready) -> Destroyed`.
//! Le gestionnaire possède tous les objets GPU (programmes, texture de
//! palette, géométrie) dans une arène reconstruite par [`GpuProgramManager::rebuild`]
//! au démarrage et après restauration du contexte, et libérée explicitement
//! par [`GpuProgramManager::release`].

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use serde::Serialize;

use crate::color::{build_lut, ColorPalette, ColorSpace, LUT_SIZE};
use crate::error::{RenderError, Result};
use crate::gpu::backend::{FrameUniforms, GpuBackend, ProgramKey};
use crate::gpu::shaders::program_source;
use crate::perf::FrameSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ManagerState {
    Uninitialized,
    Ready,
    ContextLost,
    Destroyed,
}

/// LUT courante, conservée côté CPU pour pouvoir reconstruire la texture.
#[derive(Clone, Debug, PartialEq)]
struct PaletteSource {
    id: String,
    space: ColorSpace,
    cyclic: bool,
    rgba: Vec<u8>,
}

pub struct GpuProgramManager<B: GpuBackend> {
    backend: B,
    state: ManagerState,
    width: u32,
    height: u32,
    palette_resolution: usize,
    programs: HashMap<ProgramKey, B::Program>,
    /// Programmes dont la compilation a échoué: pas de nouvel essai avant
    /// la prochaine reconstruction.
    failed: HashSet<ProgramKey>,
    active: Option<ProgramKey>,
    palette_source: Option<PaletteSource>,
    palette: Option<B::Palette>,
    geometry: Option<B::Geometry>,
    draw_calls: u64,
}

impl<B: GpuBackend> GpuProgramManager<B> {
    pub fn new(backend: B) -> Self {
        Self::with_palette_resolution(backend, LUT_SIZE)
    }

    pub fn with_palette_resolution(backend: B, palette_resolution: usize) -> Self {
        Self {
            backend,
            state: ManagerState::Uninitialized,
            width: 0,
            height: 0,
            palette_resolution: palette_resolution.max(2),
            programs: HashMap::new(),
            failed: HashSet::new(),
            active: None,
            palette_source: None,
            palette: None,
            geometry: None,
            draw_calls: 0,
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Drapeau consulté en tête de chaque tick de la boucle.
    pub fn is_ready(&self) -> bool {
        self.state == ManagerState::Ready && !self.backend.is_context_lost()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn active_program(&self) -> Option<ProgramKey> {
        self.active
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn memory_estimate(&self) -> u64 {
        self.backend.memory_estimate()
    }

    /// Premier passage à `Ready`: dimensionne la surface, compile le
    /// programme demandé et construit la LUT de la palette.
    pub fn initialize(
        &mut self,
        key: ProgramKey,
        palette: &ColorPalette,
        space: ColorSpace,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.state != ManagerState::Uninitialized {
            return Err(RenderError::NotReady(self.state));
        }
        self.width = width.max(1);
        self.height = height.max(1);
        self.active = Some(key);
        self.palette_source = Some(self.palette_source_for(palette, space));
        self.backend.resize(self.width, self.height)?;
        self.rebuild()
    }

    fn palette_source_for(&self, palette: &ColorPalette, space: ColorSpace) -> PaletteSource {
        PaletteSource {
            id: palette.id.clone(),
            space,
            cyclic: palette.continuity.is_cyclic(),
            rgba: build_lut(palette, self.palette_resolution, space),
        }
    }

    /// Recrée tous les objets GPU à partir de l'état CPU (programme actif,
    /// LUT). Les objets encore détenus sont libérés d'abord.
    pub fn rebuild(&mut self) -> Result<()> {
        if self.state == ManagerState::Destroyed {
            return Err(RenderError::NotReady(self.state));
        }
        self.release_handles();
        self.failed.clear();

        self.geometry = Some(self.backend.create_geometry()?);

        if let Some(source) = &self.palette_source {
            self.palette = Some(self.backend.create_palette_texture(&source.rgba)?);
        }

        if let Some(key) = self.active {
            let program = self.compile(key)?;
            self.programs.insert(key, program);
        }

        info!("GPU resources rebuilt ({}x{})", self.width, self.height);
        self.state = ManagerState::Ready;
        Ok(())
    }

    fn compile(&mut self, key: ProgramKey) -> Result<B::Program> {
        let source = program_source(key);
        debug!("Compiling {} ({} bytes of WGSL)", key.label(), source.len());
        self.backend.compile_program(key, &source)
    }

    /// Sélectionne le programme de `key`, en le compilant si besoin.
    ///
    /// En cas d'échec le programme précédent reste actif et l'erreur est
    /// renvoyée une seule fois; les demandes suivantes pour la même clé
    /// sont ignorées jusqu'à la prochaine reconstruction.
    pub fn select_program(&mut self, key: ProgramKey) -> Result<()> {
        if !self.is_ready() {
            return Err(RenderError::NotReady(self.state));
        }
        if self.programs.contains_key(&key) {
            self.active = Some(key);
            return Ok(());
        }
        if self.failed.contains(&key) {
            return Ok(());
        }
        match self.compile(key) {
            Ok(program) => {
                self.programs.insert(key, program);
                self.active = Some(key);
                Ok(())
            }
            Err(err) => {
                warn!("{} rejected, keeping {:?}: {}", key.label(), self.active.map(|k| k.label()), err);
                self.failed.insert(key);
                Err(err)
            }
        }
    }

    /// Remplace la LUT si la palette ou l'espace d'interpolation ont changé.
    pub fn set_palette(&mut self, palette: &ColorPalette, space: ColorSpace) -> Result<()> {
        let unchanged = self
            .palette_source
            .as_ref()
            .is_some_and(|s| s.id == palette.id && s.space == space);
        if unchanged {
            return Ok(());
        }
        let source = self.palette_source_for(palette, space);
        if self.is_ready() {
            let texture = self.backend.create_palette_texture(&source.rgba)?;
            if let Some(old) = self.palette.replace(texture) {
                self.backend.destroy_palette_texture(old);
            }
        }
        debug!("Palette '{}' loaded ({} entries)", source.id, source.rgba.len() / 4);
        self.palette_source = Some(source);
        Ok(())
    }

    pub fn palette_is_cyclic(&self) -> bool {
        self.palette_source.as_ref().is_some_and(|s| s.cyclic)
    }

    /// Nouvelle taille de surface. Les dimensions sont reprises telles quelles
    /// dans les uniforms de la frame suivante.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        if self.is_ready() {
            self.backend.resize(width, height)?;
        }
        Ok(())
    }

    /// Uniforms d'une frame pour la surface courante.
    pub fn uniforms(&self, settings: &FrameSettings, time: f32) -> FrameUniforms {
        let params = &settings.params;
        let julia = params.effective_julia_constant();
        FrameUniforms {
            resolution: [self.width as f32, self.height as f32],
            center: [params.center.re as f32, params.center.im as f32],
            julia: [julia.re as f32, julia.im as f32],
            zoom: params.zoom as f32,
            escape_radius: params.escape_radius as f32,
            max_iterations: params.max_iterations,
            sample_grid: settings.sample_grid(),
            time,
            palette_cyclic: u32::from(self.palette_is_cyclic()),
        }
    }

    /// Dessine une frame avec le programme actif.
    pub fn draw(&mut self, settings: &FrameSettings, time: f32) -> Result<()> {
        if self.backend.is_context_lost() && self.state == ManagerState::Ready {
            self.notify_context_lost();
        }
        if !self.is_ready() {
            return Err(RenderError::NotReady(self.state));
        }

        let uniforms = self.uniforms(settings, time);
        let (Some(key), Some(palette), Some(geometry)) = (self.active, &self.palette, &self.geometry) else {
            return Err(RenderError::NotReady(self.state));
        };
        let Some(program) = self.programs.get(&key) else {
            return Err(RenderError::NotReady(self.state));
        };
        self.backend.draw(program, palette, geometry, &uniforms)?;
        self.draw_calls += 1;
        Ok(())
    }

    /// Le contexte a été invalidé par la plateforme: les objets sont
    /// abandonnés sans appel de libération.
    pub fn notify_context_lost(&mut self) {
        if matches!(self.state, ManagerState::Destroyed | ManagerState::ContextLost) {
            return;
        }
        warn!("GPU context lost, rendering suspended");
        self.programs.clear();
        self.palette = None;
        self.geometry = None;
        self.state = ManagerState::ContextLost;
    }

    /// Contexte restauré: nouveau contexte, puis reconstruction complète.
    pub fn notify_context_restored(&mut self) -> Result<()> {
        if self.state != ManagerState::ContextLost {
            return Err(RenderError::NotReady(self.state));
        }
        self.backend.restore_context()?;
        self.backend.resize(self.width, self.height)?;
        self.rebuild()?;
        info!("GPU context restored");
        Ok(())
    }

    fn release_handles(&mut self) {
        for (_, program) in self.programs.drain() {
            self.backend.destroy_program(program);
        }
        if let Some(palette) = self.palette.take() {
            self.backend.destroy_palette_texture(palette);
        }
        if let Some(geometry) = self.geometry.take() {
            self.backend.destroy_geometry(geometry);
        }
    }

    /// Libère tous les objets GPU. État terminal.
    pub fn release(&mut self) {
        if self.state == ManagerState::Destroyed {
            return;
        }
        if self.state == ManagerState::ContextLost {
            self.programs.clear();
        } else {
            self.release_handles();
        }
        self.state = ManagerState::Destroyed;
        info!("GPU program manager released");
    }
}
