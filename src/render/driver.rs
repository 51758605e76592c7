//! Boucle de rendu.
//!
//! Chaque tick: niveau LOD → sélection du programme → début de frame →
//! dessin → fin de frame. L'hôte appelle [`RenderLoop::tick`] à chaque
//! rafraîchissement (ou via un [`FrameScheduler`]); les paramètres vivent hors
//! de la boucle et lui sont passés à chaque tick.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::color::{ColorSpace, PaletteStore};
use crate::error::{RenderError, Result};
use crate::fractal::FractalParams;
use crate::gpu::{GpuBackend, GpuProgramManager, ManagerState, ProgramKey};
use crate::perf::{FrameSettings, LodController, PerformanceMetrics, PerformanceMonitor};

/// Source de temps de la boucle.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Primitive d'ordonnancement fournie par l'hôte: bloque jusqu'à la
/// prochaine frame.
pub trait FrameScheduler {
    fn wait_for_next_frame(&mut self);
}

/// Cadence fixe, pour les hôtes sans signal de rafraîchissement.
#[derive(Debug)]
pub struct IntervalScheduler {
    period: Duration,
    next: Option<Instant>,
}

impl IntervalScheduler {
    pub fn new(target_fps: u32) -> Self {
        Self { period: Duration::from_nanos(1_000_000_000 / u64::from(target_fps.max(1))), next: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FrameScheduler for IntervalScheduler {
    fn wait_for_next_frame(&mut self) {
        let now = Instant::now();
        let deadline = self.next.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Pas de rattrapage après une frame trop longue.
        self.next = Some(deadline.max(now) + self.period);
    }
}

/// Résultat d'un tick.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Une frame a été dessinée avec ces réglages.
    Drawn { settings: FrameSettings, frame_ms: Option<f64> },
    /// La boucle est arrêtée: rien n'est planifié.
    Stopped,
    /// Le contexte est perdu: la boucle s'est arrêtée d'elle-même.
    Suspended,
}

pub struct RenderLoop<B: GpuBackend, C: Clock = SystemClock> {
    manager: GpuProgramManager<B>,
    monitor: PerformanceMonitor,
    lod: LodController,
    palettes: PaletteStore,
    color_space: ColorSpace,
    clock: C,
    epoch: Instant,
    running: bool,
    last_settings: Option<FrameSettings>,
}

impl<B: GpuBackend, C: Clock> RenderLoop<B, C> {
    pub fn new(
        manager: GpuProgramManager<B>,
        monitor: PerformanceMonitor,
        lod: LodController,
        palettes: PaletteStore,
        color_space: ColorSpace,
        clock: C,
    ) -> Self {
        let epoch = clock.now();
        Self {
            manager,
            monitor,
            lod,
            palettes,
            color_space,
            clock,
            epoch,
            running: false,
            last_settings: None,
        }
    }

    /// Initialise le gestionnaire pour `params` si nécessaire, puis démarre.
    pub fn start(&mut self, params: &FractalParams, width: u32, height: u32) -> Result<()> {
        if self.manager.state() == ManagerState::Uninitialized {
            let tier = self.lod.update(params.zoom, &self.monitor.metrics());
            let settings = self.lod.apply(params, tier);
            let key = ProgramKey::new(settings.params.fractal_type, settings.params.precision);
            let palette = self.palettes.resolve(&settings.params.palette);
            self.manager.initialize(key, palette, self.color_space, width, height)?;
        } else {
            self.manager.resize(width, height)?;
        }
        self.resume()
    }

    /// Reprend les ticks sur un gestionnaire déjà prêt.
    pub fn resume(&mut self) -> Result<()> {
        if !self.manager.is_ready() {
            return Err(RenderError::NotReady(self.manager.state()));
        }
        if !self.running {
            info!("Render loop started");
        }
        self.running = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.running {
            info!("Render loop stopped");
        }
        self.running = false;
        self.monitor.pause();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn manager(&self) -> &GpuProgramManager<B> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut GpuProgramManager<B> {
        &mut self.manager
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.monitor.metrics()
    }

    pub fn lod(&self) -> &LodController {
        &self.lod
    }

    pub fn palettes_mut(&mut self) -> &mut PaletteStore {
        &mut self.palettes
    }

    pub fn set_color_space(&mut self, space: ColorSpace) {
        self.color_space = space;
    }

    /// Réglages de la dernière frame dessinée.
    pub fn last_settings(&self) -> Option<&FrameSettings> {
        self.last_settings.as_ref()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.manager.resize(width, height)
    }

    /// Un tick de la boucle.
    ///
    /// Le drapeau « prêt » est examiné en premier: après une perte de
    /// contexte aucun objet GPU n'est touché et la boucle s'arrête.
    pub fn tick(&mut self, params: &FractalParams) -> Result<TickOutcome> {
        if !self.running {
            return Ok(TickOutcome::Stopped);
        }
        if !self.manager.is_ready() {
            self.suspend();
            return Ok(TickOutcome::Suspended);
        }

        let tier = self.lod.update(params.zoom, &self.monitor.metrics());
        let mut settings = self.lod.apply(params, tier);

        let requested = ProgramKey::new(settings.params.fractal_type, settings.params.precision);
        if let Err(err) = self.manager.select_program(requested) {
            warn!("Keeping previous program: {err}");
        }
        // Les réglages rapportés décrivent le programme réellement dessiné.
        if let Some(active) = self.manager.active_program().filter(|k| *k != requested) {
            settings.params.fractal_type = active.variant;
            settings.params.precision = active.precision;
        }
        let palette = self.palettes.resolve(&settings.params.palette);
        if let Err(err) = self.manager.set_palette(palette, self.color_space) {
            return self.handle_draw_error(err);
        }

        let start = self.clock.now();
        self.monitor.begin_frame(start);
        let time = start.saturating_duration_since(self.epoch).as_secs_f32();
        if let Err(err) = self.manager.draw(&settings, time) {
            return self.handle_draw_error(err);
        }
        let frame_ms = self.monitor.end_frame(self.clock.now());
        self.monitor.set_gpu_memory_estimate(self.manager.memory_estimate());

        self.last_settings = Some(settings.clone());
        Ok(TickOutcome::Drawn { settings, frame_ms })
    }

    fn handle_draw_error(&mut self, err: RenderError) -> Result<TickOutcome> {
        match err {
            RenderError::ContextLost | RenderError::NotReady(ManagerState::ContextLost) => {
                self.suspend();
                Ok(TickOutcome::Suspended)
            }
            other => Err(other),
        }
    }

    fn suspend(&mut self) {
        self.manager.notify_context_lost();
        self.stop();
    }

    /// Signal de perte de contexte venant de la plateforme.
    pub fn notify_context_lost(&mut self) {
        self.suspend();
    }

    /// Signal de restauration: reconstruit les objets GPU et relance la boucle.
    pub fn notify_context_restored(&mut self) -> Result<()> {
        self.manager.notify_context_restored()?;
        self.lod.reset();
        self.resume()
    }

    /// Exécute au plus `frames` ticks cadencés par `scheduler`. S'arrête plus
    /// tôt si la boucle est arrêtée ou suspendue. Renvoie le nombre de frames
    /// dessinées.
    pub fn run_frames<S: FrameScheduler>(
        &mut self,
        params: &FractalParams,
        scheduler: &mut S,
        frames: u32,
    ) -> Result<u32> {
        let mut drawn = 0;
        for _ in 0..frames {
            scheduler.wait_for_next_frame();
            match self.tick(params)? {
                TickOutcome::Drawn { .. } => drawn += 1,
                TickOutcome::Stopped | TickOutcome::Suspended => break,
            }
        }
        debug!("{drawn} frames drawn, metrics {:?}", self.monitor.metrics());
        Ok(drawn)
    }

    /// Arrête la boucle et libère les objets GPU.
    pub fn shutdown(&mut self) {
        self.stop();
        self.manager.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::fractal::FractalType;
    use crate::gpu::mock::{Call, RecordingBackend};

    struct ManualClock {
        now: Cell<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self { now: Cell::new(Instant::now()) }
        }

        fn advance(&self, ms: u64) {
            self.now.set(self.now.get() + Duration::from_millis(ms));
        }
    }

    impl Clock for &ManualClock {
        fn now(&self) -> Instant {
            self.now.get()
        }
    }

    #[derive(Default)]
    struct CountingScheduler {
        waits: u32,
    }

    impl FrameScheduler for CountingScheduler {
        fn wait_for_next_frame(&mut self) {
            self.waits += 1;
        }
    }

    fn render_loop(clock: &ManualClock) -> RenderLoop<RecordingBackend, &ManualClock> {
        RenderLoop::new(
            GpuProgramManager::new(RecordingBackend::default()),
            PerformanceMonitor::default(),
            LodController::default(),
            PaletteStore::default(),
            ColorSpace::Rgb,
            clock,
        )
    }

    fn draw_count(lp: &RenderLoop<RecordingBackend, &ManualClock>) -> usize {
        lp.manager().backend().draws().len()
    }

    #[test]
    fn test_tick_requires_start() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        assert_eq!(lp.tick(&FractalParams::default()).unwrap(), TickOutcome::Stopped);
        assert!(lp.resume().is_err());
    }

    #[test]
    fn test_tick_draws_with_lod_settings() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams { max_iterations: 1000, ..FractalParams::default() };
        lp.start(&params, 64, 48).unwrap();

        let TickOutcome::Drawn { settings, .. } = lp.tick(&params).unwrap() else {
            panic!("frame not drawn");
        };
        // Zoom 4: un seuil franchi.
        assert_eq!(settings.tier, 1);
        assert_eq!(draw_count(&lp), 1);
        assert_eq!(lp.metrics().frame_count, 1);
        assert!(lp.metrics().gpu_memory_bytes == lp.manager().memory_estimate());
    }

    #[test]
    fn test_variant_switch_compiles_program() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams::default();
        lp.start(&params, 32, 32).unwrap();
        lp.tick(&params).unwrap();

        let julia = FractalParams { fractal_type: FractalType::Julia, ..params };
        lp.tick(&julia).unwrap();
        let Some(Call::Draw { program, .. }) = lp.manager().backend().calls.last().cloned() else {
            panic!("no draw");
        };
        assert_eq!(program.variant, FractalType::Julia);
    }

    #[test]
    fn test_compile_failure_does_not_stop_loop() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams::default();
        lp.start(&params, 32, 32).unwrap();
        lp.manager_mut().backend_mut().fail_variants.insert(FractalType::Newton);

        let newton = FractalParams { fractal_type: FractalType::Newton, ..params };
        assert!(matches!(lp.tick(&newton).unwrap(), TickOutcome::Drawn { .. }));
        assert!(lp.is_running());
        let Some(Call::Draw { program, .. }) = lp.manager().backend().calls.last().cloned() else {
            panic!("no draw");
        };
        assert_eq!(program.variant, FractalType::Mandelbrot);
    }

    #[test]
    fn test_rejected_program_reports_drawn_variant() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams::default();
        lp.start(&params, 32, 32).unwrap();
        lp.manager_mut().backend_mut().fail_variants.insert(FractalType::Newton);

        let newton = FractalParams { fractal_type: FractalType::Newton, ..params };
        // Premier échec puis échec mémorisé: les deux frames montrent Mandelbrot.
        for _ in 0..2 {
            let TickOutcome::Drawn { settings, .. } = lp.tick(&newton).unwrap() else {
                panic!("frame not drawn");
            };
            assert_eq!(settings.params.fractal_type, FractalType::Mandelbrot);
            let active = lp.manager().active_program().unwrap();
            assert_eq!(settings.params.precision, active.precision);
            assert_eq!(lp.last_settings(), Some(&settings));
        }
    }

    #[test]
    fn test_context_loss_and_restore() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams::default();
        lp.start(&params, 64, 64).unwrap();

        for _ in 0..3 {
            lp.tick(&params).unwrap();
            clock.advance(16);
        }
        let before = *lp.manager().backend().draws().last().unwrap();

        lp.manager_mut().backend_mut().lose_context();
        assert_eq!(lp.tick(&params).unwrap(), TickOutcome::Suspended);
        assert!(!lp.is_running());
        assert_eq!(lp.manager().state(), ManagerState::ContextLost);
        for _ in 0..5 {
            assert_eq!(lp.tick(&params).unwrap(), TickOutcome::Stopped);
        }
        assert_eq!(draw_count(&lp), 3);

        lp.notify_context_restored().unwrap();
        assert!(lp.is_running());
        lp.tick(&params).unwrap();
        assert_eq!(draw_count(&lp), 4);
        let after = *lp.manager().backend().draws().last().unwrap();
        assert_eq!(FrameUniformsNoTime::from(after), FrameUniformsNoTime::from(before));
    }

    /// Uniforms sans l'horloge d'animation.
    #[derive(Debug, PartialEq)]
    struct FrameUniformsNoTime {
        resolution: [f32; 2],
        center: [f32; 2],
        julia: [f32; 2],
        zoom: f32,
        escape_radius: f32,
        max_iterations: u32,
        sample_grid: u32,
        palette_cyclic: u32,
    }

    impl From<crate::gpu::FrameUniforms> for FrameUniformsNoTime {
        fn from(u: crate::gpu::FrameUniforms) -> Self {
            Self {
                resolution: u.resolution,
                center: u.center,
                julia: u.julia,
                zoom: u.zoom,
                escape_radius: u.escape_radius,
                max_iterations: u.max_iterations,
                sample_grid: u.sample_grid,
                palette_cyclic: u.palette_cyclic,
            }
        }
    }

    #[test]
    fn test_platform_loss_signal() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams::default();
        lp.start(&params, 16, 16).unwrap();
        lp.notify_context_lost();
        assert_eq!(lp.manager().state(), ManagerState::ContextLost);
        assert_eq!(lp.tick(&params).unwrap(), TickOutcome::Stopped);
        lp.notify_context_restored().unwrap();
        assert!(matches!(lp.tick(&params).unwrap(), TickOutcome::Drawn { .. }));
    }

    #[test]
    fn test_run_frames_stops_on_loss() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams::default();
        lp.start(&params, 16, 16).unwrap();
        let mut scheduler = CountingScheduler::default();
        assert_eq!(lp.run_frames(&params, &mut scheduler, 5).unwrap(), 5);
        assert_eq!(scheduler.waits, 5);

        lp.manager_mut().backend_mut().lose_context();
        assert_eq!(lp.run_frames(&params, &mut scheduler, 5).unwrap(), 0);
        assert_eq!(scheduler.waits, 6);
    }

    #[test]
    fn test_stop_keeps_state_and_resume() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        let params = FractalParams::default();
        lp.start(&params, 16, 16).unwrap();
        lp.tick(&params).unwrap();
        lp.stop();
        assert_eq!(lp.tick(&params).unwrap(), TickOutcome::Stopped);
        lp.resume().unwrap();
        assert!(matches!(lp.tick(&params).unwrap(), TickOutcome::Drawn { .. }));
        assert_eq!(lp.metrics().frame_count, 2);
    }

    #[test]
    fn test_shutdown_releases() {
        let clock = ManualClock::new();
        let mut lp = render_loop(&clock);
        lp.start(&FractalParams::default(), 16, 16).unwrap();
        lp.shutdown();
        assert_eq!(lp.manager().state(), ManagerState::Destroyed);
        assert!(lp.resume().is_err());
    }

    #[test]
    fn test_interval_scheduler_period() {
        let s = IntervalScheduler::new(50);
        assert_eq!(s.period(), Duration::from_millis(20));
        assert_eq!(IntervalScheduler::new(0).period(), Duration::from_secs(1));
    }
}
