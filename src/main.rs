use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use num_complex::Complex64;

use fractall_rt::color::{ColorSpace, Continuity, PaletteStore};
use fractall_rt::config::RendererConfig;
use fractall_rt::fractal::{default_params_for_type, presets, FractalParams, FractalType, ParamEdit};
use fractall_rt::gpu::{GpuProgramManager, WgpuBackend};
use fractall_rt::io::png::{save_field_png, save_rgba_png};
use fractall_rt::perf::{LodController, PerformanceMonitor};
use fractall_rt::render::{
    FrameScheduler, InputEvent, IntervalScheduler, Region, RenderLoop, RenderWorker, Session, SystemClock,
    TickOutcome, WorkerRequest,
};
use fractall_rt::RenderError;

/// Rendu de fractales escape-time: export CPU ou boucle GPU hors écran.
///
/// Exemples:
///   fractall-rt render --preset 2 --width 800 --height 600 --output julia.png
///   fractall-rt gpu --type burning-ship --frames 300 --lose-at 100 --output ship.png
#[derive(Parser, Debug)]
#[command(name = "fractall-rt", version, about = "Rendu temps réel de fractales escape-time")]
struct Cli {
    /// Fichier JSON de configuration du renderer
    #[arg(long, global = true, value_name = "FICHIER")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calcule le champ sur CPU (worker en arrière-plan) et écrit un PNG
    Render {
        #[command(flatten)]
        view: ViewArgs,

        /// Échantillons par pixel (arrondi à une grille n x n)
        #[arg(long, default_value_t = 1)]
        samples: u32,

        /// Fichier de sortie PNG
        #[arg(long, value_name = "FICHIER")]
        output: PathBuf,
    },
    /// Fait tourner la boucle de rendu GPU pendant un nombre de frames
    Gpu {
        #[command(flatten)]
        view: ViewArgs,

        /// Nombre de frames à dessiner
        #[arg(long, default_value_t = 120)]
        frames: u32,

        /// Simule une perte de contexte à cette frame
        #[arg(long)]
        lose_at: Option<u32>,

        /// Facteur de zoom appliqué à chaque frame (> 1 rapproche)
        #[arg(long)]
        zoom_rate: Option<f64>,

        /// Écrit la dernière frame présentée en PNG
        #[arg(long, value_name = "FICHIER")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Index du preset de départ (0 = Mandelbrot)
    #[arg(long)]
    preset: Option<usize>,

    /// Type de fractale (mandelbrot, julia, burning-ship, tricorn, celtic,
    /// perpendicular, heart, phoenix, lambda, newton, lyapunov)
    #[arg(long = "type")]
    fractal_type: Option<String>,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    #[arg(long)]
    center_x: Option<f64>,

    #[arg(long)]
    center_y: Option<f64>,

    /// Étendue verticale visible du plan complexe
    #[arg(long)]
    zoom: Option<f64>,

    /// Itérations max (50, 100, 500 ou 1000)
    #[arg(long)]
    iterations: Option<u32>,

    /// Rayon d'échappement (2, 4 ou 8)
    #[arg(long)]
    escape_radius: Option<f64>,

    /// Identifiant de palette
    #[arg(long)]
    palette: Option<String>,

    /// Palette personnalisée: couleurs hexadécimales séparées par des virgules
    #[arg(long, value_delimiter = ',')]
    custom_palette: Vec<String>,

    /// La palette personnalisée boucle
    #[arg(long)]
    cyclic: bool,

    /// Précision (high, medium, low)
    #[arg(long)]
    precision: Option<String>,

    #[arg(long, requires = "julia_im")]
    julia_re: Option<f64>,

    #[arg(long, requires = "julia_re")]
    julia_im: Option<f64>,

    /// Espace d'interpolation de la LUT (rgb, linear, hsb)
    #[arg(long)]
    color_space: Option<String>,

    /// Index d'un lieu remarquable de la variante
    #[arg(long)]
    location: Option<usize>,
}

const CUSTOM_PALETTE_ID: &str = "custom";

impl ViewArgs {
    /// Paramètres de départ: preset ou défauts du type, puis surcharges.
    /// Chaque surcharge passe par le validateur.
    fn params(&self, store: &mut PaletteStore) -> anyhow::Result<FractalParams> {
        let mut params = match (&self.fractal_type, self.preset) {
            (Some(name), _) => match FractalType::from_name(name) {
                Some(t) => default_params_for_type(t),
                None => bail!("Type de fractale invalide: '{name}'"),
            },
            (None, Some(index)) => match presets().get(index) {
                Some(preset) => preset.params.clone(),
                None => bail!("Preset invalide: {index} (0 à {})", presets().len() - 1),
            },
            (None, None) => FractalParams::default(),
        };

        if let Some(index) = self.location {
            let mut session = Session::new(&params, self.width, self.height, Duration::ZERO);
            session.handle(&InputEvent::GoToLocation { index }, Instant::now());
            params = session.params().clone();
        }

        let mut edits = Vec::new();
        if let Some(x) = self.center_x {
            edits.push(ParamEdit::CenterRe(x));
        }
        if let Some(y) = self.center_y {
            edits.push(ParamEdit::CenterIm(y));
        }
        if let Some(z) = self.zoom {
            edits.push(ParamEdit::Zoom(z));
        }
        if let Some(n) = self.iterations {
            edits.push(ParamEdit::MaxIterations(n));
        }
        if let Some(r) = self.escape_radius {
            edits.push(ParamEdit::EscapeRadius(r));
        }
        if let Some(p) = &self.precision {
            edits.push(ParamEdit::Precision(p.clone()));
        }
        if let (Some(re), Some(im)) = (self.julia_re, self.julia_im) {
            edits.push(ParamEdit::JuliaConstant(Some(Complex64::new(re, im))));
        }
        if !self.custom_palette.is_empty() {
            let continuity = if self.cyclic { Continuity::Cyclic } else { Continuity::Linear };
            if store.add_custom(CUSTOM_PALETTE_ID, "Custom", self.custom_palette.as_slice(), continuity).is_none() {
                bail!("Palette personnalisée sans couleur valide");
            }
            edits.push(ParamEdit::Palette(CUSTOM_PALETTE_ID.to_string()));
        } else if let Some(p) = &self.palette {
            edits.push(ParamEdit::Palette(p.clone()));
        }

        for edit in &edits {
            let next = params.with_edit(edit);
            debug!("{edit:?} -> {next:?}");
            params = next;
        }
        Ok(params)
    }

    fn color_space(&self, config: &RendererConfig) -> anyhow::Result<ColorSpace> {
        match &self.color_space {
            Some(name) => match ColorSpace::from_name(name) {
                Some(space) => Ok(space),
                None => bail!("Espace de couleur invalide: '{name}' (rgb, linear, hsb)"),
            },
            None => Ok(config.color_space),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RendererConfig::load(path).with_context(|| format!("chargement de {}", path.display()))?,
        None => RendererConfig::default(),
    };

    match cli.command {
        Command::Render { view, samples, output } => run_render(&config, &view, samples, &output),
        Command::Gpu { view, frames, lose_at, zoom_rate, output } => {
            run_gpu(&config, &view, frames, lose_at, zoom_rate, output.as_deref())
        }
    }
}

fn run_render(config: &RendererConfig, view: &ViewArgs, samples: u32, output: &std::path::Path) -> anyhow::Result<()> {
    let mut store = PaletteStore::default();
    let params = view.params(&mut store)?;
    let color_space = view.color_space(config)?;
    let session = Session::new(&params, view.width, view.height, config.debounce());
    let viewport = session.viewport();
    info!(
        "Rendering {} {}x{} (center {}, zoom {}, {} iterations)",
        params.fractal_type.name(),
        viewport.width,
        viewport.height,
        params.center,
        params.zoom,
        params.max_iterations
    );

    let continuity = store.resolve(&params.palette).continuity;
    let mut worker = RenderWorker::spawn(store)?;
    let start = Instant::now();
    let field = worker
        .compute(WorkerRequest::Field {
            variant: params.fractal_type,
            params: params.clone(),
            viewport,
            region: Region::full(&viewport),
            samples_per_pixel: samples,
        })?
        .into_field()
        .context("calcul du champ")?;
    info!("Field computed in {:.1} ms", start.elapsed().as_secs_f64() * 1000.0);

    let lut = worker
        .compute(WorkerRequest::PaletteLut {
            palette_id: params.palette.clone(),
            color_space,
            steps: config.palette_resolution,
        })?
        .into_lut()
        .context("génération de la LUT")?;

    save_field_png(&field, params.fractal_type, params.max_iterations, &lut, continuity, output)
        .context("écriture du PNG")?;
    info!("Wrote {}", output.display());
    Ok(())
}

fn run_gpu(
    config: &RendererConfig,
    view: &ViewArgs,
    frames: u32,
    lose_at: Option<u32>,
    zoom_rate: Option<f64>,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let mut store = PaletteStore::default();
    let params = view.params(&mut store)?;
    let color_space = view.color_space(config)?;

    let backend = match WgpuBackend::new(config.buffer_count) {
        Ok(backend) => backend,
        Err(RenderError::ContextUnavailable(reason)) => {
            eprintln!("Rendu GPU non supporté sur cette machine: {reason}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    let loss = backend.loss_flag();
    info!("{}-buffered offscreen rendering", backend.buffer_count());

    let manager = GpuProgramManager::with_palette_resolution(backend, config.palette_resolution);
    let monitor = PerformanceMonitor::new(config.frame_window, config.fps_interval());
    let lod = LodController::new(config.lod.clone());
    let mut render_loop = RenderLoop::new(manager, monitor, lod, store, color_space, SystemClock);
    let mut session = Session::new(&params, view.width, view.height, config.debounce());

    let (width, height) = session.size();
    render_loop.start(session.params(), width, height).context("initialisation du GPU")?;

    let mut scheduler = IntervalScheduler::new(config.target_fps);
    let mut drawn = 0u32;
    for frame in 0..frames {
        scheduler.wait_for_next_frame();
        if lose_at == Some(frame) {
            warn!("Simulating GPU context loss at frame {frame}");
            loss.store(true, Ordering::Release);
        }
        if let Some(factor) = zoom_rate {
            session.handle(&InputEvent::Zoom { factor, anchor: None }, Instant::now());
        }
        session.poll(Instant::now());

        match render_loop.tick(session.params())? {
            TickOutcome::Drawn { settings, frame_ms } => {
                drawn += 1;
                debug!("frame {frame}: tier {} ({:?} ms)", settings.tier, frame_ms);
            }
            TickOutcome::Suspended => {
                info!("Render loop suspended at frame {frame}, restoring context");
                render_loop.notify_context_restored().context("restauration du contexte")?;
            }
            TickOutcome::Stopped => break,
        }
    }

    let metrics = render_loop.metrics();
    info!(
        "{drawn}/{frames} frames, {:.1} fps, {:.2} ms/frame, ~{} KiB GPU memory, tier {:?}",
        metrics.fps,
        metrics.frame_time_ms,
        metrics.gpu_memory_bytes / 1024,
        render_loop.lod().current_tier()
    );

    if let Some(path) = output {
        let (w, h, rgba) = render_loop.manager().backend().read_latest_frame().context("relecture de la frame")?;
        save_rgba_png(w, h, rgba, path).context("écriture du PNG")?;
        info!("Wrote {}", path.display());
    }

    render_loop.shutdown();
    Ok(())
}
