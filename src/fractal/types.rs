use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Rayons d'échappement acceptés par le validateur.
pub const ESCAPE_RADII: [f64; 3] = [2.0, 4.0, 8.0];
/// Nombres maximaux d'itérations acceptés par le validateur.
pub const MAX_ITERATION_CHOICES: [u32; 4] = [50, 100, 500, 1000];
/// Bornes du zoom validé. L'UI peut annoncer [0.001, 1000] mais c'est ce
/// clamp qui fait foi.
pub const ZOOM_MIN: f64 = 0.1;
pub const ZOOM_MAX: f64 = 1_000_000.0;

pub const DEFAULT_ESCAPE_RADIUS: f64 = 2.0;
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_ZOOM: f64 = 4.0;
pub const DEFAULT_CENTER: Complex64 = Complex64::new(-0.5, 0.0);
pub const DEFAULT_PALETTE: &str = "classic";
/// Constante de Julia utilisée quand aucune n'est fournie.
pub const DEFAULT_JULIA_CONSTANT: Complex64 = Complex64::new(-0.7269, 0.1889);

/// Variantes de fractales escape-time du catalogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FractalType {
    #[default]
    Mandelbrot,
    Julia,
    BurningShip,
    Tricorn,
    Celtic,
    Perpendicular,
    Heart,
    Phoenix,
    Lambda,
    Newton,
    Lyapunov,
}

impl FractalType {
    pub fn all() -> &'static [FractalType] {
        &[
            FractalType::Mandelbrot,
            FractalType::Julia,
            FractalType::BurningShip,
            FractalType::Tricorn,
            FractalType::Celtic,
            FractalType::Perpendicular,
            FractalType::Heart,
            FractalType::Phoenix,
            FractalType::Lambda,
            FractalType::Newton,
            FractalType::Lyapunov,
        ]
    }

    /// Clé stable (CLI, messages du worker, labels GPU).
    pub fn id(self) -> &'static str {
        match self {
            FractalType::Mandelbrot => "mandelbrot",
            FractalType::Julia => "julia",
            FractalType::BurningShip => "burning-ship",
            FractalType::Tricorn => "tricorn",
            FractalType::Celtic => "celtic",
            FractalType::Perpendicular => "perpendicular",
            FractalType::Heart => "heart",
            FractalType::Phoenix => "phoenix",
            FractalType::Lambda => "lambda",
            FractalType::Newton => "newton",
            FractalType::Lyapunov => "lyapunov",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FractalType::Mandelbrot => "Mandelbrot",
            FractalType::Julia => "Julia",
            FractalType::BurningShip => "Burning Ship",
            FractalType::Tricorn => "Tricorn",
            FractalType::Celtic => "Celtic",
            FractalType::Perpendicular => "Perpendicular",
            FractalType::Heart => "Heart",
            FractalType::Phoenix => "Phoenix",
            FractalType::Lambda => "Lambda",
            FractalType::Newton => "Newton",
            FractalType::Lyapunov => "Lyapunov",
        }
    }

    /// Parse un identifiant (tolère majuscules, espaces et underscores).
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name.trim().to_lowercase().replace(['_', ' '], "-");
        match key.as_str() {
            "mandelbrot" => Some(FractalType::Mandelbrot),
            "julia" => Some(FractalType::Julia),
            "burning-ship" | "burningship" => Some(FractalType::BurningShip),
            "tricorn" => Some(FractalType::Tricorn),
            "celtic" => Some(FractalType::Celtic),
            "perpendicular" => Some(FractalType::Perpendicular),
            "heart" => Some(FractalType::Heart),
            "phoenix" => Some(FractalType::Phoenix),
            "lambda" => Some(FractalType::Lambda),
            "newton" => Some(FractalType::Newton),
            "lyapunov" => Some(FractalType::Lyapunov),
            _ => None,
        }
    }

    /// Variantes dont `c` est la constante de Julia et non le point échantillonné.
    pub fn is_julia_family(self) -> bool {
        matches!(self, FractalType::Julia)
    }
}

/// Niveau de précision numérique.
///
/// - `High`: arithmétique f64, coloration lissée
/// - `Medium`: arithmétique f32, coloration lissée
/// - `Low`: arithmétique f32, comptes entiers (bandes visibles)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionTier {
    #[default]
    High,
    Medium,
    Low,
}

impl PrecisionTier {
    pub fn all() -> &'static [PrecisionTier] {
        &[PrecisionTier::High, PrecisionTier::Medium, PrecisionTier::Low]
    }

    pub fn name(self) -> &'static str {
        match self {
            PrecisionTier::High => "high",
            PrecisionTier::Medium => "medium",
            PrecisionTier::Low => "low",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "high" => Some(PrecisionTier::High),
            "medium" => Some(PrecisionTier::Medium),
            "low" => Some(PrecisionTier::Low),
            _ => None,
        }
    }

    /// 0 = plus coûteux.
    pub fn rank(self) -> u8 {
        match self {
            PrecisionTier::High => 0,
            PrecisionTier::Medium => 1,
            PrecisionTier::Low => 2,
        }
    }

    /// Renvoie le niveau le moins précis des deux.
    pub fn min_quality(self, other: PrecisionTier) -> PrecisionTier {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    pub fn smooth_coloring(self) -> bool {
        !matches!(self, PrecisionTier::Low)
    }
}

/// Configuration complète de rendu: la seule source de vérité de
/// « ce qu'il faut dessiner à la prochaine frame ».
///
/// Les valeurs passées au renderer sont toujours issues de [`FractalParams::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FractalParams {
    pub fractal_type: FractalType,
    pub escape_radius: f64,
    pub max_iterations: u32,
    pub center: Complex64,
    pub zoom: f64,
    pub palette: String,
    pub precision: PrecisionTier,
    pub julia_constant: Option<Complex64>,
}

impl Default for FractalParams {
    fn default() -> Self {
        Self {
            fractal_type: FractalType::Mandelbrot,
            escape_radius: DEFAULT_ESCAPE_RADIUS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            palette: DEFAULT_PALETTE.to_string(),
            precision: PrecisionTier::High,
            julia_constant: None,
        }
    }
}

impl FractalParams {
    /// Renvoie une copie entièrement valide.
    ///
    /// Chaque champ invalide est remplacé par sa valeur par défaut, seul; les
    /// autres champs valides sont conservés. Le zoom positif et fini est
    /// ramené dans [`ZOOM_MIN`, `ZOOM_MAX`].
    pub fn validate(&self) -> FractalParams {
        let escape_radius = if ESCAPE_RADII.contains(&self.escape_radius) {
            self.escape_radius
        } else {
            DEFAULT_ESCAPE_RADIUS
        };

        let max_iterations = if MAX_ITERATION_CHOICES.contains(&self.max_iterations) {
            self.max_iterations
        } else {
            DEFAULT_MAX_ITERATIONS
        };

        let center = if self.center.re.is_finite() && self.center.im.is_finite() {
            self.center
        } else {
            DEFAULT_CENTER
        };

        let zoom = if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom.clamp(ZOOM_MIN, ZOOM_MAX)
        } else {
            DEFAULT_ZOOM
        };

        let palette = match self.palette.trim() {
            "" => DEFAULT_PALETTE.to_string(),
            id => id.to_string(),
        };

        let julia_constant = self
            .julia_constant
            .filter(|c| c.re.is_finite() && c.im.is_finite());

        FractalParams {
            fractal_type: self.fractal_type,
            escape_radius,
            max_iterations,
            center,
            zoom,
            palette,
            precision: self.precision,
            julia_constant,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate() == *self
    }

    /// Constante de Julia effective (défaut si absente).
    pub fn effective_julia_constant(&self) -> Complex64 {
        self.julia_constant.unwrap_or(DEFAULT_JULIA_CONSTANT)
    }

    /// Applique une édition et revalide: renvoie un nouvel objet complet,
    /// jamais une mutation partielle visible.
    pub fn with_edit(&self, edit: &ParamEdit) -> FractalParams {
        let mut next = self.clone();
        match edit {
            ParamEdit::FractalType(name) => {
                next.fractal_type = FractalType::from_name(name).unwrap_or_default();
            }
            ParamEdit::EscapeRadius(r) => next.escape_radius = *r,
            ParamEdit::MaxIterations(n) => next.max_iterations = *n,
            ParamEdit::Center(c) => next.center = *c,
            ParamEdit::CenterRe(re) => next.center.re = *re,
            ParamEdit::CenterIm(im) => next.center.im = *im,
            ParamEdit::Zoom(z) => next.zoom = *z,
            ParamEdit::Palette(id) => next.palette = id.clone(),
            ParamEdit::Precision(name) => {
                next.precision = PrecisionTier::from_name(name).unwrap_or_default();
            }
            ParamEdit::JuliaConstant(c) => next.julia_constant = *c,
        }
        next.validate()
    }
}

/// Édition typée d'un champ, telle qu'émise par les formulaires de l'UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ParamEdit {
    FractalType(String),
    EscapeRadius(f64),
    MaxIterations(u32),
    Center(Complex64),
    CenterRe(f64),
    CenterIm(f64),
    Zoom(f64),
    Palette(String),
    Precision(String),
    JuliaConstant(Option<Complex64>),
}
