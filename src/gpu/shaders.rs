//! Génération des programmes WGSL, un par couple (variante, précision).
//!
//! Le shader reprend exactement le mappeur de coordonnées, le pilote
//! escape-time et la lecture de LUT du chemin CPU. L'arithmétique GPU est en
//! f32 pour tous les niveaux; `Low` remplace le compte lissé par le compte
//! entier.

use crate::fractal::formulas::{NEWTON_TOLERANCE, PHOENIX_P};
use crate::fractal::lyapunov::LYAPUNOV_SENTINEL;
use crate::fractal::{FractalType, PrecisionTier};
use crate::gpu::backend::ProgramKey;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Tours de palette cyclique par seconde (animation lente).
pub const PALETTE_DRIFT: f32 = 0.01;

const HEADER: &str = r#"
struct Uniforms {
    resolution: vec2<f32>,
    center: vec2<f32>,
    julia: vec2<f32>,
    zoom: f32,
    escape_radius: f32,
    max_iterations: u32,
    sample_grid: u32,
    time: f32,
    palette_cyclic: u32,
};

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var palette: texture_1d<f32>;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(position, 0.0, 1.0);
    return out;
}

fn pixel_to_complex(px: f32, py: f32) -> vec2<f32> {
    let aspect = u.resolution.x / u.resolution.y;
    let x = (px / u.resolution.x - 0.5) * aspect * u.zoom;
    let y = (py / u.resolution.y - 0.5) * u.zoom;
    return vec2<f32>(x, y) + u.center;
}

fn cmul(a: vec2<f32>, b: vec2<f32>) -> vec2<f32> {
    return vec2<f32>(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x);
}

fn csq(z: vec2<f32>) -> vec2<f32> {
    return vec2<f32>((z.x - z.y) * (z.x + z.y), 2.0 * z.x * z.y);
}

fn cdiv(a: vec2<f32>, b: vec2<f32>) -> vec2<f32> {
    let d = dot(b, b);
    return vec2<f32>(a.x * b.x + a.y * b.y, a.y * b.x - a.x * b.y) / d;
}
"#;

const SMOOTH_ESCAPE: &str = r#"
fn escape_value(i: u32, m: f32) -> f32 {
    if (m > 3.0e38) {
        return f32(i);
    }
    return f32(i) + 1.0 - log2(log2(m) * 0.5);
}
"#;

const BANDED_ESCAPE: &str = r#"
fn escape_value(i: u32, m: f32) -> f32 {
    return f32(i);
}
"#;

/// Résultat: x = valeur, y = nature (0 échappé, 1 intérieur, 2 bande Newton, 3 Lyapunov).
const ESCAPE_DRIVER: &str = r#"
fn evaluate(p: vec2<f32>) -> vec2<f32> {
    var z = seed(p);
    var z_prev = vec2<f32>(0.0, 0.0);
    let c = parameter(p);
    let r2 = u.escape_radius * u.escape_radius;
    for (var i: u32 = 0u; i < u.max_iterations; i = i + 1u) {
        let m = dot(z, z);
        if (!(m <= r2)) {
            return vec2<f32>(escape_value(i, m), 0.0);
        }
        let next = iterate_step(z, z_prev, c);
        z_prev = z;
        z = next;
    }
    return vec2<f32>(f32(u.max_iterations), 1.0);
}
"#;

const NEWTON_DRIVER: &str = r#"
fn nearest_root(z: vec2<f32>) -> u32 {
    let d0 = distance(z, vec2<f32>(1.0, 0.0));
    let d1 = distance(z, vec2<f32>(-0.5, 0.8660254));
    let d2 = distance(z, vec2<f32>(-0.5, -0.8660254));
    if (d0 <= d1 && d0 <= d2) {
        return 0u;
    }
    if (d1 <= d2) {
        return 1u;
    }
    return 2u;
}

fn evaluate(p: vec2<f32>) -> vec2<f32> {
    var z = p;
    let tol2 = NEWTON_TOLERANCE * NEWTON_TOLERANCE;
    for (var i: u32 = 0u; i < u.max_iterations; i = i + 1u) {
        let z2 = csq(z);
        let denom = 3.0 * z2;
        if (dot(denom, denom) == 0.0) {
            break;
        }
        let delta = cdiv(cmul(z2, z) - vec2<f32>(1.0, 0.0), denom);
        z = z - delta;
        if (dot(delta, delta) < tol2) {
            let band = (f32(nearest_root(z)) + f32(i) / f32(u.max_iterations)) / 3.0;
            return vec2<f32>(band, 2.0);
        }
    }
    return vec2<f32>(f32(u.max_iterations), 1.0);
}
"#;

const LYAPUNOV_DRIVER: &str = r#"
fn evaluate(p: vec2<f32>) -> vec2<f32> {
    let a = p.x;
    let b = p.y;
    if (!(a > 0.0 && a < 4.0) || !(b > 0.0 && b < 4.0) || u.max_iterations == 0u) {
        return vec2<f32>(LYAPUNOV_SENTINEL, 3.0);
    }
    var x = 0.5;
    var total = 0.0;
    for (var i: u32 = 0u; i < u.max_iterations; i = i + 1u) {
        let r = select(b, a, i % 2u == 0u);
        x = r * x * (1.0 - x);
        if (!(x > 0.0 && x < 1.0)) {
            return vec2<f32>(LYAPUNOV_SENTINEL, 3.0);
        }
        total = total + log(max(abs(r * (1.0 - 2.0 * x)), 1e-10));
    }
    return vec2<f32>(total / f32(u.max_iterations), 3.0);
}
"#;

const COLORING: &str = r#"
fn normalize_lyapunov(l: f32) -> f32 {
    if (l < 0.0) {
        return min(-l, 2.0) / 2.0 * 0.85;
    }
    return 0.85 + min(l, 1.0) * 0.15;
}

// Position dans la palette, négative pour du noir.
fn palette_position(r: vec2<f32>) -> f32 {
    let max_iter = f32(max(u.max_iterations, 1u));
    if (r.y == 1.0) {
        return -1.0;
    }
    if (r.y == 2.0) {
        return clamp(r.x, 0.0, 1.0);
    }
    if (r.y == 3.0) {
        if (r.x <= LYAPUNOV_SENTINEL) {
            return -1.0;
        }
        return normalize_lyapunov(r.x);
    }
    if (u.palette_cyclic != 0u) {
        return fract(r.x / COLOR_CYCLE_LENGTH + u.time * PALETTE_DRIFT);
    }
    return clamp(r.x / max_iter, 0.0, 1.0);
}

fn sample_palette(t: f32) -> vec3<f32> {
    let n = i32(textureDimensions(palette));
    var x = 0.0;
    var i0 = 0;
    var i1 = 0;
    if (u.palette_cyclic != 0u) {
        x = fract(t) * f32(n);
        i0 = i32(floor(x)) % n;
        i1 = (i0 + 1) % n;
    } else {
        x = clamp(t, 0.0, 1.0) * f32(n - 1);
        i0 = min(i32(floor(x)), n - 1);
        i1 = min(i0 + 1, n - 1);
    }
    let a = textureLoad(palette, i0, 0).rgb;
    let b = textureLoad(palette, i1, 0).rgb;
    return mix(a, b, x - floor(x));
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let n = max(u.sample_grid, 1u);
    let inv = 1.0 / f32(n);
    let col = floor(frag.x);
    let row = floor(frag.y);
    var color = vec3<f32>(0.0, 0.0, 0.0);
    for (var sy: u32 = 0u; sy < n; sy = sy + 1u) {
        for (var sx: u32 = 0u; sx < n; sx = sx + 1u) {
            let px = col + (f32(sx) + 0.5) * inv;
            let py = u.resolution.y - (row + (f32(sy) + 0.5) * inv);
            let t = palette_position(evaluate(pixel_to_complex(px, py)));
            if (t >= 0.0) {
                color = color + sample_palette(t);
            }
        }
    }
    return vec4<f32>(color * inv * inv, 1.0);
}
"#;

/// Germe, paramètre `c` et pas d'itération de la variante.
fn variant_functions(variant: FractalType) -> Option<(&'static str, &'static str, &'static str)> {
    let mandel_seed = "return vec2<f32>(0.0, 0.0);";
    let sample = "return p;";
    let parts = match variant {
        FractalType::Mandelbrot => (mandel_seed, sample, "return csq(z) + c;"),
        FractalType::Julia => (sample, "return u.julia;", "return csq(z) + c;"),
        FractalType::BurningShip => (mandel_seed, "return vec2<f32>(p.x, -p.y);", "return csq(abs(z)) + c;"),
        FractalType::Tricorn => (mandel_seed, sample, "return csq(vec2<f32>(z.x, -z.y)) + c;"),
        FractalType::Celtic => (
            mandel_seed,
            sample,
            "let w = csq(z);\n    return vec2<f32>(abs(w.x), w.y) + c;",
        ),
        FractalType::Perpendicular => (mandel_seed, sample, "return abs(z) + c;"),
        FractalType::Heart => (mandel_seed, sample, "return csq(z) * length(z) + c;"),
        FractalType::Phoenix => (mandel_seed, sample, "return csq(z) + c + PHOENIX_P * z_prev;"),
        FractalType::Lambda => (
            "return vec2<f32>(0.5, 0.0);",
            sample,
            "return cmul(cmul(c, z), vec2<f32>(1.0, 0.0) - z);",
        ),
        FractalType::Newton | FractalType::Lyapunov => return None,
    };
    Some(parts)
}

/// Source WGSL complète du programme.
pub fn program_source(key: ProgramKey) -> String {
    let mut src = String::with_capacity(8 * 1024);
    src.push_str(&format!("// {}\n", key.label()));
    src.push_str(&format!("const PHOENIX_P: f32 = {:?};\n", PHOENIX_P as f32));
    src.push_str(&format!("const NEWTON_TOLERANCE: f32 = {:?};\n", NEWTON_TOLERANCE as f32));
    src.push_str(&format!("const LYAPUNOV_SENTINEL: f32 = {:?};\n", LYAPUNOV_SENTINEL as f32));
    src.push_str(&format!(
        "const COLOR_CYCLE_LENGTH: f32 = {:?};\n",
        crate::color::palettes::COLOR_CYCLE_LENGTH as f32
    ));
    src.push_str(&format!("const PALETTE_DRIFT: f32 = {:?};\n", PALETTE_DRIFT));
    src.push_str(HEADER);

    src.push_str(match key.precision {
        PrecisionTier::High | PrecisionTier::Medium => SMOOTH_ESCAPE,
        PrecisionTier::Low => BANDED_ESCAPE,
    });

    match variant_functions(key.variant) {
        Some((seed, parameter, step)) => {
            src.push_str(&format!("\nfn seed(p: vec2<f32>) -> vec2<f32> {{\n    {seed}\n}}\n"));
            src.push_str(&format!("\nfn parameter(p: vec2<f32>) -> vec2<f32> {{\n    {parameter}\n}}\n"));
            src.push_str(&format!(
                "\nfn iterate_step(z: vec2<f32>, z_prev: vec2<f32>, c: vec2<f32>) -> vec2<f32> {{\n    {step}\n}}\n"
            ));
            src.push_str(ESCAPE_DRIVER);
        }
        None if key.variant == FractalType::Newton => src.push_str(NEWTON_DRIVER),
        None => src.push_str(LYAPUNOV_DRIVER),
    }

    src.push_str(COLORING);
    src
}
