use std::path::Path;

use image::{RgbImage, RgbaImage};
use rayon::prelude::*;

use crate::color::{field_position, sample_lut, Continuity};
use crate::error::{RenderError, Result};
use crate::fractal::FractalType;
use crate::render::Field;

/// Colorise un champ d'itérations à travers une LUT RGBA.
///
/// Les pixels intérieurs (et la sentinelle Lyapunov) sont noirs. La
/// colorisation est parallélisée par lignes.
pub fn colorize_field(
    field: &Field,
    fractal_type: FractalType,
    max_iterations: u32,
    lut: &[u8],
    continuity: Continuity,
) -> Vec<u8> {
    let w = field.width as usize;
    if w == 0 {
        return Vec::new();
    }
    let mut buffer = vec![0u8; field.values.len() * 3];
    buffer
        .par_chunks_mut(w * 3)
        .zip(field.values.par_chunks(w))
        .for_each(|(out, row)| {
            for (px, value) in out.chunks_mut(3).zip(row) {
                let rgb = field_position(*value, fractal_type, max_iterations, continuity)
                    .map(|t| sample_lut(lut, t, continuity))
                    .unwrap_or([0, 0, 0]);
                px.copy_from_slice(&rgb);
            }
        });
    buffer
}

/// Colorise le champ puis l'enregistre au format PNG.
pub fn save_field_png(
    field: &Field,
    fractal_type: FractalType,
    max_iterations: u32,
    lut: &[u8],
    continuity: Continuity,
    output: &Path,
) -> Result<()> {
    let buffer = colorize_field(field, fractal_type, max_iterations, lut, continuity);
    let img = RgbImage::from_raw(field.width, field.height, buffer)
        .ok_or_else(|| RenderError::Image(format!("buffer does not match {}x{}", field.width, field.height)))?;
    img.save(output).map_err(|e| RenderError::Image(format!("{}: {e}", output.display())))
}

/// Enregistre une frame RGBA relue depuis le GPU.
pub fn save_rgba_png(width: u32, height: u32, rgba: Vec<u8>, output: &Path) -> Result<()> {
    let img = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| RenderError::Image(format!("buffer does not match {width}x{height}")))?;
    img.save(output).map_err(|e| RenderError::Image(format!("{}: {e}", output.display())))
}
