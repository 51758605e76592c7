pub mod palettes;
pub mod color_models;

pub use color_models::ColorSpace;
pub use palettes::{
    build_lut, field_position, generate_gradient, palette_position, sample_lut, ColorPalette, Continuity,
    PaletteStore, LUT_SIZE,
};
