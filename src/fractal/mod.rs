pub mod complex;
pub mod types;
pub mod formulas;
pub mod lyapunov;
pub mod definitions;

pub use types::{FractalParams, FractalType, ParamEdit, PrecisionTier};
pub use formulas::{EscapeValue, IterationConfig};
pub use definitions::{default_params_for_type, definition, presets, FractalDefinition, InterestingLocation, Preset};
