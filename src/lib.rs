//! Rendu temps réel de fractales escape-time.
//!
//! Le cœur (formules, mappeur de coordonnées, contrôle du niveau de détail,
//! gestionnaire des programmes GPU, boucle de rendu) est indépendant de
//! l'hôte: le backend GPU, l'horloge et l'ordonnancement des frames sont des
//! traits fournis par l'appelant.

pub mod color;
pub mod config;
pub mod error;
pub mod fractal;
pub mod gpu;
pub mod io;
pub mod perf;
pub mod render;

pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use fractal::{FractalParams, FractalType, ParamEdit, PrecisionTier};
pub use render::{RenderLoop, Session, Viewport};
