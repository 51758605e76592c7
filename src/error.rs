use thiserror::Error;

use crate::fractal::{FractalType, PrecisionTier};
use crate::gpu::ManagerState;

/// Erreurs du cœur de rendu.
///
/// Les paramètres invalides et les débordements numériques n'en font pas
/// partie: le validateur substitue les valeurs par défaut et un dépassement
/// compte comme un échappement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("GPU context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("GPU context lost")]
    ContextLost,
    #[error("Shader compilation failed for {variant:?} ({precision:?}): {diagnostics}")]
    ProgramCompilationFailed {
        variant: FractalType,
        precision: PrecisionTier,
        diagnostics: String,
    },
    #[error("GPU program manager not ready (state {0:?})")]
    NotReady(ManagerState),
    #[error("Worker error: {message}")]
    Worker { message: String, stack: Option<String> },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Image error: {0}")]
    Image(String),
}

impl RenderError {
    /// Erreurs après lesquelles la boucle peut reprendre.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RenderError::ContextLost | RenderError::ProgramCompilationFailed { .. } | RenderError::Worker { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
