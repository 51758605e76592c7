//! Configuration du renderer, surchargeable par un fichier JSON.

use std::path::Path;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::color::{ColorSpace, LUT_SIZE};
use crate::error::{RenderError, Result};
use crate::perf::debounce::DEFAULT_DEBOUNCE;
use crate::perf::monitor::{DEFAULT_FPS_INTERVAL, DEFAULT_FRAME_WINDOW};
use crate::perf::LodConfig;

pub const DEFAULT_BUFFER_COUNT: usize = 3;
pub const DEFAULT_TARGET_FPS: u32 = 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub lod: LodConfig,
    /// Double (2) ou triple (3) buffering.
    pub buffer_count: usize,
    /// Nombre d'entrées de la LUT de palette.
    pub palette_resolution: usize,
    pub color_space: ColorSpace,
    pub debounce_ms: u64,
    pub target_fps: u32,
    pub fps_window_ms: u64,
    pub frame_window: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            lod: LodConfig::default(),
            buffer_count: DEFAULT_BUFFER_COUNT,
            palette_resolution: LUT_SIZE,
            color_space: ColorSpace::default(),
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            target_fps: DEFAULT_TARGET_FPS,
            fps_window_ms: DEFAULT_FPS_INTERVAL.as_millis() as u64,
            frame_window: DEFAULT_FRAME_WINDOW,
        }
    }
}

impl RendererConfig {
    /// Charge un fichier JSON; les champs absents prennent leur valeur par
    /// défaut, les champs hors limites sont corrigés.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: RendererConfig =
            serde_json::from_str(text).map_err(|e| RenderError::Config(e.to_string()))?;
        Ok(config.sanitized())
    }

    /// Remplace chaque valeur hors limites par sa valeur par défaut.
    pub fn sanitized(&self) -> Self {
        let defaults = RendererConfig::default();
        let buffer_count = if (2..=3).contains(&self.buffer_count) {
            self.buffer_count
        } else {
            warn!("buffer_count {} out of range, using {}", self.buffer_count, defaults.buffer_count);
            defaults.buffer_count
        };
        let palette_resolution = if (2..=4096).contains(&self.palette_resolution) {
            self.palette_resolution
        } else {
            warn!("palette_resolution {} out of range, using {}", self.palette_resolution, LUT_SIZE);
            defaults.palette_resolution
        };
        Self {
            lod: self.lod.sanitized(),
            buffer_count,
            palette_resolution,
            color_space: self.color_space,
            debounce_ms: self.debounce_ms,
            target_fps: if self.target_fps == 0 { defaults.target_fps } else { self.target_fps },
            fps_window_ms: if self.fps_window_ms == 0 { defaults.fps_window_ms } else { self.fps_window_ms },
            frame_window: if self.frame_window == 0 { defaults.frame_window } else { self.frame_window },
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fps_interval(&self) -> Duration {
        Duration::from_millis(self.fps_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = RendererConfig::default();
        assert_eq!(c.buffer_count, 3);
        assert_eq!(c.palette_resolution, 256);
        assert_eq!(c.debounce(), Duration::from_millis(50));
        assert_eq!(c.fps_interval(), Duration::from_millis(1000));
        assert_eq!(c.frame_window, 60);
        assert_eq!(c.sanitized(), c);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c = RendererConfig::from_json(r#"{"buffer_count": 2, "color_space": "linear"}"#).unwrap();
        assert_eq!(c.buffer_count, 2);
        assert_eq!(c.color_space, ColorSpace::Linear);
        assert_eq!(c.lod, LodConfig::default());
        assert_eq!(c.target_fps, 60);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let c = RendererConfig::from_json(r#"{"buffer_count": 7, "palette_resolution": 0, "target_fps": 0}"#)
            .unwrap();
        assert_eq!(c.buffer_count, 3);
        assert_eq!(c.palette_resolution, 256);
        assert_eq!(c.target_fps, 60);
    }

    #[test]
    fn test_lod_override() {
        let c = RendererConfig::from_json(
            r#"{"lod": {"zoom_thresholds": [100.0, 5.0], "tiers": [{"max_iterations": 200, "samples_per_pixel": 1, "precision": "medium"}]}}"#,
        )
        .unwrap();
        assert_eq!(c.lod.zoom_thresholds, vec![5.0, 100.0]);
        assert_eq!(c.lod.tiers.len(), 1);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(RendererConfig::from_json("{"), Err(RenderError::Config(_))));
        let missing = RendererConfig::load(Path::new("/nonexistent/fractall-rt.json"));
        assert!(matches!(missing, Err(RenderError::Config(_))));
    }
}
