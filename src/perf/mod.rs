pub mod debounce;
pub mod lod;
pub mod monitor;

pub use debounce::Debouncer;
pub use lod::{FrameSettings, LodConfig, LodController, QualityTier};
pub use monitor::{PerformanceMetrics, PerformanceMonitor};
