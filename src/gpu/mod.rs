pub mod backend;
pub mod manager;
pub mod shaders;
pub mod wgpu_backend;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{FrameUniforms, GpuBackend, ProgramKey};
pub use manager::{GpuProgramManager, ManagerState};
pub use wgpu_backend::WgpuBackend;
