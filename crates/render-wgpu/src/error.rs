use prism_render::{GraphError, ShaderError};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("adapter {adapter} lacks required features {missing:?}")]
    UnsupportedFeatures {
        adapter: String,
        missing: wgpu::Features,
    },
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface has no supported formats")]
    NoSurfaceFormat,
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("shader {key} failed to build: {message}")]
    ShaderRebuild { key: String, message: String },
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("GPU device lost")]
    DeviceLost,
}
