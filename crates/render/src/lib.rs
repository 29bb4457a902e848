//! Renderer-agnostic frame logic.
//!
//! Everything the GPU backend needs to decide before recording commands:
//! views and cull uniforms, shadow cascade fitting, the bloom mip chain, the
//! pass graph with its resource transitions, renderer configuration, the
//! shader registry and the per-frame scene update.
//!
//! # Invariants
//! - Nothing here owns a GPU handle; backends consume plain data.
//! - The CPU cull reference and the compute shader apply the same test, so
//!   either can be used to predict the other.
//! - The pass plan is compiled once per configuration. Compute passes always
//!   precede graphics passes.

pub mod bloom;
pub mod cascades;
pub mod config;
pub mod context;
pub mod culling;
pub mod frame_graph;
mod renderer;
pub mod scene;
pub mod shader_registry;
pub mod view;

pub use bloom::{BloomChain, BloomSettings, BloomStep};
pub use cascades::{CascadeUniform, ShadowCascade, compute_cascades};
pub use config::{ConfigError, Environment, RendererConfig, ShadowSettings, SsaoSettings};
pub use context::RenderContext;
pub use culling::{CullUniform, CullView};
pub use frame_graph::{FrameGraph, FramePlan, GraphError, PassKind, Queue};
pub use renderer::{DebugTextRenderer, Renderer};
pub use scene::{
    CullRequest, FrameUpdate, GpuPointLight, PointLight, SceneError, SceneState, SceneUniform,
};
pub use shader_registry::{ShaderError, ShaderKey, ShaderRegistry, ShaderStage};
pub use view::RenderView;

pub fn crate_info() -> &'static str {
    "prism-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
