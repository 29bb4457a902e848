//! wgpu render backend for prism.
//!
//! Owns every GPU object: per-asset buffers and indirect replicas, the cull
//! compute pipeline, the cascaded shadow array, frame targets, the bloom
//! chain, the image-based lighting maps and all render pipelines. Frames are
//! recorded by walking the [`prism_render::FramePlan`] compiled for the
//! current configuration.
//!
//! # Invariants
//! - Culling only rewrites `instance_count`; all other command fields stay
//!   as loaded.
//! - Draws use `first_instance` as the metadata slot, so
//!   `INDIRECT_FIRST_INSTANCE` is required of the adapter.
//! - A failed shader rebuild never replaces a working pipeline.
//! - No renderer state is shared across threads; nothing here locks.

mod bloom;
mod camera;
mod culler;
mod environment;
mod error;
mod geometry;
mod gpu;
mod pipelines;
mod renderer;
mod shaders;
mod shadows;
mod targets;

pub use bloom::BloomPass;
pub use camera::FlyCamera;
pub use culler::{Dispatch, FrustumCuller, dispatches_for};
pub use environment::{EnvironmentBindings, EnvironmentUniform, cube_texture_format};
pub use error::RenderError;
pub use geometry::GpuAsset;
pub use gpu::{GpuContext, OPTIONAL_FEATURES, REQUIRED_FEATURES};
pub use pipelines::{Layouts, PipelineCache};
pub use renderer::{FrameStats, PlanKey, SceneRenderer};
pub use shadows::CascadedShadowSystem;
pub use targets::FrameTargets;
pub use shaders::{builtin_keys, compose, register_builtin};

pub fn crate_info() -> &'static str {
    "prism-render-wgpu v0.1.0"
}
