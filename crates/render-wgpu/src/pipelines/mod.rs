//! Bind group layouts and every pipeline of the frame, rebuilt per shader key
//! when the registry reports a changed source.

mod builder;
mod layouts;

use prism_assets::AssetKind;
use prism_render::{ShaderKey, ShaderRegistry};

use crate::error::RenderError;
use crate::shaders;

use builder::Builder;
use layouts::PipelineLayouts;
pub use layouts::Layouts;

/// One pipeline per vertex layout.
pub struct GeometryPipelines {
    pub static_mesh: wgpu::RenderPipeline,
    pub skinned_mesh: wgpu::RenderPipeline,
}

impl GeometryPipelines {
    pub fn for_kind(&self, kind: AssetKind) -> &wgpu::RenderPipeline {
        match kind {
            AssetKind::Static => &self.static_mesh,
            AssetKind::Skinned => &self.skinned_mesh,
        }
    }
}

pub struct BloomPipelines {
    pub collect: wgpu::RenderPipeline,
    pub downsample: wgpu::RenderPipeline,
    pub upsample: wgpu::RenderPipeline,
}

pub struct Pipelines {
    pub cull: wgpu::ComputePipeline,
    pub prepass: GeometryPipelines,
    pub ssao: wgpu::RenderPipeline,
    pub shadow: GeometryPipelines,
    pub sky: wgpu::RenderPipeline,
    pub forward: GeometryPipelines,
    pub debug_lines: wgpu::RenderPipeline,
    pub bloom: BloomPipelines,
    pub composite: wgpu::RenderPipeline,
}

/// Run `build` inside a validation error scope.
fn checked<T>(device: &wgpu::Device, key: ShaderKey, build: impl FnOnce() -> T) -> Result<T, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(RenderError::ShaderRebuild {
            key: key.to_string(),
            message: error.to_string(),
        }),
        None => Ok(value),
    }
}

/// Owns layouts and pipelines. Rebuilds only what a dirty shader feeds.
pub struct PipelineCache {
    pub layouts: Layouts,
    pipeline_layouts: PipelineLayouts,
    surface_format: wgpu::TextureFormat,
    pipelines: Pipelines,
}

impl PipelineCache {
    pub fn new(
        device: &wgpu::Device,
        registry: &ShaderRegistry,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, RenderError> {
        let _span = tracing::info_span!("pipeline_build").entered();
        let layouts = Layouts::new(device);
        let pipeline_layouts = PipelineLayouts::new(device, &layouts);
        let builder = Builder {
            device,
            registry,
            layouts: &pipeline_layouts,
            surface_format,
        };
        let pipelines = Pipelines {
            cull: builder.cull()?,
            prepass: builder.geometry(shaders::PREPASS)?,
            ssao: builder.ssao()?,
            shadow: builder.geometry(shaders::SHADOW)?,
            sky: builder.sky()?,
            forward: builder.geometry(shaders::FORWARD)?,
            debug_lines: builder.debug_lines()?,
            bloom: builder.bloom()?,
            composite: builder.composite()?,
        };
        Ok(Self {
            layouts,
            pipeline_layouts,
            surface_format,
            pipelines,
        })
    }

    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    /// Rebuild pipelines of every dirty shader, then clear the dirty flags.
    /// A failed build is logged and the previous pipeline stays in use.
    pub fn rebuild_dirty(&mut self, device: &wgpu::Device, registry: &mut ShaderRegistry) -> Vec<RenderError> {
        let dirty = registry.dirty_keys();
        if dirty.is_empty() {
            return Vec::new();
        }
        let _span = tracing::info_span!("pipeline_rebuild", shaders = dirty.len()).entered();

        let mut failures = Vec::new();
        for key in dirty {
            if let Err(error) = self.rebuild(device, registry, key) {
                tracing::error!(shader = %key, "{error}; keeping previous pipeline");
                failures.push(error);
            } else {
                tracing::info!(shader = %key, "pipeline rebuilt");
            }
        }
        registry.clear_dirty();
        failures
    }

    fn rebuild(&mut self, device: &wgpu::Device, registry: &ShaderRegistry, key: ShaderKey) -> Result<(), RenderError> {
        let builder = Builder {
            device,
            registry,
            layouts: &self.pipeline_layouts,
            surface_format: self.surface_format,
        };
        let p = &mut self.pipelines;
        match key {
            shaders::CULL => p.cull = builder.cull()?,
            shaders::PREPASS => p.prepass = builder.geometry(key)?,
            shaders::SSAO => p.ssao = builder.ssao()?,
            shaders::SHADOW => p.shadow = builder.geometry(key)?,
            shaders::SKY => p.sky = builder.sky()?,
            shaders::FORWARD => p.forward = builder.geometry(key)?,
            shaders::DEBUG_LINES => p.debug_lines = builder.debug_lines()?,
            shaders::BLOOM => p.bloom = builder.bloom()?,
            shaders::COMPOSITE => p.composite = builder.composite()?,
            other => tracing::debug!(shader = %other, "no pipeline uses this shader"),
        }
        Ok(())
    }
}
