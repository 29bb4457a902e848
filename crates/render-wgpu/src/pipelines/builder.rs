//! Per-pass pipeline construction from composed shader modules.

use prism_assets::AssetKind;
use prism_render::{ShaderKey, ShaderRegistry};

use super::layouts::{PipelineLayouts, vertex_layout};
use super::{BloomPipelines, GeometryPipelines, checked};
use crate::error::RenderError;
use crate::shaders::{self, compose};
use crate::targets::{BLOOM_FORMAT, DEPTH_FORMAT, HDR_FORMAT, NORMAL_FORMAT, SHADOW_FORMAT, SSAO_FORMAT};

fn depth_state(write: bool, compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: Default::default(),
        bias: Default::default(),
    }
}

fn color_target(format: wgpu::TextureFormat, blend: Option<wgpu::BlendState>) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format,
        blend,
        write_mask: wgpu::ColorWrites::ALL,
    })
}

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

struct RenderSpec<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    vs: &'a str,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    fs: Option<&'a str>,
    targets: &'a [Option<wgpu::ColorTargetState>],
    topology: wgpu::PrimitiveTopology,
    cull_mode: Option<wgpu::Face>,
    depth: Option<wgpu::DepthStencilState>,
}

fn render_pipeline(device: &wgpu::Device, module: &wgpu::ShaderModule, spec: RenderSpec<'_>) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(spec.label),
        layout: Some(spec.layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(spec.vs),
            compilation_options: Default::default(),
            buffers: spec.buffers,
        },
        fragment: spec.fs.map(|entry| wgpu::FragmentState {
            module,
            entry_point: Some(entry),
            compilation_options: Default::default(),
            targets: spec.targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: spec.topology,
            cull_mode: spec.cull_mode,
            ..Default::default()
        },
        depth_stencil: spec.depth,
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

pub(super) struct Builder<'a> {
    pub device: &'a wgpu::Device,
    pub registry: &'a ShaderRegistry,
    pub layouts: &'a PipelineLayouts,
    pub surface_format: wgpu::TextureFormat,
}

impl Builder<'_> {
    fn module(&self, key: ShaderKey) -> Result<wgpu::ShaderModule, RenderError> {
        let text = compose(self.registry, key)?;
        checked(self.device, key, || {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(key.as_str()),
                source: wgpu::ShaderSource::Wgsl(text.into()),
            })
        })
    }

    pub fn cull(&self) -> Result<wgpu::ComputePipeline, RenderError> {
        let module = self.module(shaders::CULL)?;
        checked(self.device, shaders::CULL, || {
            self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("cull_pipeline"),
                layout: Some(&self.layouts.cull),
                module: &module,
                entry_point: Some("cs_main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })
    }

    /// Prepass and forward rasterize both faces; the fragment stage drops
    /// back faces of single-sided materials.
    pub fn geometry(&self, key: ShaderKey) -> Result<GeometryPipelines, RenderError> {
        let module = self.module(key)?;
        let normal_target = [color_target(NORMAL_FORMAT, None)];
        let hdr_target = [color_target(HDR_FORMAT, None)];
        let build = |kind: AssetKind| {
            let buffers = [vertex_layout(kind)];
            let vs = match kind {
                AssetKind::Static => "vs_static",
                AssetKind::Skinned => "vs_skinned",
            };
            let label = format!("{key}_{kind:?}");
            let spec = match key {
                shaders::SHADOW => RenderSpec {
                    label: &label,
                    layout: &self.layouts.shadow,
                    vs,
                    buffers: &buffers,
                    fs: None,
                    targets: &[],
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    depth: Some(wgpu::DepthStencilState {
                        format: SHADOW_FORMAT,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::LessEqual,
                        stencil: Default::default(),
                        bias: wgpu::DepthBiasState {
                            constant: 2,
                            slope_scale: 2.0,
                            clamp: 0.0,
                        },
                    }),
                },
                shaders::FORWARD => RenderSpec {
                    label: &label,
                    layout: &self.layouts.forward,
                    vs,
                    buffers: &buffers,
                    fs: Some("fs_main"),
                    targets: &hdr_target,
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    depth: Some(depth_state(false, wgpu::CompareFunction::LessEqual)),
                },
                _ => RenderSpec {
                    label: &label,
                    layout: &self.layouts.prepass,
                    vs,
                    buffers: &buffers,
                    fs: Some("fs_main"),
                    targets: &normal_target,
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    depth: Some(depth_state(true, wgpu::CompareFunction::Less)),
                },
            };
            render_pipeline(self.device, &module, spec)
        };
        checked(self.device, key, || GeometryPipelines {
            static_mesh: build(AssetKind::Static),
            skinned_mesh: build(AssetKind::Skinned),
        })
    }

    fn fullscreen(
        &self,
        key: ShaderKey,
        label: &str,
        layout: &wgpu::PipelineLayout,
        fs: &str,
        target: Option<wgpu::ColorTargetState>,
        depth: Option<wgpu::DepthStencilState>,
    ) -> Result<wgpu::RenderPipeline, RenderError> {
        let module = self.module(key)?;
        let targets = [target];
        checked(self.device, key, || {
            render_pipeline(
                self.device,
                &module,
                RenderSpec {
                    label,
                    layout,
                    vs: "vs_fullscreen",
                    buffers: &[],
                    fs: Some(fs),
                    targets: &targets,
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    depth,
                },
            )
        })
    }

    pub fn ssao(&self) -> Result<wgpu::RenderPipeline, RenderError> {
        self.fullscreen(
            shaders::SSAO,
            "ssao_pipeline",
            &self.layouts.ssao,
            "fs_main",
            color_target(SSAO_FORMAT, None),
            None,
        )
    }

    /// Drawn at the far plane inside the forward pass.
    pub fn sky(&self) -> Result<wgpu::RenderPipeline, RenderError> {
        self.fullscreen(
            shaders::SKY,
            "sky_pipeline",
            &self.layouts.sky,
            "fs_main",
            color_target(HDR_FORMAT, None),
            Some(depth_state(false, wgpu::CompareFunction::LessEqual)),
        )
    }

    pub fn debug_lines(&self) -> Result<wgpu::RenderPipeline, RenderError> {
        let module = self.module(shaders::DEBUG_LINES)?;
        let targets = [color_target(HDR_FORMAT, None)];
        let attributes = wgpu::vertex_attr_array![0 => Float32x3];
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        checked(self.device, shaders::DEBUG_LINES, || {
            render_pipeline(
                self.device,
                &module,
                RenderSpec {
                    label: "debug_lines_pipeline",
                    layout: &self.layouts.scene_only,
                    vs: "vs_main",
                    buffers: &buffers,
                    fs: Some("fs_main"),
                    targets: &targets,
                    topology: wgpu::PrimitiveTopology::LineList,
                    cull_mode: None,
                    depth: Some(depth_state(false, wgpu::CompareFunction::Always)),
                },
            )
        })
    }

    pub fn bloom(&self) -> Result<BloomPipelines, RenderError> {
        let layout = &self.layouts.bloom;
        Ok(BloomPipelines {
            collect: self.fullscreen(
                shaders::BLOOM,
                "bloom_collect_pipeline",
                layout,
                "fs_collect",
                color_target(BLOOM_FORMAT, None),
                None,
            )?,
            downsample: self.fullscreen(
                shaders::BLOOM,
                "bloom_downsample_pipeline",
                layout,
                "fs_downsample",
                color_target(BLOOM_FORMAT, None),
                None,
            )?,
            upsample: self.fullscreen(
                shaders::BLOOM,
                "bloom_upsample_pipeline",
                layout,
                "fs_upsample",
                color_target(BLOOM_FORMAT, Some(ADDITIVE)),
                None,
            )?,
        })
    }

    pub fn composite(&self) -> Result<wgpu::RenderPipeline, RenderError> {
        self.fullscreen(
            shaders::COMPOSITE,
            "composite_pipeline",
            &self.layouts.composite,
            "fs_main",
            color_target(self.surface_format, None),
            None,
        )
    }
}
