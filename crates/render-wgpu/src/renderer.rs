//! Frame driver: uploads what changed, walks the compiled pass plan and
//! records compute and graphics command buffers, then presents.
//!
//! # Invariants
//! - Compute (culling) is submitted before graphics in the same call.
//! - Every size-dependent target is recreated together.
//! - Recording for frame N starts only after frame N-1 finished on the GPU.

use prism_assets::EnvironmentMaps;
use prism_common::limits::MAX_POINT_LIGHTS;
use prism_render::scene::{FrameUpdate, GpuPointLight, SceneState, SceneUniform};
use prism_render::{
    CullView, FrameGraph, FramePlan, PassKind, RendererConfig, ShaderRegistry,
};

use crate::bloom::BloomPass;
use crate::culler::FrustumCuller;
use crate::environment::EnvironmentBindings;
use crate::error::RenderError;
use crate::geometry::GpuAsset;
use crate::gpu::GpuContext;
use crate::pipelines::{Layouts, PipelineCache};
use crate::shadows::CascadedShadowSystem;
use crate::targets::FrameTargets;

/// Configuration bits that change the shape of the pass plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanKey {
    pub ssao: bool,
    pub bloom: bool,
    pub cull_cascades: bool,
    /// Levels of the bloom chain at the current target size.
    pub bloom_mips: u32,
}

impl PlanKey {
    pub fn new(config: &RendererConfig, bloom_mips: u32) -> Self {
        Self {
            ssao: config.ssao.enabled,
            bloom: config.bloom.enabled,
            cull_cascades: config.shadows.cull_cascades,
            bloom_mips,
        }
    }

    pub fn plan(self, config: &RendererConfig) -> Result<FramePlan, RenderError> {
        Ok(FrameGraph::standard_with_bloom_mips(config, self.bloom_mips)?.compile())
    }

    /// Cascade replicas hold stale cull results once cascade culling stops.
    pub fn needs_cascade_reset(self, next: PlanKey) -> bool {
        self.cull_cascades && !next.cull_cascades
    }
}

/// `counts.w` of the scene uniform: 1 when the surface encodes sRGB itself.
pub fn srgb_flag(format: wgpu::TextureFormat) -> u32 {
    u32::from(format.is_srgb())
}

/// What one recorded frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: usize,
    pub cull_dispatches: usize,
    pub asset_draws: usize,
}

fn linear_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("linear_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Environment maps named by the config, or none. A broken set is logged
/// and the analytic ambient is used instead.
fn load_environment(config: &RendererConfig) -> Option<EnvironmentMaps> {
    let dir = config.environment_dir.as_ref()?;
    match EnvironmentMaps::load(dir) {
        Ok(maps) => maps,
        Err(error) => {
            tracing::error!(dir = %dir.display(), "{error}; using sky ambient");
            None
        }
    }
}

/// Bind groups over size-dependent views, rebuilt with the targets.
struct SizedResources {
    targets: FrameTargets,
    bloom: BloomPass,
    lighting_group: wgpu::BindGroup,
    composite_group: wgpu::BindGroup,
}

impl SizedResources {
    fn new(
        device: &wgpu::Device,
        layouts: &Layouts,
        shadows: &CascadedShadowSystem,
        sampler: &wgpu::Sampler,
        size: (u32, u32),
    ) -> Self {
        let targets = FrameTargets::new(device, &layouts.gbuffer, size);
        let bloom = BloomPass::new(device, &layouts.bloom, &targets.hdr, size);
        let lighting_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lighting_group"),
            layout: &layouts.lighting,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&shadows.array_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&shadows.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.ssao),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        let bloom_view = bloom.output().unwrap_or(&targets.hdr);
        let composite_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite_group"),
            layout: &layouts.composite,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.hdr),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(bloom_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self {
            targets,
            bloom,
            lighting_group,
            composite_group,
        }
    }
}

pub struct SceneRenderer {
    pipelines: PipelineCache,
    culler: FrustumCuller,
    shadows: CascadedShadowSystem,
    sampler: wgpu::Sampler,
    scene_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    scene_group: wgpu::BindGroup,
    environment: EnvironmentBindings,
    sized: SizedResources,
    assets: Vec<GpuAsset>,
    plan: FramePlan,
    plan_key: PlanKey,
}

impl SceneRenderer {
    pub fn new(gpu: &GpuContext, registry: &ShaderRegistry, config: &RendererConfig) -> Result<Self, RenderError> {
        let _span = tracing::info_span!("renderer_init").entered();
        let device = &gpu.device;
        let pipelines = PipelineCache::new(device, registry, gpu.format())?;
        let layouts = &pipelines.layouts;

        let scene_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_uniform"),
            size: std::mem::size_of::<SceneUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let lights_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("point_lights"),
            size: std::mem::size_of::<[GpuPointLight; MAX_POINT_LIGHTS]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let scene_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_group"),
            layout: &layouts.scene,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights_buffer.as_entire_binding(),
                },
            ],
        });

        let maps = load_environment(config);
        let environment = EnvironmentBindings::new(device, &gpu.queue, &layouts.environment, maps.as_ref());
        tracing::info!(image_based = environment.enabled(), "ambient lighting configured");

        let shadows = CascadedShadowSystem::new(device, &layouts.cascade);
        let sampler = linear_sampler(device);
        let sized = SizedResources::new(device, layouts, &shadows, &sampler, gpu.size());

        let plan_key = PlanKey::new(config, sized.bloom.chain().mip_count());
        let plan = plan_key.plan(config)?;
        tracing::debug!("frame plan:\n{plan}");

        Ok(Self {
            pipelines,
            culler: FrustumCuller::new(),
            shadows,
            sampler,
            scene_buffer,
            lights_buffer,
            scene_group,
            environment,
            sized,
            assets: Vec::new(),
            plan,
            plan_key,
        })
    }

    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    pub fn gpu_assets(&self) -> &[GpuAsset] {
        &self.assets
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.sized.targets.size()
    }

    /// Recreate every size-dependent target and the groups that bind them.
    pub fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        self.sized = SizedResources::new(device, &self.pipelines.layouts, &self.shadows, &self.sampler, size);
        tracing::debug!(width = size.0, height = size.1, "size-dependent resources recreated");
    }

    /// Rebuild pipelines whose shader changed. Failures keep the previous pipeline.
    pub fn rebuild_shaders(&mut self, device: &wgpu::Device, registry: &mut ShaderRegistry) -> Vec<RenderError> {
        self.pipelines.rebuild_dirty(device, registry)
    }

    /// Make every scene asset resident. Assets are only ever appended.
    pub fn sync_assets(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &SceneState) {
        let layouts = &self.pipelines.layouts;
        for asset in scene.assets().iter().skip(self.assets.len()) {
            self.assets
                .push(GpuAsset::new(device, queue, &layouts.asset, &layouts.cull, asset));
        }
    }

    fn refresh_plan(&mut self, queue: &wgpu::Queue, config: &RendererConfig) -> Result<(), RenderError> {
        let key = PlanKey::new(config, self.sized.bloom.chain().mip_count());
        if key == self.plan_key {
            return Ok(());
        }
        if self.plan_key.needs_cascade_reset(key) {
            for asset in &self.assets {
                asset.reset_cascade_slots(queue);
            }
            tracing::debug!("cascade replicas reset");
        }
        self.plan = key.plan(config)?;
        self.plan_key = key;
        tracing::info!(?key, "frame plan recompiled");
        Ok(())
    }

    fn upload(&self, gpu: &GpuContext, scene: &SceneState, update: &FrameUpdate, config: &RendererConfig) {
        let queue = &gpu.queue;
        for &index in &update.dirty_assets {
            if let (Some(gpu_asset), Some(asset)) = (self.assets.get(index), scene.assets().get(index)) {
                gpu_asset.upload(queue, asset);
            }
        }

        let mut uniform = update.uniform;
        uniform.counts[3] = srgb_flag(gpu.format());
        queue.write_buffer(&self.scene_buffer, 0, bytemuck::bytes_of(&uniform));
        let (lights, _) = scene.gpu_point_lights();
        queue.write_buffer(&self.lights_buffer, 0, bytemuck::cast_slice(&lights));
        self.sized.bloom.write_params(queue, &config.bloom);
    }

    /// Render one frame. Returns `None` when the surface had to be rebuilt
    /// and nothing was presented.
    ///
    /// `overlay` records into the composited surface view after the
    /// composite and before present; the command buffers it returns are
    /// submitted ahead of the frame's graphics work.
    pub fn render_frame<F>(
        &mut self,
        gpu: &mut GpuContext,
        scene: &SceneState,
        update: &FrameUpdate,
        config: &RendererConfig,
        overlay: F,
    ) -> Result<Option<FrameStats>, RenderError>
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView) -> Vec<wgpu::CommandBuffer>,
    {
        let _span = tracing::info_span!("render_frame", frame = scene.frame_index()).entered();

        gpu.wait_for_previous_frame();
        self.sync_assets(&gpu.device, &gpu.queue, scene);
        self.refresh_plan(&gpu.queue, config)?;
        self.upload(gpu, scene, update, config);

        let frame = match gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring");
                gpu.reconfigure();
                let size = gpu.size();
                self.resize(&gpu.device, size);
                return Ok(None);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface acquire timed out; skipping frame");
                return Ok(None);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::DeviceLost),
            Err(other) => return Err(other.into()),
        };
        let surface_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let device = &gpu.device;
        let mut compute = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("compute_encoder"),
        });
        let mut graphics = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("graphics_encoder"),
        });

        self.plan.log_transitions();
        let mut stats = FrameStats::default();
        let mut overlay = Some(overlay);
        let mut extra = Vec::new();
        let frame_ctx = FrameContext {
            queue: &gpu.queue,
            scene,
            update,
            config,
            multi_draw: gpu.supports_multi_draw(),
        };

        for pass in self.plan.passes() {
            stats.passes += 1;
            match pass.kind {
                PassKind::CullMain => {
                    stats.cull_dispatches += self.record_cull(&frame_ctx, &mut compute, CullView::Main);
                }
                PassKind::CullCascade(i) => {
                    stats.cull_dispatches += self.record_cull(&frame_ctx, &mut compute, CullView::Cascade(i));
                }
                PassKind::DepthPrepass => {
                    stats.asset_draws += self.record_prepass(&frame_ctx, &mut graphics);
                }
                PassKind::Ssao => self.record_ssao(&frame_ctx, &mut graphics),
                PassKind::Shadow(layer) => self.shadows.record_layer(
                    &mut graphics,
                    &self.pipelines.pipelines().shadow,
                    &self.scene_group,
                    &self.assets,
                    layer,
                    frame_ctx.multi_draw,
                ),
                PassKind::Forward => {
                    stats.asset_draws += self.record_forward(&frame_ctx, &mut graphics);
                }
                PassKind::Bloom(step) => {
                    self.sized
                        .bloom
                        .record_step(&mut graphics, &self.pipelines.pipelines().bloom, step);
                }
                PassKind::Composite => self.record_composite(&mut graphics, &surface_view),
                PassKind::Overlay => {
                    if let Some(callback) = overlay.take() {
                        extra = callback(device, &gpu.queue, &mut graphics, &surface_view);
                    }
                }
                PassKind::Present => {}
            }
        }

        let suboptimal = frame.suboptimal;
        let mut buffers = vec![compute.finish()];
        buffers.extend(extra);
        buffers.push(graphics.finish());
        gpu.submit(buffers);
        frame.present();

        if suboptimal {
            tracing::debug!("suboptimal frame; reconfiguring surface");
            gpu.reconfigure();
            let size = gpu.size();
            self.resize(&gpu.device, size);
        }
        tracing::trace!(?stats, "frame submitted");
        Ok(Some(stats))
    }

    fn record_cull(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder, view: CullView) -> usize {
        self.culler.record(
            ctx.queue,
            encoder,
            &self.pipelines.pipelines().cull,
            &self.assets,
            &ctx.update.cull,
            view,
        )
    }

    fn record_prepass(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) -> usize {
        let targets = &self.sized.targets;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("depth_prepass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.normals,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, &self.scene_group, &[]);
        let prepass = &self.pipelines.pipelines().prepass;
        let mut draws = 0;
        for asset in &self.assets {
            pass.set_pipeline(prepass.for_kind(asset.kind()));
            asset.draw(&mut pass, CullView::Main.slot(), ctx.multi_draw);
            draws += usize::from(asset.draw_count() > 0);
        }
        draws
    }

    fn record_ssao(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let targets = &self.sized.targets;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ssao"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.ssao,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if !ctx.config.ssao.enabled {
            return;
        }
        pass.set_pipeline(&self.pipelines.pipelines().ssao);
        pass.set_bind_group(0, &self.scene_group, &[]);
        pass.set_bind_group(1, &targets.gbuffer_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn record_forward(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) -> usize {
        let targets = &self.sized.targets;
        let pipelines = self.pipelines.pipelines();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("forward"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.hdr,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, &self.scene_group, &[]);

        if ctx.scene.collision_debug() {
            pass.set_pipeline(&pipelines.sky);
            pass.set_bind_group(1, &self.environment.group, &[]);
            pass.draw(0..3, 0..1);
            pass.set_pipeline(&pipelines.debug_lines);
            for asset in &self.assets {
                asset.draw_debug_lines(&mut pass);
            }
            return 0;
        }

        pass.set_bind_group(2, &self.sized.lighting_group, &[]);
        pass.set_bind_group(3, &self.environment.group, &[]);
        let mut draws = 0;
        for asset in &self.assets {
            pass.set_pipeline(pipelines.forward.for_kind(asset.kind()));
            asset.draw(&mut pass, CullView::Main.slot(), ctx.multi_draw);
            draws += usize::from(asset.draw_count() > 0);
        }
        pass.set_pipeline(&pipelines.sky);
        pass.set_bind_group(1, &self.environment.group, &[]);
        pass.draw(0..3, 0..1);
        draws
    }

    fn record_composite(&self, encoder: &mut wgpu::CommandEncoder, surface: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: surface,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipelines.pipelines().composite);
        pass.set_bind_group(0, &self.scene_group, &[]);
        pass.set_bind_group(1, &self.sized.composite_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// Per-frame inputs shared by the pass recorders.
struct FrameContext<'a> {
    queue: &'a wgpu::Queue,
    scene: &'a SceneState,
    update: &'a FrameUpdate,
    config: &'a RendererConfig,
    multi_draw: bool,
}
