//! Bloom mip chain on the GPU. Step order and sizes come from
//! [`prism_render::BloomChain`].

use bytemuck::{Pod, Zeroable};
use prism_render::{BloomChain, BloomSettings, BloomStep};

use crate::pipelines::BloomPipelines;
use crate::targets::BLOOM_FORMAT;

/// Layout matches `BloomParams` in WGSL.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct BloomParams {
    pub threshold: f32,
    pub knee: f32,
    /// Texel size of the sampled texture.
    pub texel: [f32; 2],
}

/// Mip a step renders into.
pub fn target_mip(step: BloomStep) -> u32 {
    match step {
        BloomStep::Collect => 0,
        BloomStep::Downsample { dst, .. } | BloomStep::Upsample { dst, .. } => dst,
    }
}

/// Size of the texture a step samples; the HDR target for collect.
pub fn source_size(step: BloomStep, chain: &BloomChain, hdr: (u32, u32)) -> (u32, u32) {
    match step {
        BloomStep::Collect => hdr,
        BloomStep::Downsample { src, .. } | BloomStep::Upsample { src, .. } => chain.size(src).unwrap_or(hdr),
    }
}

/// Upsamples accumulate onto what the downsample left; everything else
/// overwrites its target.
pub fn load_op(step: BloomStep) -> wgpu::LoadOp<wgpu::Color> {
    match step {
        BloomStep::Upsample { .. } => wgpu::LoadOp::Load,
        _ => wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
    }
}

struct StepResources {
    step: BloomStep,
    params: wgpu::Buffer,
    texel: [f32; 2],
    group: wgpu::BindGroup,
}

pub struct BloomPass {
    chain: BloomChain,
    mip_views: Vec<wgpu::TextureView>,
    steps: Vec<StepResources>,
}

impl BloomPass {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        hdr: &wgpu::TextureView,
        size: (u32, u32),
    ) -> Self {
        let chain = BloomChain::new(size.0, size.1);
        let (width, height) = chain.size(0).unwrap_or((1, 1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("bloom_chain"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: chain.mip_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BLOOM_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let mip_views: Vec<wgpu::TextureView> = (0..chain.mip_count())
            .map(|mip| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("bloom_mip_{mip}")),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("bloom_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let steps = chain
            .steps()
            .into_iter()
            .filter_map(|step| {
                let source = match step {
                    BloomStep::Collect => hdr,
                    BloomStep::Downsample { src, .. } | BloomStep::Upsample { src, .. } => {
                        mip_views.get(src as usize)?
                    }
                };
                let (w, h) = source_size(step, &chain, size);
                let texel = [1.0 / w.max(1) as f32, 1.0 / h.max(1) as f32];
                let params = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("bloom_params"),
                    size: std::mem::size_of::<BloomParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("bloom_group"),
                    layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: params.as_entire_binding(),
                        },
                    ],
                });
                Some(StepResources {
                    step,
                    params,
                    texel,
                    group,
                })
            })
            .collect();

        tracing::debug!(sizes = ?chain.sizes(), "bloom chain created");
        Self {
            chain,
            mip_views,
            steps,
        }
    }

    pub fn chain(&self) -> &BloomChain {
        &self.chain
    }

    /// Mip 0 after the last upsample, read by the composite.
    pub fn output(&self) -> Option<&wgpu::TextureView> {
        self.mip_views.first()
    }

    pub fn write_params(&self, queue: &wgpu::Queue, settings: &BloomSettings) {
        for resources in &self.steps {
            let params = BloomParams {
                threshold: settings.threshold,
                knee: settings.knee,
                texel: resources.texel,
            };
            queue.write_buffer(&resources.params, 0, bytemuck::bytes_of(&params));
        }
    }

    pub fn record_step(&self, encoder: &mut wgpu::CommandEncoder, pipelines: &BloomPipelines, step: BloomStep) {
        let Some(resources) = self.steps.iter().find(|r| r.step == step) else {
            tracing::debug!(?step, "bloom step not in chain");
            return;
        };
        let Some(target) = self.mip_views.get(target_mip(step) as usize) else {
            return;
        };
        let pipeline = match step {
            BloomStep::Collect => &pipelines.collect,
            BloomStep::Downsample { .. } => &pipelines.downsample,
            BloomStep::Upsample { .. } => &pipelines.upsample,
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("bloom"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: load_op(step),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &resources.group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_uniform_layout() {
        assert_eq!(std::mem::size_of::<BloomParams>(), 16);
    }

    #[test]
    fn steps_target_and_sample_the_right_mips() {
        let chain = BloomChain::new(1280, 720);
        let hdr = (1280, 720);
        assert_eq!(target_mip(BloomStep::Collect), 0);
        assert_eq!(source_size(BloomStep::Collect, &chain, hdr), hdr);

        let down = BloomStep::Downsample { src: 1, dst: 2 };
        assert_eq!(target_mip(down), 2);
        assert_eq!(source_size(down, &chain, hdr), (320, 180));

        let up = BloomStep::Upsample { src: 4, dst: 3 };
        assert_eq!(target_mip(up), 3);
        assert_eq!(source_size(up, &chain, hdr), (40, 22));
    }

    #[test]
    fn only_upsample_keeps_previous_contents() {
        assert!(matches!(load_op(BloomStep::Upsample { src: 1, dst: 0 }), wgpu::LoadOp::Load));
        assert!(matches!(load_op(BloomStep::Collect), wgpu::LoadOp::Clear(_)));
        assert!(matches!(
            load_op(BloomStep::Downsample { src: 0, dst: 1 }),
            wgpu::LoadOp::Clear(_)
        ));
    }
}
