//! Cascaded shadow map: a depth array with one layer per cascade, rendered
//! from each asset's cascade replica.

use prism_common::limits::{SHADOW_MAP_CASCADES, SHADOW_MAP_DIMENSIONS};
use wgpu::util::DeviceExt;

use crate::geometry::GpuAsset;
use crate::pipelines::GeometryPipelines;
use crate::targets::SHADOW_FORMAT;

/// Indirect replica drawn into cascade `layer`.
pub fn cascade_slot(layer: u32) -> usize {
    layer as usize + 1
}

pub struct CascadedShadowSystem {
    layer_views: Vec<wgpu::TextureView>,
    /// Every layer, sampled by the forward pass.
    pub array_view: wgpu::TextureView,
    /// `LessEqual` comparison sampler for PCF lookups.
    pub sampler: wgpu::Sampler,
    cascade_groups: Vec<wgpu::BindGroup>,
}

impl CascadedShadowSystem {
    pub fn new(device: &wgpu::Device, cascade_layout: &wgpu::BindGroupLayout) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow_map"),
            size: wgpu::Extent3d {
                width: SHADOW_MAP_DIMENSIONS,
                height: SHADOW_MAP_DIMENSIONS,
                depth_or_array_layers: SHADOW_MAP_CASCADES as u32,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let layer_views = (0..SHADOW_MAP_CASCADES as u32)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("shadow_layer_{layer}")),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("shadow_array"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let cascade_groups = (0..SHADOW_MAP_CASCADES as u32)
            .map(|layer| {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("cascade_index_{layer}")),
                    contents: bytemuck::cast_slice(&[layer, 0u32, 0, 0]),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("cascade_group_{layer}")),
                    layout: cascade_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        tracing::debug!(
            size = SHADOW_MAP_DIMENSIONS,
            layers = SHADOW_MAP_CASCADES,
            "shadow map created"
        );
        Self {
            layer_views,
            array_view,
            sampler,
            cascade_groups,
        }
    }

    /// Clear layer `layer` and draw every asset's cascade replica into it.
    pub fn record_layer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &GeometryPipelines,
        scene_group: &wgpu::BindGroup,
        assets: &[GpuAsset],
        layer: u32,
        multi_draw: bool,
    ) {
        let (Some(view), Some(cascade_group)) = (
            self.layer_views.get(layer as usize),
            self.cascade_groups.get(layer as usize),
        ) else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&format!("shadow_cascade_{layer}")),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, scene_group, &[]);
        pass.set_bind_group(2, cascade_group, &[]);
        for asset in assets {
            pass.set_pipeline(pipelines.for_kind(asset.kind()));
            asset.draw(&mut pass, cascade_slot(layer), multi_draw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_common::limits::INDIRECT_BUFFER_SLOTS;
    use prism_render::CullView;

    #[test]
    fn layers_draw_their_own_replica() {
        for layer in 0..SHADOW_MAP_CASCADES as u32 {
            assert_eq!(cascade_slot(layer), CullView::Cascade(layer).slot());
            assert!(cascade_slot(layer) < INDIRECT_BUFFER_SLOTS);
        }
    }
}
