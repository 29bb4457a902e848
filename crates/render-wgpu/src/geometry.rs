//! GPU residency of one asset: merged vertex/index buffers, the five indirect
//! command replicas, the storage buffers the vertex stage indexes and the
//! material map array.

use prism_assets::{AssetKind, IndirectDrawCommand, RenderableAsset, TextureArray};
use prism_common::Aabb;
use prism_common::limits::INDIRECT_BUFFER_SLOTS;
use prism_render::CullUniform;
use wgpu::util::DeviceExt;

/// Byte stride of one indexed indirect command.
pub const COMMAND_SIZE: u64 = std::mem::size_of::<IndirectDrawCommand>() as u64;

const MAT4_SIZE: usize = std::mem::size_of::<[[f32; 4]; 4]>();

/// Byte offset of command `index` inside an indirect buffer.
pub fn command_offset(index: u32) -> u64 {
    index as u64 * COMMAND_SIZE
}

/// Line-list vertices of every box, 24 per box.
pub fn debug_line_vertices(boxes: &[Aabb]) -> Vec<[f32; 3]> {
    boxes
        .iter()
        .flat_map(|b| b.edge_vertices())
        .map(|v| v.to_array())
        .collect()
}

/// Storage bindings may not be empty, so short contents are zero-padded.
fn padded(bytes: &[u8], min: usize) -> Vec<u8> {
    let mut out = bytes.to_vec();
    if out.len() < min {
        out.resize(min, 0);
    }
    out
}

fn init_buffer(device: &wgpu::Device, label: &str, bytes: &[u8], min: usize, usage: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: &padded(bytes, min),
        usage,
    })
}

/// Upload the packed material maps as a mipmapped 2D array.
fn material_maps(device: &wgpu::Device, queue: &wgpu::Queue, name: &str, textures: &TextureArray) -> wgpu::TextureView {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("{name}_material_maps")),
            size: wgpu::Extent3d {
                width: textures.size(),
                height: textures.size(),
                depth_or_array_layers: textures.layer_count(),
            },
            mip_level_count: textures.mip_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        textures.data(),
    );
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(&format!("{name}_material_maps_view")),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        ..Default::default()
    })
}

fn material_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("material_sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn joint_bytes(joints: &[glam::Mat4]) -> Vec<u8> {
    let arrays: Vec<[[f32; 4]; 4]> = if joints.is_empty() {
        vec![glam::Mat4::IDENTITY.to_cols_array_2d()]
    } else {
        joints.iter().map(|m| m.to_cols_array_2d()).collect()
    };
    bytemuck::cast_slice(&arrays).to_vec()
}

/// Everything the passes need to draw or cull one asset.
pub struct GpuAsset {
    name: String,
    kind: AssetKind,
    draw_count: u32,
    commands: Vec<IndirectDrawCommand>,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    indirect: Vec<wgpu::Buffer>,
    cull_uniforms: Vec<wgpu::Buffer>,
    cull_groups: Vec<wgpu::BindGroup>,
    metadata_buffer: wgpu::Buffer,
    joint_buffer: wgpu::Buffer,
    joint_capacity: usize,
    /// Metadata, materials, joints and material maps (group 1 of every
    /// geometry pipeline).
    pub asset_group: wgpu::BindGroup,
    debug_lines: wgpu::Buffer,
    debug_vertex_count: u32,
}

impl GpuAsset {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        asset_layout: &wgpu::BindGroupLayout,
        cull_layout: &wgpu::BindGroupLayout,
        asset: &RenderableAsset,
    ) -> Self {
        let name = asset.name().to_string();
        let _span = tracing::info_span!("gpu_asset_upload", asset = %name).entered();
        let set = asset.draw_set();
        let commands = set.commands().to_vec();
        let draw_count = commands.len() as u32;

        let vertex_buffer = init_buffer(
            device,
            &format!("{name}_vertices"),
            asset.vertex_bytes(),
            4,
            wgpu::BufferUsages::VERTEX,
        );
        let index_buffer = init_buffer(
            device,
            &format!("{name}_indices"),
            bytemuck::cast_slice(asset.indices()),
            4,
            wgpu::BufferUsages::INDEX,
        );

        let command_bytes: &[u8] = bytemuck::cast_slice(&commands);
        let indirect: Vec<wgpu::Buffer> = (0..INDIRECT_BUFFER_SLOTS)
            .map(|slot| {
                init_buffer(
                    device,
                    &format!("{name}_indirect_{slot}"),
                    command_bytes,
                    COMMAND_SIZE as usize,
                    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
                )
            })
            .collect();

        let metadata = set.gpu_metadata();
        let metadata_buffer = init_buffer(
            device,
            &format!("{name}_metadata"),
            bytemuck::cast_slice(&metadata),
            std::mem::size_of::<prism_assets::GpuPrimitiveMetadata>(),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let materials = asset.gpu_materials();
        let material_buffer = init_buffer(
            device,
            &format!("{name}_materials"),
            bytemuck::cast_slice(&materials),
            std::mem::size_of::<prism_assets::GpuMaterial>(),
            wgpu::BufferUsages::STORAGE,
        );
        let joint_capacity = asset.joint_matrices().len().max(1);
        let joint_buffer = init_buffer(
            device,
            &format!("{name}_joints"),
            &joint_bytes(asset.joint_matrices()),
            MAT4_SIZE,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let maps_view = material_maps(device, queue, &name, asset.textures());
        let sampler = material_sampler(device);

        let asset_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{name}_asset_group")),
            layout: asset_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: metadata_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: joint_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&maps_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let cull_uniforms: Vec<wgpu::Buffer> = (0..INDIRECT_BUFFER_SLOTS)
            .map(|slot| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{name}_cull_uniform_{slot}")),
                    size: std::mem::size_of::<CullUniform>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let cull_groups = cull_uniforms
            .iter()
            .zip(&indirect)
            .enumerate()
            .map(|(slot, (uniform, commands))| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{name}_cull_group_{slot}")),
                    layout: cull_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: uniform.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: metadata_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: commands.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        let lines = debug_line_vertices(&asset.debug_boxes());
        let debug_lines = init_buffer(
            device,
            &format!("{name}_debug_lines"),
            bytemuck::cast_slice(&lines),
            std::mem::size_of::<[f32; 3]>(),
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        );

        tracing::debug!(
            asset = %name,
            draws = draw_count,
            vertices = asset.vertex_count(),
            indices = asset.index_count(),
            joints = asset.joint_matrices().len(),
            texture_layers = asset.textures().layer_count(),
            "asset resident on GPU"
        );

        Self {
            name,
            kind: asset.kind(),
            draw_count,
            commands,
            vertex_buffer,
            index_buffer,
            indirect,
            cull_uniforms,
            cull_groups,
            metadata_buffer,
            joint_buffer,
            joint_capacity,
            asset_group,
            debug_lines,
            debug_vertex_count: lines.len() as u32,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    /// Patch metadata, joints and wireframe boxes after the asset changed.
    pub fn upload(&self, queue: &wgpu::Queue, asset: &RenderableAsset) {
        let metadata = asset.draw_set().gpu_metadata();
        if !metadata.is_empty() {
            queue.write_buffer(&self.metadata_buffer, 0, bytemuck::cast_slice(&metadata));
        }
        self.upload_joints(queue, asset.joint_matrices());

        let lines = debug_line_vertices(&asset.debug_boxes());
        if !lines.is_empty() && lines.len() as u32 <= self.debug_vertex_count {
            queue.write_buffer(&self.debug_lines, 0, bytemuck::cast_slice(&lines));
        }
    }

    fn upload_joints(&self, queue: &wgpu::Queue, joints: &[glam::Mat4]) {
        if joints.is_empty() {
            return;
        }
        if joints.len() > self.joint_capacity {
            tracing::error!(
                asset = %self.name,
                joints = joints.len(),
                capacity = self.joint_capacity,
                "joint count grew past the uploaded buffer; skipping"
            );
            return;
        }
        queue.write_buffer(&self.joint_buffer, 0, &joint_bytes(joints));
    }

    /// Write the cull uniform of `slot`. Must happen before the dispatch that
    /// reads it is submitted.
    pub fn write_cull_uniform(&self, queue: &wgpu::Queue, slot: usize, uniform: &CullUniform) {
        if let Some(buffer) = self.cull_uniforms.get(slot) {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(uniform));
        }
    }

    pub fn cull_group(&self, slot: usize) -> Option<&wgpu::BindGroup> {
        self.cull_groups.get(slot)
    }

    /// Restore cascade replicas to the loaded commands (every instance count
    /// back to one), used when cascade culling is switched off.
    pub fn reset_cascade_slots(&self, queue: &wgpu::Queue) {
        if self.commands.is_empty() {
            return;
        }
        for buffer in self.indirect.iter().skip(1) {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&self.commands));
        }
    }

    /// Issue every indirect command of replica `slot`. The caller binds the
    /// pipeline and every group except 1.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, slot: usize, multi_draw: bool) {
        let Some(indirect) = self.indirect.get(slot) else {
            return;
        };
        if self.draw_count == 0 {
            return;
        }
        pass.set_bind_group(1, &self.asset_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        if multi_draw {
            pass.multi_draw_indexed_indirect(indirect, 0, self.draw_count);
        } else {
            for i in 0..self.draw_count {
                pass.draw_indexed_indirect(indirect, command_offset(i));
            }
        }
    }

    /// World AABB wireframes, drawn with the debug line pipeline.
    pub fn draw_debug_lines(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.debug_vertex_count == 0 {
            return;
        }
        pass.set_vertex_buffer(0, self.debug_lines.slice(..));
        pass.draw(0..self.debug_vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn command_stride_matches_gpu_layout() {
        assert_eq!(COMMAND_SIZE, 20);
        assert_eq!(command_offset(0), 0);
        assert_eq!(command_offset(3), 60);
    }

    #[test]
    fn each_box_gives_twelve_lines() {
        let boxes = [
            Aabb::new(Vec3::ZERO, Vec3::ONE),
            Aabb::new(Vec3::splat(-2.0), Vec3::splat(-1.0)),
        ];
        let lines = debug_line_vertices(&boxes);
        assert_eq!(lines.len(), 48);
        assert!(lines[..24].iter().all(|p| p.iter().all(|c| (0.0..=1.0).contains(c))));
    }

    #[test]
    fn short_contents_are_padded() {
        assert_eq!(padded(&[], 20).len(), 20);
        assert_eq!(padded(&[1, 2, 3], 2), vec![1, 2, 3]);
    }

    #[test]
    fn static_assets_get_an_identity_joint() {
        let bytes = joint_bytes(&[]);
        assert_eq!(bytes.len(), MAT4_SIZE);
        let first: [[f32; 4]; 4] = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(first, glam::Mat4::IDENTITY.to_cols_array_2d());
    }
}
