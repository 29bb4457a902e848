//! Vertex layouts, bind group layouts and the pipeline layouts built on them.

use prism_assets::{AssetKind, SkinnedVertex, StaticVertex};

const STATIC_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32x4,
];

const SKINNED_ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32x4,
    4 => Uint32x4,
    5 => Float32x4,
];

pub fn vertex_layout(kind: AssetKind) -> wgpu::VertexBufferLayout<'static> {
    match kind {
        AssetKind::Static => wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<StaticVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &STATIC_ATTRIBUTES,
        },
        AssetKind::Skinned => wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SkinnedVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &SKINNED_ATTRIBUTES,
        },
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, ty: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

const FILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: true };

/// Bind group layouts shared by pipelines and the objects that own the bound
/// resources.
pub struct Layouts {
    /// Scene uniform and point lights.
    pub scene: wgpu::BindGroupLayout,
    /// Per-asset metadata, materials, joints, material maps and their sampler.
    pub asset: wgpu::BindGroupLayout,
    /// Cascade index for the shadow vertex stage.
    pub cascade: wgpu::BindGroupLayout,
    /// Shadow array, comparison sampler, SSAO and a linear sampler.
    pub lighting: wgpu::BindGroupLayout,
    /// Irradiance cube, specular cube, BRDF table, their sampler and the
    /// environment uniform.
    pub environment: wgpu::BindGroupLayout,
    /// Prepass depth and normals read by SSAO.
    pub gbuffer: wgpu::BindGroupLayout,
    pub cull: wgpu::BindGroupLayout,
    pub bloom: wgpu::BindGroupLayout,
    pub composite: wgpu::BindGroupLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let vf = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let layout = |label: &str, entries: &[wgpu::BindGroupLayoutEntry]| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
        };
        Self {
            scene: layout(
                "scene_layout",
                &[uniform_entry(0, vf), uniform_entry(1, wgpu::ShaderStages::FRAGMENT)],
            ),
            asset: layout(
                "asset_layout",
                &[
                    storage_entry(0, vf, true),
                    storage_entry(1, vf, true),
                    storage_entry(2, vf, true),
                    texture_entry(3, FILTERABLE, wgpu::TextureViewDimension::D2Array),
                    sampler_entry(4, wgpu::SamplerBindingType::Filtering),
                ],
            ),
            cascade: layout("cascade_layout", &[uniform_entry(0, wgpu::ShaderStages::VERTEX)]),
            lighting: layout(
                "lighting_layout",
                &[
                    texture_entry(0, wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2Array),
                    sampler_entry(1, wgpu::SamplerBindingType::Comparison),
                    texture_entry(2, FILTERABLE, wgpu::TextureViewDimension::D2),
                    sampler_entry(3, wgpu::SamplerBindingType::Filtering),
                ],
            ),
            environment: layout(
                "environment_layout",
                &[
                    texture_entry(0, FILTERABLE, wgpu::TextureViewDimension::Cube),
                    texture_entry(1, FILTERABLE, wgpu::TextureViewDimension::Cube),
                    texture_entry(2, FILTERABLE, wgpu::TextureViewDimension::D2),
                    sampler_entry(3, wgpu::SamplerBindingType::Filtering),
                    uniform_entry(4, wgpu::ShaderStages::FRAGMENT),
                ],
            ),
            gbuffer: layout(
                "gbuffer_layout",
                &[
                    texture_entry(0, wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2),
                    texture_entry(
                        1,
                        wgpu::TextureSampleType::Float { filterable: false },
                        wgpu::TextureViewDimension::D2,
                    ),
                ],
            ),
            cull: layout(
                "cull_layout",
                &[
                    uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                    storage_entry(1, wgpu::ShaderStages::COMPUTE, true),
                    storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
                ],
            ),
            bloom: layout(
                "bloom_layout",
                &[
                    texture_entry(0, FILTERABLE, wgpu::TextureViewDimension::D2),
                    sampler_entry(1, wgpu::SamplerBindingType::Filtering),
                    uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
                ],
            ),
            composite: layout(
                "composite_layout",
                &[
                    texture_entry(0, FILTERABLE, wgpu::TextureViewDimension::D2),
                    texture_entry(1, FILTERABLE, wgpu::TextureViewDimension::D2),
                    sampler_entry(2, wgpu::SamplerBindingType::Filtering),
                ],
            ),
        }
    }
}

pub(super) struct PipelineLayouts {
    pub prepass: wgpu::PipelineLayout,
    pub shadow: wgpu::PipelineLayout,
    pub forward: wgpu::PipelineLayout,
    pub ssao: wgpu::PipelineLayout,
    pub sky: wgpu::PipelineLayout,
    pub scene_only: wgpu::PipelineLayout,
    pub bloom: wgpu::PipelineLayout,
    pub composite: wgpu::PipelineLayout,
    pub cull: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device, l: &Layouts) -> Self {
        let layout = |label: &str, groups: &[&wgpu::BindGroupLayout]| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: groups,
                push_constant_ranges: &[],
            })
        };
        Self {
            prepass: layout("prepass_pipeline_layout", &[&l.scene, &l.asset]),
            shadow: layout("shadow_pipeline_layout", &[&l.scene, &l.asset, &l.cascade]),
            forward: layout(
                "forward_pipeline_layout",
                &[&l.scene, &l.asset, &l.lighting, &l.environment],
            ),
            ssao: layout("ssao_pipeline_layout", &[&l.scene, &l.gbuffer]),
            sky: layout("sky_pipeline_layout", &[&l.scene, &l.environment]),
            scene_only: layout("scene_pipeline_layout", &[&l.scene]),
            bloom: layout("bloom_pipeline_layout", &[&l.bloom]),
            composite: layout("composite_pipeline_layout", &[&l.scene, &l.composite]),
            cull: layout("cull_pipeline_layout", &[&l.cull]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layouts_cover_the_vertex_structs() {
        let stat = vertex_layout(AssetKind::Static);
        let skinned = vertex_layout(AssetKind::Skinned);
        assert_eq!(stat.array_stride, 48);
        assert_eq!(skinned.attributes.len(), stat.attributes.len() + 2);
        let last = skinned.attributes[skinned.attributes.len() - 1];
        assert_eq!(last.offset + last.format.size(), skinned.array_stride);
    }
}
