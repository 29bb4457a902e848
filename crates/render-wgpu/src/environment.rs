//! Image-based lighting on the GPU: the irradiance and specular cubes, the
//! BRDF table and the uniform that tells the shaders whether they are real.
//!
//! Without maps the group still binds 1x1 black cubes and a 1x1 table so
//! the forward and sky pipelines keep one layout; the shaders then fall
//! back to the analytic sky ambient.

use bytemuck::{Pod, Zeroable};
use prism_assets::{CubeFormat, CubeMap, EnvironmentMaps, LookupTable};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct EnvironmentUniform {
    /// x = specular mip count, y = 1 when maps are bound.
    pub params: [f32; 4],
}

impl EnvironmentUniform {
    pub fn new(maps: Option<&EnvironmentMaps>) -> Self {
        match maps {
            Some(maps) => Self {
                params: [maps.specular.mip_count as f32, 1.0, 0.0, 0.0],
            },
            None => Self {
                params: [1.0, 0.0, 0.0, 0.0],
            },
        }
    }

    pub fn enabled(&self) -> bool {
        self.params[1] >= 0.5
    }
}

pub fn cube_texture_format(format: CubeFormat) -> wgpu::TextureFormat {
    match format {
        CubeFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        CubeFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        CubeFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        CubeFormat::Rgb9e5Ufloat => wgpu::TextureFormat::Rgb9e5Ufloat,
    }
}

fn black_cube() -> CubeMap {
    CubeMap {
        size: 1,
        mip_count: 1,
        format: CubeFormat::Rgba8Unorm,
        data: [0, 0, 0, 255].repeat(6),
    }
}

fn flat_lut() -> LookupTable {
    LookupTable {
        width: 1,
        height: 1,
        pixels: vec![255, 0, 0, 255],
    }
}

fn upload_cube(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, cube: &CubeMap) -> wgpu::TextureView {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: cube.size,
                height: cube.size,
                depth_or_array_layers: 6,
            },
            mip_level_count: cube.mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: cube_texture_format(cube.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::MipMajor,
        &cube.data,
    );
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    })
}

fn upload_lut(device: &wgpu::Device, queue: &wgpu::Queue, lut: &LookupTable) -> wgpu::TextureView {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("brdf_lut"),
            size: wgpu::Extent3d {
                width: lut.width,
                height: lut.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &lut.pixels,
    );
    texture.create_view(&Default::default())
}

/// Group bound at index 3 of the forward pipeline and 1 of the sky.
pub struct EnvironmentBindings {
    pub group: wgpu::BindGroup,
    uniform: EnvironmentUniform,
}

impl EnvironmentBindings {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        maps: Option<&EnvironmentMaps>,
    ) -> Self {
        let _span = tracing::info_span!("environment_upload", maps = maps.is_some()).entered();
        let fallback_cube = black_cube();
        let fallback_lut = flat_lut();
        let (diffuse, specular, lut) = match maps {
            Some(m) => (&m.diffuse, &m.specular, &m.lut),
            None => (&fallback_cube, &fallback_cube, &fallback_lut),
        };

        let irradiance = upload_cube(device, queue, "irradiance_cube", diffuse);
        let prefiltered = upload_cube(device, queue, "specular_cube", specular);
        let lut_view = upload_lut(device, queue, lut);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("environment_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let uniform = EnvironmentUniform::new(maps);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("environment_uniform"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("environment_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&irradiance),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&prefiltered),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&lut_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffer.as_entire_binding(),
                },
            ],
        });
        tracing::debug!(
            irradiance = diffuse.size,
            specular = specular.size,
            specular_mips = specular.mip_count,
            "environment group ready"
        );
        Self { group, uniform }
    }

    pub fn enabled(&self) -> bool {
        self.uniform.enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maps(specular_mips: u32) -> EnvironmentMaps {
        let mut specular = black_cube();
        specular.mip_count = specular_mips;
        EnvironmentMaps {
            diffuse: black_cube(),
            specular,
            lut: flat_lut(),
        }
    }

    #[test]
    fn uniform_is_one_vec4() {
        assert_eq!(std::mem::size_of::<EnvironmentUniform>(), 16);
    }

    #[test]
    fn uniform_flags_bound_maps() {
        let off = EnvironmentUniform::new(None);
        assert!(!off.enabled());
        assert_eq!(off.params[0], 1.0);

        let on = EnvironmentUniform::new(Some(&maps(6)));
        assert!(on.enabled());
        assert_eq!(on.params[0], 6.0);
    }

    #[test]
    fn fallbacks_fill_every_face() {
        let cube = black_cube();
        assert_eq!(
            cube.data.len(),
            prism_assets::environment::cube_level_bytes(1, 0, cube.format)
        );
        let lut = flat_lut();
        assert_eq!(lut.pixels.len(), (lut.width * lut.height * 4) as usize);
    }

    #[test]
    fn every_cube_format_maps_to_a_filterable_format() {
        for format in [
            CubeFormat::Rgba8Unorm,
            CubeFormat::Rgba8UnormSrgb,
            CubeFormat::Rgba16Float,
            CubeFormat::Rgb9e5Ufloat,
        ] {
            let texture = cube_texture_format(format);
            assert_eq!(texture.block_copy_size(None), Some(format.bytes_per_texel() as u32));
        }
    }
}
