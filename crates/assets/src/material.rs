use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::source::SourceMaterial;
use crate::texture::TextureArray;

/// Material map slot with no texture bound.
pub const NO_TEXTURE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Fragments below the cutoff are discarded.
    Mask,
    /// Drawn opaque; there is no sorted transparent pass.
    Blend,
}

impl AlphaMode {
    fn gpu_code(self) -> u32 {
        match self {
            Self::Opaque => 0,
            Self::Mask => 1,
            Self::Blend => 2,
        }
    }
}

/// Scene image indices of each map a material samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterialMaps {
    pub base_color: Option<usize>,
    pub metallic_roughness: Option<usize>,
    pub normal: Option<usize>,
    pub emissive: Option<usize>,
    pub occlusion: Option<usize>,
}

/// Metallic-roughness material: factors plus optional maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    /// Emissive factor already scaled by the emissive strength.
    pub emissive: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub maps: MaterialMaps,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".into(),
            base_color: Vec4::new(0.8, 0.8, 0.8, 1.0),
            emissive: Vec3::ZERO,
            metallic: 0.0,
            roughness: 0.8,
            normal_scale: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            maps: MaterialMaps::default(),
        }
    }
}

impl From<&SourceMaterial> for Material {
    fn from(src: &SourceMaterial) -> Self {
        Self {
            name: src.name.clone(),
            base_color: src.base_color,
            emissive: src.emissive * src.emissive_strength,
            metallic: src.metallic,
            roughness: src.roughness,
            normal_scale: src.normal_scale,
            alpha_mode: src.alpha_mode,
            alpha_cutoff: src.alpha_cutoff,
            double_sided: src.double_sided,
            maps: MaterialMaps {
                base_color: src.base_color_texture,
                metallic_roughness: src.metallic_roughness_texture,
                normal: src.normal_texture,
                emissive: src.emissive_texture,
                occlusion: src.occlusion_texture,
            },
        }
    }
}

impl Material {
    /// Materials for an asset. Never empty, so material index 0 is always valid.
    pub fn table_from_source(materials: &[SourceMaterial]) -> Vec<Material> {
        if materials.is_empty() {
            return vec![Material::default()];
        }
        materials.iter().map(Material::from).collect()
    }

    /// GPU record with map slots resolved to layers of `textures`.
    pub fn to_gpu(&self, textures: &TextureArray) -> GpuMaterial {
        let layer = |image| textures.layer(image).unwrap_or(NO_TEXTURE);
        GpuMaterial {
            base_color: self.base_color.to_array(),
            emissive: self.emissive.extend(0.0).to_array(),
            params: [self.metallic, self.roughness, self.normal_scale, self.alpha_cutoff],
            maps: [
                layer(self.maps.base_color),
                layer(self.maps.metallic_roughness),
                layer(self.maps.normal),
                layer(self.maps.emissive),
            ],
            flags: [
                layer(self.maps.occlusion),
                u32::from(self.double_sided),
                self.alpha_mode.gpu_code(),
                0,
            ],
        }
    }
}

/// Storage-buffer layout of one material.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GpuMaterial {
    pub base_color: [f32; 4],
    pub emissive: [f32; 4],
    /// metallic, roughness, normal scale, alpha cutoff.
    pub params: [f32; 4],
    /// Array layers of the base colour, metallic-roughness, normal and
    /// emissive maps, `NO_TEXTURE` when absent.
    pub maps: [u32; 4],
    /// Occlusion layer, double-sided flag, alpha mode.
    pub flags: [u32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceImage;

    fn image() -> SourceImage {
        SourceImage {
            name: "albedo".into(),
            width: 2,
            height: 2,
            pixels: vec![128; 16],
        }
    }

    #[test]
    fn empty_table_gets_default() {
        let table = Material::table_from_source(&[]);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0], Material::default());
    }

    #[test]
    fn gpu_layout_is_80_bytes() {
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 80);
        let gpu = Material::default().to_gpu(&TextureArray::from_images(&[]));
        assert_eq!(gpu.params[1], 0.8);
        assert_eq!(gpu.maps, [NO_TEXTURE; 4]);
        assert_eq!(gpu.flags[0], NO_TEXTURE);
    }

    #[test]
    fn emissive_strength_scales_the_factor() {
        let src = SourceMaterial {
            emissive: Vec3::new(1.0, 0.5, 0.0),
            emissive_strength: 4.0,
            ..Default::default()
        };
        assert_eq!(Material::from(&src).emissive, Vec3::new(4.0, 2.0, 0.0));
    }

    #[test]
    fn maps_resolve_to_array_layers() {
        let src = SourceMaterial {
            base_color_texture: Some(0),
            normal_texture: Some(0),
            emissive_texture: Some(7),
            alpha_mode: AlphaMode::Mask,
            alpha_cutoff: 0.3,
            double_sided: true,
            ..Default::default()
        };
        let textures = TextureArray::from_images(&[image()]);
        let gpu = Material::from(&src).to_gpu(&textures);
        assert_eq!(gpu.maps, [1, NO_TEXTURE, 1, NO_TEXTURE]);
        assert_eq!(gpu.flags, [NO_TEXTURE, 1, 1, 0]);
        assert_eq!(gpu.params[3], 0.3);
    }
}
