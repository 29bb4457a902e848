//! Parsed scene graph handed over by the importer.
//!
//! Plain data, indexed by position. Node, mesh, material and skin references
//! are indices into the owning `SourceScene` vectors and are trusted to be in
//! range by everything downstream. Material texture references index
//! `SourceScene::images` and are checked where they are resolved.

use glam::{Mat4, Vec2, Vec3, Vec4};
use prism_common::{Aabb, Transform};

use crate::animation::{ChannelPath, Interpolation};
use crate::material::AlphaMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    LineLoop,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone)]
pub struct SourceNode {
    pub name: String,
    pub transform: Transform,
    /// Raw matrix applied after TRS. Identity when the node was authored as TRS.
    pub matrix: Mat4,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub children: Vec<usize>,
}

impl Default for SourceNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Transform::IDENTITY,
            matrix: Mat4::IDENTITY,
            mesh: None,
            skin: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourcePrimitive {
    pub topology: Topology,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub tangents: Option<Vec<Vec4>>,
    pub joints: Option<Vec<[u16; 4]>>,
    pub weights: Option<Vec<Vec4>>,
    pub indices: Option<Vec<u32>>,
    pub material: Option<usize>,
    pub bounds: Option<Aabb>,
}

impl SourcePrimitive {
    pub fn triangles(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            topology: Topology::TriangleList,
            positions,
            normals: None,
            uvs: None,
            tangents: None,
            joints: None,
            weights: None,
            indices: Some(indices),
            material: None,
            bounds: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceMesh {
    pub name: String,
    pub primitives: Vec<SourcePrimitive>,
}

#[derive(Debug, Clone)]
pub struct SourceMaterial {
    pub name: String,
    pub base_color: Vec4,
    pub emissive: Vec3,
    /// Multiplier on `emissive` (`KHR_materials_emissive_strength`).
    pub emissive_strength: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub base_color_texture: Option<usize>,
    pub metallic_roughness_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub emissive_texture: Option<usize>,
    pub occlusion_texture: Option<usize>,
}

/// glTF factor defaults.
impl Default for SourceMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            emissive_strength: 1.0,
            metallic: 1.0,
            roughness: 1.0,
            normal_scale: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            emissive_texture: None,
            occlusion_texture: None,
        }
    }
}

/// Decoded image, always tightly packed RGBA8.
#[derive(Debug, Clone, Default)]
pub struct SourceImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl SourceImage {
    /// False when `pixels` does not hold `width * height` texels.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceSkin {
    pub name: String,
    pub joints: Vec<usize>,
    /// `None` when the file omits them; identities are substituted.
    pub inverse_bind_matrices: Option<Vec<Mat4>>,
}

#[derive(Debug, Clone)]
pub struct SourceSampler {
    pub interpolation: Interpolation,
    pub inputs: Vec<f32>,
    /// xyz for translation/scale, xyzw for rotation.
    pub outputs: Vec<Vec4>,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceChannel {
    pub node: usize,
    pub path: ChannelPath,
    pub sampler: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SourceAnimation {
    pub name: String,
    pub samplers: Vec<SourceSampler>,
    pub channels: Vec<SourceChannel>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceScene {
    pub name: String,
    pub nodes: Vec<SourceNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<SourceMesh>,
    pub materials: Vec<SourceMaterial>,
    pub images: Vec<SourceImage>,
    pub skins: Vec<SourceSkin>,
    pub animations: Vec<SourceAnimation>,
}

impl SourceScene {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn is_skinned(&self) -> bool {
        !self.skins.is_empty()
    }

    /// Append a node, returning its index. Callers wire up `children`/`roots`.
    pub fn push_node(&mut self, node: SourceNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn push_mesh(&mut self, mesh: SourceMesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }
}
