//! Renderable assets: a static or skinned scene built into one geometry batch.

use std::path::Path;

use glam::Mat4;
use prism_common::{Aabb, Collider, Contact};
use serde::{Deserialize, Serialize};

use crate::AssetError;
use crate::animation::{Animation, AnimationPlayer};
use crate::batch::{GeometryBatch, IndirectDrawSet, SkinnedVertex, StaticVertex};
use crate::gltf_import::import_gltf;
use crate::material::{GpuMaterial, Material};
use crate::node::NodeArena;
use crate::skin::Skin;
use crate::source::SourceScene;
use crate::texture::TextureArray;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Static,
    Skinned,
}

/// A scene without skins. Metadata is baked at load and re-baked only when
/// the asset's world transform changes.
#[derive(Debug, Clone)]
pub struct StaticAsset {
    name: String,
    nodes: NodeArena,
    batch: GeometryBatch<StaticVertex>,
    materials: Vec<Material>,
    textures: TextureArray,
    world: Mat4,
    dirty: bool,
}

impl StaticAsset {
    pub fn from_source(name: impl Into<String>, scene: &SourceScene) -> Result<Self, AssetError> {
        let name = name.into();
        if scene.is_empty() {
            return Err(AssetError::EmptyScene(name));
        }
        let mut nodes = NodeArena::from_source(scene);
        let batch = GeometryBatch::build(scene, &mut nodes, &Mat4::IDENTITY, &[]);
        Ok(Self {
            name,
            nodes,
            batch,
            materials: Material::table_from_source(&scene.materials),
            textures: TextureArray::from_images(&scene.images),
            world: Mat4::IDENTITY,
            dirty: false,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let scene = import_gltf(path)?;
        Self::from_source(scene.name.clone(), &scene)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn batch(&self) -> &GeometryBatch<StaticVertex> {
        &self.batch
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn textures(&self) -> &TextureArray {
        &self.textures
    }

    pub fn world_transform(&self) -> Mat4 {
        self.world
    }

    pub fn set_world_transform(&mut self, world: Mat4) {
        self.world = world;
        self.dirty = true;
    }

    /// Re-bake metadata if the world transform changed. Returns whether the
    /// metadata changed.
    pub fn update(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.batch.refresh_metadata(&mut self.nodes, &self.world, &[]);
        self.dirty = false;
        true
    }
}

/// A scene with at least one skin. Joint matrices and metadata are
/// recomputed every frame.
#[derive(Debug, Clone)]
pub struct SkinnedAsset {
    name: String,
    nodes: NodeArena,
    batch: GeometryBatch<SkinnedVertex>,
    materials: Vec<Material>,
    textures: TextureArray,
    skins: Vec<Skin>,
    joint_offsets: Vec<u32>,
    joint_matrices: Vec<Mat4>,
    player: AnimationPlayer,
    world: Mat4,
}

impl SkinnedAsset {
    pub fn from_source(name: impl Into<String>, scene: &SourceScene) -> Result<Self, AssetError> {
        let name = name.into();
        if scene.is_empty() {
            return Err(AssetError::EmptyScene(name));
        }
        let mut nodes = NodeArena::from_source(scene);
        let skins = scene
            .skins
            .iter()
            .map(Skin::from_source)
            .collect::<Result<Vec<_>, _>>()?;

        let mut joint_offsets = Vec::with_capacity(skins.len());
        let mut running = 0u32;
        for skin in &skins {
            joint_offsets.push(running);
            running += skin.joint_count() as u32;
        }

        let animations = scene
            .animations
            .iter()
            .map(|a| Animation::from_source(a, nodes.len()))
            .collect();
        let batch = GeometryBatch::build(scene, &mut nodes, &Mat4::IDENTITY, &joint_offsets);

        let mut asset = Self {
            name,
            nodes,
            batch,
            materials: Material::table_from_source(&scene.materials),
            textures: TextureArray::from_images(&scene.images),
            skins,
            joint_offsets,
            joint_matrices: Vec::with_capacity(running as usize),
            player: AnimationPlayer::new(animations),
            world: Mat4::IDENTITY,
        };
        asset.pose(0.0);
        tracing::debug!(
            asset = %asset.name,
            skins = asset.skins.len(),
            joints = running,
            clips = asset.player.animations().len(),
            "skinned asset ready"
        );
        Ok(asset)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let scene = import_gltf(path)?;
        Self::from_source(scene.name.clone(), &scene)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn batch(&self) -> &GeometryBatch<SkinnedVertex> {
        &self.batch
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn textures(&self) -> &TextureArray {
        &self.textures
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    /// Base index of each skin inside [`Self::joint_matrices`].
    pub fn joint_offsets(&self) -> &[u32] {
        &self.joint_offsets
    }

    /// Every skin's joint matrices, concatenated in skin order.
    pub fn joint_matrices(&self) -> &[Mat4] {
        &self.joint_matrices
    }

    pub fn player(&self) -> &AnimationPlayer {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut AnimationPlayer {
        &mut self.player
    }

    pub fn world_transform(&self) -> Mat4 {
        self.world
    }

    pub fn set_world_transform(&mut self, world: Mat4) {
        self.world = world;
    }

    /// Advance the active clip, then rebuild joints and metadata.
    pub fn update(&mut self, dt: f32) -> bool {
        self.pose(dt);
        true
    }

    fn pose(&mut self, dt: f32) {
        self.nodes.invalidate_all();
        self.player.update(dt, &mut self.nodes);

        self.joint_matrices.clear();
        for skin in &mut self.skins {
            skin.update(&mut self.nodes);
            self.joint_matrices.extend_from_slice(skin.joint_matrices());
        }
        self.batch
            .refresh_metadata(&mut self.nodes, &self.world, &self.joint_offsets);
    }
}

/// Closed set of renderable asset kinds held by the scene.
#[derive(Debug, Clone)]
pub enum RenderableAsset {
    Static(StaticAsset),
    Skinned(SkinnedAsset),
}

impl RenderableAsset {
    /// Import a glTF file; scenes with skins become skinned assets.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let scene = import_gltf(path)?;
        Self::from_source(scene.name.clone(), &scene)
    }

    pub fn from_source(name: impl Into<String>, scene: &SourceScene) -> Result<Self, AssetError> {
        if scene.is_skinned() {
            SkinnedAsset::from_source(name, scene).map(Self::Skinned)
        } else {
            StaticAsset::from_source(name, scene).map(Self::Static)
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Static(_) => AssetKind::Static,
            Self::Skinned(_) => AssetKind::Skinned,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Static(a) => a.name(),
            Self::Skinned(a) => a.name(),
        }
    }

    pub fn draw_set(&self) -> &IndirectDrawSet {
        match self {
            Self::Static(a) => a.batch.draw_set(),
            Self::Skinned(a) => a.batch.draw_set(),
        }
    }

    pub fn materials(&self) -> &[Material] {
        match self {
            Self::Static(a) => a.materials(),
            Self::Skinned(a) => a.materials(),
        }
    }

    pub fn textures(&self) -> &TextureArray {
        match self {
            Self::Static(a) => a.textures(),
            Self::Skinned(a) => a.textures(),
        }
    }

    /// Material table as uploaded, map slots resolved to texture layers.
    pub fn gpu_materials(&self) -> Vec<GpuMaterial> {
        let textures = self.textures();
        self.materials().iter().map(|m| m.to_gpu(textures)).collect()
    }

    pub fn nodes(&self) -> &NodeArena {
        match self {
            Self::Static(a) => a.nodes(),
            Self::Skinned(a) => a.nodes(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Static(a) => a.batch.vertices().len(),
            Self::Skinned(a) => a.batch.vertices().len(),
        }
    }

    pub fn index_count(&self) -> usize {
        match self {
            Self::Static(a) => a.batch.indices().len(),
            Self::Skinned(a) => a.batch.indices().len(),
        }
    }

    /// Interleaved vertices as uploaded. The stride follows [`Self::kind`].
    pub fn vertex_bytes(&self) -> &[u8] {
        match self {
            Self::Static(a) => bytemuck::cast_slice(a.batch.vertices()),
            Self::Skinned(a) => bytemuck::cast_slice(a.batch.vertices()),
        }
    }

    pub fn indices(&self) -> &[u32] {
        match self {
            Self::Static(a) => a.batch.indices(),
            Self::Skinned(a) => a.batch.indices(),
        }
    }

    /// Empty for static assets.
    pub fn joint_matrices(&self) -> &[Mat4] {
        match self {
            Self::Static(_) => &[],
            Self::Skinned(a) => a.joint_matrices(),
        }
    }

    pub fn player(&self) -> Option<&AnimationPlayer> {
        match self {
            Self::Static(_) => None,
            Self::Skinned(a) => Some(a.player()),
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut AnimationPlayer> {
        match self {
            Self::Static(_) => None,
            Self::Skinned(a) => Some(a.player_mut()),
        }
    }

    /// Skinned bounds move with the pose, so only static assets are culled.
    pub fn is_cullable(&self) -> bool {
        matches!(self, Self::Static(_))
    }

    pub fn world_transform(&self) -> Mat4 {
        match self {
            Self::Static(a) => a.world_transform(),
            Self::Skinned(a) => a.world_transform(),
        }
    }

    pub fn set_world_transform(&mut self, world: Mat4) {
        match self {
            Self::Static(a) => a.set_world_transform(world),
            Self::Skinned(a) => a.set_world_transform(world),
        }
    }

    /// Per-frame step. Returns whether metadata or joints need re-upload.
    pub fn update(&mut self, dt: f32) -> bool {
        match self {
            Self::Static(a) => a.update(),
            Self::Skinned(a) => a.update(dt),
        }
    }

    /// True if `query` overlaps any primitive's world box. Skinned assets
    /// never collide.
    pub fn intersects(&self, query: &Aabb) -> bool {
        match self {
            Self::Static(a) => a
                .batch
                .world_boxes()
                .iter()
                .any(|b| b.intersects(query)),
            Self::Skinned(_) => false,
        }
    }

    /// Deepest contact between `collider` and the asset's world boxes. The
    /// normal pushes the collider out of the asset.
    pub fn contact(&self, collider: &Collider) -> Option<Contact> {
        let Self::Static(a) = self else {
            return None;
        };
        let reach = collider.bounds();
        a.batch
            .world_boxes()
            .iter()
            .filter(|b| b.intersects(&reach))
            .filter_map(|b| collider.contact_aabb(b))
            .max_by(|x, y| x.depth.total_cmp(&y.depth))
    }

    /// World boxes drawn by the collision wireframe view.
    pub fn debug_boxes(&self) -> Vec<Aabb> {
        match self {
            Self::Static(a) => a.batch.world_boxes(),
            Self::Skinned(a) => a.batch.world_boxes(),
        }
    }
}
