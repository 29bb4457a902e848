//! Scene assets: parsed glTF graphs turned into GPU-ready geometry batches.
//!
//! An asset owns its node arena, one merged vertex/index batch, an indirect
//! draw set (commands + per-primitive metadata), its materials and their
//! packed texture array and, for skinned assets, skins and animation clips.
//! Image-based lighting maps load separately through [`environment`].
//!
//! # Invariants
//! - `draw_set.commands[i].first_instance == i` and `metadata[i]` describes
//!   the same primitive as `commands[i]`. Ordering never changes after build.
//! - Merged indices are rebased: they already include the primitive's vertex
//!   start, so every command uses `vertex_offset == 0`.
//! - Any transform write through the node arena invalidates that node's
//!   cached world matrix and the caches of its whole subtree.
//! - `Skin` joints and inverse-bind matrices always have equal length.

pub mod animation;
pub mod asset;
pub mod batch;
pub mod environment;
pub mod gltf_import;
pub mod material;
pub mod node;
pub mod skin;
pub mod source;
pub mod texture;

pub use animation::{Animation, AnimationPlayer, Channel, ChannelPath, Interpolation, Sampler};
pub use asset::{AssetKind, RenderableAsset, SkinnedAsset, StaticAsset};
pub use batch::{
    BatchVertex, GeometryBatch, GpuPrimitiveMetadata, IndirectDrawCommand, IndirectDrawSet,
    NO_JOINTS, PerPrimitiveMetadata, Primitive, SkinnedVertex, StaticVertex,
};
pub use environment::{CubeFormat, CubeMap, EnvironmentMaps, LookupTable};
pub use gltf_import::import_gltf;
pub use material::{AlphaMode, GpuMaterial, Material, MaterialMaps, NO_TEXTURE};
pub use node::{MatrixCache, Node, NodeArena, NodeId};
pub use skin::Skin;
pub use source::{
    SourceAnimation, SourceChannel, SourceImage, SourceMaterial, SourceMesh, SourceNode,
    SourcePrimitive, SourceSampler, SourceScene, SourceSkin, Topology,
};
pub use texture::TextureArray;

/// Errors from asset loading and construction.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("glTF decode error: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("KTX2 parse error: {0}")]
    Ktx2(String),
    #[error("environment map {path}: {reason}")]
    Environment { path: String, reason: String },
    #[error("scene {0:?} has no root nodes")]
    EmptyScene(String),
    #[error("skin {skin:?} has {joints} joints but {inverse_binds} inverse-bind matrices")]
    InvalidSkin {
        skin: String,
        joints: usize,
        inverse_binds: usize,
    },
}

pub fn crate_info() -> &'static str {
    "prism-assets v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("assets"));
    }
}
