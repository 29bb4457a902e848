use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use prism_common::{Aabb, BoundingSphere};

use crate::node::{NodeArena, NodeId};
use crate::source::{SourcePrimitive, SourceScene, Topology};

/// `joint_offset` value for primitives that are not skinned.
pub const NO_JOINTS: u32 = u32::MAX;

/// Interleaved vertex layout that can be filled from a source primitive.
pub trait BatchVertex: Pod {
    /// Whether primitives of skinned nodes read joint matrices.
    const SKINNED: bool;

    fn from_source(primitive: &SourcePrimitive, index: usize) -> Self;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StaticVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 4],
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

fn attribute<T: Copy>(values: &Option<Vec<T>>, index: usize, fallback: T) -> T {
    values
        .as_ref()
        .and_then(|v| v.get(index))
        .copied()
        .unwrap_or(fallback)
}

impl BatchVertex for StaticVertex {
    const SKINNED: bool = false;

    fn from_source(p: &SourcePrimitive, i: usize) -> Self {
        Self {
            position: p.positions[i].to_array(),
            normal: attribute(&p.normals, i, Vec3::Y).to_array(),
            uv: attribute(&p.uvs, i, Vec2::ZERO).to_array(),
            tangent: attribute(&p.tangents, i, Vec4::new(1.0, 0.0, 0.0, 1.0)).to_array(),
        }
    }
}

impl BatchVertex for SkinnedVertex {
    const SKINNED: bool = true;

    fn from_source(p: &SourcePrimitive, i: usize) -> Self {
        let base = StaticVertex::from_source(p, i);
        Self {
            position: base.position,
            normal: base.normal,
            uv: base.uv,
            tangent: base.tangent,
            joints: attribute(&p.joints, i, [0; 4]).map(u32::from),
            weights: attribute(&p.weights, i, Vec4::X).to_array(),
        }
    }
}

/// Indexed indirect draw record, byte-compatible with the GPU's layout.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// Per-draw data joined to the command with the same slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerPrimitiveMetadata {
    pub material_index: u32,
    pub node_index: u32,
    /// Base of the primitive's skin in the asset joint buffer, or [`NO_JOINTS`].
    pub joint_offset: u32,
    pub world_matrix: Mat4,
    pub bounding_sphere: BoundingSphere,
}

impl PerPrimitiveMetadata {
    pub fn to_gpu(&self) -> GpuPrimitiveMetadata {
        GpuPrimitiveMetadata {
            world_matrix: self.world_matrix.to_cols_array_2d(),
            bounding_sphere: self.bounding_sphere.to_array(),
            material_index: self.material_index,
            node_index: self.node_index,
            joint_offset: self.joint_offset,
            _pad: 0,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GpuPrimitiveMetadata {
    pub world_matrix: [[f32; 4]; 4],
    pub bounding_sphere: [f32; 4],
    pub material_index: u32,
    pub node_index: u32,
    pub joint_offset: u32,
    pub _pad: u32,
}

/// Commands plus their metadata, parallel by slot.
#[derive(Debug, Clone, Default)]
pub struct IndirectDrawSet {
    commands: Vec<IndirectDrawCommand>,
    metadata: Vec<PerPrimitiveMetadata>,
}

impl IndirectDrawSet {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[IndirectDrawCommand] {
        &self.commands
    }

    pub fn metadata(&self) -> &[PerPrimitiveMetadata] {
        &self.metadata
    }

    pub fn gpu_metadata(&self) -> Vec<GpuPrimitiveMetadata> {
        self.metadata.iter().map(PerPrimitiveMetadata::to_gpu).collect()
    }

    pub fn index_total(&self) -> u64 {
        self.commands.iter().map(|c| c.index_count as u64).sum()
    }
}

/// One drawable range inside the merged buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub node: NodeId,
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub index_offset: u32,
    pub index_count: u32,
    pub material_index: u32,
    pub local_bounds: Aabb,
}

/// Merged vertex/index data of one asset and its indirect draw set.
#[derive(Debug, Clone)]
pub struct GeometryBatch<V> {
    vertices: Vec<V>,
    indices: Vec<u32>,
    primitives: Vec<Primitive>,
    draw_set: IndirectDrawSet,
}

impl<V: BatchVertex> GeometryBatch<V> {
    /// Merge every triangle-list primitive reachable from the scene roots, in
    /// depth-first pre-order, then bake metadata against `asset_world`.
    pub fn build(
        scene: &SourceScene,
        nodes: &mut NodeArena,
        asset_world: &Mat4,
        joint_offsets: &[u32],
    ) -> Self {
        let _span = tracing::info_span!("geometry_batch_build", scene = %scene.name).entered();

        let mut vertices = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut primitives = Vec::new();

        for node_id in nodes.depth_first() {
            let Some(mesh_index) = nodes.get(node_id).and_then(|n| n.mesh()) else {
                continue;
            };
            let Some(mesh) = scene.meshes.get(mesh_index) else {
                tracing::debug!(node = node_id.0, mesh_index, "node references missing mesh");
                continue;
            };

            for (primitive_index, src) in mesh.primitives.iter().enumerate() {
                if src.topology != Topology::TriangleList {
                    tracing::debug!(
                        mesh = %mesh.name,
                        primitive_index,
                        topology = ?src.topology,
                        "skipping non triangle-list primitive"
                    );
                    continue;
                }
                if src.positions.is_empty() {
                    tracing::debug!(mesh = %mesh.name, primitive_index, "skipping empty primitive");
                    continue;
                }

                let vertex_start = vertices.len() as u32;
                let vertex_count = src.vertex_count() as u32;
                vertices.extend((0..src.vertex_count()).map(|i| V::from_source(src, i)));

                let index_offset = indices.len() as u32;
                match &src.indices {
                    Some(source_indices) => {
                        indices.extend(source_indices.iter().map(|i| i + vertex_start))
                    }
                    None => indices.extend(vertex_start..vertex_start + vertex_count),
                }

                primitives.push(Primitive {
                    node: node_id,
                    vertex_start,
                    vertex_count,
                    index_offset,
                    index_count: indices.len() as u32 - index_offset,
                    material_index: src.material.unwrap_or(0) as u32,
                    local_bounds: src
                        .bounds
                        .unwrap_or_else(|| Aabb::from_points(src.positions.iter().copied())),
                });
            }
        }

        let commands = primitives
            .iter()
            .enumerate()
            .map(|(slot, p)| IndirectDrawCommand {
                index_count: p.index_count,
                instance_count: 1,
                first_index: p.index_offset,
                vertex_offset: 0,
                first_instance: slot as u32,
            })
            .collect();

        let mut batch = Self {
            vertices,
            indices,
            primitives,
            draw_set: IndirectDrawSet {
                commands,
                metadata: Vec::new(),
            },
        };
        batch.refresh_metadata(nodes, asset_world, joint_offsets);

        tracing::debug!(
            vertices = batch.vertices.len(),
            indices = batch.indices.len(),
            draws = batch.draw_set.len(),
            "geometry batch built"
        );
        batch
    }

    /// Recompute world matrices and bounding spheres for every slot.
    ///
    /// Skinned primitives draw in asset space (joints carry the node
    /// hierarchy); everything else draws with `asset_world * node_world`.
    pub fn refresh_metadata(
        &mut self,
        nodes: &mut NodeArena,
        asset_world: &Mat4,
        joint_offsets: &[u32],
    ) {
        let metadata = self
            .primitives
            .iter()
            .map(|p| {
                let skin = if V::SKINNED {
                    nodes.get(p.node).and_then(|n| n.skin())
                } else {
                    None
                };
                let (world_matrix, joint_offset) = match skin.and_then(|s| joint_offsets.get(s))
                {
                    Some(&offset) => (*asset_world, offset),
                    None => (*asset_world * nodes.world_matrix(p.node), NO_JOINTS),
                };
                PerPrimitiveMetadata {
                    material_index: p.material_index,
                    node_index: p.node.0,
                    joint_offset,
                    world_matrix,
                    bounding_sphere: BoundingSphere::from_transformed_aabb(
                        &p.local_bounds,
                        &world_matrix,
                    ),
                }
            })
            .collect();
        self.draw_set.metadata = metadata;
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn draw_set(&self) -> &IndirectDrawSet {
        &self.draw_set
    }

    /// World-space box of every primitive, by slot.
    pub fn world_boxes(&self) -> Vec<Aabb> {
        self.primitives
            .iter()
            .zip(self.draw_set.metadata())
            .map(|(p, m)| p.local_bounds.transformed(&m.world_matrix))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceMesh, SourceNode};
    use glam::Quat;
    use prism_common::Transform;

    fn triangle() -> SourcePrimitive {
        let mut p = SourcePrimitive::triangles(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
        );
        p.material = Some(0);
        p
    }

    fn single_triangle_scene() -> SourceScene {
        let mut scene = SourceScene::default();
        let mesh = scene.push_mesh(SourceMesh {
            name: "tri".into(),
            primitives: vec![triangle()],
        });
        let root = scene.push_node(SourceNode {
            mesh: Some(mesh),
            ..Default::default()
        });
        scene.roots.push(root);
        scene
    }

    fn build_static(scene: &SourceScene) -> GeometryBatch<StaticVertex> {
        let mut nodes = NodeArena::from_source(scene);
        GeometryBatch::build(scene, &mut nodes, &Mat4::IDENTITY, &[])
    }

    #[test]
    fn static_load_single_triangle() {
        let batch = build_static(&single_triangle_scene());
        let set = batch.draw_set();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.commands()[0],
            IndirectDrawCommand {
                index_count: 3,
                instance_count: 1,
                first_index: 0,
                vertex_offset: 0,
                first_instance: 0,
            }
        );
        assert_eq!(set.metadata().len(), 1);
        assert_eq!(set.metadata()[0].material_index, 0);
        assert_eq!(set.metadata()[0].joint_offset, NO_JOINTS);
    }

    /// Three primitives over two nodes, the second node a child of the first.
    fn multi_primitive_scene() -> SourceScene {
        let mut scene = SourceScene::default();
        let quad = SourcePrimitive::triangles(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![0, 1, 2, 2, 3, 0],
        );
        let mut tri = triangle();
        tri.material = Some(2);
        let mut unindexed = SourcePrimitive::triangles(vec![Vec3::Z, Vec3::X, Vec3::Y], vec![]);
        unindexed.indices = None;

        let m0 = scene.push_mesh(SourceMesh {
            name: "quad_and_tri".into(),
            primitives: vec![quad, tri],
        });
        let m1 = scene.push_mesh(SourceMesh {
            name: "unindexed".into(),
            primitives: vec![unindexed],
        });
        let child = scene.push_node(SourceNode {
            mesh: Some(m1),
            transform: Transform::from_translation(Vec3::new(0.0, 0.0, -10.0)),
            ..Default::default()
        });
        let root = scene.push_node(SourceNode {
            mesh: Some(m0),
            children: vec![child],
            ..Default::default()
        });
        scene.roots.push(root);
        scene
    }

    #[test]
    fn commands_and_metadata_share_slots() {
        let batch = build_static(&multi_primitive_scene());
        let set = batch.draw_set();
        assert_eq!(set.commands().len(), set.metadata().len());
        for (i, cmd) in set.commands().iter().enumerate() {
            assert_eq!(cmd.first_instance, i as u32);
            assert_eq!(cmd.vertex_offset, 0);
        }
        assert_eq!(set.metadata()[1].material_index, 2);
        assert_eq!(set.metadata()[2].material_index, 0);
    }

    #[test]
    fn indices_are_rebased_by_running_vertex_start() {
        let scene = multi_primitive_scene();
        let batch = build_static(&scene);

        let mut expected_start = 0u32;
        let sources: Vec<&SourcePrimitive> = vec![
            &scene.meshes[0].primitives[0],
            &scene.meshes[0].primitives[1],
            &scene.meshes[1].primitives[0],
        ];
        for (prim, src) in batch.primitives().iter().zip(sources) {
            assert_eq!(prim.vertex_start, expected_start);
            let merged = &batch.indices()
                [prim.index_offset as usize..(prim.index_offset + prim.index_count) as usize];
            let source: Vec<u32> = src
                .indices
                .clone()
                .unwrap_or_else(|| (0..src.vertex_count() as u32).collect());
            for (m, s) in merged.iter().zip(&source) {
                assert_eq!(*m, s + expected_start);
            }
            expected_start += src.vertex_count() as u32;
        }
        assert_eq!(batch.vertices().len() as u32, expected_start);
    }

    #[test]
    fn non_triangle_topology_is_skipped() {
        let mut scene = single_triangle_scene();
        let mut lines = triangle();
        lines.topology = Topology::LineList;
        scene.meshes[0].primitives.insert(0, lines);
        let batch = build_static(&scene);
        assert_eq!(batch.draw_set().len(), 1);
        assert_eq!(batch.primitives()[0].vertex_start, 0);
    }

    #[test]
    fn mesh_without_primitives_yields_no_draws() {
        let mut scene = single_triangle_scene();
        scene.meshes[0].primitives.clear();
        let batch = build_static(&scene);
        assert!(batch.draw_set().is_empty());
        assert!(batch.indices().is_empty());
    }

    #[test]
    fn metadata_spheres_contain_world_corners() {
        let scene = multi_primitive_scene();
        let mut nodes = NodeArena::from_source(&scene);
        let asset_world = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.7),
            Vec3::new(3.0, 1.0, -4.0),
        );
        let batch: GeometryBatch<StaticVertex> =
            GeometryBatch::build(&scene, &mut nodes, &asset_world, &[]);
        for (prim, meta) in batch.primitives().iter().zip(batch.draw_set().metadata()) {
            for corner in prim.local_bounds.corners() {
                let p = meta.world_matrix.transform_point3(corner);
                assert!(meta.bounding_sphere.contains_point(p, 1e-4));
            }
        }
        // The child node's -10 Z offset lands in its world matrix.
        let child_origin = batch.draw_set().metadata()[2]
            .world_matrix
            .transform_point3(Vec3::ZERO);
        assert!((child_origin - asset_world.transform_point3(Vec3::new(0.0, 0.0, -10.0))).length() < 1e-4);
    }

    #[test]
    fn skinned_vertices_fill_defaults() {
        let v = SkinnedVertex::from_source(&triangle(), 1);
        assert_eq!(v.position, [1.0, 0.0, 0.0]);
        assert_eq!(v.normal, [0.0, 1.0, 0.0]);
        assert_eq!(v.weights, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(std::mem::size_of::<SkinnedVertex>(), 80);
        assert_eq!(std::mem::size_of::<StaticVertex>(), 48);
        assert_eq!(std::mem::size_of::<IndirectDrawCommand>(), 20);
        assert_eq!(std::mem::size_of::<GpuPrimitiveMetadata>(), 96);
    }
}
