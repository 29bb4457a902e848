use glam::{Mat4, Quat, Vec3};
use prism_common::Transform;

use crate::source::SourceScene;

/// Handle into a [`NodeArena`]. Equal to the node's index in the source scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Cached world matrix state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixCache {
    Dirty,
    Clean(Mat4),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    transform: Transform,
    matrix: Mat4,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    mesh: Option<usize>,
    skin: Option<usize>,
    cache: MatrixCache,
}

impl Node {
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn mesh(&self) -> Option<usize> {
        self.mesh
    }

    pub fn skin(&self) -> Option<usize> {
        self.skin
    }

    pub fn cache(&self) -> MatrixCache {
        self.cache
    }

    /// `T * R * S * matrix`.
    pub fn local_matrix(&self) -> Mat4 {
        self.transform.to_matrix() * self.matrix
    }
}

/// Per-asset node storage. Parents own children by handle list.
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl NodeArena {
    pub fn from_source(scene: &SourceScene) -> Self {
        let count = scene.nodes.len();
        let mut nodes: Vec<Node> = scene
            .nodes
            .iter()
            .map(|src| Node {
                name: src.name.clone(),
                transform: src.transform,
                matrix: src.matrix,
                parent: None,
                children: Vec::new(),
                mesh: src.mesh,
                skin: src.skin,
                cache: MatrixCache::Dirty,
            })
            .collect();

        for (index, src) in scene.nodes.iter().enumerate() {
            for &child in &src.children {
                if child >= count || nodes[child].parent.is_some() {
                    tracing::debug!(parent = index, child, "ignoring invalid child reference");
                    continue;
                }
                nodes[child].parent = Some(NodeId(index as u32));
                nodes[index].children.push(NodeId(child as u32));
            }
        }

        let roots = scene
            .roots
            .iter()
            .filter(|&&r| r < count && nodes[r].parent.is_none())
            .map(|&r| NodeId(r as u32))
            .collect();

        Self { nodes, roots }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Pre-order depth-first walk from every root, in root order.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.index()].children.iter().rev().copied());
        }
        order
    }

    /// World matrix relative to the asset root, computed lazily and cached.
    pub fn world_matrix(&mut self, id: NodeId) -> Mat4 {
        // Walk up to the first clean ancestor, then resolve back down.
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        let mut base = Mat4::IDENTITY;
        while let Some(current) = cursor {
            let node = &self.nodes[current.index()];
            if let MatrixCache::Clean(m) = node.cache {
                base = m;
                break;
            }
            chain.push(current);
            cursor = node.parent;
        }

        for current in chain.into_iter().rev() {
            let node = &mut self.nodes[current.index()];
            base *= node.local_matrix();
            node.cache = MatrixCache::Clean(base);
        }
        base
    }

    /// Same value as [`world_matrix`](Self::world_matrix) without touching caches.
    pub fn compute_world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.index()];
            matrix = node.local_matrix() * matrix;
            cursor = node.parent;
        }
        matrix
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) {
        self.nodes[id.index()].transform = transform;
        self.invalidate_subtree(id);
    }

    pub fn set_translation(&mut self, id: NodeId, translation: Vec3) {
        self.nodes[id.index()].transform.translation = translation;
        self.invalidate_subtree(id);
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) {
        self.nodes[id.index()].transform.rotation = rotation;
        self.invalidate_subtree(id);
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) {
        self.nodes[id.index()].transform.scale = scale;
        self.invalidate_subtree(id);
    }

    pub fn invalidate_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.index()];
            node.cache = MatrixCache::Dirty;
            stack.extend(node.children.iter().copied());
        }
    }

    pub fn invalidate_all(&mut self) {
        for node in &mut self.nodes {
            node.cache = MatrixCache::Dirty;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceNode;

    /// root(0) -> a(1) -> b(2); root -> c(3)
    fn chain_scene() -> SourceScene {
        let mut scene = SourceScene::default();
        scene.push_node(SourceNode {
            name: "root".into(),
            transform: Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            children: vec![1, 3],
            ..Default::default()
        });
        scene.push_node(SourceNode {
            name: "a".into(),
            transform: Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)),
            children: vec![2],
            ..Default::default()
        });
        scene.push_node(SourceNode {
            name: "b".into(),
            transform: Transform::from_translation(Vec3::new(0.0, 0.0, 3.0)),
            ..Default::default()
        });
        scene.push_node(SourceNode {
            name: "c".into(),
            ..Default::default()
        });
        scene.roots = vec![0];
        scene
    }

    #[test]
    fn depth_first_is_pre_order() {
        let arena = NodeArena::from_source(&chain_scene());
        let order: Vec<u32> = arena.depth_first().iter().map(|n| n.0).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(arena.get(NodeId(2)).unwrap().parent(), Some(NodeId(1)));
    }

    #[test]
    fn world_matrix_composes_parent_chain() {
        let mut arena = NodeArena::from_source(&chain_scene());
        let world = arena.world_matrix(NodeId(2));
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
        assert!(matches!(arena.get(NodeId(1)).unwrap().cache(), MatrixCache::Clean(_)));
        assert_eq!(world, arena.compute_world_matrix(NodeId(2)));
    }

    #[test]
    fn write_invalidates_subtree_only() {
        let mut arena = NodeArena::from_source(&chain_scene());
        for id in arena.depth_first() {
            arena.world_matrix(id);
        }
        arena.set_translation(NodeId(1), Vec3::new(0.0, 5.0, 0.0));

        assert_eq!(arena.get(NodeId(1)).unwrap().cache(), MatrixCache::Dirty);
        assert_eq!(arena.get(NodeId(2)).unwrap().cache(), MatrixCache::Dirty);
        assert!(matches!(arena.get(NodeId(0)).unwrap().cache(), MatrixCache::Clean(_)));
        assert!(matches!(arena.get(NodeId(3)).unwrap().cache(), MatrixCache::Clean(_)));

        let world = arena.world_matrix(NodeId(2));
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 5.0, 3.0));
    }

    #[test]
    fn root_write_reaches_grandchildren() {
        let mut arena = NodeArena::from_source(&chain_scene());
        arena.world_matrix(NodeId(2));
        arena.set_scale(NodeId(0), Vec3::splat(2.0));
        let world = arena.world_matrix(NodeId(2));
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 4.0, 6.0));
    }

    #[test]
    fn invalid_child_references_are_dropped() {
        let mut scene = chain_scene();
        scene.nodes[3].children = vec![99, 1];
        let arena = NodeArena::from_source(&scene);
        assert!(arena.get(NodeId(3)).unwrap().children().is_empty());
        assert_eq!(arena.depth_first().len(), 4);
    }
}
