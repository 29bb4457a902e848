use glam::Mat4;

use crate::AssetError;
use crate::node::{NodeArena, NodeId};
use crate::source::SourceSkin;

/// Joint list, inverse-bind matrices and the current joint matrices.
#[derive(Debug, Clone)]
pub struct Skin {
    pub name: String,
    joints: Vec<NodeId>,
    inverse_bind: Vec<Mat4>,
    joint_matrices: Vec<Mat4>,
}

impl Skin {
    pub fn new(
        name: impl Into<String>,
        joints: Vec<NodeId>,
        inverse_bind: Vec<Mat4>,
    ) -> Result<Self, AssetError> {
        let name = name.into();
        if joints.len() != inverse_bind.len() {
            return Err(AssetError::InvalidSkin {
                skin: name,
                joints: joints.len(),
                inverse_binds: inverse_bind.len(),
            });
        }
        let joint_matrices = vec![Mat4::IDENTITY; joints.len()];
        Ok(Self {
            name,
            joints,
            inverse_bind,
            joint_matrices,
        })
    }

    pub fn from_source(src: &SourceSkin) -> Result<Self, AssetError> {
        let joints = src.joints.iter().map(|&j| NodeId(j as u32)).collect();
        let inverse_bind = src
            .inverse_bind_matrices
            .clone()
            .unwrap_or_else(|| vec![Mat4::IDENTITY; src.joints.len()]);
        Self::new(src.name.clone(), joints, inverse_bind)
    }

    pub fn joints(&self) -> &[NodeId] {
        &self.joints
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn inverse_bind_matrices(&self) -> &[Mat4] {
        &self.inverse_bind
    }

    pub fn joint_matrices(&self) -> &[Mat4] {
        &self.joint_matrices
    }

    /// `joint[i] = world(joints[i]) * inverse_bind[i]`.
    pub fn update(&mut self, nodes: &mut NodeArena) {
        for ((matrix, &joint), inverse_bind) in self
            .joint_matrices
            .iter_mut()
            .zip(&self.joints)
            .zip(&self.inverse_bind)
        {
            *matrix = nodes.world_matrix(joint) * *inverse_bind;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceNode, SourceScene};
    use glam::{Quat, Vec3};
    use prism_common::Transform;

    fn arm() -> (SourceScene, NodeArena) {
        let mut scene = SourceScene::default();
        let hand = scene.push_node(SourceNode {
            name: "hand".into(),
            transform: Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
            ..Default::default()
        });
        let shoulder = scene.push_node(SourceNode {
            name: "shoulder".into(),
            transform: Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
            children: vec![hand],
            ..Default::default()
        });
        scene.roots.push(shoulder);
        let nodes = NodeArena::from_source(&scene);
        (scene, nodes)
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = Skin::new("bad", vec![NodeId(0), NodeId(1)], vec![Mat4::IDENTITY]);
        assert!(matches!(
            err,
            Err(AssetError::InvalidSkin {
                joints: 2,
                inverse_binds: 1,
                ..
            })
        ));
    }

    #[test]
    fn missing_inverse_binds_default_to_identity() {
        let skin = Skin::from_source(&SourceSkin {
            name: "s".into(),
            joints: vec![0, 1],
            inverse_bind_matrices: None,
        })
        .unwrap();
        assert_eq!(skin.inverse_bind_matrices(), &[Mat4::IDENTITY, Mat4::IDENTITY]);
    }

    #[test]
    fn joint_matrix_tracks_animated_ancestor() {
        let (_, mut nodes) = arm();
        let joints = vec![NodeId(1), NodeId(0)];
        let inverse_bind = vec![
            Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)),
            Mat4::from_translation(Vec3::new(0.0, -2.0, 0.0)),
        ];
        let mut skin = Skin::new("arm", joints.clone(), inverse_bind.clone()).unwrap();

        // Bind pose: every joint matrix is identity.
        skin.update(&mut nodes);
        for m in skin.joint_matrices() {
            assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-5));
        }

        nodes.set_rotation(NodeId(1), Quat::from_rotation_z(0.5));
        skin.update(&mut nodes);
        for (j, joint) in joints.iter().enumerate() {
            let expected = nodes.compute_world_matrix(*joint) * inverse_bind[j];
            assert!(skin.joint_matrices()[j].abs_diff_eq(expected, 1e-5));
        }
    }
}
