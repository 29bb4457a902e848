use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any `grow` call will snap to the first point.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut acc, p| {
            acc.grow(p);
            acc
        })
    }

    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Corner `i` picks min/max per axis from bits 0 (x), 1 (y), 2 (z).
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    /// Box enclosing all 8 corners after transformation.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self::from_points(self.corners().map(|c| matrix.transform_point3(c)))
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        p.clamp(self.min, self.max)
    }

    /// Outward normal of the face nearest to an interior point, and the
    /// distance to it.
    pub fn nearest_face(&self, p: Vec3) -> (Vec3, f32) {
        let faces = [
            (Vec3::NEG_X, p.x - self.min.x),
            (Vec3::X, self.max.x - p.x),
            (Vec3::NEG_Y, p.y - self.min.y),
            (Vec3::Y, self.max.y - p.y),
            (Vec3::NEG_Z, p.z - self.min.z),
            (Vec3::Z, self.max.z - p.z),
        ];
        faces
            .into_iter()
            .fold((Vec3::Y, f32::INFINITY), |best, face| if face.1 < best.1 { face } else { best })
    }

    /// The 12 edges as 24 line-list vertices.
    pub fn edge_vertices(&self) -> [Vec3; 24] {
        const EDGES: [(usize, usize); 12] = [
            (0, 1),
            (2, 3),
            (4, 5),
            (6, 7),
            (0, 2),
            (1, 3),
            (4, 6),
            (5, 7),
            (0, 4),
            (1, 5),
            (2, 6),
            (3, 7),
        ];
        let c = self.corners();
        let mut out = [Vec3::ZERO; 24];
        for (i, (a, b)) in EDGES.iter().enumerate() {
            out[i * 2] = c[*a];
            out[i * 2 + 1] = c[*b];
        }
        out
    }
}

/// Bounding sphere used by GPU culling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere around the box obtained by pushing the local box corners through
    /// `world`. Not tight; it contains every transformed corner.
    pub fn from_transformed_aabb(local: &Aabb, world: &Mat4) -> Self {
        let bounds = local.transformed(world);
        Self {
            center: bounds.center(),
            radius: bounds.extents().length(),
        }
    }

    pub fn contains_point(&self, p: Vec3, epsilon: f32) -> bool {
        p.distance(self.center) <= self.radius + epsilon
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.center.x, self.center.y, self.center.z, self.radius]
    }
}
