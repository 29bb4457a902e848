//! Frustum-culling math shared by the compute pass and its CPU reference.
//!
//! The GPU shader evaluates exactly [`is_visible`]; only `instance_count` of
//! each command is ever rewritten.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use prism_assets::{IndirectDrawCommand, PerPrimitiveMetadata};
use prism_common::BoundingSphere;
use prism_common::limits::{CULL_WORKGROUP_SIZE, INDIRECT_BUFFER_SLOTS, SHADOW_MAP_CASCADES};
use serde::{Deserialize, Serialize};

/// Which view a cull targets. Each view owns one indirect-command replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullView {
    Main,
    Cascade(u32),
}

impl CullView {
    /// Main view is slot 0, cascade `i` is slot `i + 1`.
    pub fn slot(self) -> usize {
        match self {
            CullView::Main => 0,
            CullView::Cascade(i) => i as usize + 1,
        }
    }

    /// `-1` is the main view, `0..SHADOW_MAP_CASCADES` a cascade.
    pub fn from_cascade_index(index: i32) -> Option<Self> {
        match index {
            -1 => Some(CullView::Main),
            i if i >= 0 && (i as usize) < SHADOW_MAP_CASCADES => Some(CullView::Cascade(i as u32)),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = CullView> {
        std::iter::once(CullView::Main)
            .chain((0..SHADOW_MAP_CASCADES as u32).map(CullView::Cascade))
    }
}

const _: () = assert!(INDIRECT_BUFFER_SLOTS == SHADOW_MAP_CASCADES + 1);

/// Side planes derived from a projection matrix.
///
/// `frustum` is `(X.x, X.z, Y.y, Y.z)` and `frustum_w` is `(X.w, Y.w)` of
/// the planes `X = row3 + row0` and `Y = row3 + row1`, each divided by its
/// xyz length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullPlanes {
    pub frustum: Vec4,
    pub frustum_w: Vec2,
}

impl CullPlanes {
    pub fn from_projection(proj: &Mat4) -> Self {
        let x = normalize_plane(proj.row(3) + proj.row(0));
        let y = normalize_plane(proj.row(3) + proj.row(1));
        Self {
            frustum: Vec4::new(x.x, x.z, y.y, y.z),
            frustum_w: Vec2::new(x.w, y.w),
        }
    }
}

fn normalize_plane(p: Vec4) -> Vec4 {
    let len = p.xyz().length();
    if len > 0.0 { p / len } else { p }
}

/// Uniform block of one cull dispatch. Layout matches `CullData` in WGSL.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CullUniform {
    pub view: [[f32; 4]; 4],
    pub frustum: [f32; 4],
    pub frustum_w: [f32; 2],
    pub near: f32,
    pub far: f32,
    pub count: u32,
    pub _pad: [u32; 3],
}

impl CullUniform {
    pub fn new(view: &Mat4, proj: &Mat4, near: f32, far: f32, count: u32) -> Self {
        let planes = CullPlanes::from_projection(proj);
        Self {
            view: view.to_cols_array_2d(),
            frustum: planes.frustum.to_array(),
            frustum_w: planes.frustum_w.to_array(),
            near,
            far,
            count,
            _pad: [0; 3],
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    pub fn planes(&self) -> CullPlanes {
        CullPlanes {
            frustum: Vec4::from(self.frustum),
            frustum_w: Vec2::from(self.frustum_w),
        }
    }
}

/// Sphere-vs-frustum test in view space (camera looking down -Z).
pub fn is_visible(uniform: &CullUniform, sphere: &BoundingSphere) -> bool {
    let c: Vec3 = uniform.view_matrix().transform_point3(sphere.center);
    let r = sphere.radius;
    let CullPlanes { frustum: f, frustum_w: w } = uniform.planes();

    c.z * f.y + w.x - c.x.abs() * f.x > -r
        && c.z * f.w + w.y - c.y.abs() * f.z > -r
        && -c.z + r > uniform.near
        && -c.z - r < uniform.far
}

/// Workgroups needed for `count` commands.
pub fn dispatch_groups(count: u32) -> u32 {
    count.div_ceil(CULL_WORKGROUP_SIZE)
}

/// CPU reference of the cull compute pass. Returns how many draws survived.
pub fn cull_commands(
    uniform: &CullUniform,
    commands: &mut [IndirectDrawCommand],
    metadata: &[PerPrimitiveMetadata],
) -> usize {
    let count = (uniform.count as usize).min(commands.len()).min(metadata.len());
    let mut visible = 0;
    for (command, meta) in commands[..count].iter_mut().zip(metadata) {
        let keep = is_visible(uniform, &meta.bounding_sphere);
        command.instance_count = u32::from(keep);
        visible += usize::from(keep);
    }
    visible
}
