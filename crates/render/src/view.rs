use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Camera/view configuration for one frame.
///
/// Right-handed, looking down -Z in view space, depth range [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderView {
    pub view: Mat4,
    pub proj: Mat4,
    /// Camera position in world space.
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Default for RenderView {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 2.0, 6.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            200.0,
        )
    }
}

impl RenderView {
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            proj: Mat4::perspective_rh(fov_y, aspect, near, far),
            position: eye,
            near,
            far,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    /// World-space frustum corners: 0..3 on the near plane, 4..7 on the far
    /// plane, each quad ordered (-1, 1), (1, 1), (1, -1), (-1, -1) in NDC.
    pub fn frustum_corners(&self) -> [Vec3; 8] {
        const NDC_XY: [(f32, f32); 4] = [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];
        let inverse = self.view_proj().inverse();
        std::array::from_fn(|i| {
            let (x, y) = NDC_XY[i % 4];
            let z = if i < 4 { 0.0 } else { 1.0 };
            let p = inverse * Vec4::new(x, y, z, 1.0);
            p.truncate() / p.w
        })
    }

    /// Unit forward direction in world space.
    pub fn forward(&self) -> Vec3 {
        -self.view.inverse().z_axis.truncate().normalize_or_zero()
    }
}
