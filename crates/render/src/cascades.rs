//! Cascaded shadow maps: split distances and per-cascade light matrices.
//!
//! # Invariants
//! - Split depths strictly increase; cascade 0 starts at the camera near plane.
//! - Every cascade is recomputed from scratch each frame.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use prism_common::limits::{CASCADE_SPLIT_LAMBDA, SHADOW_MAP_CASCADES};
use serde::Serialize;

use crate::view::RenderView;

/// One light-space slice of the camera frustum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShadowCascade {
    pub view: Mat4,
    pub proj: Mat4,
    /// Positive view-space distance where this cascade ends.
    pub split_depth: f32,
    /// Positive view-space distance where this cascade starts.
    pub near_depth: f32,
    /// Depth extent of the orthographic projection.
    pub far: f32,
    pub radius: f32,
    pub center: Vec3,
    pub layer: u32,
}

impl ShadowCascade {
    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }
}

/// Split fractions in `(0, 1]` of the `[near, far]` range, log/uniform
/// blended by `lambda`.
pub fn cascade_splits(near: f32, far: f32, lambda: f32) -> [f32; SHADOW_MAP_CASCADES] {
    let clip_range = far - near;
    let ratio = far / near;
    std::array::from_fn(|i| {
        let p = (i + 1) as f32 / SHADOW_MAP_CASCADES as f32;
        let log = near * ratio.powf(p);
        let uniform = near + clip_range * p;
        let d = lambda * (log - uniform) + uniform;
        (d - near) / clip_range
    })
}

/// Light basis up vector; +Z when the light is close to vertical.
fn light_up(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Fit one orthographic cascade per split around the camera frustum.
///
/// `light_dir` points from the light toward the scene.
pub fn compute_cascades(camera: &RenderView, light_dir: Vec3) -> [ShadowCascade; SHADOW_MAP_CASCADES] {
    let light_dir = light_dir.normalize_or_zero();
    let light_dir = if light_dir == Vec3::ZERO {
        Vec3::NEG_Y
    } else {
        light_dir
    };
    let up = light_up(light_dir);
    let splits = cascade_splits(camera.near, camera.far, CASCADE_SPLIT_LAMBDA);
    let clip_range = camera.far - camera.near;
    let corners = camera.frustum_corners();

    let mut last_split = 0.0;
    std::array::from_fn(|i| {
        let split = splits[i];
        let mut slice = [Vec3::ZERO; 8];
        for j in 0..4 {
            let ray = corners[j + 4] - corners[j];
            slice[j] = corners[j] + ray * last_split;
            slice[j + 4] = corners[j] + ray * split;
        }

        let center = slice.iter().copied().sum::<Vec3>() / 8.0;
        let radius = slice
            .iter()
            .map(|c| c.distance(center))
            .fold(0.0f32, f32::max);
        let radius = (radius * 16.0).ceil() / 16.0;

        let view = Mat4::look_at_rh(center - light_dir * radius, center, up);
        let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, 2.0 * radius);

        let cascade = ShadowCascade {
            view,
            proj,
            split_depth: camera.near + split * clip_range,
            near_depth: camera.near + last_split * clip_range,
            far: 2.0 * radius,
            radius,
            center,
            layer: i as u32,
        };
        last_split = split;
        cascade
    })
}

/// Cascade block of the per-frame scene uniform. Layout matches WGSL.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CascadeUniform {
    pub view_proj: [[[f32; 4]; 4]; SHADOW_MAP_CASCADES],
    /// Split depths as positive view-space distances.
    pub splits: [f32; 4],
}

impl CascadeUniform {
    pub fn new(cascades: &[ShadowCascade; SHADOW_MAP_CASCADES]) -> Self {
        Self {
            view_proj: cascades.map(|c| c.view_proj().to_cols_array_2d()),
            splits: cascades.map(|c| c.split_depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> RenderView {
        RenderView::look_at(
            Vec3::new(0.0, 5.0, 10.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn splits_are_monotonic_and_end_at_far() {
        let splits = cascade_splits(0.1, 100.0, CASCADE_SPLIT_LAMBDA);
        for w in splits.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert!(splits[0] > 0.0);
        assert!((splits[3] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn pure_uniform_splits_are_even() {
        let splits = cascade_splits(1.0, 101.0, 0.0);
        for (i, s) in splits.iter().enumerate() {
            assert!((s - (i + 1) as f32 * 0.25).abs() < 1e-5);
        }
    }

    #[test]
    fn cascades_cover_view_range_in_order() {
        let cam = camera();
        let cascades = compute_cascades(&cam, Vec3::new(-0.3, -1.0, -0.2));
        assert!((cascades[0].near_depth - cam.near).abs() < 1e-6);
        for w in cascades.windows(2) {
            assert!(w[0].split_depth < w[1].split_depth);
            assert!((w[1].near_depth - w[0].split_depth).abs() < 1e-4);
        }
        assert!((cascades[3].split_depth - cam.far).abs() < 1e-3);
        for (i, c) in cascades.iter().enumerate() {
            assert_eq!(c.layer, i as u32);
            assert_eq!(c.far, 2.0 * c.radius);
            assert_eq!((c.radius * 16.0).fract(), 0.0);
        }
    }

    #[test]
    fn cascade_center_projects_to_clip_center() {
        let cascades = compute_cascades(&camera(), Vec3::new(0.2, -1.0, 0.1));
        for c in &cascades {
            let clip = c.view_proj().project_point3(c.center);
            assert!(clip.x.abs() < 1e-3 && clip.y.abs() < 1e-3);
            assert!((clip.z - 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn vertical_light_switches_up_vector() {
        let cascades = compute_cascades(&camera(), Vec3::NEG_Y);
        for c in &cascades {
            assert!(c.view.is_finite());
        }
        assert_eq!(light_up(Vec3::NEG_Y), Vec3::Z);
        assert_eq!(light_up(Vec3::new(1.0, -1.0, 0.0)), Vec3::Y);
    }

    #[test]
    fn uniform_packs_split_depths() {
        let cascades = compute_cascades(&camera(), Vec3::new(0.0, -1.0, -1.0));
        let u = CascadeUniform::new(&cascades);
        for (i, c) in cascades.iter().enumerate() {
            assert_eq!(u.splits[i], c.split_depth);
        }
        assert_eq!(std::mem::size_of::<CascadeUniform>(), 4 * 64 + 16);
    }
}
