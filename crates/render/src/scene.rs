//! Scene state and the CPU half of each frame.
//!
//! `pre_render` advances animation, re-bakes dirty metadata, fits the shadow
//! cascades, builds the per-frame uniform and lists the cull dispatches. The
//! backend uploads and records what it returns; nothing here touches a GPU.
//!
//! # Invariants
//! - At most `MAX_POINT_LIGHTS` point lights.
//! - While the frustum is frozen, every cull request uses the captured view;
//!   the scene uniform always uses the live one.
//! - Skinned assets are never culled; their slots keep `instance_count == 1`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use prism_assets::RenderableAsset;
use prism_common::{Aabb, Collider, Contact};
use prism_common::limits::{MAX_POINT_LIGHTS, SHADOW_MAP_CASCADES};
use serde::{Deserialize, Serialize};

use crate::cascades::{CascadeUniform, ShadowCascade, compute_cascades};
use crate::config::{Environment, RendererConfig};
use crate::culling::{CullUniform, CullView, cull_commands};
use crate::view::RenderView;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub enabled: bool,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            range,
            enabled: true,
        }
    }

    pub fn to_gpu(&self) -> GpuPointLight {
        GpuPointLight {
            position_range: self.position.extend(self.range).to_array(),
            color_intensity: self.color.extend(self.intensity).to_array(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position_range: [f32; 4],
    pub color_intensity: [f32; 4],
}

/// Per-frame scene uniform. Layout matches `Scene` in WGSL.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct SceneUniform {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    /// xyz position, w near.
    pub camera_pos: [f32; 4],
    /// xyz direction the light travels, w far.
    pub sun_dir: [f32; 4],
    /// rgb, w intensity.
    pub sun_color: [f32; 4],
    /// rgb, w ambient intensity.
    pub sky_zenith: [f32; 4],
    /// rgb, w exposure.
    pub sky_horizon: [f32; 4],
    pub cascades: CascadeUniform,
    /// radius, bias, intensity, enabled.
    pub ssao: [f32; 4],
    /// bloom intensity, threshold, knee, shadow depth bias.
    pub post: [f32; 4],
    /// width, height, 1/width, 1/height.
    pub screen: [f32; 4],
    /// point light count, collision debug, frame index, sRGB surface flag
    /// (zero here; the backend sets it when the surface encodes on write).
    pub counts: [u32; 4],
}

/// One cull dispatch: which asset, which replica, with what frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullRequest {
    pub asset: usize,
    pub view: CullView,
    pub uniform: CullUniform,
}

/// Everything the backend needs to upload and record this frame.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub uniform: SceneUniform,
    pub cascades: [ShadowCascade; SHADOW_MAP_CASCADES],
    pub cull: Vec<CullRequest>,
    /// Assets whose metadata or joints changed and must be re-uploaded.
    pub dirty_assets: Vec<usize>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("point light limit of {0} reached")]
    TooManyPointLights(usize),
}

#[derive(Debug, Clone)]
pub struct SceneState {
    assets: Vec<RenderableAsset>,
    environment: Environment,
    point_lights: Vec<PointLight>,
    frozen: Option<RenderView>,
    collision_debug: bool,
    frame: u64,
}

impl SceneState {
    pub fn new(environment: Environment) -> Self {
        Self {
            assets: Vec::new(),
            environment,
            point_lights: Vec::new(),
            frozen: None,
            collision_debug: false,
            frame: 0,
        }
    }

    pub fn add_asset(&mut self, asset: RenderableAsset) -> usize {
        tracing::info!(
            asset = asset.name(),
            kind = ?asset.kind(),
            draws = asset.draw_set().len(),
            "asset added to scene"
        );
        self.assets.push(asset);
        self.assets.len() - 1
    }

    pub fn assets(&self) -> &[RenderableAsset] {
        &self.assets
    }

    pub fn asset_mut(&mut self, index: usize) -> Option<&mut RenderableAsset> {
        self.assets.get_mut(index)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn add_point_light(&mut self, light: PointLight) -> Result<usize, SceneError> {
        if self.point_lights.len() >= MAX_POINT_LIGHTS {
            return Err(SceneError::TooManyPointLights(MAX_POINT_LIGHTS));
        }
        self.point_lights.push(light);
        Ok(self.point_lights.len() - 1)
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    pub fn point_light_mut(&mut self, index: usize) -> Option<&mut PointLight> {
        self.point_lights.get_mut(index)
    }

    /// Enabled lights packed for upload, padded to the fixed array length.
    pub fn gpu_point_lights(&self) -> ([GpuPointLight; MAX_POINT_LIGHTS], u32) {
        let mut out = [GpuPointLight::default(); MAX_POINT_LIGHTS];
        let mut count = 0;
        for light in self.point_lights.iter().filter(|l| l.enabled) {
            out[count] = light.to_gpu();
            count += 1;
        }
        (out, count as u32)
    }

    pub fn frozen_view(&self) -> Option<&RenderView> {
        self.frozen.as_ref()
    }

    /// Freeze culling at `current`, or unfreeze if already frozen.
    pub fn toggle_frustum_freeze(&mut self, current: &RenderView) {
        self.frozen = match self.frozen {
            Some(_) => None,
            None => Some(*current),
        };
        tracing::info!(frozen = self.frozen.is_some(), "frustum freeze toggled");
    }

    pub fn collision_debug(&self) -> bool {
        self.collision_debug
    }

    pub fn set_collision_debug(&mut self, enabled: bool) {
        self.collision_debug = enabled;
    }

    /// Indices of assets whose collision boxes overlap `query`.
    pub fn collisions(&self, query: &Aabb) -> Vec<usize> {
        self.assets
            .iter()
            .enumerate()
            .filter(|(_, a)| a.intersects(query))
            .map(|(i, _)| i)
            .collect()
    }

    /// Contacts between `collider` and every asset it touches, as
    /// `(asset index, contact)` pairs.
    pub fn contacts(&self, collider: &Collider) -> Vec<(usize, Contact)> {
        self.assets
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.contact(collider).map(|c| (i, c)))
            .collect()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    pub fn pre_render(
        &mut self,
        view: &RenderView,
        dt: f32,
        config: &RendererConfig,
        viewport: (u32, u32),
    ) -> FrameUpdate {
        let _span = tracing::info_span!("pre_render", frame = self.frame).entered();

        let dirty_assets: Vec<usize> = self
            .assets
            .iter_mut()
            .enumerate()
            .filter_map(|(i, asset)| asset.update(dt).then_some(i))
            .collect();

        let cascades = compute_cascades(view, self.environment.sun_direction);
        // A frozen frustum is still culled every frame. Assets added or moved
        // after the freeze would otherwise draw with stale or empty replicas.
        let cull_view = self.frozen.unwrap_or(*view);
        let cull_cascades = if self.frozen.is_some() {
            compute_cascades(&cull_view, self.environment.sun_direction)
        } else {
            cascades
        };

        let mut cull = Vec::new();
        for (index, asset) in self.assets.iter().enumerate() {
            if !asset.is_cullable() || asset.draw_set().is_empty() {
                continue;
            }
            let count = asset.draw_set().len() as u32;
            cull.push(CullRequest {
                asset: index,
                view: CullView::Main,
                uniform: CullUniform::new(
                    &cull_view.view,
                    &cull_view.proj,
                    cull_view.near,
                    cull_view.far,
                    count,
                ),
            });
            if config.shadows.cull_cascades {
                for cascade in &cull_cascades {
                    cull.push(CullRequest {
                        asset: index,
                        view: CullView::Cascade(cascade.layer),
                        uniform: CullUniform::new(&cascade.view, &cascade.proj, 0.0, cascade.far, count),
                    });
                }
            }
        }

        let uniform = self.scene_uniform(view, &cascades, config, viewport);
        tracing::debug!(
            dirty = dirty_assets.len(),
            culls = cull.len(),
            frozen = self.frozen.is_some(),
            "pre_render done"
        );
        self.frame += 1;

        FrameUpdate {
            uniform,
            cascades,
            cull,
            dirty_assets,
        }
    }

    fn scene_uniform(
        &self,
        view: &RenderView,
        cascades: &[ShadowCascade; SHADOW_MAP_CASCADES],
        config: &RendererConfig,
        viewport: (u32, u32),
    ) -> SceneUniform {
        let env = &self.environment;
        let view_proj = view.view_proj();
        let (width, height) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
        let (_, light_count) = self.gpu_point_lights();
        SceneUniform {
            view: view.view.to_cols_array_2d(),
            proj: view.proj.to_cols_array_2d(),
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_pos: view.position.extend(view.near).to_array(),
            sun_dir: env.sun_direction.normalize_or_zero().extend(view.far).to_array(),
            sun_color: env.sun_color.extend(env.sun_intensity).to_array(),
            sky_zenith: env.sky_zenith.extend(env.ambient_intensity).to_array(),
            sky_horizon: env.sky_horizon.extend(config.exposure).to_array(),
            cascades: CascadeUniform::new(cascades),
            ssao: [
                config.ssao.radius,
                config.ssao.bias,
                config.ssao.intensity,
                if config.ssao.enabled { 1.0 } else { 0.0 },
            ],
            post: [
                if config.bloom.enabled { config.bloom.intensity } else { 0.0 },
                config.bloom.threshold,
                config.bloom.knee,
                config.shadows.depth_bias,
            ],
            screen: [width, height, 1.0 / width, 1.0 / height],
            counts: [
                light_count,
                u32::from(self.collision_debug),
                self.frame as u32,
                0,
            ],
        }
    }

    /// Instance counts the cull pass would write for `request`, computed on
    /// the CPU against a copy of the asset's commands.
    pub fn reference_cull(&self, request: &CullRequest) -> Vec<u32> {
        let Some(asset) = self.assets.get(request.asset) else {
            return Vec::new();
        };
        let set = asset.draw_set();
        let mut commands = set.commands().to_vec();
        cull_commands(&request.uniform, &mut commands, set.metadata());
        commands.iter().map(|c| c.instance_count).collect()
    }

    /// World transform for an asset; metadata is re-baked on the next
    /// `pre_render`.
    pub fn set_asset_transform(&mut self, index: usize, world: Mat4) -> bool {
        match self.assets.get_mut(index) {
            Some(asset) => {
                asset.set_world_transform(world);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_assets::{SourceMesh, SourceNode, SourcePrimitive, SourceScene};

    fn triangle_asset(name: &str) -> RenderableAsset {
        let mut scene = SourceScene {
            name: name.into(),
            ..Default::default()
        };
        let mesh = scene.push_mesh(SourceMesh {
            name: "tri".into(),
            primitives: vec![SourcePrimitive::triangles(
                vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                vec![0, 1, 2],
            )],
        });
        let root = scene.push_node(SourceNode {
            mesh: Some(mesh),
            ..Default::default()
        });
        scene.roots.push(root);
        RenderableAsset::from_source(name, &scene).unwrap()
    }

    fn camera_at(eye: Vec3, target: Vec3) -> RenderView {
        RenderView::look_at(eye, target, 60f32.to_radians(), 1.0, 0.1, 100.0)
    }

    #[test]
    fn pre_render_requests_main_and_cascade_culls() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("a"));
        scene.add_asset(triangle_asset("b"));

        let view = camera_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let update = scene.pre_render(&view, 0.016, &RendererConfig::default(), (800, 600));
        assert_eq!(update.cull.len(), 2 * (1 + SHADOW_MAP_CASCADES));
        assert_eq!(update.cull[0].view, CullView::Main);
        assert_eq!(update.cull[1].view, CullView::Cascade(0));
        assert_eq!(update.cull[0].uniform.count, 1);
        assert_eq!(scene.reference_cull(&update.cull[0]), vec![1]);
        assert_eq!(scene.frame_index(), 1);
    }

    #[test]
    fn cascade_culling_can_be_disabled() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("a"));
        let mut config = RendererConfig::default();
        config.shadows.cull_cascades = false;

        let view = camera_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let update = scene.pre_render(&view, 0.0, &config, (800, 600));
        assert_eq!(update.cull.len(), 1);
        assert_eq!(update.cull[0].view.slot(), 0);
    }

    #[test]
    fn frozen_frustum_culls_with_captured_view() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("a"));
        let config = RendererConfig::default();

        let looking_at = camera_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        scene.toggle_frustum_freeze(&looking_at);

        // Turn around: the live view no longer sees the triangle.
        let looking_away = camera_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0));
        let update = scene.pre_render(&looking_away, 0.0, &config, (800, 600));
        let main = update.cull[0];
        assert_eq!(main.uniform.view, looking_at.view.to_cols_array_2d());
        assert_eq!(update.uniform.view, looking_away.view.to_cols_array_2d());
        assert_eq!(scene.reference_cull(&main), vec![1]);

        scene.toggle_frustum_freeze(&looking_away);
        let update = scene.pre_render(&looking_away, 0.0, &config, (800, 600));
        assert_eq!(scene.reference_cull(&update.cull[0]), vec![0]);
    }

    #[test]
    fn assets_added_while_frozen_are_culled_against_the_captured_view() {
        let mut scene = SceneState::new(Environment::default());
        let mut config = RendererConfig::default();
        config.shadows.cull_cascades = false;

        let looking_at = camera_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        scene.toggle_frustum_freeze(&looking_at);
        let index = scene.add_asset(triangle_asset("late"));

        let looking_away = camera_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0));
        let update = scene.pre_render(&looking_away, 0.0, &config, (800, 600));
        let request = update.cull.iter().find(|r| r.asset == index).unwrap();
        assert_eq!(request.uniform.view, looking_at.view.to_cols_array_2d());
        assert_eq!(scene.reference_cull(request), vec![1]);
    }

    #[test]
    fn moved_assets_are_reported_dirty_once() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("a"));
        let view = RenderView::default();
        let config = RendererConfig::default();

        assert!(scene.set_asset_transform(0, Mat4::from_translation(Vec3::X * 3.0)));
        assert!(!scene.set_asset_transform(7, Mat4::IDENTITY));
        assert_eq!(scene.pre_render(&view, 0.0, &config, (1, 1)).dirty_assets, vec![0]);
        assert!(scene.pre_render(&view, 0.0, &config, (1, 1)).dirty_assets.is_empty());
    }

    #[test]
    fn point_light_limit() {
        let mut scene = SceneState::new(Environment::default());
        for i in 0..MAX_POINT_LIGHTS {
            scene
                .add_point_light(PointLight::new(Vec3::splat(i as f32), Vec3::ONE, 1.0, 5.0))
                .unwrap();
        }
        assert_eq!(
            scene.add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0, 5.0)),
            Err(SceneError::TooManyPointLights(MAX_POINT_LIGHTS))
        );
        if let Some(light) = scene.point_light_mut(0) {
            light.enabled = false;
        }
        let (lights, count) = scene.gpu_point_lights();
        assert_eq!(count as usize, MAX_POINT_LIGHTS - 1);
        assert_eq!(lights[0].position_range, [1.0, 1.0, 1.0, 5.0]);
    }

    #[test]
    fn collisions_report_overlapping_assets() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("near"));
        let far = scene.add_asset(triangle_asset("far"));
        scene.set_asset_transform(far, Mat4::from_translation(Vec3::splat(100.0)));
        scene.pre_render(&RenderView::default(), 0.0, &RendererConfig::default(), (1, 1));

        let query = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        assert_eq!(scene.collisions(&query), vec![0]);
    }

    #[test]
    fn capsule_contacts_name_the_touched_asset() {
        use prism_common::Capsule;

        let mut scene = SceneState::new(Environment::default());
        let far = scene.add_asset(triangle_asset("far"));
        scene.add_asset(triangle_asset("near"));
        scene.set_asset_transform(far, Mat4::from_translation(Vec3::splat(100.0)));
        scene.pre_render(&RenderView::default(), 0.0, &RendererConfig::default(), (1, 1));

        let capsule = Collider::Capsule(Capsule::new(Vec3::new(0.0, -5.0, 0.0), Vec3::new(0.0, 5.0, 0.0), 0.25));
        let contacts = scene.contacts(&capsule);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].0, 1);
        assert!(contacts[0].1.depth > 0.0);
    }

    #[test]
    fn scene_uniform_layout() {
        assert_eq!(std::mem::size_of::<SceneUniform>(), 4 * 64 + 5 * 16 + 272 + 3 * 16 + 16);
    }
}
