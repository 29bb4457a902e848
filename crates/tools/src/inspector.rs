use prism_assets::{AssetKind, RenderableAsset};
use prism_render::scene::{FrameUpdate, SceneState};
use prism_render::{CullView, ShadowCascade};
use serde::Serialize;

/// Scene inspector for developer tooling.
///
/// Read-only queries against scene state for the overlay, the CLI and logs.
pub struct SceneInspector;

impl SceneInspector {
    pub fn summary(scene: &SceneState) -> SceneSummary {
        SceneSummary {
            frame: scene.frame_index(),
            assets: scene.assets().iter().map(Self::asset).collect(),
            point_lights: scene.point_lights().len(),
            frustum_frozen: scene.frozen_view().is_some(),
            collision_debug: scene.collision_debug(),
        }
    }

    pub fn asset(asset: &RenderableAsset) -> AssetSummary {
        let player = asset.player();
        AssetSummary {
            name: asset.name().to_string(),
            kind: asset.kind(),
            draws: asset.draw_set().len(),
            vertices: asset.vertex_count(),
            indices: asset.index_count(),
            nodes: asset.nodes().len(),
            materials: asset.materials().len(),
            texture_layers: asset.textures().layer_count(),
            joints: asset.joint_matrices().len(),
            animations: player
                .map(|p| p.animations().iter().map(|a| a.name.clone()).collect())
                .unwrap_or_default(),
            active_animation: player.and_then(|p| p.active()).map(|a| a.name.clone()),
            position: asset.world_transform().w_axis.truncate().to_array(),
        }
    }

    pub fn inspect_asset(scene: &SceneState, index: usize) -> Option<AssetSummary> {
        scene.assets().get(index).map(Self::asset)
    }

    /// Visible/total draws per cull request, from the CPU reference cull.
    pub fn cull_report(scene: &SceneState, update: &FrameUpdate) -> Vec<CullReport> {
        tracing::debug!(requests = update.cull.len(), "building cull report");
        update
            .cull
            .iter()
            .map(|request| {
                let counts = scene.reference_cull(request);
                CullReport {
                    asset: request.asset,
                    view: request.view,
                    visible: counts.iter().filter(|&&c| c > 0).count(),
                    total: counts.len(),
                }
            })
            .collect()
    }

    pub fn cascades(cascades: &[ShadowCascade]) -> Vec<CascadeSummary> {
        cascades
            .iter()
            .map(|c| CascadeSummary {
                layer: c.layer,
                near_depth: c.near_depth,
                split_depth: c.split_depth,
                radius: c.radius,
                center: c.center.to_array(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneSummary {
    pub frame: u64,
    pub assets: Vec<AssetSummary>,
    pub point_lights: usize,
    pub frustum_frozen: bool,
    pub collision_debug: bool,
}

impl SceneSummary {
    pub fn total_draws(&self) -> usize {
        self.assets.iter().map(|a| a.draws).sum()
    }
}

impl std::fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scene: frame={} assets={} draws={} point_lights={}",
            self.frame,
            self.assets.len(),
            self.total_draws(),
            self.point_lights
        )?;
        if self.frustum_frozen {
            write!(f, " [frustum frozen]")?;
        }
        if self.collision_debug {
            write!(f, " [collision debug]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub name: String,
    pub kind: AssetKind,
    pub draws: usize,
    pub vertices: usize,
    pub indices: usize,
    pub nodes: usize,
    pub materials: usize,
    /// Material map layers, counting the white fallback layer.
    pub texture_layers: u32,
    pub joints: usize,
    pub animations: Vec<String>,
    pub active_animation: Option<String>,
    pub position: [f32; 3],
}

impl std::fmt::Display for AssetSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{:?}] draws={} vertices={} indices={} nodes={} materials={} textures={}",
            self.name,
            self.kind,
            self.draws,
            self.vertices,
            self.indices,
            self.nodes,
            self.materials,
            self.texture_layers.saturating_sub(1)
        )?;
        if self.kind == AssetKind::Skinned {
            write!(f, " joints={} animations={}", self.joints, self.animations.len())?;
            if let Some(active) = &self.active_animation {
                write!(f, " playing={active}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CullReport {
    pub asset: usize,
    pub view: CullView,
    pub visible: usize,
    pub total: usize,
}

impl std::fmt::Display for CullReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "asset {} {:?}: {}/{} visible", self.asset, self.view, self.visible, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeSummary {
    pub layer: u32,
    pub near_depth: f32,
    pub split_depth: f32,
    pub radius: f32,
    pub center: [f32; 3],
}

impl std::fmt::Display for CascadeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cascade {}: depth {:.2}..{:.2} radius={:.2} center=({:.2}, {:.2}, {:.2})",
            self.layer,
            self.near_depth,
            self.split_depth,
            self.radius,
            self.center[0],
            self.center[1],
            self.center[2],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use prism_assets::{SourceMesh, SourceNode, SourcePrimitive, SourceScene};
    use prism_common::limits::SHADOW_MAP_CASCADES;
    use prism_render::{Environment, RenderView, RendererConfig, compute_cascades};

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

    fn view_at(eye: Vec3) -> RenderView {
        RenderView::look_at(eye, Vec3::ZERO, 60f32.to_radians(), 1.0, 0.1, 100.0)
    }

    #[test]
    fn summary_empty_scene() {
        let scene = SceneState::new(Environment::default());
        let summary = SceneInspector::summary(&scene);
        assert_eq!(summary.frame, 0);
        assert!(summary.assets.is_empty());
        assert_eq!(summary.total_draws(), 0);
    }

    #[test]
    fn summary_with_assets() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("a"));
        let index = scene.add_asset(triangle_asset("b"));
        scene.set_asset_transform(index, Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));

        let summary = SceneInspector::summary(&scene);
        assert_eq!(summary.assets.len(), 2);
        assert_eq!(summary.total_draws(), 2);
        assert_eq!(summary.assets[1].position, [1.0, 2.0, 3.0]);
        assert_eq!(summary.assets[0].kind, AssetKind::Static);
        assert!(summary.assets[0].active_animation.is_none());
        assert_eq!(summary.assets[0].texture_layers, 1);
        assert!(summary.assets[0].to_string().ends_with("textures=0"));
    }

    #[test]
    fn inspect_asset_not_found() {
        let scene = SceneState::new(Environment::default());
        assert!(SceneInspector::inspect_asset(&scene, 3).is_none());
    }

    #[test]
    fn cull_report_counts_visible_draws() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("a"));
        let mut config = RendererConfig::default();
        config.shadows.cull_cascades = false;

        let update = scene.pre_render(&view_at(Vec3::new(0.0, 0.0, 5.0)), 0.0, &config, (640, 480));
        let report = SceneInspector::cull_report(&scene, &update);
        assert_eq!(
            report,
            vec![CullReport {
                asset: 0,
                view: CullView::Main,
                visible: 1,
                total: 1
            }]
        );

        // Looking away from the triangle.
        let away = RenderView::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(0.0, 0.0, 10.0),
            60f32.to_radians(),
            1.0,
            0.1,
            100.0,
        );
        let update = scene.pre_render(&away, 0.0, &config, (640, 480));
        assert_eq!(SceneInspector::cull_report(&scene, &update)[0].visible, 0);
    }

    #[test]
    fn cascade_summaries_follow_splits() {
        let cascades = compute_cascades(&view_at(Vec3::new(0.0, 2.0, 5.0)), Vec3::new(-0.3, -1.0, -0.2));
        let summaries = SceneInspector::cascades(&cascades);
        assert_eq!(summaries.len(), SHADOW_MAP_CASCADES);
        assert!(summaries.windows(2).all(|w| w[0].split_depth < w[1].split_depth));
        assert!(format!("{}", summaries[0]).starts_with("cascade 0"));
    }

    #[test]
    fn summaries_serialize() {
        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(triangle_asset("a"));
        let json = serde_json::to_string(&SceneInspector::summary(&scene)).unwrap();
        assert!(json.contains("\"kind\":\"Static\""));
        assert!(json.contains("\"draws\":1"));
    }

    #[test]
    fn summary_display() {
        let mut scene = SceneState::new(Environment::default());
        scene.set_collision_debug(true);
        let s = format!("{}", SceneInspector::summary(&scene));
        assert!(s.contains("frame=0"));
        assert!(s.contains("[collision debug]"));
    }
}
