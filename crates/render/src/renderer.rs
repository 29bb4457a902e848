use std::fmt::Write as _;

use prism_common::limits::SHADOW_MAP_CASCADES;

use crate::cascades::compute_cascades;
use crate::config::RendererConfig;
use crate::culling::{CullUniform, cull_commands};
use crate::frame_graph::FrameGraph;
use crate::scene::SceneState;
use crate::view::RenderView;

/// Renderer-agnostic interface. All renderers implement this trait.
///
/// The renderer reads scene state and a view, then produces output. It
/// never mutates the scene; animation and metadata re-baking happen in
/// [`SceneState::pre_render`].
pub trait Renderer {
    /// The output type produced by this renderer.
    type Output;

    /// Render one frame from the given scene and view.
    fn render(&self, scene: &SceneState, view: &RenderView) -> Self::Output;
}

/// Text frame report: what the GPU backend would draw for this view.
///
/// Visibility comes from the CPU reference cull, so the report matches the
/// compute pass without needing a device. Useful for the CLI, logs and tests.
#[derive(Debug, Default)]
pub struct DebugTextRenderer {
    config: RendererConfig,
}

impl DebugTextRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, scene: &SceneState, view: &RenderView) -> String {
        let mut out = String::new();
        let cull_view = scene.frozen_view().copied().unwrap_or(*view);

        let _ = writeln!(
            out,
            "=== Frame {} ({} assets, {} point lights) ===",
            scene.frame_index(),
            scene.assets().len(),
            scene.point_lights().iter().filter(|l| l.enabled).count()
        );
        let _ = writeln!(
            out,
            "Camera: pos=({:.2}, {:.2}, {:.2}) near={} far={}{}",
            view.position.x,
            view.position.y,
            view.position.z,
            view.near,
            view.far,
            if scene.frozen_view().is_some() { " [frustum frozen]" } else { "" }
        );

        let mut total_draws = 0;
        let mut total_visible = 0;
        for asset in scene.assets() {
            let set = asset.draw_set();
            let draws = set.len();
            let visible = if asset.is_cullable() {
                let uniform = CullUniform::new(
                    &cull_view.view,
                    &cull_view.proj,
                    cull_view.near,
                    cull_view.far,
                    draws as u32,
                );
                let mut commands = set.commands().to_vec();
                cull_commands(&uniform, &mut commands, set.metadata())
            } else {
                draws
            };
            total_draws += draws;
            total_visible += visible;
            let _ = writeln!(
                out,
                "  {} [{:?}] draws={} visible={} vertices={} indices={} joints={}",
                asset.name(),
                asset.kind(),
                draws,
                visible,
                asset.vertex_count(),
                asset.index_count(),
                asset.joint_matrices().len()
            );
        }
        let _ = writeln!(out, "Draws: {total_visible}/{total_draws} visible");

        let cascades = compute_cascades(view, scene.environment().sun_direction);
        let splits: Vec<String> = cascades
            .iter()
            .map(|c| format!("{:.2}", c.split_depth))
            .collect();
        let _ = writeln!(
            out,
            "Cascades ({SHADOW_MAP_CASCADES}): splits=[{}] culled={}",
            splits.join(", "),
            self.config.shadows.cull_cascades
        );

        match FrameGraph::standard(&self.config) {
            Ok(graph) => {
                let plan = graph.compile();
                let _ = write!(out, "{plan}");
            }
            Err(e) => {
                let _ = writeln!(out, "Pass graph invalid: {e}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use glam::{Mat4, Vec3};
    use prism_assets::{RenderableAsset, SourceMesh, SourceNode, SourcePrimitive, SourceScene};

    fn scene_with_two_quads() -> SceneState {
        let mut source = SourceScene {
            name: "quads".into(),
            ..Default::default()
        };
        let mesh = source.push_mesh(SourceMesh {
            name: "quad".into(),
            primitives: vec![SourcePrimitive::triangles(
                vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
                vec![0, 1, 2, 0, 2, 3],
            )],
        });
        let front = source.push_node(SourceNode {
            mesh: Some(mesh),
            ..Default::default()
        });
        let behind = source.push_node(SourceNode {
            mesh: Some(mesh),
            matrix: Mat4::from_translation(Vec3::new(0.0, 0.0, 50.0)),
            ..Default::default()
        });
        source.roots.extend([front, behind]);

        let mut scene = SceneState::new(Environment::default());
        scene.add_asset(RenderableAsset::from_source("quads", &source).unwrap());
        scene
    }

    #[test]
    fn debug_renderer_empty_scene() {
        let scene = SceneState::new(Environment::default());
        let renderer = DebugTextRenderer::default();
        let output = renderer.render(&scene, &RenderView::default());

        assert!(output.contains("Frame 0 (0 assets"));
        assert!(output.contains("Draws: 0/0 visible"));
        assert!(output.contains("cull.main"));
        assert!(output.contains("present"));
    }

    #[test]
    fn debug_renderer_reports_culled_draws() {
        let scene = scene_with_two_quads();
        let view = RenderView::look_at(
            Vec3::new(0.5, 0.5, 5.0),
            Vec3::new(0.5, 0.5, 0.0),
            60f32.to_radians(),
            1.0,
            0.1,
            100.0,
        );
        let output = DebugTextRenderer::default().render(&scene, &view);
        assert!(output.contains("quads [Static] draws=2 visible=1"));
        assert!(output.contains("Draws: 1/2 visible"));
    }

    #[test]
    fn disabled_bloom_drops_bloom_passes() {
        let mut config = RendererConfig::default();
        config.bloom.enabled = false;
        let output = DebugTextRenderer::new(config)
            .render(&SceneState::new(Environment::default()), &RenderView::default());
        assert!(!output.contains("bloom."));
        assert!(output.contains("culled=true"));
    }
}
