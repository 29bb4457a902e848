//! Built-in WGSL sources.
//!
//! Registry entries hold only the module body. Shared declarations (scene
//! uniform, asset storage, vertex layouts, the fullscreen triangle) are
//! prepended by [`compose`], so override files in the shader directory stay
//! small and always agree with the Rust-side layouts.

use prism_render::{ShaderError, ShaderKey, ShaderRegistry, ShaderStage};

pub const CULL: ShaderKey = ShaderKey("cull");
pub const PREPASS: ShaderKey = ShaderKey("prepass");
pub const SSAO: ShaderKey = ShaderKey("ssao");
pub const SHADOW: ShaderKey = ShaderKey("shadow");
pub const SKY: ShaderKey = ShaderKey("sky");
pub const FORWARD: ShaderKey = ShaderKey("forward");
pub const DEBUG_LINES: ShaderKey = ShaderKey("debug_lines");
pub const BLOOM: ShaderKey = ShaderKey("bloom");
pub const COMPOSITE: ShaderKey = ShaderKey("composite");

const BUILTIN: &[(ShaderKey, ShaderStage, &str)] = &[
    (CULL, ShaderStage::Compute, CULL_SHADER),
    (PREPASS, ShaderStage::VertexFragment, PREPASS_SHADER),
    (SSAO, ShaderStage::VertexFragment, SSAO_SHADER),
    (SHADOW, ShaderStage::Vertex, SHADOW_SHADER),
    (SKY, ShaderStage::VertexFragment, SKY_SHADER),
    (FORWARD, ShaderStage::VertexFragment, FORWARD_SHADER),
    (DEBUG_LINES, ShaderStage::VertexFragment, DEBUG_LINES_SHADER),
    (BLOOM, ShaderStage::VertexFragment, BLOOM_SHADER),
    (COMPOSITE, ShaderStage::VertexFragment, COMPOSITE_SHADER),
];

pub fn register_builtin(registry: &mut ShaderRegistry) {
    for &(key, stage, source) in BUILTIN {
        registry.register(key, stage, source);
    }
}

/// Every built-in key, in registration order.
pub fn builtin_keys() -> impl Iterator<Item = ShaderKey> {
    BUILTIN.iter().map(|(key, _, _)| *key)
}

fn preludes(key: ShaderKey) -> &'static [&'static str] {
    match key.as_str() {
        "prepass" | "shadow" | "forward" => &[SCENE_PRELUDE, GEOMETRY_PRELUDE],
        "ssao" | "sky" | "composite" => &[SCENE_PRELUDE, FULLSCREEN_PRELUDE],
        "debug_lines" => &[SCENE_PRELUDE],
        "bloom" => &[FULLSCREEN_PRELUDE],
        _ => &[],
    }
}

/// Full module text for `key`: preludes followed by the active source.
pub fn compose(registry: &ShaderRegistry, key: ShaderKey) -> Result<String, ShaderError> {
    let body = registry.source(key)?;
    let mut text = String::new();
    for prelude in preludes(key) {
        text.push_str(prelude);
        text.push('\n');
    }
    text.push_str(body);
    Ok(text)
}

/// Scene uniform and point lights (group 0).
pub const SCENE_PRELUDE: &str = include_str!("scene.wgsl");
/// Asset storage buffers, material maps, vertex layouts and skinning (group 1).
pub const GEOMETRY_PRELUDE: &str = include_str!("geometry.wgsl");
pub const FULLSCREEN_PRELUDE: &str = include_str!("fullscreen.wgsl");

pub const CULL_SHADER: &str = include_str!("cull.wgsl");
pub const PREPASS_SHADER: &str = include_str!("prepass.wgsl");
pub const SSAO_SHADER: &str = include_str!("ssao.wgsl");
pub const SHADOW_SHADER: &str = include_str!("shadow.wgsl");
pub const SKY_SHADER: &str = include_str!("sky.wgsl");
pub const FORWARD_SHADER: &str = include_str!("forward.wgsl");
pub const DEBUG_LINES_SHADER: &str = include_str!("debug_lines.wgsl");
pub const BLOOM_SHADER: &str = include_str!("bloom.wgsl");
pub const COMPOSITE_SHADER: &str = include_str!("composite.wgsl");

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ShaderRegistry {
        let mut registry = ShaderRegistry::new();
        register_builtin(&mut registry);
        registry
    }

    #[test]
    fn every_builtin_is_registered() {
        let registry = registry();
        assert_eq!(registry.keys().count(), BUILTIN.len());
        for key in builtin_keys() {
            assert!(registry.source(key).is_ok(), "{key} missing");
        }
    }

    #[test]
    fn geometry_shaders_get_scene_and_asset_declarations() {
        let registry = registry();
        for key in [PREPASS, SHADOW, FORWARD] {
            let text = compose(&registry, key).unwrap();
            assert!(text.contains("var<uniform> scene: Scene"));
            assert!(text.contains("fn pose_skinned"));
            assert!(text.contains("fn vs_static"));
            assert!(text.contains("fn vs_skinned"));
        }
    }

    #[test]
    fn textured_passes_take_derivatives_before_discarding() {
        for source in [PREPASS_SHADER, FORWARD_SHADER] {
            let derivative = source.find("dpdx(in.uv)").unwrap();
            let discard = source.find("discard;").unwrap();
            assert!(derivative < discard);
        }
        assert!(GEOMETRY_PRELUDE.contains("textureSampleGrad"));
        assert!(!GEOMETRY_PRELUDE.contains("textureSample("));
    }

    #[test]
    fn environment_bindings_match_the_pipeline_groups() {
        let registry = registry();
        assert!(compose(&registry, FORWARD).unwrap().contains("@group(3) @binding(4) var<uniform> environment"));
        assert!(compose(&registry, SKY).unwrap().contains("@group(1) @binding(4) var<uniform> environment"));
    }

    #[test]
    fn post_shaders_share_the_fullscreen_triangle() {
        let registry = registry();
        for key in [SSAO, SKY, BLOOM, COMPOSITE] {
            assert!(compose(&registry, key).unwrap().contains("fn vs_fullscreen"));
        }
        assert!(!compose(&registry, CULL).unwrap().contains("vs_fullscreen"));
    }

    #[test]
    fn cull_shader_matches_workgroup_size() {
        let size = prism_common::limits::CULL_WORKGROUP_SIZE;
        assert!(CULL_SHADER.contains(&format!("@workgroup_size({size})")));
    }

    #[test]
    fn overrides_keep_the_prelude() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sky.wgsl"), "// custom sky").unwrap();

        let mut registry = registry();
        registry.set_override_dir(Some(dir.path().to_path_buf()));
        assert_eq!(registry.reload_from_dir().unwrap(), vec![SKY]);
        let text = compose(&registry, SKY).unwrap();
        assert!(text.starts_with(SCENE_PRELUDE));
        assert!(text.ends_with("// custom sky"));
    }
}
