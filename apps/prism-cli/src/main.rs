use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use glam::Vec3;
use prism_assets::RenderableAsset;
use prism_common::{Capsule, Collider, Sphere, limits};
use prism_render::scene::SceneState;
use prism_render::{
    DebugTextRenderer, FrameGraph, RenderView, Renderer, RendererConfig, ShaderRegistry, compute_cascades,
};
use prism_tools::SceneInspector;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prism-cli", about = "CLI for prism assets, shaders and frame reports")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version, crate info and fixed limits
    Info,
    /// Load a glTF file and summarise what the renderer would upload
    Inspect {
        path: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the shadow cascades for a camera
    Cascades {
        /// Camera position
        #[arg(long, num_args = 3, default_values_t = [0.0, 2.0, 6.0], allow_negative_numbers = true)]
        eye: Vec<f32>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Run pre-render and the CPU reference cull, then print the frame report
    Frame {
        /// glTF assets to place in the scene
        assets: Vec<PathBuf>,
        #[arg(long, num_args = 3, default_values_t = [0.0, 2.0, 6.0], allow_negative_numbers = true)]
        eye: Vec<f32>,
        /// Frames to advance before reporting (animations step 1/60 s each)
        #[arg(long, default_value = "1")]
        frames: u32,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Place a sphere or upright capsule among the assets and print the contacts
    Collide {
        assets: Vec<PathBuf>,
        /// Sphere centre, or the bottom tip of the capsule
        #[arg(long, num_args = 3, default_values_t = [0.0, 0.0, 0.0], allow_negative_numbers = true)]
        at: Vec<f32>,
        #[arg(long, default_value = "0.5")]
        radius: f32,
        /// Capsule height; a sphere is used when absent
        #[arg(long)]
        height: Option<f32>,
        #[arg(long)]
        json: bool,
    },
    /// List built-in shaders, or print one composed shader
    Shaders {
        /// Directory of `<key>.wgsl` overrides
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Print the full composed source of this shader
        #[arg(long)]
        print: Option<String>,
    },
    /// Print the default renderer configuration as YAML
    Config,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RendererConfig> {
    match path {
        Some(path) => RendererConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(RendererConfig::default()),
    }
}

fn camera(eye: &[f32], config: &RendererConfig) -> RenderView {
    let eye = match eye {
        [x, y, z] => Vec3::new(*x, *y, *z),
        _ => Vec3::new(0.0, 2.0, 6.0),
    };
    RenderView::look_at(eye, Vec3::ZERO, config.fov_degrees.to_radians(), 16.0 / 9.0, config.near, config.far)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("prism-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", prism_common::crate_info());
            println!("assets: {}", prism_assets::crate_info());
            println!("render: {}", prism_render::crate_info());
            println!("render-wgpu: {}", prism_render_wgpu::crate_info());
            println!("input: {}", prism_input::crate_info());
            println!("tools: {}", prism_tools::crate_info());
            println!(
                "limits: shadow map {0}x{0}, {1} cascades, {2} bloom mips, {3} indirect slots, \
                 cull workgroup {4}, {5} point lights",
                limits::SHADOW_MAP_DIMENSIONS,
                limits::SHADOW_MAP_CASCADES,
                limits::BLOOM_MIP_COUNT,
                limits::INDIRECT_BUFFER_SLOTS,
                limits::CULL_WORKGROUP_SIZE,
                limits::MAX_POINT_LIGHTS,
            );
            println!(
                "required adapter features: {:?}, optional: {:?}",
                prism_render_wgpu::REQUIRED_FEATURES,
                prism_render_wgpu::OPTIONAL_FEATURES
            );
        }
        Commands::Inspect { path, json } => {
            let asset = RenderableAsset::load(&path).with_context(|| format!("loading {}", path.display()))?;
            let summary = SceneInspector::asset(&asset);
            if json {
                print_json(&summary)?;
            } else {
                println!("{summary}");
                for (i, name) in summary.animations.iter().enumerate() {
                    println!("  animation {i}: {name}");
                }
                for (i, meta) in asset.draw_set().metadata().iter().enumerate() {
                    let c = asset.draw_set().commands()[i];
                    println!(
                        "  draw {i}: indices={} first_index={} vertex_offset={} material={} radius={:.3}",
                        c.index_count, c.first_index, c.vertex_offset, meta.material_index, meta.bounding_sphere.radius
                    );
                }
            }
        }
        Commands::Cascades { eye, config, json } => {
            let config = load_config(config.as_ref())?;
            let view = camera(&eye, &config);
            let cascades = compute_cascades(&view, config.environment.sun_direction);
            let summaries = SceneInspector::cascades(&cascades);
            if json {
                print_json(&summaries)?;
            } else {
                for summary in &summaries {
                    println!("{summary}");
                }
            }
        }
        Commands::Frame {
            assets,
            eye,
            frames,
            config,
            json,
        } => {
            let config = load_config(config.as_ref())?;
            let mut scene = SceneState::new(config.environment);
            for path in &assets {
                match RenderableAsset::load(path) {
                    Ok(asset) => {
                        scene.add_asset(asset);
                    }
                    Err(e) => tracing::error!(path = %path.display(), "skipping asset: {e}"),
                }
            }

            let view = camera(&eye, &config);
            let mut update = scene.pre_render(&view, 0.0, &config, (1920, 1080));
            for _ in 1..frames.max(1) {
                update = scene.pre_render(&view, 1.0 / 60.0, &config, (1920, 1080));
            }

            if json {
                print_json(&serde_json::json!({
                    "scene": SceneInspector::summary(&scene),
                    "cull": SceneInspector::cull_report(&scene, &update),
                    "plan": FrameGraph::standard(&config)?.compile(),
                }))?;
            } else {
                print!("{}", DebugTextRenderer::new(config).render(&scene, &view));
            }
        }
        Commands::Collide {
            assets,
            at,
            radius,
            height,
            json,
        } => {
            let config = RendererConfig::default();
            let mut scene = SceneState::new(config.environment);
            for path in &assets {
                let asset = RenderableAsset::load(path).with_context(|| format!("loading {}", path.display()))?;
                scene.add_asset(asset);
            }
            scene.pre_render(&camera(&[0.0, 2.0, 6.0], &config), 0.0, &config, (1, 1));

            let base = match at.as_slice() {
                [x, y, z] => Vec3::new(*x, *y, *z),
                _ => Vec3::ZERO,
            };
            let collider = match height {
                Some(h) => Collider::Capsule(Capsule::new(base, base + Vec3::Y * h, radius)),
                None => Collider::Sphere(Sphere::new(base, radius)),
            };
            let contacts = scene.contacts(&collider);
            if json {
                print_json(&contacts)?;
            } else if contacts.is_empty() {
                println!("no contacts");
            } else {
                for (index, c) in &contacts {
                    println!(
                        "asset {index}: depth={:.4} normal=({:.3}, {:.3}, {:.3})",
                        c.depth, c.normal.x, c.normal.y, c.normal.z
                    );
                }
            }
        }
        Commands::Shaders { dir, print } => {
            let mut registry = ShaderRegistry::new();
            prism_render_wgpu::register_builtin(&mut registry);
            if dir.is_some() {
                registry.set_override_dir(dir);
                let changed = registry.reload_from_dir()?;
                println!("{} override(s) applied", changed.len());
            }
            match print {
                Some(name) => {
                    let key = prism_render_wgpu::builtin_keys()
                        .find(|k| k.as_str() == name)
                        .with_context(|| format!("unknown shader {name:?}"))?;
                    println!("{}", prism_render_wgpu::compose(&registry, key)?);
                }
                None => {
                    for entry in registry.entries() {
                        println!("{:<12} {:?} {:?} {}", entry.key.as_str(), entry.stage, entry.origin(), entry.digest_hex());
                    }
                }
            }
        }
        Commands::Config => {
            print!("{}", RendererConfig::default().to_yaml()?);
        }
    }

    Ok(())
}
