use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use clap::Parser;
use egui::Context as EguiContext;
use glam::{Mat4, Vec2, Vec3};
use prism_assets::RenderableAsset;
use prism_input::{Action, Key};
use prism_render::{PointLight, RenderContext, RendererConfig, SceneState, ShaderRegistry};
use prism_render_wgpu::{FlyCamera, FrameStats, GpuContext, RenderError, SceneRenderer};
use prism_tools::SceneInspector;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

#[derive(Parser)]
#[command(name = "prism-desktop", about = "Prism desktop viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Renderer configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start with ambient occlusion disabled
    #[arg(long)]
    no_ssao: bool,

    /// Present without waiting for vblank
    #[arg(long)]
    no_vsync: bool,

    /// Directory of `<key>.wgsl` shader overrides, reloaded with F5
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    /// Directory with diffuse.ktx2, specular.ktx2 and lut.png for image-based lighting
    #[arg(long)]
    environment: Option<PathBuf>,

    /// glTF assets to load, placed side by side along +X
    assets: Vec<PathBuf>,
}

fn map_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyN => Key::N,
        KeyCode::Space => Key::Space,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::Shift,
        KeyCode::ControlLeft | KeyCode::ControlRight => Key::Control,
        KeyCode::Escape => Key::Escape,
        KeyCode::Tab => Key::Tab,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        _ => return None,
    })
}

/// Work from this frame's actions that needs the window or the GPU.
#[derive(Default)]
struct Deferred {
    quit: bool,
    reload_shaders: bool,
    mouse_look: Option<bool>,
}

/// Application state.
struct AppState {
    ctx: RenderContext,
    scene: SceneState,
    config: RendererConfig,
    camera: FlyCamera,
    show_overlay: bool,
    last_frame: Instant,
    frame_ms: f32,
    last_stats: Option<FrameStats>,
    reload_requested: bool,
}

impl AppState {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => RendererConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => RendererConfig::default(),
        };
        if cli.no_ssao {
            config.ssao.enabled = false;
        }
        if cli.no_vsync {
            config.vsync = false;
        }
        if cli.shader_dir.is_some() {
            config.shader_dir = cli.shader_dir.clone();
        }
        if cli.environment.is_some() {
            config.environment_dir = cli.environment.clone();
        }

        let mut shaders = ShaderRegistry::new();
        prism_render_wgpu::register_builtin(&mut shaders);
        shaders.set_override_dir(config.shader_dir.clone());
        if shaders.override_dir().is_some() {
            let changed = shaders.reload_from_dir()?;
            tracing::info!(count = changed.len(), "shader overrides applied");
        }

        let mut scene = SceneState::new(config.environment);
        for path in &cli.assets {
            match RenderableAsset::load(path) {
                Ok(asset) => {
                    let index = scene.add_asset(asset);
                    let offset = Vec3::new(index as f32 * 4.0, 0.0, 0.0);
                    scene.set_asset_transform(index, Mat4::from_translation(offset));
                    tracing::info!(path = %path.display(), index, "asset loaded");
                }
                Err(e) => tracing::error!(path = %path.display(), "skipping asset: {e}"),
            }
        }
        for light in [
            PointLight::new(Vec3::new(2.0, 2.5, 2.0), Vec3::new(1.0, 0.85, 0.6), 8.0, 10.0),
            PointLight::new(Vec3::new(-3.0, 1.5, -1.0), Vec3::new(0.5, 0.7, 1.0), 6.0, 8.0),
        ] {
            if let Err(e) = scene.add_point_light(light) {
                tracing::warn!("{e}");
            }
        }

        let camera = FlyCamera {
            fov: config.fov_degrees.to_radians(),
            near: config.near,
            far: config.far,
            ..FlyCamera::default()
        };

        Ok(Self {
            ctx: RenderContext::new(shaders),
            scene,
            config,
            camera,
            show_overlay: true,
            last_frame: Instant::now(),
            frame_ms: 0.0,
            last_stats: None,
            reload_requested: false,
        })
    }

    fn handle_key(&mut self, code: KeyCode, pressed: bool) {
        let Some(key) = map_key(code) else {
            return;
        };
        if pressed {
            self.ctx.input.key_down(key);
        } else {
            self.ctx.input.key_up(key);
        }
    }

    fn apply_actions(&mut self) -> Deferred {
        let mut deferred = Deferred {
            reload_shaders: std::mem::take(&mut self.reload_requested),
            ..Deferred::default()
        };
        for action in self.ctx.triggered() {
            match action {
                Action::ToggleFrustumFreeze => self.scene.toggle_frustum_freeze(&self.camera.render_view()),
                Action::ToggleCollisionDebug => {
                    let enabled = !self.scene.collision_debug();
                    self.scene.set_collision_debug(enabled);
                    tracing::info!(enabled, "collision debug");
                }
                Action::ToggleSsao => {
                    self.config.ssao.enabled = !self.config.ssao.enabled;
                    tracing::info!(enabled = self.config.ssao.enabled, "ssao");
                }
                Action::ToggleCascadeCulling => {
                    self.config.shadows.cull_cascades = !self.config.shadows.cull_cascades;
                    tracing::info!(enabled = self.config.shadows.cull_cascades, "cascade culling");
                }
                Action::ToggleOverlay => self.show_overlay = !self.show_overlay,
                Action::ToggleMouseLook => {
                    let enabled = !self.ctx.input.mouse_look();
                    self.ctx.input.set_mouse_look(enabled);
                    deferred.mouse_look = Some(enabled);
                }
                Action::ReloadShaders => deferred.reload_shaders = true,
                Action::NextAnimation => self.next_animation(),
                Action::ToggleAnimationPause => self.toggle_animation_pause(),
                Action::Quit => deferred.quit = true,
                _ => {}
            }
        }
        deferred
    }

    fn next_animation(&mut self) {
        for index in 0..self.scene.assets().len() {
            let Some(player) = self.scene.asset_mut(index).and_then(|a| a.player_mut()) else {
                continue;
            };
            if player.cycle().is_some() {
                let name = player.active().map(|a| a.name.clone()).unwrap_or_default();
                tracing::info!(asset = index, animation = %name, "animation switched");
            }
        }
    }

    fn toggle_animation_pause(&mut self) {
        for index in 0..self.scene.assets().len() {
            if let Some(player) = self.scene.asset_mut(index).and_then(|a| a.player_mut()) {
                player.set_paused(!player.is_paused());
            }
        }
    }

    fn reload_shaders(&mut self, device: &wgpu::Device, renderer: &mut SceneRenderer) {
        match self.ctx.shaders.reload_from_dir() {
            Ok(changed) => tracing::info!(count = changed.len(), "shader sources reloaded"),
            Err(e) => {
                tracing::error!("shader reload failed: {e}");
                return;
            }
        }
        for error in renderer.rebuild_shaders(device, &mut self.ctx.shaders) {
            tracing::error!("{error}");
        }
    }

    fn draw_ui(&mut self, ctx: &EguiContext) {
        if !self.show_overlay {
            return;
        }

        let summary = SceneInspector::summary(&self.scene);

        egui::SidePanel::left("overlay")
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.heading("Prism");
                ui.separator();
                ui.label(format!("Frame: {}  ({:.2} ms)", summary.frame, self.frame_ms));
                if let Some(stats) = &self.last_stats {
                    ui.label(format!(
                        "Passes: {}  Cull dispatches: {}  Asset draws: {}",
                        stats.passes, stats.cull_dispatches, stats.asset_draws
                    ));
                }
                ui.label(format!(
                    "Camera: ({:.1}, {:.1}, {:.1})",
                    self.camera.position.x, self.camera.position.y, self.camera.position.z
                ));
                ui.label(format!("Point lights: {}", summary.point_lights));
                if summary.frustum_frozen {
                    ui.colored_label(egui::Color32::YELLOW, "Frustum frozen");
                }
                ui.separator();

                ui.heading("Renderer");
                ui.checkbox(&mut self.config.ssao.enabled, "SSAO (F4)");
                ui.checkbox(&mut self.config.bloom.enabled, "Bloom");
                ui.checkbox(&mut self.config.shadows.cull_cascades, "Cull shadow cascades (Tab)");
                let mut collision = self.scene.collision_debug();
                if ui.checkbox(&mut collision, "Collision debug (F3)").changed() {
                    self.scene.set_collision_debug(collision);
                }
                ui.add(egui::Slider::new(&mut self.config.exposure, 0.1..=4.0).text("Exposure"));
                ui.add(egui::Slider::new(&mut self.config.bloom.intensity, 0.0..=1.0).text("Bloom intensity"));
                if ui.button("Reload shaders (F5)").clicked() {
                    self.reload_requested = true;
                }

                ui.separator();
                ui.heading(format!("Assets ({} draws)", summary.total_draws()));
                for asset in &summary.assets {
                    ui.label(asset.to_string());
                }

                ui.separator();
                ui.small("F1 overlay | Space mouse look | WASD/QE move | N/P animation | F2 freeze");
            });
    }
}

struct GpuApp {
    state: AppState,
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    renderer: Option<SceneRenderer>,
    egui_ctx: EguiContext,
    egui_winit: Option<egui_winit::State>,
    egui_renderer: Option<egui_wgpu::Renderer>,
    error: Option<anyhow::Error>,
}

impl GpuApp {
    fn new(state: AppState) -> Self {
        Self {
            state,
            window: None,
            gpu: None,
            renderer: None,
            egui_ctx: EguiContext::default(),
            egui_winit: None,
            egui_renderer: None,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("Prism")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let size = window.inner_size();
        let gpu = GpuContext::new(window.clone(), (size.width, size.height), self.state.config.vsync)?;
        let renderer = SceneRenderer::new(&gpu, &self.state.ctx.shaders, &self.state.config)?;
        self.state.camera.set_viewport(size.width, size.height);

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&gpu.device, gpu.format(), None, 1, false);

        tracing::info!(
            adapter = %gpu.adapter_info.name,
            backend = gpu.adapter_info.backend.to_str(),
            multi_draw = gpu.supports_multi_draw(),
            "GPU initialized"
        );

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.renderer = Some(renderer);
        self.egui_winit = Some(egui_winit);
        self.egui_renderer = Some(egui_renderer);
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(gpu), Some(renderer), Some(egui_winit), Some(egui_renderer)) = (
            self.window.as_ref(),
            self.gpu.as_mut(),
            self.renderer.as_mut(),
            self.egui_winit.as_mut(),
            self.egui_renderer.as_mut(),
        ) else {
            return;
        };
        let state = &mut self.state;

        let now = Instant::now();
        let dt = (now - state.last_frame).as_secs_f32().min(0.1);
        state.last_frame = now;
        state.frame_ms = state.frame_ms * 0.9 + dt * 1000.0 * 0.1;

        if let Some((width, height)) = state.ctx.input.take_resize() {
            gpu.resize(width, height);
            renderer.resize(&gpu.device, gpu.size());
            state.camera.set_viewport(width, height);
        }

        state.camera.apply_input(&state.ctx.actions, &state.ctx.input, dt);
        let deferred = state.apply_actions();
        if deferred.quit {
            event_loop.exit();
            return;
        }
        if let Some(enabled) = deferred.mouse_look {
            let grab = if enabled { CursorGrabMode::Locked } else { CursorGrabMode::None };
            if window.set_cursor_grab(grab).is_err() && enabled {
                let _ = window.set_cursor_grab(CursorGrabMode::Confined);
            }
            window.set_cursor_visible(!enabled);
        }
        if deferred.reload_shaders {
            state.reload_shaders(&gpu.device, renderer);
        }

        let view = state.camera.render_view();
        let update = state.scene.pre_render(&view, dt, &state.config, gpu.size());

        let raw_input = egui_winit.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| state.draw_ui(ctx));
        egui_winit.handle_platform_output(window, full_output.platform_output);
        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let (width, height) = gpu.size();
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point: full_output.pixels_per_point,
        };
        for (id, image_delta) in &full_output.textures_delta.set {
            egui_renderer.update_texture(&gpu.device, &gpu.queue, *id, image_delta);
        }

        let result = renderer.render_frame(
            gpu,
            &state.scene,
            &update,
            &state.config,
            |device: &wgpu::Device, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView| {
                let buffers = egui_renderer.update_buffers(device, queue, encoder, &paint_jobs, &screen_descriptor);
                let mut pass = encoder
                    .begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("egui_pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: target,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        ..Default::default()
                    })
                    .forget_lifetime();
                egui_renderer.render(&mut pass, &paint_jobs, &screen_descriptor);
                buffers
            },
        );

        for id in &full_output.textures_delta.free {
            egui_renderer.free_texture(id);
        }

        match result {
            Ok(Some(stats)) => state.last_stats = Some(stats),
            Ok(None) => {}
            Err(RenderError::DeviceLost) => {
                tracing::error!("GPU device lost; exiting");
                self.error = Some(RenderError::DeviceLost.into());
                event_loop.exit();
                return;
            }
            Err(e) => tracing::error!("frame failed: {e}"),
        }

        state.ctx.end_frame();
        window.request_redraw();
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            tracing::error!("initialization failed: {e:#}");
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let (Some(egui_winit), Some(window)) = (&mut self.egui_winit, &self.window) {
            let response = egui_winit.on_window_event(window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.state.ctx.input.resized(new_size.width, new_size.height);
            }
            WindowEvent::Focused(false) => {
                self.state.ctx.input.reset();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                self.state.handle_key(key, key_state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.state.ctx.input.mouse_moved(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("prism-desktop starting");

    let state = AppState::new(&cli)?;
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(state);
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_keys_map_to_engine_keys() {
        assert_eq!(map_key(KeyCode::KeyW), Some(Key::W));
        assert_eq!(map_key(KeyCode::ShiftRight), Some(Key::Shift));
        assert_eq!(map_key(KeyCode::F5), Some(Key::F5));
        assert_eq!(map_key(KeyCode::KeyZ), None);
    }

    #[test]
    fn actions_toggle_renderer_state() {
        let cli = Cli::parse_from(["prism-desktop", "--no-ssao"]);
        let mut state = AppState::new(&cli).unwrap();
        assert!(!state.config.ssao.enabled);
        assert_eq!(state.scene.point_lights().len(), 2);

        state.handle_key(KeyCode::F4, true);
        state.handle_key(KeyCode::Tab, true);
        state.handle_key(KeyCode::F2, true);
        let deferred = state.apply_actions();
        assert!(!deferred.quit);
        assert!(state.config.ssao.enabled);
        assert!(!state.config.shadows.cull_cascades);
        assert!(state.scene.frozen_view().is_some());
    }

    #[test]
    fn deferred_actions_are_reported() {
        let mut state = AppState::new(&Cli::parse_from(["prism-desktop"])).unwrap();
        state.handle_key(KeyCode::Escape, true);
        state.handle_key(KeyCode::Space, true);
        state.handle_key(KeyCode::F5, true);
        let deferred = state.apply_actions();
        assert!(deferred.quit);
        assert!(deferred.reload_shaders);
        assert_eq!(deferred.mouse_look, Some(true));
        assert!(state.ctx.input.mouse_look());
    }
}
