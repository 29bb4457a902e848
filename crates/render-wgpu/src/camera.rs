use glam::{Mat4, Vec3};
use prism_input::{Action, ActionMap, InputSnapshot};
use prism_render::RenderView;

/// Fly camera with position, yaw, pitch, and projection parameters.
/// Driven by actions, never by raw keys.
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub sprint_factor: f32,
    pub sensitivity: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 6.0),
            yaw: -90.0_f32.to_radians(),
            pitch: -15.0_f32.to_radians(),
            fov: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 200.0,
            speed: 5.0,
            sprint_factor: 3.0,
            sensitivity: 0.003,
        }
    }
}

impl FlyCamera {
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    /// Move by a camera-local intent (x right, y world up, z forward).
    pub fn translate(&mut self, intent: Vec3, dt: f32, sprint: bool) {
        if intent == Vec3::ZERO {
            return;
        }
        let speed = if sprint { self.speed * self.sprint_factor } else { self.speed };
        let step = self.right() * intent.x + Vec3::Y * intent.y + self.forward() * intent.z;
        self.position += step.normalize_or_zero() * speed * dt;
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch -= dy * self.sensitivity;
        self.pitch = self.pitch.clamp(-89.0_f32.to_radians(), 89.0_f32.to_radians());
    }

    /// Apply held movement actions and, while mouse look is on, the mouse delta.
    pub fn apply_input(&mut self, actions: &ActionMap, input: &InputSnapshot, dt: f32) {
        let sprint = actions.held(input).contains(&Action::Sprint);
        self.translate(actions.movement(input), dt, sprint);
        if input.mouse_look() {
            let delta = input.mouse_delta();
            self.rotate(delta.x, delta.y);
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn render_view(&self) -> RenderView {
        RenderView {
            view: self.view_matrix(),
            proj: self.projection_matrix(),
            position: self.position,
            near: self.near,
            far: self.far,
        }
    }
}
