//! Perspective camera and first-person controller

use crate::config::CameraConfig;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3, Vec4};
use crate::input::{EventResponse, InputEvent, InputState, KeyCode, MouseButton};

/// 3D perspective camera
///
/// View space is right-handed and Y-up. The Vulkan flip to Y-down clip space
/// is a separate matrix applied between projection and view.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Viewport width / height
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Create a perspective camera from configuration
    pub fn from_config(position: Vec3, aspect: f32, config: &CameraConfig) -> Self {
        Self::perspective(position, config.fov_degrees, aspect, config.near, config.far)
    }

    /// Update camera position in world space
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Point the camera at `target` with a custom up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Update aspect ratio after a viewport change
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::info!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// Perspective projection with a [0, 1] depth range
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far)
    }

    /// Combined P × X × V, where X flips view space into Vulkan clip conventions
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * Mat4::vulkan_coordinate_transform() * self.view_matrix()
    }

    /// World-space ray through a point given in normalized device coordinates
    ///
    /// Returns `(origin, direction)`, or `None` if the camera matrices are
    /// degenerate.
    pub fn screen_to_world_ray(&self, ndc_x: f32, ndc_y: f32) -> Option<(Vec3, Vec3)> {
        let inverse = self.view_projection_matrix().try_inverse()?;

        let unproject = |depth: f32| {
            let h = inverse * Vec4::new(ndc_x, ndc_y, depth, 1.0);
            Vec3::new(h.x / h.w, h.y / h.w, h.z / h.w)
        };
        let near = unproject(0.0);
        let far = unproject(1.0);

        let direction = (far - near).try_normalize(f32::EPSILON)?;
        Some((self.position, direction))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 3.0, 3.0),
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Anything that turns input into a view-projection matrix
pub trait CameraController {
    /// Current projection * view
    fn view_projection(&self) -> Mat4;

    /// Eye position in world space
    fn position(&self) -> Vec3;

    /// React to input that no layer handled
    fn handle_input(&mut self, event: &InputEvent) -> EventResponse;

    /// Advance by `delta_time` seconds
    fn update(&mut self, delta_time: f32);
}

/// WASD + right-mouse-look camera
///
/// W/S move along the view direction, A/D strafe, E/Q rise and sink, Left
/// Shift triples speed and the scroll wheel scales the base speed.
#[derive(Debug, Clone)]
pub struct FirstPersonController {
    camera: Camera,
    yaw: f32,
    pitch: f32,
    input: InputState,
    move_speed: f32,
    mouse_sensitivity: f32,
    looking: bool,
    last_cursor: Option<(f64, f64)>,
}

impl FirstPersonController {
    const PITCH_LIMIT: f32 = 89.0_f32 * std::f32::consts::PI / 180.0;
    const FAST_MULTIPLIER: f32 = 3.0;

    /// Wrap `camera`, keeping its current viewing direction
    pub fn new(camera: Camera, config: &CameraConfig) -> Self {
        let direction = (camera.target - camera.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| Vec3::new(0.0, 0.0, -1.0));
        let yaw = direction.x.atan2(-direction.z);
        let pitch = direction.y.clamp(-1.0, 1.0).asin();

        let mut controller = Self {
            camera,
            yaw,
            pitch: pitch.clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT),
            input: InputState::new(),
            move_speed: config.move_speed,
            mouse_sensitivity: config.mouse_sensitivity,
            looking: false,
            last_cursor: None,
        };
        controller.sync_target();
        controller
    }

    /// Underlying camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Current base movement speed
    pub fn move_speed(&self) -> f32 {
        self.move_speed
    }

    /// Yaw around +Y in radians; 0 looks down -Z
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch in radians; positive looks up
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Unit view direction
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            -self.pitch.cos() * self.yaw.cos(),
        )
    }

    fn sync_target(&mut self) {
        self.camera.target = self.camera.position + self.forward();
    }

    fn is_movement_key(key: KeyCode) -> bool {
        matches!(
            key,
            KeyCode::W | KeyCode::A | KeyCode::S | KeyCode::D | KeyCode::Q | KeyCode::E | KeyCode::LeftShift
        )
    }
}

impl CameraController for FirstPersonController {
    fn view_projection(&self) -> Mat4 {
        self.camera.view_projection_matrix()
    }

    fn position(&self) -> Vec3 {
        self.camera.position
    }

    fn handle_input(&mut self, event: &InputEvent) -> EventResponse {
        match *event {
            InputEvent::KeyPressed { key, .. } | InputEvent::KeyReleased(key) if Self::is_movement_key(key) => {
                self.input.apply(event);
                EventResponse::Handled
            }
            InputEvent::MouseButton { button: MouseButton::Right, pressed } => {
                self.looking = pressed;
                self.last_cursor = None;
                EventResponse::Handled
            }
            InputEvent::MouseMoved { x, y } => {
                let previous = self.last_cursor.replace((x, y));
                if !self.looking {
                    return EventResponse::Unhandled;
                }
                if let Some((last_x, last_y)) = previous {
                    self.yaw += (x - last_x) as f32 * self.mouse_sensitivity;
                    self.pitch = (self.pitch - (y - last_y) as f32 * self.mouse_sensitivity)
                        .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
                    self.sync_target();
                }
                EventResponse::Handled
            }
            InputEvent::Scroll { dy, .. } => {
                self.move_speed = (self.move_speed * 1.1_f32.powf(dy as f32)).clamp(0.1, 1000.0);
                log::debug!("Camera speed: {:.2}", self.move_speed);
                EventResponse::Handled
            }
            InputEvent::WindowResized { width, height } => {
                if height > 0 {
                    self.camera.set_aspect_ratio(width as f32 / height as f32);
                }
                EventResponse::Unhandled
            }
            _ => EventResponse::Unhandled,
        }
    }

    fn update(&mut self, delta_time: f32) {
        let forward = self.forward();
        let right = forward.cross(&self.camera.up).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::x);
        let up = Vec3::y();

        let mut direction = Vec3::zeros();
        let axes = [
            (KeyCode::W, forward),
            (KeyCode::S, -forward),
            (KeyCode::D, right),
            (KeyCode::A, -right),
            (KeyCode::E, up),
            (KeyCode::Q, -up),
        ];
        for (key, axis) in axes {
            if self.input.is_key_down(key) {
                direction += axis;
            }
        }

        if let Some(direction) = direction.try_normalize(f32::EPSILON) {
            let mut speed = self.move_speed;
            if self.input.is_key_down(KeyCode::LeftShift) {
                speed *= Self::FAST_MULTIPLIER;
            }
            self.camera.position += direction * speed * delta_time;
        }
        self.sync_target();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn controller() -> FirstPersonController {
        let mut camera = Camera::from_config(Vec3::zeros(), 1.0, &CameraConfig::default());
        camera.target = Vec3::new(0.0, 0.0, -1.0);
        FirstPersonController::new(camera, &CameraConfig::default())
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera = Camera::default();
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);

        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0);
    }

    #[test]
    fn test_point_above_target_is_up_on_screen() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 45.0, 1.0, 0.1, 100.0);
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 1.0, 0.0, 1.0);

        // Vulkan clip space is Y-down
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 45.0, 1.0, 0.1, 100.0);
        let (origin, direction) = camera.screen_to_world_ray(0.0, 0.0).unwrap();

        assert_relative_eq!(origin, Vec3::new(0.0, 0.0, 5.0));
        assert_relative_eq!(direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-4);
    }

    #[test]
    fn test_forward_key_moves_along_view() {
        let mut fps = controller();
        let response = fps.handle_input(&InputEvent::KeyPressed { key: KeyCode::W, repeat: 0 });
        fps.update(1.0);

        assert!(response.is_handled());
        assert_relative_eq!(fps.position(), Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);

        fps.handle_input(&InputEvent::KeyReleased(KeyCode::W));
        fps.update(1.0);
        assert_relative_eq!(fps.position(), Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_cloned_controller_keeps_held_keys() {
        let mut fps = controller();
        fps.handle_input(&InputEvent::KeyPressed { key: KeyCode::W, repeat: 0 });

        let mut copy = fps.clone();
        copy.update(1.0);
        fps.update(1.0);

        assert_relative_eq!(copy.position(), fps.position(), epsilon = 1e-6);
        assert_relative_eq!(copy.position(), Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_mouse_look_requires_right_button() {
        let mut fps = controller();
        let yaw = fps.yaw();

        assert_eq!(fps.handle_input(&InputEvent::MouseMoved { x: 10.0, y: 0.0 }), EventResponse::Unhandled);
        fps.handle_input(&InputEvent::MouseButton { button: MouseButton::Right, pressed: true });
        fps.handle_input(&InputEvent::MouseMoved { x: 10.0, y: 0.0 });
        fps.handle_input(&InputEvent::MouseMoved { x: 110.0, y: 0.0 });

        assert_relative_eq!(fps.yaw(), yaw + 100.0 * 0.003, epsilon = 1e-6);
        assert_relative_eq!(fps.camera().target - fps.position(), fps.forward(), epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_clamped() {
        let mut fps = controller();
        fps.handle_input(&InputEvent::MouseButton { button: MouseButton::Right, pressed: true });
        fps.handle_input(&InputEvent::MouseMoved { x: 0.0, y: 0.0 });
        fps.handle_input(&InputEvent::MouseMoved { x: 0.0, y: -100_000.0 });

        assert!(fps.pitch() <= FirstPersonController::PITCH_LIMIT + 1e-6);
    }

    #[test]
    fn test_scroll_scales_speed_and_resize_sets_aspect() {
        let mut fps = controller();
        fps.handle_input(&InputEvent::Scroll { dx: 0.0, dy: 1.0 });
        assert_relative_eq!(fps.move_speed(), 5.5, epsilon = 1e-5);

        let response = fps.handle_input(&InputEvent::WindowResized { width: 1600, height: 900 });
        assert_eq!(response, EventResponse::Unhandled);
        assert_relative_eq!(fps.camera().aspect, 16.0 / 9.0, epsilon = 1e-6);
    }

    #[test]
    fn test_unrelated_keys_pass_through() {
        let mut fps = controller();
        let response = fps.handle_input(&InputEvent::KeyPressed { key: KeyCode::Enter, repeat: 0 });
        assert_eq!(response, EventResponse::Unhandled);
    }
}
