//! Fly camera (Z up) and the matrices it feeds to shaders.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Degrees of rotation per pixel of mouse motion.
pub const MOUSE_SENSITIVITY: f32 = 0.05;
/// Units per second.
pub const MOVE_SPEED: f32 = 3.0;
/// Pitch limit in degrees, short of straight up/down.
pub const PITCH_LIMIT: f32 = 89.999;

/// Construction parameters. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraConfig {
    pub yaw: f32,
    pub pitch: f32,
    pub position: Vec3,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: -20.0,
            position: Vec3::new(0.0, -4.0, 2.5),
            fov: 50.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

/// Per-frame movement request; each axis is usually -1, 0 or 1.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Movement {
    /// Along the view direction.
    pub forward: f32,
    /// Along `front x up`.
    pub right: f32,
    /// Along world +Z.
    pub up: f32,
}

/// Yaw/pitch fly camera.
#[derive(Debug, Clone)]
pub struct Camera {
    yaw: f32,
    pitch: f32,
    position: Vec3,
    front: Vec3,
    projection: Mat4,
}

impl Camera {
    /// World up.
    pub const UP: Vec3 = Vec3::Z;

    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        let pitch = config.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        Self {
            yaw: config.yaw,
            pitch,
            position: config.position,
            front: front_vector(config.yaw, pitch),
            projection: vulkan_perspective(config.fov, aspect, config.near, config.far),
        }
    }

    pub const fn yaw(&self) -> f32 {
        self.yaw
    }

    pub const fn pitch(&self) -> f32 {
        self.pitch
    }

    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit view direction.
    pub const fn front(&self) -> Vec3 {
        self.front
    }

    /// Unit vector to the right of the view direction.
    pub fn right(&self) -> Vec3 {
        self.front.cross(Self::UP).normalize()
    }

    /// Apply relative mouse motion in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - dy * MOUSE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.front = front_vector(self.yaw, self.pitch);
    }

    /// Move for `dt` seconds.
    pub fn advance(&mut self, movement: Movement, dt: f32) {
        let step = dt * MOVE_SPEED;
        self.position += self.front * movement.forward * step;
        self.position += self.right() * movement.right * step;
        self.position += Self::UP * movement.up * step;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, Self::UP)
    }

    pub const fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Uniform block for binding 10.
    pub fn camera_space(&self) -> CameraSpace {
        let view = self.view_matrix();
        CameraSpace {
            projection: self.projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            inverse_view: view.inverse().to_cols_array_2d(),
        }
    }
}

/// Direction for yaw/pitch in degrees; yaw 0 looks down +Y.
pub fn front_vector(yaw: f32, pitch: f32) -> Vec3 {
    let (yaw, pitch) = (yaw.to_radians(), pitch.to_radians());
    Vec3::new(pitch.cos() * yaw.sin(), pitch.cos() * yaw.cos(), pitch.sin()).normalize()
}

/// Right-handed perspective with 0..1 depth and Y flipped for Vulkan clip space.
pub fn vulkan_perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut projection = Mat4::perspective_rh(fov_degrees.to_radians(), aspect, near, far);
    projection.y_axis.y *= -1.0;
    projection
}

/// Camera matrices (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraSpace {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
}

/// Per-object model matrix (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ModelSpace {
    pub model: [[f32; 4]; 4],
}

impl From<Mat4> for ModelSpace {
    fn from(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniform_sizes() {
        assert_eq!(std::mem::size_of::<CameraSpace>(), 192);
        assert_eq!(std::mem::size_of::<ModelSpace>(), 64);
    }

    #[test]
    fn yaw_zero_looks_along_y() {
        let front = front_vector(0.0, 0.0);
        assert_relative_eq!(front.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(front.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(front.z, 0.0, epsilon = 1e-6);

        let right = front_vector(90.0, 0.0);
        assert_relative_eq!(right.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn default_camera_looks_down() {
        let camera = Camera::new(&CameraConfig::default(), 16.0 / 9.0);
        assert!(camera.front().z < 0.0);
        assert_relative_eq!(camera.front().length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::new(&CameraConfig::default(), 1.0);
        camera.rotate(0.0, -1_000_000.0);
        assert_relative_eq!(camera.pitch(), PITCH_LIMIT);
        camera.rotate(0.0, 1_000_000.0);
        assert_relative_eq!(camera.pitch(), -PITCH_LIMIT);
    }

    #[test]
    fn mouse_up_raises_pitch() {
        let mut camera = Camera::new(&CameraConfig::default(), 1.0);
        camera.rotate(20.0, -100.0);
        assert_relative_eq!(camera.yaw(), 1.0);
        assert_relative_eq!(camera.pitch(), -15.0, epsilon = 1e-5);
    }

    #[test]
    fn movement_scales_with_time() {
        let config = CameraConfig {
            pitch: 0.0,
            position: Vec3::ZERO,
            ..CameraConfig::default()
        };
        let mut camera = Camera::new(&config, 1.0);
        camera.advance(
            Movement {
                forward: 1.0,
                right: 1.0,
                up: -1.0,
            },
            0.5,
        );
        let position = camera.position();
        assert_relative_eq!(position.x, 1.5, epsilon = 1e-5);
        assert_relative_eq!(position.y, 1.5, epsilon = 1e-5);
        assert_relative_eq!(position.z, -1.5, epsilon = 1e-5);
    }

    #[test]
    fn projection_flips_y() {
        let gl = Mat4::perspective_rh(50f32.to_radians(), 1.5, 0.01, 1000.0);
        let vk = vulkan_perspective(50.0, 1.5, 0.01, 1000.0);
        assert_relative_eq!(vk.y_axis.y, -gl.y_axis.y);
        assert_relative_eq!(vk.x_axis.x, gl.x_axis.x);
    }

    #[test]
    fn inverse_view_round_trips() {
        let camera = Camera::new(&CameraConfig::default(), 1.0);
        let space = camera.camera_space();
        let view = Mat4::from_cols_array_2d(&space.view);
        let inverse = Mat4::from_cols_array_2d(&space.inverse_view);
        let identity = view * inverse;
        for (a, b) in identity.to_cols_array().iter().zip(Mat4::IDENTITY.to_cols_array()) {
            assert_relative_eq!(*a, b, epsilon = 1e-4);
        }
    }
}
