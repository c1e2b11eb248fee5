//! Point lights and the illumination uniform block.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Capacity of the light array in the illumination block.
pub const MAX_LIGHTS: usize = 10;

/// One point light (std140, 48 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SpotLight {
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 4],
    pub size: f32,
    pub _pad: [f32; 3],
}

impl SpotLight {
    pub fn new(position: Vec3, color: Vec4, intensity: f32, size: f32) -> Self {
        Self {
            position: position.to_array(),
            intensity,
            color: color.to_array(),
            size,
            _pad: [0.0; 3],
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Rotate the light's position by `angle` radians around world Z.
    pub fn rotate_about_z(&mut self, angle: f32) {
        self.position = Mat4::from_rotation_z(angle)
            .transform_point3(self.position())
            .to_array();
    }
}

/// `count` lights evenly spaced around Z, starting from `start`.
pub fn ring_positions(start: Vec3, count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / count as f32;
            Mat4::from_rotation_z(angle).transform_point3(start)
        })
        .collect()
}

/// Ambient term plus up to [`MAX_LIGHTS`] point lights (std140, 528 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Illumination {
    pub ambient_intensity: f32,
    pub _pad0: [f32; 3],
    pub ambient_color: [f32; 4],
    pub lights: [SpotLight; MAX_LIGHTS],
    pub light_count: i32,
    pub _pad1: [i32; 3],
}

impl Illumination {
    /// Build the block; lights past [`MAX_LIGHTS`] are dropped with a warning.
    pub fn new(ambient_intensity: f32, ambient_color: Vec4, lights: &[SpotLight]) -> Self {
        if lights.len() > MAX_LIGHTS {
            tracing::warn!(
                "{} lights requested, only the first {MAX_LIGHTS} are uploaded",
                lights.len()
            );
        }

        let mut block = Self::zeroed();
        block.ambient_intensity = ambient_intensity;
        block.ambient_color = ambient_color.to_array();

        let used = lights.len().min(MAX_LIGHTS);
        block.lights[..used].copy_from_slice(&lights[..used]);
        block.light_count = used as i32;
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::mem::{offset_of, size_of};

    #[test]
    fn std140_layout() {
        assert_eq!(size_of::<SpotLight>(), 48);
        assert_eq!(offset_of!(SpotLight, color), 16);
        assert_eq!(offset_of!(SpotLight, size), 32);

        assert_eq!(size_of::<Illumination>(), 528);
        assert_eq!(offset_of!(Illumination, ambient_color), 16);
        assert_eq!(offset_of!(Illumination, lights), 32);
        assert_eq!(offset_of!(Illumination, light_count), 512);
    }

    #[test]
    fn extra_lights_are_truncated() {
        let light = SpotLight::new(Vec3::ONE, Vec4::ONE, 1.0, 1.0);
        let block = Illumination::new(0.001, Vec4::ONE, &[light; 12]);
        assert_eq!(block.light_count, 10);
    }

    #[test]
    fn unused_slots_stay_zeroed() {
        let light = SpotLight::new(Vec3::X, Vec4::ONE, 1.0, 1.0);
        let block = Illumination::new(0.5, Vec4::ONE, &[light; 2]);
        assert_eq!(block.light_count, 2);
        assert_eq!(block.lights[1], light);
        assert_eq!(block.lights[2], SpotLight::zeroed());
    }

    #[test]
    fn six_lights_form_a_ring() {
        let positions = ring_positions(Vec3::splat(1.5), 6);
        assert_eq!(positions.len(), 6);
        assert_relative_eq!(positions[0].x, 1.5, epsilon = 1e-5);
        assert_relative_eq!(positions[0].y, 1.5, epsilon = 1e-5);
        for position in &positions {
            assert_relative_eq!(position.z, 1.5, epsilon = 1e-5);
            assert_relative_eq!(position.truncate().length(), 1.5 * 2f32.sqrt(), epsilon = 1e-5);
        }
        // Opposite lights are mirrored through the Z axis.
        assert_relative_eq!(positions[3].x, -1.5, epsilon = 1e-5);
        assert_relative_eq!(positions[3].y, -1.5, epsilon = 1e-5);
    }

    #[test]
    fn quarter_turn_about_z() {
        let mut light = SpotLight::new(Vec3::new(1.0, 0.0, 2.0), Vec4::ONE, 1.0, 1.0);
        light.rotate_about_z(std::f32::consts::FRAC_PI_2);
        let position = light.position();
        assert_relative_eq!(position.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(position.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(position.z, 2.0, epsilon = 1e-6);
    }
}
