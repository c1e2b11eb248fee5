//! Held-key tracking for fly controls.

use hashbrown::HashSet;
use lumen_render::Movement;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Keys currently held down.
#[derive(Debug, Default)]
pub struct KeyTracker {
    held: HashSet<KeyCode>,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_key_event(&mut self, event: &KeyEvent) {
        let PhysicalKey::Code(key) = event.physical_key else {
            return;
        };
        self.set(key, event.state == ElementState::Pressed);
    }

    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// Movement request from WASD, Space and Left Shift.
    pub fn movement(&self) -> Movement {
        let axis = |positive: KeyCode, negative: KeyCode| {
            f32::from(u8::from(self.is_pressed(positive))) - f32::from(u8::from(self.is_pressed(negative)))
        };
        Movement {
            forward: axis(KeyCode::KeyW, KeyCode::KeyS),
            right: axis(KeyCode::KeyD, KeyCode::KeyA),
            up: axis(KeyCode::Space, KeyCode::ShiftLeft),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keys_means_no_movement() {
        assert_eq!(KeyTracker::new().movement(), Movement::default());
    }

    #[test]
    fn held_keys_map_to_axes() {
        let mut keys = KeyTracker::new();
        keys.set(KeyCode::KeyW, true);
        keys.set(KeyCode::KeyA, true);
        keys.set(KeyCode::ShiftLeft, true);
        assert_eq!(
            keys.movement(),
            Movement {
                forward: 1.0,
                right: -1.0,
                up: -1.0,
            }
        );
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut keys = KeyTracker::new();
        keys.set(KeyCode::KeyW, true);
        keys.set(KeyCode::KeyS, true);
        assert!(keys.movement().forward.abs() < f32::EPSILON);
    }

    #[test]
    fn release_clears_key() {
        let mut keys = KeyTracker::new();
        keys.set(KeyCode::Space, true);
        keys.set(KeyCode::Space, false);
        assert!(!keys.is_pressed(KeyCode::Space));
        assert!(keys.movement().up.abs() < f32::EPSILON);
    }
}
